use std::{
    io,
    path::Path,
    time::Duration,
    };
use serial2_tokio::{SerialPort, CharSize, StopBits, Parity};
use tokio::time::{Instant, sleep_until, timeout_at};

use crate::{
    timing::transmission_time,
    transport::{Transmit, Transport},
    };


/**
    RS-485 line on a serial port, the transceiver direction being driven by RTS

    the kernel gives no asynchronous way to wait for the uart to empty, so [Transmit::flush] waits for the time the written bytes need at the port's baud rate
*/
pub struct SerialTransport {
    port: SerialPort,
    baud_rate: u32,
    drain: Drain,
}

impl SerialTransport {
    /// open the given serial port file in raw 8N1 mode at the given baud rate
    pub fn open(path: impl AsRef<Path>, rate: u32) -> Result<Self, io::Error> {
        let port = SerialPort::open(path, |mut settings: serial2_tokio::Settings| {
                settings.set_raw();
                settings.set_baud_rate(rate)?;
                settings.set_char_size(CharSize::Bits8);
                settings.set_stop_bits(StopBits::One);
                settings.set_parity(Parity::None);
                Ok(settings)
                })?;
        // start listening
        port.set_rts(false)?;
        Ok(Self {port, baud_rate: rate, drain: Drain::default()})
    }
    pub fn port(&self) -> &SerialPort {
        &self.port
    }
}

impl Transmit for SerialTransport {
    type Error = io::Error;

    fn set_direction(&mut self, transmit: bool) -> Result<(), io::Error> {
        self.port.set_rts(transmit)
    }
    async fn send(&mut self, data: &[u8]) -> Result<usize, io::Error> {
        // an answer arrived after a previous timeout must not be read as the response to this request
        self.port.discard_input_buffer()?;
        self.port.write_all(data).await?;
        self.drain.queue(self.baud_rate, data.len(), Instant::now());
        Ok(data.len())
    }
    async fn flush(&mut self) -> Result<(), io::Error> {
        // written bytes are already in the kernel, only their transmission is left
        if let Some(end) = self.drain.take() {
            sleep_until(end).await;
        }
        Ok(())
    }
}

impl Transport for SerialTransport {
    async fn receive(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize, io::Error> {
        let deadline = Instant::now() + timeout;
        let mut received = 0;
        while received < buffer.len() {
            match timeout_at(deadline, self.port.read(&mut buffer[received ..])).await {
                // port closed
                Ok(Ok(0)) => break,
                Ok(Ok(size)) => received += size,
                Ok(Err(err)) => return Err(err),
                Err(_) => break,
            }
        }
        Ok(received)
    }
}


/// estimated end of transmission of the bytes queued in the uart
#[derive(Copy, Clone, Debug, Default)]
struct Drain {
    end: Option<Instant>,
}
impl Drain {
    /// account for `bytes` written at `now`, they are sent after the bytes already queued
    fn queue(&mut self, baud: u32, bytes: usize, now: Instant) {
        let start = self.end.map_or(now, |end| end.max(now));
        self.end = Some(start + transmission_time(baud, bytes));
    }
    /// end of transmission of everything queued so far, and forget it
    fn take(&mut self) -> Option<Instant> {
        self.end.take()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_single_write() {
        let now = Instant::now();
        let mut drain = Drain::default();
        assert_eq!(drain.take(), None);
        drain.queue(115_200, 10, now);
        assert_eq!(drain.take(), Some(now + Duration::from_micros(869)));
        assert_eq!(drain.take(), None);
    }

    #[test]
    fn drain_writes_queue_up() {
        let now = Instant::now();
        let mut drain = Drain::default();
        drain.queue(115_200, 10, now);
        drain.queue(115_200, 10, now + Duration::from_micros(100));
        assert_eq!(drain.take(), Some(now + Duration::from_micros(2 * 869)));

        // the uart was already empty
        drain.queue(115_200, 10, now);
        drain.queue(115_200, 10, now + Duration::from_secs(1));
        assert_eq!(drain.take(), Some(now + Duration::from_secs(1) + Duration::from_micros(869)));
    }
}
