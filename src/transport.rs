/*!
    capabilities expected from the physical link

    the protocol only needs to write bytes, drive the RS-485 direction signal, know when transmission is over, and on master side read with a deadline.
    Slaves receive bytes through interrupts instead, see [crate::slave].
*/
#![allow(async_fn_in_trait)]

use core::time::Duration;


/// transmitting half of a half-duplex line
pub trait Transmit {
    type Error: core::fmt::Debug;

    /// drive the transceiver direction signal, `true` to take the line for transmission
    fn set_direction(&mut self, transmit: bool) -> Result<(), Self::Error>;
    /// queue bytes for transmission, returning how many were accepted
    async fn send(&mut self, data: &[u8]) -> Result<usize, Self::Error>;
    /// wait until every queued byte has left the wire
    async fn flush(&mut self) -> Result<(), Self::Error>;
}

/// complete half-duplex line as used by the master
pub trait Transport: Transmit {
    /**
        receive bytes until `buffer` is full or `timeout` elapsed

        returns the number of bytes received, fewer than requested means the deadline passed
    */
    async fn receive(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize, Self::Error>;
}

/// restartable one-shot timer raising the slave's end-of-frame interrupt
pub trait InterByteTimer {
    /// cancel any pending expiry and expire again after `timeout`
    fn restart(&mut self, timeout: Duration);
}


#[cfg(feature = "slave")]
pub use rs485::*;

#[cfg(feature = "slave")]
mod rs485 {
    use embedded_hal::digital::OutputPin;
    use embedded_io_async::Write;
    use super::Transmit;

    /// uart with a GPIO driving the RS-485 transceiver's driver-enable input
    pub struct Rs485<B, D> {
        bus: B,
        direction: D,
    }
    #[derive(Debug)]
    pub enum Rs485Error<B, D> {
        Bus(B),
        Direction(D),
    }

    impl<B: Write, D: OutputPin> Rs485<B, D> {
        pub fn new(bus: B, mut direction: D) -> Result<Self, Rs485Error<B::Error, D::Error>> {
            // start listening
            direction.set_low().map_err(Rs485Error::Direction)?;
            Ok(Self {bus, direction})
        }
        pub fn release(self) -> (B, D) {
            (self.bus, self.direction)
        }
    }
    impl<B: Write, D: OutputPin> Transmit for Rs485<B, D> {
        type Error = Rs485Error<B::Error, D::Error>;

        fn set_direction(&mut self, transmit: bool) -> Result<(), Self::Error> {
            let result = if transmit  {self.direction.set_high()}
                else  {self.direction.set_low()};
            result.map_err(Rs485Error::Direction)
        }
        async fn send(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
            self.bus.write_all(data).await.map_err(Rs485Error::Bus)?;
            Ok(data.len())
        }
        async fn flush(&mut self) -> Result<(), Self::Error> {
            self.bus.flush().await.map_err(Rs485Error::Bus)
        }
    }

}
