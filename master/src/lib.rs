/*!
    simulated lines to exercise the master without hardware

    - [Scripted] answers each request with the next reply of a script
    - [Loopback] wires the master to a [Slave] running in the same task

    both record what happened on the line in a shared [Record], and use tokio's clock so tests can run on a paused clock
*/

use std::{
    collections::VecDeque,
    convert::Infallible,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
    };
use tokio::time::{Instant, sleep};
use busline::{
    transport::{Transmit, Transport, InterByteTimer},
    slave::{Slave, PacketHandler},
    };


/// run a test body on a paused clock, so delays are exact and timeouts do not take real time
pub fn test<F: Future>(test: F) -> F::Output {
    let _ = env_logger::builder().is_test(true).try_init();
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("failed to create runtime")
        .block_on(async move {
            tokio::time::timeout(Duration::from_secs(10), test)
            .await.expect("aborted test because took too long")
        })
}


/// one request seen on the line
#[derive(Clone, Debug)]
pub struct Exchange {
    pub request: Vec<u8>,
    /// start of the request transmission
    pub start: Instant,
    /// end of the response, or of the request if none was read
    pub end: Instant,
    /// a response was read
    pub received: bool,
}

/// what happened on a simulated line
#[derive(Default, Debug)]
pub struct Record {
    pub exchanges: Vec<Exchange>,
    /// every direction change, in order
    pub directions: Vec<bool>,
    /// sends while not transmitting, and receptions while transmitting
    pub misdirected: usize,
    transmitting: bool,
}
impl Record {
    /// silence between the end of each exchange and the start of the next
    pub fn gaps(&self) -> Vec<Duration> {
        self.exchanges.windows(2)
            .map(|pair| pair[1].start.saturating_duration_since(pair[0].end))
            .collect()
    }
    /// whether two exchanges ever overlapped
    pub fn overlapping(&self) -> bool {
        self.exchanges.windows(2)
            .any(|pair| pair[1].start < pair[0].end)
    }
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.exchanges.iter()
            .map(|exchange| exchange.request.clone())
            .collect()
    }

    fn direction(&mut self, transmit: bool) {
        self.directions.push(transmit);
        self.transmitting = transmit;
    }
    fn sent(&mut self, data: &[u8]) {
        if !self.transmitting {
            self.misdirected += 1;
        }
        let now = Instant::now();
        self.exchanges.push(Exchange {
            request: data.to_vec(),
            start: now,
            end: now,
            received: false,
        });
    }
    fn received(&mut self) {
        if self.transmitting {
            self.misdirected += 1;
        }
        if let Some(last) = self.exchanges.last_mut() {
            last.end = Instant::now();
            last.received = true;
        }
    }
}

/// shared access to the [Record] of a simulated line
#[derive(Clone, Default, Debug)]
pub struct Recorder(Arc<Mutex<Record>>);
impl Recorder {
    pub fn get(&self) -> MutexGuard<'_, Record> {
        self.0.lock().expect("record poisoned")
    }
}


/// what a [Scripted] line answers to a request expecting a response
#[derive(Clone, Debug)]
pub enum Reply {
    /// these bytes, immediately
    Frame(Vec<u8>),
    /// these bytes after some time
    Delayed(Duration, Vec<u8>),
    /// nothing at all
    Silence,
}

/// transmission step a [Scripted] line can fail, also its error type
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    Send,
    Flush,
}

/// line answering requests from a script, then silence once the script is exhausted
pub struct Scripted {
    replies: VecDeque<Reply>,
    fault: Option<Fault>,
    recorder: Recorder,
}
impl Scripted {
    pub fn new(replies: impl IntoIterator<Item=Reply>) -> (Self, Recorder) {
        let recorder = Recorder::default();
        (Self {replies: replies.into_iter().collect(), fault: None, recorder: recorder.clone()}, recorder)
    }
    /// make the next occurrence of this step fail, once
    pub fn fail(&mut self, fault: Fault) {
        self.fault = Some(fault);
    }
    fn fault(&mut self, step: Fault) -> Result<(), Fault> {
        if self.fault == Some(step) {
            self.fault = None;
            return Err(step);
        }
        Ok(())
    }
}
impl Transmit for Scripted {
    type Error = Fault;

    fn set_direction(&mut self, transmit: bool) -> Result<(), Fault> {
        self.recorder.get().direction(transmit);
        Ok(())
    }
    async fn send(&mut self, data: &[u8]) -> Result<usize, Fault> {
        self.fault(Fault::Send)?;
        self.recorder.get().sent(data);
        Ok(data.len())
    }
    async fn flush(&mut self) -> Result<(), Fault> {
        self.fault(Fault::Flush)
    }
}
impl Transport for Scripted {
    async fn receive(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize, Fault> {
        let (delay, bytes) = match self.replies.pop_front().unwrap_or(Reply::Silence) {
            Reply::Frame(bytes) => (Duration::ZERO, bytes),
            Reply::Delayed(delay, bytes) => (delay, bytes),
            Reply::Silence => (timeout, Vec::new()),
        };
        let received = if delay >= timeout {
            sleep(timeout).await;
            0
        }
        else {
            sleep(delay).await;
            let size = bytes.len().min(buffer.len());
            buffer[.. size].copy_from_slice(&bytes[.. size]);
            if size < buffer.len() {
                sleep(timeout - delay).await;
            }
            size
        };
        self.recorder.get().received();
        Ok(received)
    }
}


/// bytes transmitted by a slave, waiting to be read by the master
#[derive(Clone, Default, Debug)]
pub struct Wire(Arc<Mutex<VecDeque<u8>>>);
impl Wire {
    fn get(&self) -> MutexGuard<'_, VecDeque<u8>> {
        self.0.lock().expect("wire poisoned")
    }
}
impl Transmit for Wire {
    type Error = Infallible;

    fn set_direction(&mut self, _transmit: bool) -> Result<(), Infallible> {
        Ok(())
    }
    async fn send(&mut self, data: &[u8]) -> Result<usize, Infallible> {
        self.get().extend(data);
        Ok(data.len())
    }
    async fn flush(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

/// the end of frame is simulated when the master stops transmitting
struct NoTimer;
impl InterByteTimer for NoTimer {
    fn restart(&mut self, _timeout: Duration) {}
}

/// master's line wired to a slave and its packet handler
pub struct Loopback<'s, H, const N: usize> {
    slave: &'s Slave<Wire, N>,
    wire: Wire,
    handler: H,
    recorder: Recorder,
}
impl<'s, H: PacketHandler, const N: usize> Loopback<'s, H, N> {
    /// `wire` must be the one the slave transmits on
    pub fn new(slave: &'s Slave<Wire, N>, wire: Wire, handler: H) -> (Self, Recorder) {
        let recorder = Recorder::default();
        (Self {slave, wire, handler, recorder: recorder.clone()}, recorder)
    }
}
impl<H: PacketHandler, const N: usize> Transmit for Loopback<'_, H, N> {
    type Error = Infallible;

    fn set_direction(&mut self, transmit: bool) -> Result<(), Infallible> {
        self.recorder.get().direction(transmit);
        Ok(())
    }
    async fn send(&mut self, data: &[u8]) -> Result<usize, Infallible> {
        self.recorder.get().sent(data);
        self.wire.get().clear();
        for &byte in data {
            self.slave.on_byte(byte, &mut NoTimer);
        }
        Ok(data.len())
    }
    async fn flush(&mut self) -> Result<(), Infallible> {
        // the line goes silent, so the slave's frame gap expires
        if self.slave.on_timeout() {
            self.slave.process_one(&mut self.handler).await?;
        }
        Ok(())
    }
}
impl<H: PacketHandler, const N: usize> Transport for Loopback<'_, H, N> {
    async fn receive(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<usize, Infallible> {
        let size = {
            let mut wire = self.wire.get();
            let size = wire.len().min(buffer.len());
            for (dst, src) in buffer.iter_mut().zip(wire.drain(.. size)) {
                *dst = src;
            }
            size
        };
        if size < buffer.len() {
            sleep(timeout).await;
        }
        self.recorder.get().received();
        Ok(size)
    }
}
