/*!
    slave side of the bus, for `no_std` targets

    bytes are pushed by the uart receive interrupt with [Slave::on_byte], and a frame ends when the line stays silent for the frame gap, reported by the timer interrupt calling [Slave::on_timeout].
    Accepted frames are then handed to a worker task running [Slave::run], which calls the application's [PacketHandler] and transmits its response.

    The receive buffer belongs to the interrupt side until a frame is complete, and to the worker until processing ends. Bytes arriving meanwhile are dropped and counted as lost, the master is responsible for retrying.
*/

use core::{
    cell::RefCell,
    time::Duration,
    };
use critical_section::Mutex;
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    signal::Signal,
    };
use log::*;

use crate::{
    mutex::*,
    packet::{Address, Format},
    timing::{frame_gap, SETTLING_BITS},
    transport::{Transmit, InterByteTimer},
    };


/// settings of a slave, they must match the master's
#[derive(Copy, Clone, Debug)]
pub struct SlaveConfig {
    /// own address, frames to any other address than this or broadcast are ignored
    pub address: Address,
    pub format: Format,
    pub baud_rate: u32,
    /// bit periods of silence ending a frame
    pub settling_bits: u32,
}
impl SlaveConfig {
    pub fn new(address: Address, format: Format, baud_rate: u32) -> Self {
        Self {address, format, baud_rate, settling_bits: SETTLING_BITS}
    }
    pub fn with_settling_bits(self, settling_bits: u32) -> Self {
        Self {settling_bits, .. self}
    }
    /// line silence delimiting frames
    pub fn gap(&self) -> Duration {
        frame_gap(self.baud_rate, self.settling_bits)
    }
}

/// progress of the frame currently in the receive buffer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameState {
    /// nothing received
    Idle,
    /// bytes arriving, inter-byte timer armed
    Receiving,
    /// accepted frame waiting for the worker
    Complete,
    /// frame being handled by the worker
    Processing,
}

/// reception counters, none of these events is an error for the slave
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SlaveStatistics {
    /// frames handed to the packet handler
    pub accepted: u32,
    /// responses transmitted
    pub responses: u32,
    /// frames discarded because longer than the receive buffer
    pub overflows: u32,
    /// bytes dropped because arrived during processing
    pub lost: u32,
    /// frames shorter than an address and a checksum
    pub runts: u32,
    /// frames addressed to another node
    pub foreign: u32,
    /// frames with bad checksum
    pub corrupted: u32,
    /// responses that failed to transmit
    pub transmit_errors: u32,
}

/// application side of a slave
pub trait PacketHandler {
    /**
        process one complete frame, address and checksum included

        returns the number of bytes written to `response` to transmit back, zero for no response
    */
    fn handle(&mut self, request: &[u8], response: &mut [u8]) -> usize;
}
impl<F: FnMut(&[u8], &mut [u8]) -> usize> PacketHandler for F {
    fn handle(&mut self, request: &[u8], response: &mut [u8]) -> usize {
        self(request, response)
    }
}


/**
    slave framing engine, with receive buffer of `N` bytes

    it is meant to be shared (usually as a `static`) between the uart interrupt, the timer interrupt and the worker task
*/
pub struct Slave<B, const N: usize> {
    config: SlaveConfig,
    gap: Duration,
    /// only accessed with interrupts disabled
    reception: Mutex<RefCell<Reception<N>>>,
    /// raised from the timer interrupt when a frame is complete
    complete: Signal<CriticalSectionRawMutex, ()>,
    /// only used by the worker
    control: BusyMutex<SlaveControl<B, N>>,
}
struct Reception<const N: usize> {
    state: FrameState,
    buffer: [u8; N],
    size: usize,
    overflow: bool,
    statistics: SlaveStatistics,
}
struct SlaveControl<B, const N: usize> {
    bus: B,
    request: [u8; N],
    response: [u8; N],
}
/// reason for discarding a frame
#[derive(Copy, Clone, Debug)]
enum Reject {
    Overflow,
    Runt,
    Foreign,
    Corrupted,
}

impl<B: Transmit, const N: usize> Slave<B, N> {
    pub fn new(bus: B, config: SlaveConfig) -> Self {
        Self {
            config,
            gap: config.gap(),
            reception: Mutex::new(RefCell::new(Reception::new())),
            complete: Signal::new(),
            control: BusyMutex::new(SlaveControl {
                bus,
                request: [0; N],
                response: [0; N],
            }),
        }
    }
    pub fn config(&self) -> &SlaveConfig  {&self.config}
    /// silence after which a frame is considered complete
    pub fn gap(&self) -> Duration  {self.gap}

    /**
        byte received interrupt

        the byte is appended to the current frame and `timer` restarted with the frame gap, unless the buffer is owned by the worker
    */
    pub fn on_byte(&self, byte: u8, timer: &mut impl InterByteTimer) {
        critical_section::with(|cs| {
            if self.reception.borrow_ref_mut(cs).push(byte) {
                timer.restart(self.gap);
            }
        })
    }
    /**
        inter-byte timer expired interrupt

        returns true if the accumulated frame is handed to the worker, otherwise it is discarded and the slave is ready for a new frame
    */
    pub fn on_timeout(&self) -> bool {
        let accepted = critical_section::with(|cs| {
            let mut reception = self.reception.borrow_ref_mut(cs);
            if reception.state != FrameState::Receiving {
                return false;
            }
            match self.check(&reception) {
                Ok(()) => {
                    reception.state = FrameState::Complete;
                    reception.statistics.accepted = reception.statistics.accepted.saturating_add(1);
                    true
                },
                Err(reject) => {
                    trace!("discard {} bytes frame: {:?}", reception.size, reject);
                    reception.reject(reject);
                    false
                },
            }
        });
        if accepted {
            self.complete.signal(());
        }
        accepted
    }

    /// worker loop, processing frames forever
    pub async fn run<H: PacketHandler>(&self, handler: &mut H) -> ! {
        loop {
            if let Err(err) = self.process_one(handler).await {
                warn!("failed to transmit response: {:?}", err);
            }
        }
    }
    /**
        wait for a complete frame, process it and transmit the response if any

        returns whether a frame was processed. Only one worker can run at a time, others wait.
    */
    pub async fn process_one<H: PacketHandler>(&self, handler: &mut H) -> Result<bool, B::Error> {
        let mut control = self.control.lock().await;
        let control = &mut *control;
        self.complete.wait().await;

        // take ownership of the frame
        let size = critical_section::with(|cs| {
            let mut reception = self.reception.borrow_ref_mut(cs);
            if reception.state != FrameState::Complete {
                return None;
            }
            reception.state = FrameState::Processing;
            let size = reception.size;
            control.request[.. size].copy_from_slice(&reception.buffer[.. size]);
            Some(size)
        });
        let Some(size) = size
            else {return Ok(false)};
        debug!("processing {} bytes frame", size);

        let answer = handler.handle(&control.request[.. size], &mut control.response).min(N);
        let result = if answer != 0  {control.respond(answer).await}
            else  {Ok(())};

        // give the buffer back to reception
        critical_section::with(|cs| {
            let mut reception = self.reception.borrow_ref_mut(cs);
            reception.clear();
            let statistics = &mut reception.statistics;
            match &result {
                Ok(()) if answer != 0 => statistics.responses = statistics.responses.saturating_add(1),
                Err(_) => statistics.transmit_errors = statistics.transmit_errors.saturating_add(1),
                _ => {},
            }
        });
        result.map(|_| true)
    }

    pub fn state(&self) -> FrameState {
        critical_section::with(|cs| self.reception.borrow_ref(cs).state)
    }
    /// whether the frame being received exceeded the buffer
    pub fn overflow(&self) -> bool {
        critical_section::with(|cs| self.reception.borrow_ref(cs).overflow)
    }
    pub fn statistics(&self) -> SlaveStatistics {
        critical_section::with(|cs| self.reception.borrow_ref(cs).statistics)
    }
    pub fn reset_statistics(&self) {
        critical_section::with(|cs| self.reception.borrow_ref_mut(cs).statistics = SlaveStatistics::default())
    }

    fn check(&self, reception: &Reception<N>) -> Result<(), Reject> {
        let format = &self.config.format;
        let frame = &reception.buffer[.. reception.size];
        if reception.overflow {
            return Err(Reject::Overflow);
        }
        if frame.len() < format.min_frame() {
            return Err(Reject::Runt);
        }
        let ours = format.address(frame)
            .is_some_and(|address|  address == self.config.address || format.is_broadcast(address));
        if !ours {
            return Err(Reject::Foreign);
        }
        if !format.checksum.check(frame) {
            return Err(Reject::Corrupted);
        }
        Ok(())
    }
}

impl<const N: usize> Reception<N> {
    const fn new() -> Self {
        Self {
            state: FrameState::Idle,
            buffer: [0; N],
            size: 0,
            overflow: false,
            statistics: SlaveStatistics {
                accepted: 0, responses: 0, overflows: 0, lost: 0,
                runts: 0, foreign: 0, corrupted: 0, transmit_errors: 0,
            },
        }
    }
    /// returns true if the byte was taken by reception
    fn push(&mut self, byte: u8) -> bool {
        match self.state {
            FrameState::Complete | FrameState::Processing => {
                self.statistics.lost = self.statistics.lost.saturating_add(1);
                false
            },
            FrameState::Idle | FrameState::Receiving => {
                if self.size < N {
                    self.buffer[self.size] = byte;
                    self.size += 1;
                }
                else {
                    self.overflow = true;
                }
                self.state = FrameState::Receiving;
                true
            },
        }
    }
    fn reject(&mut self, reject: Reject) {
        let counter = match reject {
            Reject::Overflow => &mut self.statistics.overflows,
            Reject::Runt => &mut self.statistics.runts,
            Reject::Foreign => &mut self.statistics.foreign,
            Reject::Corrupted => &mut self.statistics.corrupted,
        };
        *counter = counter.saturating_add(1);
        self.clear();
    }
    fn clear(&mut self) {
        self.state = FrameState::Idle;
        self.size = 0;
        self.overflow = false;
    }
}

impl<B: Transmit, const N: usize> SlaveControl<B, N> {
    /// transmit the first `size` bytes of the response buffer, no retry
    async fn respond(&mut self, size: usize) -> Result<(), B::Error> {
        self.bus.set_direction(true)?;
        let sent = match self.bus.send(&self.response[.. size]).await {
            Ok(_) => self.bus.flush().await,
            Err(err) => Err(err),
        };
        // give the line back whatever happened
        let released = self.bus.set_direction(false);
        sent?;
        released
    }
}
