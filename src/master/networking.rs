use core::time::Duration;
use tokio::{
    sync::{Mutex, MutexGuard},
    time::{Instant, sleep_until},
    };
use log::*;

use crate::{
    checksum::ChecksumKind,
    packet::{Address, Format},
    timing::{frame_gap, SETTLING_BITS},
    transport::Transport,
    };
use super::{Error, Statistics, StatisticsConfig};


/// settings of a bus, they must match the settings of every slave on the line
#[derive(Copy, Clone, Debug)]
pub struct BusConfig {
    /// line baud rate, used to derive the settling delay
    pub baud_rate: u32,
    /// maximum time waiting for a complete response
    pub timeout: Duration,
    /// bit periods of silence left before addressing a different node
    pub settling_bits: u32,
    pub format: Format,
    pub statistics: StatisticsConfig,
}
impl Default for BusConfig {
    fn default() -> Self {
        Self::new(115_200)
    }
}
impl BusConfig {
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            timeout: Duration::from_millis(100),
            settling_bits: SETTLING_BITS,
            format: Format::default(),
            statistics: StatisticsConfig::default(),
        }
    }
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {timeout, .. self}
    }
    pub fn with_settling_bits(self, settling_bits: u32) -> Self {
        Self {settling_bits, .. self}
    }
    pub fn with_format(self, format: Format) -> Self {
        Self {format, .. self}
    }
    pub fn with_statistics(self, statistics: StatisticsConfig) -> Self {
        Self {statistics, .. self}
    }
    /// silence required between the end of an exchange and a frame to another node
    pub fn settling(&self) -> Duration {
        frame_gap(self.baud_rate, self.settling_bits)
    }
}


/**
    bus master, owner of a half-duplex line

    every exchange goes through its internal lock, so no two exchanges can ever overlap on the line, whatever the number of tasks or [super::Device] using it. Waiters acquire the line in arrival order.
*/
pub struct Bus<T> {
    line: Mutex<LineState<T>>,
    config: BusConfig,
}
/// everything only touched with the line locked
struct LineState<T> {
    transport: T,
    /// node addressed by the last exchange
    last_target: Option<Address>,
    /// end of the last exchange
    last_exchange: Option<Instant>,
    statistics: Statistics,
}

impl<T: Transport> Bus<T> {
    pub fn new(transport: T, config: BusConfig) -> Self {
        Self {
            line: Mutex::new(LineState {
                transport,
                last_target: None,
                last_exchange: None,
                statistics: Statistics::new(Instant::now()),
            }),
            config,
        }
    }
    pub fn config(&self) -> &BusConfig {
        &self.config
    }
    /// wait for exclusive access to the line
    pub async fn lock(&self) -> Line<'_, T> {
        Line {
            state: self.line.lock().await,
            config: &self.config,
        }
    }
    /**
        send a complete request frame to `target` and receive a response frame filling `response`

        an empty `response` makes a write-only exchange. See [Line::transceive]
    */
    pub async fn transceive<'d>(&self, request: &[u8], response: &'d mut [u8], target: Address, checksum: ChecksumKind) -> Result<&'d [u8], Error<T::Error>> {
        self.lock().await
            .transceive(request, response, target, checksum).await
    }
    /// copy of the current transmission counters
    pub async fn statistics(&self) -> Statistics {
        self.line.lock().await.statistics
    }
    pub async fn reset_statistics(&self) {
        self.line.lock().await.statistics = Statistics::new(Instant::now());
    }
}


/// exclusive access to the line, released on drop
pub struct Line<'b, T> {
    state: MutexGuard<'b, LineState<T>>,
    config: &'b BusConfig,
}

impl<T: Transport> Line<'_, T> {
    /// wait until `spacing` elapsed since the end of the last exchange
    pub async fn space(&mut self, spacing: Duration) {
        if let Some(last) = self.state.last_exchange {
            sleep_until(last + spacing).await;
        }
    }
    /**
        perform exactly one physical exchange

        1. leave the settling delay if the last exchange was a broadcast or addressed another node
        2. send `request` with the line in transmit direction, then give the line back
        3. unless `response` is empty, receive it entirely before the timeout, check its trailing checksum and that it comes from `target`

        the outcome is accounted in the bus statistics
    */
    pub async fn transceive<'d>(&mut self, request: &[u8], response: &'d mut [u8], target: Address, checksum: ChecksumKind) -> Result<&'d [u8], Error<T::Error>> {
        if self.needs_settling(target) {
            if let Some(last) = self.state.last_exchange {
                sleep_until(last + self.config.settling()).await;
            }
        }
        debug!("transceive {} bytes to {:#x}, expecting {}", request.len(), target, response.len());
        let result = self.exchange(request, response, target, checksum).await;

        let now = Instant::now();
        let config = self.config;
        let state = &mut *self.state;
        state.last_target = Some(target);
        state.last_exchange = Some(now);
        state.statistics.record(result.is_ok(), now, &config.statistics);
        if let Err(err) = &result {
            debug!("exchange with {:#x} failed: {}", target, err);
        }
        result?;
        let response: &'d [u8] = response;
        Ok(response)
    }
    pub fn statistics(&self) -> &Statistics {
        &self.state.statistics
    }

    fn needs_settling(&self, target: Address) -> bool {
        match self.state.last_target {
            None => false,
            Some(last) => last != target || self.config.format.is_broadcast(last),
        }
    }
    async fn exchange(&mut self, request: &[u8], response: &mut [u8], target: Address, checksum: ChecksumKind) -> Result<(), Error<T::Error>> {
        let timeout = self.config.timeout;
        let format = self.config.format;
        let transport = &mut self.state.transport;

        transport.set_direction(true).map_err(Error::Bus)?;
        let sent = match transport.send(request).await {
            Ok(sent) => transport.flush().await.map(|_| sent),
            Err(err) => Err(err),
        };
        // give the line back whatever happened
        transport.set_direction(false).map_err(Error::Bus)?;
        if sent.map_err(Error::Bus)? < request.len() {
            return Err(Error::Timeout);
        }
        if response.is_empty() {
            return Ok(());
        }

        let received = transport.receive(response, timeout).await.map_err(Error::Bus)?;
        if received < response.len() {
            trace!("received {} of {} bytes", received, response.len());
            return Err(Error::Timeout);
        }
        if !checksum.check(response) {
            return Err(Error::Checksum);
        }
        // late answer to a former request
        if format.address(response) != Some(target) {
            return Err(Error::Address);
        }
        Ok(())
    }
}
