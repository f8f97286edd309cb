use core::time::Duration;
use packbytes::{FromBytes, ToBytes, ByteArray};
use log::*;

use crate::{
    packet::{Address, MAX_FRAME},
    transport::Transport,
    };
use super::{Bus, Error};


/// per-node retry policy
#[derive(Copy, Clone, Debug)]
pub struct DeviceConfig {
    /// physical attempts made for one request before giving up
    pub attempts: u8,
    /// failed attempts after which the device is considered dysfunctional
    pub error_budget: u32,
    /// minimum silence between two frames on the bus, whatever their target
    pub packet_spacing: Duration,
}
impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            error_budget: 10,
            packet_spacing: Duration::from_millis(1),
        }
    }
}
impl DeviceConfig {
    pub fn with_attempts(self, attempts: u8) -> Self {
        Self {attempts, .. self}
    }
    pub fn with_error_budget(self, error_budget: u32) -> Self {
        Self {error_budget, .. self}
    }
    pub fn with_packet_spacing(self, packet_spacing: Duration) -> Self {
        Self {packet_spacing, .. self}
    }
}

/**
    one node on a [Bus]

    it is a lightweight reference to the bus, many devices can share the same bus.

    Requests are retried until a response passes its checksum. Failed attempts accumulate in an error budget, once it is spent the device is dysfunctional: every request fails immediately without touching the bus, until [Self::reset] is called.
*/
pub struct Device<'b, T> {
    bus: &'b Bus<T>,
    address: Address,
    config: DeviceConfig,
    /// failed attempts since last success or reset
    errors: u32,
    /// result of the availability check, if already done
    available: Option<bool>,
}

impl<'b, T: Transport> Device<'b, T> {
    pub fn new(bus: &'b Bus<T>, address: Address, config: DeviceConfig) -> Self {
        Self {
            bus,
            address,
            config,
            errors: 0,
            available: None,
        }
    }
    pub fn address(&self) -> Address  {self.address}
    pub fn bus(&self) -> &'b Bus<T>  {self.bus}
    pub fn config(&self) -> &DeviceConfig  {&self.config}
    /// failed attempts accumulated in the error budget
    pub fn errors(&self) -> u32  {self.errors}
    pub fn is_dysfunctional(&self) -> bool {
        self.errors >= self.config.error_budget
    }
    /// give the device a new error budget, and forget its availability
    pub fn reset(&mut self) {
        self.errors = 0;
        self.available = None;
    }

    /**
        send `request` as payload and receive a response payload filling `response`

        an empty `response` still expects a frame with an address and a checksum
    */
    pub async fn transceive<'d>(&mut self, request: &[u8], response: &'d mut [u8]) -> Result<&'d [u8], Error<T::Error>> {
        let format = self.bus.config().format;
        let size = format.frame_size(response.len());
        if size > MAX_FRAME {
            return Err(Error::Master("response is longer than maximum frame"));
        }
        let mut received = [0u8; MAX_FRAME];
        self.exchange(request, &mut received[.. size]).await?;
        response.copy_from_slice(&received[format.width.bytes() ..][.. response.len()]);
        Ok(&*response)
    }
    /// send `request` as payload without expecting any response
    pub async fn send(&mut self, request: &[u8]) -> Result<(), Error<T::Error>> {
        self.exchange(request, &mut []).await
    }
    /// exchange typed payloads, serialized little endian
    pub async fn query<Q: ToBytes, R: FromBytes>(&mut self, request: Q) -> Result<R, Error<T::Error>> {
        let mut request = request.to_le_bytes();
        let mut response = R::Bytes::zeroed();
        self.transceive(request.as_mut(), response.as_mut()).await?;
        Ok(R::from_le_bytes(response))
    }
    /**
        whether the device answers an empty request

        the request is only sent on first call, or on first call after [Self::reset]
    */
    pub async fn is_available(&mut self) -> bool {
        if let Some(available) = self.available {
            return available;
        }
        let available = self.transceive(&[], &mut []).await.is_ok();
        info!("device {:#x} {}", self.address, if available {"available"} else {"not responding"});
        self.available = Some(available);
        available
    }

    async fn exchange(&mut self, request: &[u8], response: &mut [u8]) -> Result<(), Error<T::Error>> {
        if self.is_dysfunctional() {
            return Err(Error::Dysfunctional);
        }
        let format = self.bus.config().format;
        let frame = format.build(self.address, request)
            .map_err(|_| Error::Master("request does not fit in a frame"))?;

        let attempts = self.config.attempts.max(1);
        let mut last = Error::Timeout;
        for attempt in 1 ..= attempts {
            let result = {
                let mut line = self.bus.lock().await;
                line.space(self.config.packet_spacing).await;
                line.transceive(&frame, &mut *response, self.address, format.checksum).await
                    .map(|_| ())
            };
            match result {
                Ok(()) => {
                    if self.errors != 0 {
                        debug!("device {:#x} recovered after {} errors", self.address, self.errors);
                    }
                    self.errors = 0;
                    return Ok(());
                },
                Err(err) => {
                    debug!("attempt {}/{} on device {:#x} failed: {}", attempt, attempts, self.address, err);
                    last = err;
                },
            }
        }
        self.errors = self.errors.saturating_add(u32::from(attempts));
        if self.is_dysfunctional() {
            warn!("device {:#x} is dysfunctional after {} failed attempts", self.address, self.errors);
        }
        Err(last)
    }
}
