use std::time::Duration;
use packbytes::{FromBytes, ToBytes};

use busline::{
    master::*,
    AddressWidth, ChecksumKind, Format,
    };
use master_suite::*;


const FORMAT: Format = Format::new(AddressWidth::One, ChecksumKind::Crc8);

fn config() -> BusConfig {
    BusConfig::new(115_200)
        .with_format(FORMAT)
        .with_timeout(Duration::from_millis(10))
}
fn frame(address: u16, payload: &[u8]) -> Vec<u8> {
    FORMAT.build(address, payload).unwrap().to_vec()
}

// request layout of an application command
#[derive(ToBytes, FromBytes, Clone, Debug)]
pub struct Setpoint {
    pub channel: u8,
    pub value: u16,
}


#[test]
fn retries_until_valid_response() {
    test(async {
        let mut corrupted = frame(0x03, &[0x11, 0x22]);
        corrupted[2] ^= 0x80;
        let (line, recorder) = Scripted::new([
            Reply::Silence,
            Reply::Frame(corrupted),
            Reply::Frame(frame(0x03, &[0x11, 0x22])),
            ]);
        let bus = Bus::new(line, config());
        let mut device = Device::new(&bus, 0x03, DeviceConfig::default());

        let mut response = [0; 2];
        let received = device.transceive(&[0x01], &mut response).await.unwrap();
        assert_eq!(received, [0x11, 0x22]);
        assert_eq!(device.errors(), 0);

        // every attempt sends the same frame
        let requests = recorder.get().requests();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|request| request == &frame(0x03, &[0x01])));
        let statistics = bus.statistics().await;
        assert_eq!((statistics.attempts, statistics.failures), (3, 2));
    })
}

#[test]
fn retries_after_foreign_response() {
    test(async {
        let (line, recorder) = Scripted::new([
            Reply::Frame(frame(0x02, &[0x99])),
            Reply::Frame(frame(0x03, &[0x11])),
            ]);
        let bus = Bus::new(line, config());
        let mut device = Device::new(&bus, 0x03, DeviceConfig::default());

        let mut response = [0; 1];
        let received = device.transceive(&[0x01], &mut response).await.unwrap();
        assert_eq!(received, [0x11]);
        assert_eq!(recorder.get().exchanges.len(), 2);
        let statistics = bus.statistics().await;
        assert_eq!((statistics.attempts, statistics.failures), (2, 1));
    })
}

#[test]
fn retries_after_transport_failure() {
    test(async {
        let (mut line, recorder) = Scripted::new([Reply::Frame(frame(0x03, &[0x11]))]);
        line.fail(Fault::Flush);
        let bus = Bus::new(line, config());
        let mut device = Device::new(&bus, 0x03, DeviceConfig::default());

        let mut response = [0; 1];
        let received = device.transceive(&[], &mut response).await.unwrap();
        assert_eq!(received, [0x11]);
        assert_eq!(device.errors(), 0);
        let record = recorder.get();
        assert_eq!(record.directions, [true, false, true, false]);
        assert_eq!(record.exchanges.len(), 2);
    })
}

#[test]
fn success_resets_errors() {
    test(async {
        let (line, _recorder) = Scripted::new([
            Reply::Silence,
            Reply::Silence,
            Reply::Frame(frame(0x03, &[])),
            ]);
        let bus = Bus::new(line, config());
        let mut device = Device::new(&bus, 0x03, DeviceConfig::default().with_attempts(2));

        let result = device.transceive(&[], &mut []).await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(device.errors(), 2);
        assert!(!device.is_dysfunctional());

        device.transceive(&[], &mut []).await.unwrap();
        assert_eq!(device.errors(), 0);
    })
}

#[test]
fn error_budget_exhaustion() {
    test(async {
        let (line, recorder) = Scripted::new([]);
        let bus = Bus::new(line, config());
        let mut device = Device::new(&bus, 0x03, DeviceConfig::default()
            .with_attempts(5)
            .with_error_budget(10));

        let mut response = [0; 1];
        let result = device.transceive(&[], &mut response).await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(device.errors(), 5);
        assert!(!device.is_dysfunctional());

        let result = device.transceive(&[], &mut response).await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert!(device.is_dysfunctional());
        assert_eq!(recorder.get().exchanges.len(), 10);

        // the bus is not touched anymore
        let result = device.transceive(&[], &mut response).await;
        assert!(matches!(result, Err(Error::Dysfunctional)));
        assert!(!result.unwrap_err().is_retryable());
        assert_eq!(recorder.get().exchanges.len(), 10);

        device.reset();
        assert_eq!(device.errors(), 0);
        let result = device.transceive(&[], &mut response).await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(recorder.get().exchanges.len(), 15);
    })
}

#[test]
fn availability_is_cached() {
    test(async {
        let (line, recorder) = Scripted::new([Reply::Frame(frame(0x03, &[]))]);
        let bus = Bus::new(line, config());
        let mut present = Device::new(&bus, 0x03, DeviceConfig::default());
        let mut absent = Device::new(&bus, 0x04, DeviceConfig::default().with_attempts(2));

        assert!(present.is_available().await);
        assert!(present.is_available().await);
        assert_eq!(recorder.get().exchanges.len(), 1);
        assert_eq!(recorder.get().exchanges[0].request, frame(0x03, &[]));

        assert!(!absent.is_available().await);
        assert_eq!(recorder.get().exchanges.len(), 3);
        assert!(!absent.is_available().await);
        assert_eq!(recorder.get().exchanges.len(), 3);

        // asked again after reset
        absent.reset();
        assert!(!absent.is_available().await);
        assert_eq!(recorder.get().exchanges.len(), 5);
    })
}

#[test]
fn packet_spacing() {
    test(async {
        let spacing = Duration::from_millis(2);
        let replies = [0x01, 0x02, 0x01, 0x01].map(|address| Reply::Frame(frame(address, &[])));
        let (line, recorder) = Scripted::new(replies);
        let bus = Bus::new(line, config());
        let device = DeviceConfig::default().with_packet_spacing(spacing);
        let mut first = Device::new(&bus, 0x01, device);
        let mut second = Device::new(&bus, 0x02, device);

        first.transceive(&[], &mut []).await.unwrap();
        second.transceive(&[], &mut []).await.unwrap();
        first.transceive(&[], &mut []).await.unwrap();
        first.transceive(&[], &mut []).await.unwrap();

        let gaps = recorder.get().gaps();
        assert_eq!(gaps.len(), 3);
        // spacing applies whatever the target
        assert!(gaps.iter().all(|&gap| gap >= spacing));
    })
}

#[test]
fn typed_query() {
    test(async {
        let (line, recorder) = Scripted::new([Reply::Frame(frame(0x07, &[0x01, 0x02, 0x03, 0x04]))]);
        let bus = Bus::new(line, config());
        let mut device = Device::new(&bus, 0x07, DeviceConfig::default());

        let position: u32 = device.query(Setpoint {channel: 2, value: 0x1234}).await.unwrap();
        assert_eq!(position, 0x0403_0201);
        assert_eq!(recorder.get().requests(), [frame(0x07, &[0x02, 0x34, 0x12])]);
    })
}

#[test]
fn broadcast_without_response() {
    test(async {
        let (line, recorder) = Scripted::new([]);
        let bus = Bus::new(line, config());
        let mut everyone = Device::new(&bus, FORMAT.broadcast, DeviceConfig::default());

        everyone.send(&[0x42]).await.unwrap();

        let record = recorder.get();
        assert_eq!(record.requests(), [frame(0xff, &[0x42])]);
        assert!(!record.exchanges[0].received);
    })
}

#[test]
fn oversized_request() {
    test(async {
        let (line, recorder) = Scripted::new([]);
        let bus = Bus::new(line, config());
        let mut device = Device::new(&bus, 0x03, DeviceConfig::default());

        let result = device.send(&[0; 300]).await;
        assert!(matches!(result, Err(Error::Master(_))));
        assert!(recorder.get().exchanges.is_empty());
        assert_eq!(device.errors(), 0);
    })
}
