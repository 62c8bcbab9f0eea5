//! Host client against the simulated device over an in-process pipe

mod common;

use common::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
use tokio::task::JoinHandle;

fn spawn_device(settings: DeviceSettings) -> (DuplexStream, JoinHandle<Result<(), SumpError>>) {
    init_logging();
    let (host, mut link) = duplex(64 * 1024);
    let mut device = SumpDevice::new(SimulatedEngine::new(SimulatedHardware::default()), settings);
    let task = tokio::spawn(async move { device.run(&mut link).await });
    (host, task)
}

#[tokio::test]
async fn test_identify_and_metadata() {
    let (host, task) = spawn_device(DeviceSettings::default());
    let mut client = SumpClient::new(host);

    client.reset().await.expect("reset");
    client.identify().await.expect("identify");
    let meta = client.metadata().await.expect("metadata");

    assert_eq!(meta.device_name.as_deref(), Some("ESP32"));
    assert_eq!(meta.firmware_version.as_deref(), Some("0.00"));
    assert_eq!(meta.sample_memory, Some(128 * 1024));
    assert_eq!(meta.max_sample_rate, Some(40_000_000));
    assert_eq!(meta.probes, Some(8));
    assert_eq!(meta.protocol_version, Some(2));

    drop(client);
    task.await.expect("device task").expect("device loop");
}

#[tokio::test]
async fn test_capture_8_channels() {
    let (host, _task) = spawn_device(DeviceSettings::default());
    let mut client = SumpClient::new(host);

    let setup = CaptureSetup {
        samples: 1000,
        ..CaptureSetup::default()
    };
    client.configure(&setup).await.expect("configure");
    let data = client.capture(setup.samples, ChannelWidth::Eight).await.expect("capture");

    assert_eq!(data.len(), 1000);
    for (i, byte) in data.iter().enumerate() {
        assert_eq!(*byte, (999 - i) as u8, "sample {i} out of order");
    }
}

#[tokio::test]
async fn test_big_read_count_capture() {
    let (host, _task) = spawn_device(DeviceSettings::default());
    let mut client = SumpClient::new(host);

    // Too many samples for the 16-bit READ_DELAY_COUNT field
    let setup = CaptureSetup {
        samples: 100_000,
        delay: 0,
        ..CaptureSetup::default()
    };
    client.configure(&setup).await.expect("configure");
    let data = client.capture(setup.samples, ChannelWidth::Eight).await.expect("capture");

    assert_eq!(data.len(), 100_000);
    assert_eq!(data[0], (99_999u32 & 0xff) as u8);
    assert_eq!(data[99_999], 0);
}

#[tokio::test]
async fn test_capture_below_minimum_keeps_stream_aligned() {
    let (host, _task) = spawn_device(DeviceSettings::default());
    let mut client = SumpClient::new(host);

    // The engine captures its 100-sample minimum; the host must get exactly 50 back
    let setup = CaptureSetup {
        samples: 50,
        ..CaptureSetup::default()
    };
    client.configure(&setup).await.expect("configure");
    let data = client.capture(setup.samples, ChannelWidth::Eight).await.expect("capture");

    assert_eq!(data.len(), 50);
    for (i, byte) in data.iter().enumerate() {
        assert_eq!(*byte, (49 - i) as u8, "sample {i} out of order");
    }
    client.identify().await.expect("stream left extra bytes in front of the ID reply");
}

#[tokio::test]
async fn test_psram_capture_pads_burst_remainder() {
    let settings = DeviceSettings {
        channels: ChannelWidth::Sixteen,
        samples_to_psram: true,
        ..DeviceSettings::default()
    };
    let (host, _task) = spawn_device(settings);
    let mut client = SumpClient::new(host);

    let meta = client.metadata().await.expect("metadata");
    assert_eq!(meta.probes, Some(16));
    assert_eq!(meta.sample_memory, Some(2 * 1024 * 1024));

    let setup = CaptureSetup {
        samples: 1000,
        ..CaptureSetup::default()
    };
    client.configure(&setup).await.expect("configure");
    let data = client.capture(setup.samples, ChannelWidth::Sixteen).await.expect("capture");

    // 1000 requested, 960 delivered: 40 zero units, then sample 959 down to 0
    assert_eq!(data.len(), 2000);
    assert!(data[..80].iter().all(|&b| b == 0));
    assert_eq!(&data[80..82], &[0xbf, 0x03]);
    assert_eq!(&data[82..84], &[0xbe, 0x03]);
    assert_eq!(&data[1998..], &[0x00, 0x00]);
}

#[tokio::test]
async fn test_4_channel_capture_is_sent_one_byte_per_sample() {
    let settings = DeviceSettings {
        channels: ChannelWidth::Four,
        ..DeviceSettings::default()
    };
    let (host, _task) = spawn_device(settings);
    let mut client = SumpClient::new(host);

    let meta = client.metadata().await.expect("metadata");
    assert_eq!(meta.probes, Some(8));
    assert_eq!(meta.sample_memory, Some(256 * 1024));

    let setup = CaptureSetup {
        samples: 200,
        ..CaptureSetup::default()
    };
    client.configure(&setup).await.expect("configure");
    let data = client.capture(setup.samples, ChannelWidth::Four).await.expect("capture");

    // Each stored byte goes out high nibble first: samples 198, 199, then 196, 197
    assert_eq!(data.len(), 200);
    assert_eq!(&data[..4], &[0x06, 0x07, 0x04, 0x05]);
    assert!(data.iter().all(|&b| b <= 0x0f));
}

#[tokio::test]
async fn test_commands_queue_behind_capture() {
    let (mut host, _task) = spawn_device(DeviceSettings::default());

    // ARM and QUERY in one write: the ID must come after every sample byte
    host.write_all(&[0x01, 0x02]).await.expect("write");
    let mut reply = vec![0u8; 100 + 4];
    host.read_exact(&mut reply).await.expect("read");

    assert_eq!(&reply[..100], reversed_count(100).as_slice());
    assert_eq!(&reply[100..], DEVICE_ID);
}

#[tokio::test]
async fn test_measure_timeout_abandons_capture() {
    let settings = DeviceSettings {
        measure_timeout: Duration::from_millis(50),
        ..DeviceSettings::default()
    };
    let (host, _task) = spawn_device(settings);
    let mut client = SumpClient::new(host).with_timeouts(Duration::from_secs(2), Duration::from_millis(500));

    // 100000 samples at 5 kHz would take 20 s
    let setup = CaptureSetup {
        divider: 7999,
        samples: 100_000,
        delay: 0,
        ..CaptureSetup::default()
    };
    client.configure(&setup).await.expect("configure");
    let result = client.capture(setup.samples, ChannelWidth::Eight).await;
    assert!(matches!(result, Err(SumpError::Timeout(_))), "got {result:?}");

    // The device gave up on the capture and is parsing again
    client.identify().await.expect("identify after abandoned capture");
}

#[tokio::test]
async fn test_configure_command_sequence() {
    let mut client = SumpClient::new(SplitLink::new(&[][..], Vec::new()));
    let setup = CaptureSetup {
        divider: 9,
        samples: 1000,
        delay: 500,
        trigger: Some((0x0004, 0x0004)),
        flags: None,
    };
    client.configure(&setup).await.expect("configure");

    let (_, written) = client.into_inner().into_inner();
    assert_eq!(
        hex::encode(written),
        "8009000000".to_owned() + "81e703f301" + "c004000000" + "c104000000"
    );
}
