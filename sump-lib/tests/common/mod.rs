//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use hex;
#[allow(unused_imports)]
pub use std::time::Duration;
#[allow(unused_imports)]
pub use sump_lib::capture::{CaptureEngine, CaptureHandle, SampleBatch, capture_channel};
#[allow(unused_imports)]
pub use sump_lib::command::Command;
#[allow(unused_imports)]
pub use sump_lib::config::{CaptureConfig, ChannelWidth, DeviceSettings, HardwareCapability};
#[allow(unused_imports)]
pub use sump_lib::constants::{DEVICE_ID, METADATA_LEN};
#[allow(unused_imports)]
pub use sump_lib::device::SumpDevice;
#[allow(unused_imports)]
pub use sump_lib::error::SumpError;
#[allow(unused_imports)]
pub use sump_lib::host::{CaptureSetup, SumpClient};
#[allow(unused_imports)]
pub use sump_lib::metadata::encode_metadata;
#[allow(unused_imports)]
pub use sump_lib::simulated::{SimulatedEngine, SimulatedHardware, counting_pattern};
#[allow(unused_imports)]
pub use sump_lib::transport::SplitLink;
#[allow(unused_imports)]
pub use sump_lib::trigger::TriggerEdge;

use std::collections::VecDeque;

/// Decode hex string to bytes for testing
#[allow(dead_code)]
pub fn hex_to_bytes(hex_data: &str) -> Bytes {
    Bytes::from(hex::decode(hex_data.replace(' ', "")).expect("Failed to decode hex"))
}

/// Route library logs to the test harness. Safe to call from every test.
#[allow(dead_code)]
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// What the scripted engine does with the next ARM.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Deliver a counting pattern of the requested length
    Pattern,
    /// Deliver exactly this batch
    Deliver(SampleBatch),
    /// Fail synchronously in `start_capture`
    Refuse,
    /// Start, then drop the completion without delivering
    Abandon,
}

/// Engine with small fixed limits whose captures resolve immediately.
#[allow(dead_code)]
pub struct ScriptedEngine {
    pub limits: HardwareCapability,
    pub outcomes: VecDeque<Outcome>,
    pub configs: Vec<CaptureConfig>,
}

#[allow(dead_code)]
impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            limits: HardwareCapability {
                min_sample_rate: 1_000,
                max_sample_rate: 1_000_000,
                min_sample_cnt: 4,
                max_sample_cnt: 64,
                channels: ChannelWidth::Eight,
                samples_to_psram: false,
            },
            outcomes: VecDeque::new(),
            configs: Vec::new(),
        }
    }

    pub fn with_outcomes(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        let mut engine = Self::new();
        engine.outcomes.extend(outcomes);
        engine
    }
}

impl CaptureEngine for ScriptedEngine {
    fn hw_params(&self, channels: ChannelWidth, samples_to_psram: bool) -> HardwareCapability {
        HardwareCapability {
            channels,
            samples_to_psram,
            ..self.limits
        }
    }

    fn start_capture(&mut self, config: &CaptureConfig) -> Result<CaptureHandle, SumpError> {
        self.configs.push(config.clone());
        match self.outcomes.pop_front().unwrap_or(Outcome::Pattern) {
            Outcome::Pattern => {
                let count = config.sample_count as usize;
                Ok(CaptureHandle::ready(SampleBatch {
                    data: counting_pattern(config.channels, count),
                    count,
                    clock: config.sample_rate,
                    channels: config.channels,
                }))
            }
            Outcome::Deliver(batch) => Ok(CaptureHandle::ready(batch)),
            Outcome::Refuse => Err(SumpError::CaptureStart("scripted refusal".to_string())),
            Outcome::Abandon => {
                let (completion, handle) = capture_channel();
                drop(completion);
                Ok(handle)
            }
        }
    }
}

/// Feed `input` to the device as one host session and collect everything it wrote back.
#[allow(dead_code)]
pub async fn run_script<E: CaptureEngine>(device: &mut SumpDevice<E>, input: &[u8]) -> Vec<u8> {
    let mut link = SplitLink::new(input, Vec::new());
    device.run(&mut link).await.expect("Command loop failed");
    link.into_inner().1
}

/// Newest-first 8-channel stream for a counting capture of `count` samples.
#[allow(dead_code)]
pub fn reversed_count(count: usize) -> Vec<u8> {
    (0..count).rev().map(|i| i as u8).collect()
}

/// Concatenate host commands into one byte script.
#[allow(dead_code)]
pub fn script(commands: &[Command]) -> Vec<u8> {
    commands.iter().flat_map(|c| c.encode()).collect()
}
