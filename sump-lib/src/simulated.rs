use crate::capture::{CaptureEngine, CaptureHandle, SampleBatch, capture_channel};
use crate::config::{CaptureConfig, ChannelWidth, HardwareCapability};
use crate::error::SumpError;
use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;
use tracing::{debug, warn};

/// Limits and memory layout of the simulated analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedHardware {
    pub min_sample_rate: u32,
    pub max_sample_rate: u32,
    pub min_sample_cnt: u32,
    /// Cap on the sample count below what memory allows
    pub max_sample_cnt: Option<u32>,
    /// Sample memory in internal RAM, bytes
    pub internal_memory: usize,
    /// Sample memory in PSRAM, bytes
    pub psram_memory: usize,
    /// PSRAM captures come back rounded down to a multiple of this many samples
    pub burst_align: usize,
}

impl Default for SimulatedHardware {
    fn default() -> Self {
        Self {
            min_sample_rate: 5_000,
            max_sample_rate: 40_000_000,
            min_sample_cnt: 100,
            max_sample_cnt: None,
            internal_memory: 128 * 1024,
            psram_memory: 2 * 1024 * 1024,
            burst_align: 64,
        }
    }
}

/// Capture engine producing a counting pattern instead of sampling GPIOs.
///
/// Sample `i` carries `i` truncated to the channel width. Acquisition takes as
/// long as the real capture would at the configured rate; captures that would
/// exceed the measure timeout are abandoned.
#[derive(Debug, Clone, Default)]
pub struct SimulatedEngine {
    hardware: SimulatedHardware,
    captures_started: u64,
}

impl SimulatedEngine {
    pub fn new(hardware: SimulatedHardware) -> Self {
        Self {
            hardware,
            captures_started: 0,
        }
    }

    pub fn captures_started(&self) -> u64 {
        self.captures_started
    }

    /// Number of samples actually stored for a request of `count`.
    pub fn delivered_count(&self, count: usize, samples_to_psram: bool) -> usize {
        let align = self.hardware.burst_align.max(1);
        if samples_to_psram && count >= align {
            count - count % align
        } else {
            count
        }
    }
}

/// Counting pattern for `count` samples, laid out the way the engine stores them.
pub fn counting_pattern(channels: ChannelWidth, count: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(count * 2);
    match channels {
        ChannelWidth::Sixteen => (0..count).for_each(|i| buf.put_u16_le(i as u16)),
        ChannelWidth::Eight => (0..count).for_each(|i| buf.put_u8(i as u8)),
        ChannelWidth::Four => {
            for pair in 0..count.div_ceil(2) {
                let early = (2 * pair) as u8 & 0xf;
                let late = (2 * pair + 1) as u8 & 0xf;
                buf.put_u8(early << 4 | late);
            }
        }
    }
    buf.freeze()
}

impl CaptureEngine for SimulatedEngine {
    fn hw_params(&self, channels: ChannelWidth, samples_to_psram: bool) -> HardwareCapability {
        let memory = if samples_to_psram {
            self.hardware.psram_memory
        } else {
            self.hardware.internal_memory
        };
        let fits = (memory * 8 / channels.bits() as usize).min(u32::MAX as usize) as u32;
        let max_sample_cnt = self.hardware.max_sample_cnt.map_or(fits, |cap| cap.min(fits));
        HardwareCapability {
            min_sample_rate: self.hardware.min_sample_rate,
            max_sample_rate: self.hardware.max_sample_rate,
            min_sample_cnt: self.hardware.min_sample_cnt,
            max_sample_cnt,
            channels,
            samples_to_psram,
        }
    }

    fn start_capture(&mut self, config: &CaptureConfig) -> Result<CaptureHandle, SumpError> {
        let hw = self.hw_params(config.channels, config.samples_to_psram);
        if config.sample_count < hw.min_sample_cnt || config.sample_count > hw.max_sample_cnt {
            return Err(SumpError::CaptureStart(format!(
                "{} samples outside {}..={}",
                config.sample_count, hw.min_sample_cnt, hw.max_sample_cnt
            )));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SumpError::CaptureStart(format!("no runtime to capture on: {e}")))?;

        let requested = config.sample_count as usize;
        let delivered = self.delivered_count(requested, config.samples_to_psram);
        let channels = config.channels;
        let clock = config.sample_rate;
        let acquisition = Duration::from_secs_f64(requested as f64 / clock.max(1) as f64);
        let timeout = config.measure_timeout;

        self.captures_started += 1;
        debug!(requested, delivered, ?acquisition, "Simulated capture started");

        let (completion, handle) = capture_channel();
        runtime.spawn(async move {
            if acquisition > timeout {
                tokio::time::sleep(timeout).await;
                warn!(?acquisition, ?timeout, "Simulated capture hit the measure timeout");
                return;
            }
            tokio::time::sleep(acquisition).await;
            let batch = SampleBatch {
                data: counting_pattern(channels, delivered),
                count: delivered,
                clock,
                channels,
            };
            if !completion.complete(batch) {
                warn!("Capture finished after the dispatcher stopped waiting");
            }
        });
        Ok(handle)
    }
}
