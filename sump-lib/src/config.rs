use crate::constants::{NIBBLE_CAPTURE_PROBES, TRIGGER_CHANNELS};
use crate::trigger::TriggerEdge;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::time::Duration;
use strum_macros::Display;

/// Number of logical channels per sample. Determines how samples are packed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ChannelWidth {
    #[strum(to_string = "4 channels")]
    Four = 4,
    #[strum(to_string = "8 channels")]
    Eight = 8,
    #[strum(to_string = "16 channels")]
    Sixteen = 16,
}

// num_enum turns a `#[default]` variant into the `try_from` fallback
impl Default for ChannelWidth {
    fn default() -> Self {
        ChannelWidth::Eight
    }
}

impl ChannelWidth {
    pub fn bits(&self) -> u8 {
        (*self).into()
    }

    /// Probe count reported to the host. 4-channel captures are presented as 8-channel.
    pub fn reported_probes(&self) -> u8 {
        match self {
            ChannelWidth::Four => NIBBLE_CAPTURE_PROBES,
            other => other.bits(),
        }
    }

    /// Bytes occupied by one transmitted sample.
    pub fn wire_bytes_per_sample(&self) -> usize {
        match self {
            ChannelWidth::Sixteen => 2,
            _ => 1,
        }
    }
}

/// Limits of the acquisition engine for its current configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareCapability {
    pub min_sample_rate: u32,
    pub max_sample_rate: u32,
    pub min_sample_cnt: u32,
    pub max_sample_cnt: u32,
    pub channels: ChannelWidth,
    /// Samples land in extended memory (PSRAM) and may come back burst-aligned
    pub samples_to_psram: bool,
}

impl HardwareCapability {
    /// Sample memory in bytes as advertised in metadata.
    pub fn capture_size(&self) -> u32 {
        match self.channels {
            ChannelWidth::Four => self.max_sample_cnt,
            width => self.max_sample_cnt.saturating_mul(width.bits() as u32 / 8),
        }
    }
}

/// Everything the capture engine needs to run one acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// GPIO number behind each logical channel
    pub pins: [u8; TRIGGER_CHANNELS],
    /// Logical trigger channel, `None` for free-running captures
    pub trigger_channel: Option<u8>,
    pub trigger_edge: TriggerEdge,
    pub sample_count: u32,
    pub sample_rate: u32,
    pub channels: ChannelWidth,
    pub samples_to_psram: bool,
    /// Upper bound on the acquisition, enforced by the engine
    pub measure_timeout: Duration,
}

impl CaptureConfig {
    /// GPIO the trigger is wired to, if a trigger is configured.
    pub fn trigger_gpio(&self) -> Option<u8> {
        self.trigger_channel
            .and_then(|channel| self.pins.get(channel as usize).copied())
    }
}

/// Static analyzer settings, fixed for the lifetime of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSettings {
    pub pins: [u8; TRIGGER_CHANNELS],
    pub default_sample_count: u32,
    pub default_sample_rate: u32,
    pub channels: ChannelWidth,
    pub samples_to_psram: bool,
    pub measure_timeout: Duration,
    /// Clear the session on RESET. Off by default.
    pub reset_clears_session: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        let mut pins = [0u8; TRIGGER_CHANNELS];
        for (i, pin) in pins.iter_mut().enumerate() {
            *pin = i as u8;
        }
        Self {
            pins,
            default_sample_count: 1000,
            default_sample_rate: 1_000_000,
            channels: ChannelWidth::Eight,
            samples_to_psram: false,
            measure_timeout: Duration::from_secs(20),
            reset_clears_session: false,
        }
    }
}

impl DeviceSettings {
    /// Configuration before any host command has been applied.
    pub fn base_capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            pins: self.pins,
            trigger_channel: None,
            trigger_edge: TriggerEdge::default(),
            sample_count: self.default_sample_count,
            sample_rate: self.default_sample_rate,
            channels: self.channels,
            samples_to_psram: self.samples_to_psram,
            measure_timeout: self.measure_timeout,
        }
    }
}
