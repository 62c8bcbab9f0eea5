//! Capture engine interface and the ARM-time orchestration around it.
//!
//! The engine is an external collaborator: it owns sampling, trigger hardware and
//! the sample buffer. This module only turns session state into a
//! [`CaptureConfig`], starts the engine and hands back a single-shot
//! [`CaptureHandle`] that resolves once the samples are in.

use crate::config::{CaptureConfig, ChannelWidth, DeviceSettings, HardwareCapability};
use crate::error::SumpError;
use crate::session::ProtocolSession;
use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::warn;

/// Samples delivered by the engine for one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBatch {
    /// Raw sample memory in capture order. Nibble-packed for 4-channel captures.
    pub data: Bytes,
    /// Samples actually captured. Can be below the request when memory is burst-aligned.
    pub count: usize,
    /// Sample clock the engine ran at, in Hz
    pub clock: u32,
    pub channels: ChannelWidth,
}

/// Acquisition backend driven by the protocol engine.
pub trait CaptureEngine {
    /// Limits for the given channel width and memory mode.
    fn hw_params(&self, channels: ChannelWidth, samples_to_psram: bool) -> HardwareCapability;

    /// Start an acquisition. Returns immediately; samples arrive through the handle.
    ///
    /// An `Err` here is a synchronous start failure. The engine must complete the
    /// paired [`CaptureCompletion`] at most once; dropping it abandons the capture.
    fn start_capture(&mut self, config: &CaptureConfig) -> Result<CaptureHandle, SumpError>;
}

/// Receiving side of a capture. Resolves exactly once.
#[derive(Debug)]
pub struct CaptureHandle {
    rx: oneshot::Receiver<SampleBatch>,
}

impl CaptureHandle {
    /// A handle that is already complete, for engines that capture synchronously.
    pub fn ready(batch: SampleBatch) -> Self {
        let (completion, handle) = capture_channel();
        completion.complete(batch);
        handle
    }

    /// Wait for the engine. `None` means the engine gave up without delivering samples.
    pub async fn wait(self) -> Option<SampleBatch> {
        self.rx.await.ok()
    }
}

/// Engine side of a capture. Consumed on completion, so samples can only be delivered once.
#[derive(Debug)]
pub struct CaptureCompletion {
    tx: oneshot::Sender<SampleBatch>,
}

impl CaptureCompletion {
    /// Deliver the samples. Returns `false` if the dispatcher is no longer waiting.
    pub fn complete(self, batch: SampleBatch) -> bool {
        self.tx.send(batch).is_ok()
    }
}

pub fn capture_channel() -> (CaptureCompletion, CaptureHandle) {
    let (tx, rx) = oneshot::channel();
    (CaptureCompletion { tx }, CaptureHandle { rx })
}

/// `max_rate / (divider + 1)`, clamped into the engine's rate range.
pub fn resolve_sample_rate(divider: u32, hw: &HardwareCapability) -> u32 {
    let mut rate = hw.max_sample_rate / divider.saturating_add(1);
    if rate > hw.max_sample_rate {
        rate = hw.max_sample_rate;
    }
    if rate < hw.min_sample_rate {
        rate = hw.min_sample_rate;
    }
    rate
}

/// Count handed to the engine: the request (or `min_sample_cnt` when unset), clamped into its range.
///
/// The stream sent back to the host still carries the unclamped request.
pub fn resolve_sample_count(read_count: u32, hw: &HardwareCapability) -> u32 {
    let mut count = if read_count == 0 { hw.min_sample_cnt } else { read_count };
    if count > hw.max_sample_cnt {
        count = hw.max_sample_cnt;
    }
    if count < hw.min_sample_cnt {
        count = hw.min_sample_cnt;
    }
    count
}

/// Build the configuration for one ARM from the session and the engine limits.
pub fn prepare_capture(
    session: &ProtocolSession,
    settings: &DeviceSettings,
    hw: &HardwareCapability,
) -> CaptureConfig {
    let sample_count = resolve_sample_count(session.read_count, hw);
    if sample_count != session.read_count && session.read_count_is_set() {
        warn!(
            requested = session.read_count,
            min = hw.min_sample_cnt,
            max = hw.max_sample_cnt,
            "Sample count out of range, capturing {} and still sending the requested count",
            sample_count
        );
    }

    let mut config = settings.base_capture_config();
    config.sample_count = sample_count;
    config.sample_rate = resolve_sample_rate(session.divider, hw);
    config.channels = hw.channels;
    config.samples_to_psram = hw.samples_to_psram;
    if let Some(trigger) = session.trigger.resolved() {
        config.trigger_channel = Some(trigger.channel);
        config.trigger_edge = trigger.edge;
    }
    config
}
