//! Capture buffer to SUMP sample stream.
//!
//! The host expects the newest sample first, so the buffer is walked backwards.
//! Samples the engine failed to deliver (`requested - count`) are sent as zero
//! units ahead of the real data.
//!
//! | width | unit on the wire | buffer element |
//! |-------|------------------|----------------|
//! | 16    | 2 bytes          | 2 bytes, copied in memory order |
//! | 8     | 1 byte           | 1 byte |
//! | 4     | 1 byte, low nibble only | 1 byte holding two samples, earlier one in the high nibble |

use crate::capture::SampleBatch;
use crate::config::ChannelWidth;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

/// Element `index` of `size` bytes, or `None` if it falls outside the buffer.
fn element(data: &[u8], index: isize, size: usize) -> Option<&[u8]> {
    let start = usize::try_from(index).ok()?.checked_mul(size)?;
    data.get(start..start.checked_add(size)?)
}

/// Sample units written per transport write.
pub const STREAM_CHUNK_UNITS: usize = 4096;

/// Incremental encoder producing exactly `requested` sample units from one batch.
///
/// `requested` is the count the host asked for, which can be far larger than
/// anything the engine captured, so the stream is produced in bounded chunks.
/// A batch reporting more samples than requested is clamped to the request.
/// Reads that would fall outside the buffer produce zero units; they are counted
/// and reported once, when the last chunk is taken.
#[derive(Debug)]
pub struct SampleEncoder<'a> {
    data: &'a [u8],
    channels: ChannelWidth,
    requested: usize,
    delivered: usize,
    diff: usize,
    position: usize,
    index: isize,
    missing: usize,
}

impl<'a> SampleEncoder<'a> {
    pub fn new(batch: &'a SampleBatch, requested: usize) -> Self {
        let mut delivered = batch.count;
        if delivered > requested {
            warn!(
                delivered,
                requested, "Engine delivered more samples than requested, extra samples dropped"
            );
            delivered = requested;
        }
        let diff = requested - delivered;
        let units = match batch.channels {
            ChannelWidth::Four => requested / 2,
            _ => requested,
        };
        Self {
            data: batch.data.as_ref(),
            channels: batch.channels,
            requested,
            delivered,
            diff,
            position: 0,
            index: units as isize - 1 - diff as isize,
            missing: 0,
        }
    }

    /// Sample units still to be produced.
    pub fn remaining(&self) -> usize {
        self.requested - self.position
    }

    /// Total stream length in bytes.
    pub fn stream_len(&self) -> usize {
        self.requested.saturating_mul(self.channels.wire_bytes_per_sample())
    }

    /// Units so far that had to be sent as zero because the buffer ran short.
    pub fn missing(&self) -> usize {
        self.missing
    }

    /// Next chunk of at most `max_units` units, or `None` once the stream is complete.
    pub fn next_chunk(&mut self, max_units: usize) -> Option<Bytes> {
        let units = max_units.max(1).min(self.remaining());
        if units == 0 {
            return None;
        }
        let mut out = BytesMut::with_capacity(units * self.channels.wire_bytes_per_sample());
        for _ in 0..units {
            self.put_unit(&mut out);
        }
        if self.remaining() == 0 && self.missing > 0 {
            warn!(
                missing = self.missing,
                requested = self.requested,
                delivered = self.delivered,
                buffer_len = self.data.len(),
                "Sample reads fell outside the capture buffer, sent as zero"
            );
        }
        Some(out.freeze())
    }

    fn put_unit(&mut self, out: &mut BytesMut) {
        let i = self.position;
        self.position += 1;

        match self.channels {
            ChannelWidth::Sixteen | ChannelWidth::Eight => {
                let size = self.channels.wire_bytes_per_sample();
                if i < self.diff {
                    out.put_bytes(0, size);
                    return;
                }
                match element(self.data, self.index, size) {
                    Some(sample) => out.put_slice(sample),
                    None => {
                        out.put_bytes(0, size);
                        self.missing += 1;
                    }
                }
                self.index -= 1;
            }
            ChannelWidth::Four => {
                if i < self.diff {
                    out.put_u8(0);
                    return;
                }
                let byte = match element(self.data, self.index, 1) {
                    Some(byte) => byte[0],
                    None => {
                        self.missing += 1;
                        0
                    }
                };
                if i & 1 == 1 {
                    out.put_u8(byte & 0xf);
                    self.index -= 1;
                } else {
                    out.put_u8((byte >> 4) & 0xf);
                }
            }
        }
    }
}

/// Encode `batch` as exactly `requested` sample units in one buffer.
pub fn encode_samples(batch: &SampleBatch, requested: usize) -> Bytes {
    let mut encoder = SampleEncoder::new(batch, requested);
    let mut out = BytesMut::with_capacity(encoder.stream_len());
    while let Some(chunk) = encoder.next_chunk(STREAM_CHUNK_UNITS) {
        out.extend_from_slice(&chunk);
    }
    out.freeze()
}
