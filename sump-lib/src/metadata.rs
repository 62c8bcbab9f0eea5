//! GET_METADATA tag stream.
//!
//! The device side always emits the same seven tags (28 bytes). The host side
//! accepts the general SUMP grammar, where the tag value selects the payload type:
//!
//! - `0x00`: end of metadata
//! - `0x01..=0x1F`: NUL-terminated string
//! - `0x20..=0x3F`: 32-bit big-endian integer
//! - `0x40..=0x5F`: single byte

use crate::config::HardwareCapability;
use crate::constants::*;
use crate::error::SumpError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

/// Build the metadata reply for the given engine limits.
pub fn encode_metadata(hw: &HardwareCapability) -> Bytes {
    let mut buf = BytesMut::with_capacity(METADATA_LEN);

    buf.put_u8(META_DEVICE_NAME);
    buf.put_slice(DEVICE_NAME.as_bytes());
    buf.put_u8(0);

    buf.put_u8(META_FIRMWARE_VERSION);
    buf.put_slice(FIRMWARE_VERSION.as_bytes());
    buf.put_u8(0);

    buf.put_u8(META_SAMPLE_MEMORY);
    buf.put_u32(hw.capture_size());

    buf.put_u8(META_SAMPLE_RATE);
    buf.put_u32(hw.max_sample_rate);

    buf.put_u8(META_PROBES);
    buf.put_u8(hw.channels.reported_probes());

    buf.put_u8(META_PROTOCOL_VERSION);
    buf.put_u8(PROTOCOL_VERSION);

    buf.put_u8(META_END);
    buf.freeze()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    End,
    Text,
    U32,
    U8,
}

impl TagKind {
    pub fn of(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(TagKind::End),
            0x01..=0x1f => Some(TagKind::Text),
            0x20..=0x3f => Some(TagKind::U32),
            0x40..=0x5f => Some(TagKind::U8),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    Text(String),
    Number(u32),
}

/// Device description as parsed by a host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceMetadata {
    pub device_name: Option<String>,
    pub firmware_version: Option<String>,
    /// Sample memory in bytes
    pub sample_memory: Option<u32>,
    /// Maximum sample rate in Hz
    pub max_sample_rate: Option<u32>,
    pub probes: Option<u32>,
    pub protocol_version: Option<u32>,
}

impl DeviceMetadata {
    /// Record one tag. Tags this host does not know are skipped.
    pub fn apply(&mut self, tag: u8, value: TagValue) {
        match (tag, value) {
            (0x01, TagValue::Text(s)) => self.device_name = Some(s),
            (0x02, TagValue::Text(s)) => self.firmware_version = Some(s),
            (0x20 | 0x40, TagValue::Number(n)) => self.probes = Some(n),
            (0x21, TagValue::Number(n)) => self.sample_memory = Some(n),
            (0x23, TagValue::Number(n)) => self.max_sample_rate = Some(n),
            (0x24 | 0x41, TagValue::Number(n)) => self.protocol_version = Some(n),
            (tag, value) => trace!(tag, ?value, "Skipping metadata tag"),
        }
    }

    /// Parse a tag stream. Returns the metadata and the bytes consumed, including
    /// the end tag.
    ///
    /// A stream cut off anywhere before its end tag yields `InsufficientData`, so
    /// a reader can keep buffering and retry. Any other error is final.
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize), SumpError> {
        let mut buf = bytes;
        let mut meta = DeviceMetadata::default();

        loop {
            let offset = bytes.len() - buf.remaining();
            if !buf.has_remaining() {
                return Err(SumpError::InsufficientData {
                    expected: offset + 1,
                    actual: bytes.len(),
                });
            }
            let tag = buf.get_u8();
            let kind = TagKind::of(tag).ok_or_else(|| SumpError::Metadata {
                offset,
                message: format!("unknown tag class {tag:#04x}"),
            })?;

            let value = match kind {
                TagKind::End => return Ok((meta, offset + 1)),
                TagKind::Text => {
                    let end = buf.iter().position(|&b| b == 0).ok_or(SumpError::InsufficientData {
                        expected: bytes.len() + 1,
                        actual: bytes.len(),
                    })?;
                    let text = String::from_utf8_lossy(&buf[..end]).into_owned();
                    buf.advance(end + 1);
                    TagValue::Text(text)
                }
                TagKind::U32 => {
                    if buf.remaining() < 4 {
                        return Err(SumpError::InsufficientData {
                            expected: offset + 5,
                            actual: bytes.len(),
                        });
                    }
                    TagValue::Number(buf.get_u32())
                }
                TagKind::U8 => {
                    if !buf.has_remaining() {
                        return Err(SumpError::InsufficientData {
                            expected: offset + 2,
                            actual: bytes.len(),
                        });
                    }
                    TagValue::Number(buf.get_u8() as u32)
                }
            };
            meta.apply(tag, value);
        }
    }
}
