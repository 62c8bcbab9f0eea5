use crate::constants::COMMAND_PAYLOAD_SIZE;
use crate::error::SumpError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use modular_bitfield::prelude::*;
use num_enum::{FromPrimitive, IntoPrimitive};
use strum_macros::Display;

/// One-byte SUMP opcodes.
///
/// Short commands (MSB clear) carry no payload. The long commands listed here
/// are followed by exactly four payload bytes. Bytes that match nothing land in
/// `Unknown` and never consume a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    Reset = 0x00,
    Arm = 0x01,
    Query = 0x02,
    SelfTest = 0x03,
    GetMetadata = 0x04,

    SetDivider = 0x80,
    SetReadDelayCount = 0x81,
    SetFlags = 0x82,
    SetBigReadCount = 0x83,

    SetTriggerMaskA = 0xC0,
    SetTriggerValuesA = 0xC1,
    SetTriggerConfigA = 0xC2,
    SetTriggerMaskB = 0xC4,
    SetTriggerValuesB = 0xC5,
    SetTriggerConfigB = 0xC6,
    SetTriggerMaskC = 0xC8,
    SetTriggerValuesC = 0xC9,
    SetTriggerConfigC = 0xCA,
    SetTriggerMaskD = 0xCC,
    SetTriggerValuesD = 0xCD,
    SetTriggerConfigD = 0xCE,

    #[num_enum(catch_all)]
    Unknown(u8),
}

impl Opcode {
    pub fn has_payload(&self) -> bool {
        !matches!(
            self,
            Opcode::Reset
                | Opcode::Arm
                | Opcode::Query
                | Opcode::SelfTest
                | Opcode::GetMetadata
                | Opcode::Unknown(_)
        )
    }

    /// Trigger stage (0 = A .. 3 = D) addressed by a trigger opcode.
    fn trigger_stage(&self) -> Option<u8> {
        let value: u8 = (*self).into();
        match self {
            Opcode::Unknown(_) => None,
            _ if value >= 0xC0 => Some((value >> 2) & 0x3),
            _ => None,
        }
    }
}

/// SET_FLAGS register as laid out by the OLS firmware.
///
/// Decoded for logging only; none of these bits change how this device captures.
#[bitfield(bytes = 4)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    pub demux: bool,
    pub noise_filter: bool,
    pub disabled_groups: B4,
    pub external_clock: bool,
    pub inverted_clock: bool,
    pub rle: bool,
    pub swap_channels: bool,
    pub external_test: bool,
    pub internal_test: bool,
    #[skip]
    reserved: B2,
    pub rle_mode: B2,
    #[skip]
    unused: B16,
}

/// Decode a payload as one 32-bit little-endian word.
pub fn payload_u32(payload: [u8; COMMAND_PAYLOAD_SIZE]) -> u32 {
    (&payload[..]).get_u32_le()
}

/// Decode a payload as two 16-bit little-endian words, low half first.
pub fn payload_u16_pair(payload: [u8; COMMAND_PAYLOAD_SIZE]) -> (u16, u16) {
    let mut buf = &payload[..];
    let low = buf.get_u16_le();
    let high = buf.get_u16_le();
    (low, high)
}

/// A command exactly as it arrived: opcode plus the payload, if the opcode takes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    pub opcode: Opcode,
    pub payload: Option<[u8; COMMAND_PAYLOAD_SIZE]>,
}

/// A decoded SUMP command.
///
/// Count fields hold the raw on-wire values; the `+ 1` offsets are applied by
/// the session when the command is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reset,
    Arm,
    Query,
    SelfTest,
    GetMetadata,
    SetTriggerMask { stage: u8, mask: u16 },
    SetTriggerValues { stage: u8, values: u16 },
    SetTriggerConfig { stage: u8, config: u32 },
    /// Low 24 bits of the payload
    SetDivider(u32),
    SetReadDelayCount { read: u16, delay: u16 },
    SetBigReadCount(u32),
    SetFlags(Flags),
    Unknown(u8),
}

impl TryFrom<CommandFrame> for Command {
    type Error = SumpError;

    fn try_from(frame: CommandFrame) -> Result<Self, Self::Error> {
        let opcode = frame.opcode;
        if !opcode.has_payload() {
            return Ok(match opcode {
                Opcode::Reset => Command::Reset,
                Opcode::Arm => Command::Arm,
                Opcode::Query => Command::Query,
                Opcode::SelfTest => Command::SelfTest,
                Opcode::GetMetadata => Command::GetMetadata,
                other => Command::Unknown(other.into()),
            });
        }

        let payload = frame
            .payload
            .ok_or_else(|| SumpError::Protocol(format!("{opcode} requires a 4-byte payload")))?;
        let word = payload_u32(payload);
        let low = (word & 0xffff) as u16;

        let command = match opcode {
            Opcode::SetDivider => Command::SetDivider(word & 0x00ff_ffff),
            Opcode::SetReadDelayCount => {
                let (read, delay) = payload_u16_pair(payload);
                Command::SetReadDelayCount { read, delay }
            }
            Opcode::SetFlags => Command::SetFlags(Flags::from_bytes(payload)),
            Opcode::SetBigReadCount => Command::SetBigReadCount(word),
            Opcode::SetTriggerMaskA | Opcode::SetTriggerMaskB | Opcode::SetTriggerMaskC | Opcode::SetTriggerMaskD => {
                Command::SetTriggerMask {
                    stage: opcode.trigger_stage().unwrap_or(0),
                    mask: low,
                }
            }
            Opcode::SetTriggerValuesA
            | Opcode::SetTriggerValuesB
            | Opcode::SetTriggerValuesC
            | Opcode::SetTriggerValuesD => Command::SetTriggerValues {
                stage: opcode.trigger_stage().unwrap_or(0),
                values: low,
            },
            _ => Command::SetTriggerConfig {
                stage: opcode.trigger_stage().unwrap_or(0),
                config: word,
            },
        };
        Ok(command)
    }
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match *self {
            Command::Reset => Opcode::Reset,
            Command::Arm => Opcode::Arm,
            Command::Query => Opcode::Query,
            Command::SelfTest => Opcode::SelfTest,
            Command::GetMetadata => Opcode::GetMetadata,
            Command::SetTriggerMask { stage, .. } => Opcode::from_primitive(0xC0 | (stage & 0x3) << 2),
            Command::SetTriggerValues { stage, .. } => Opcode::from_primitive(0xC1 | (stage & 0x3) << 2),
            Command::SetTriggerConfig { stage, .. } => Opcode::from_primitive(0xC2 | (stage & 0x3) << 2),
            Command::SetDivider(_) => Opcode::SetDivider,
            Command::SetReadDelayCount { .. } => Opcode::SetReadDelayCount,
            Command::SetBigReadCount(_) => Opcode::SetBigReadCount,
            Command::SetFlags(_) => Opcode::SetFlags,
            Command::Unknown(byte) => Opcode::from_primitive(byte),
        }
    }

    /// Serialize the command the way a host sends it.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + COMMAND_PAYLOAD_SIZE);
        buf.put_u8(self.opcode().into());
        match *self {
            Command::SetTriggerMask { mask, .. } => buf.put_u32_le(mask as u32),
            Command::SetTriggerValues { values, .. } => buf.put_u32_le(values as u32),
            Command::SetTriggerConfig { config, .. } => buf.put_u32_le(config),
            Command::SetDivider(divider) => buf.put_u32_le(divider & 0x00ff_ffff),
            Command::SetReadDelayCount { read, delay } => {
                buf.put_u16_le(read);
                buf.put_u16_le(delay);
            }
            Command::SetBigReadCount(count) => buf.put_u32_le(count),
            Command::SetFlags(flags) => buf.put_slice(&flags.into_bytes()),
            _ => {}
        }
        buf.freeze()
    }
}
