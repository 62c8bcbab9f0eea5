// Wire constants for the SUMP / OpenBench Logic Sniffer protocol

/// Reply to QUERY (`0x02`)
pub const DEVICE_ID: &[u8; 4] = b"1ALS";

/// Size of the payload that follows every long command
pub const COMMAND_PAYLOAD_SIZE: usize = 4;

/// Number of logical trigger channels addressable by a 16-bit mask
pub const TRIGGER_CHANNELS: usize = 16;

/// Device name reported in metadata tag 0x01
pub const DEVICE_NAME: &str = "ESP32";

/// Firmware version reported in metadata tag 0x02
pub const FIRMWARE_VERSION: &str = "0.00";

/// SUMP protocol version reported in metadata tag 0x41
pub const PROTOCOL_VERSION: u8 = 2;

/// Metadata tag: device name (NUL-terminated string)
pub const META_DEVICE_NAME: u8 = 0x01;

/// Metadata tag: firmware version (NUL-terminated string)
pub const META_FIRMWARE_VERSION: u8 = 0x02;

/// Metadata tag: sample memory size in bytes (u32, big-endian)
pub const META_SAMPLE_MEMORY: u8 = 0x21;

/// Metadata tag: maximum sample rate in Hz (u32, big-endian)
pub const META_SAMPLE_RATE: u8 = 0x23;

/// Metadata tag: number of usable probes (u8)
pub const META_PROBES: u8 = 0x40;

/// Metadata tag: protocol version (u8)
pub const META_PROTOCOL_VERSION: u8 = 0x41;

/// Metadata end-of-stream tag
pub const META_END: u8 = 0x00;

/// Probe count advertised for 4-channel captures, which go out one byte per sample
pub const NIBBLE_CAPTURE_PROBES: u8 = 8;

/// Total length of the metadata reply. Fixed for every configuration.
pub const METADATA_LEN: usize = 28;

/// Number of RESET bytes a host sends before probing a device
pub const HOST_RESET_REPEAT: usize = 5;
