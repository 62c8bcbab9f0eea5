use std::io;
use thiserror::Error;

/// The primary error type for the `sump-lib` crate.
///
/// None of these ever reach the host as status bytes: the SUMP wire protocol has
/// no error path, so the device side only logs them.
#[derive(Error, Debug)]
pub enum SumpError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Timeout waiting for device: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Capture engine refused to start: {0}")]
    CaptureStart(String),

    #[error("Unsupported channel width {0}, use 4, 8 or 16")]
    InvalidChannelWidth(u8),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Metadata parse error at offset {offset}: {message}")]
    Metadata { offset: usize, message: String },

    #[error("Insufficient data: expected at least {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },
}
