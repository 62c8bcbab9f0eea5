use crate::command::{Command, Flags};
use crate::config::ChannelWidth;
use crate::constants::{DEVICE_ID, HOST_RESET_REPEAT, METADATA_LEN};
use crate::error::SumpError;
use crate::metadata::DeviceMetadata;
use crate::transport::Transport;
use bytes::{Bytes, BytesMut};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};

// Default timeout for replies to short commands
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

// Default timeout for a capture to come back after ARM
const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(30);

/// Capture parameters a host sends ahead of ARM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSetup {
    pub divider: u32,
    pub samples: u32,
    pub delay: u32,
    /// Channel-A trigger as (mask, values). Sent mask first, as the device requires.
    pub trigger: Option<(u16, u16)>,
    pub flags: Option<Flags>,
}

impl Default for CaptureSetup {
    fn default() -> Self {
        Self {
            divider: 0,
            samples: 1000,
            delay: 1000,
            trigger: None,
            flags: None,
        }
    }
}

/// Host end of a SUMP link.
pub struct SumpClient<T> {
    transport: T,
    timeout: Duration,
    capture_timeout: Duration,
}

impl<T: Transport> SumpClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            timeout: DEFAULT_TIMEOUT,
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, reply: Duration, capture: Duration) -> Self {
        self.timeout = reply;
        self.capture_timeout = capture;
        self
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Send a single command
    pub async fn send(&mut self, command: Command) -> Result<(), SumpError> {
        let bytes = command.encode();
        debug!(bytes = %hex::encode(&bytes), ?command, "SUMP write");
        self.transport.write_all(&bytes).await?;
        self.transport.flush().await?;
        Ok(())
    }

    /// Send the usual burst of RESETs that puts a device in a known parsing state.
    pub async fn reset(&mut self) -> Result<(), SumpError> {
        for _ in 0..HOST_RESET_REPEAT {
            self.send(Command::Reset).await?;
        }
        Ok(())
    }

    pub async fn query_id(&mut self) -> Result<[u8; 4], SumpError> {
        self.send(Command::Query).await?;
        let mut id = [0u8; 4];
        timeout(self.timeout, self.transport.read_exact(&mut id)).await??;
        debug!(id = %hex::encode(id), "SUMP read");
        Ok(id)
    }

    /// QUERY and check the reply is the OLS device ID.
    pub async fn identify(&mut self) -> Result<(), SumpError> {
        let id = self.query_id().await?;
        if &id != DEVICE_ID {
            return Err(SumpError::Protocol(format!(
                "Unexpected device ID {:?}",
                String::from_utf8_lossy(&id)
            )));
        }
        info!("Device identified as {}", String::from_utf8_lossy(&id));
        Ok(())
    }

    pub async fn metadata(&mut self) -> Result<DeviceMetadata, SumpError> {
        self.send(Command::GetMetadata).await?;
        let limit = self.timeout;
        timeout(limit, self.read_metadata()).await?
    }

    async fn read_metadata(&mut self) -> Result<DeviceMetadata, SumpError> {
        let mut buf = BytesMut::with_capacity(METADATA_LEN);
        loop {
            if self.transport.read_buf(&mut buf).await? == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "metadata stream ended early").into());
            }
            match DeviceMetadata::parse(&buf) {
                Ok((meta, consumed)) => {
                    debug!(bytes = %hex::encode(&buf[..consumed]), "SUMP read");
                    if consumed < buf.len() {
                        warn!(extra = buf.len() - consumed, "Discarding bytes after the metadata end tag");
                    }
                    return Ok(meta);
                }
                Err(SumpError::InsufficientData { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Send divider, sample count, flags and trigger ahead of ARM.
    pub async fn configure(&mut self, setup: &CaptureSetup) -> Result<(), SumpError> {
        self.send(Command::SetDivider(setup.divider)).await?;

        let read = setup.samples.saturating_sub(1);
        let delay = setup.delay.saturating_sub(1);
        if read <= u16::MAX as u32 && delay <= u16::MAX as u32 {
            self.send(Command::SetReadDelayCount {
                read: read as u16,
                delay: delay as u16,
            })
            .await?;
        } else {
            self.send(Command::SetBigReadCount(read)).await?;
        }

        if let Some(flags) = setup.flags {
            self.send(Command::SetFlags(flags)).await?;
        }

        let (mask, values) = setup.trigger.unwrap_or((0, 0));
        self.send(Command::SetTriggerMask { stage: 0, mask }).await?;
        self.send(Command::SetTriggerValues { stage: 0, values }).await?;
        Ok(())
    }

    /// ARM and read the full sample stream: `samples` units, newest first.
    pub async fn capture(&mut self, samples: u32, channels: ChannelWidth) -> Result<Bytes, SumpError> {
        self.send(Command::Arm).await?;
        let mut data = vec![0u8; samples as usize * channels.wire_bytes_per_sample()];
        timeout(self.capture_timeout, self.transport.read_exact(&mut data)).await??;
        info!(samples, bytes = data.len(), "Capture received");
        Ok(Bytes::from(data))
    }
}
