use crate::capture::{CaptureEngine, prepare_capture};
use crate::command::{Command, CommandFrame, Opcode};
use crate::config::{DeviceSettings, HardwareCapability};
use crate::constants::{COMMAND_PAYLOAD_SIZE, DEVICE_ID};
use crate::encoder::{STREAM_CHUNK_UNITS, SampleEncoder};
use crate::error::SumpError;
use crate::metadata::encode_metadata;
use crate::session::ProtocolSession;
use crate::transport::Transport;
use num_enum::FromPrimitive;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

/// Device side of the SUMP protocol: session state plus the capture engine behind it.
///
/// Commands are handled strictly one at a time. ARM does not return until the
/// capture has completed and its samples are written, so nothing else is read
/// from the transport while a capture is in flight.
pub struct SumpDevice<E> {
    engine: E,
    settings: DeviceSettings,
    session: ProtocolSession,
}

impl<E: CaptureEngine> SumpDevice<E> {
    pub fn new(engine: E, settings: DeviceSettings) -> Self {
        Self {
            engine,
            settings,
            session: ProtocolSession::new(),
        }
    }

    pub fn session(&self) -> &ProtocolSession {
        &self.session
    }

    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Current engine limits for the configured channel width and memory mode.
    pub fn hw_params(&self) -> HardwareCapability {
        self.engine
            .hw_params(self.settings.channels, self.settings.samples_to_psram)
    }

    /// Read and handle commands until the host closes the transport.
    pub async fn run<T: Transport>(&mut self, transport: &mut T) -> Result<(), SumpError> {
        info!(channels = %self.settings.channels, "SUMP command loop started");
        loop {
            let opcode = match transport.read_u8().await {
                Ok(byte) => byte,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    info!("Host closed the transport");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            match self.handle_command(opcode, transport).await {
                Ok(()) => {}
                Err(SumpError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!(opcode, "Transport closed in the middle of a command");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Handle one opcode byte, reading its payload first if it has one.
    pub async fn handle_command<T: Transport>(&mut self, opcode: u8, transport: &mut T) -> Result<(), SumpError> {
        let opcode = Opcode::from_primitive(opcode);
        let payload = if opcode.has_payload() {
            let mut payload = [0u8; COMMAND_PAYLOAD_SIZE];
            transport.read_exact(&mut payload).await?;
            Some(payload)
        } else {
            None
        };

        let command = Command::try_from(CommandFrame { opcode, payload })?;
        self.execute(command, transport).await
    }

    async fn execute<T: Transport>(&mut self, command: Command, transport: &mut T) -> Result<(), SumpError> {
        match command {
            Command::Reset => {
                if self.settings.reset_clears_session {
                    self.session.reset();
                    debug!("RESET: session cleared");
                } else {
                    trace!("RESET");
                }
            }
            Command::Query => {
                debug!("QUERY");
                transport.write_all(DEVICE_ID).await?;
                transport.flush().await?;
            }
            Command::Arm => self.arm(transport).await?,
            Command::GetMetadata => {
                let hw = self.hw_params();
                debug!(?hw, "GET_METADATA");
                transport.write_all(&encode_metadata(&hw)).await?;
                transport.flush().await?;
            }
            Command::SelfTest => debug!("SELF_TEST"),
            Command::SetTriggerMask { stage: 0, mask } => {
                self.session.trigger.set_mask(mask);
                debug!(
                    mask = %format!("{mask:#06x}"),
                    channel = ?self.session.trigger.channel(),
                    "Trigger mask set"
                );
            }
            Command::SetTriggerValues { stage: 0, values } => {
                self.session.trigger.set_values(values);
                if self.session.trigger.channel().is_none() {
                    debug!(
                        values = %format!("{values:#06x}"),
                        "Trigger values received without a mask, edge unchanged"
                    );
                } else {
                    debug!(
                        values = %format!("{values:#06x}"),
                        edge = %self.session.trigger.edge(),
                        "Trigger values set"
                    );
                }
            }
            Command::SetTriggerMask { stage, .. }
            | Command::SetTriggerValues { stage, .. }
            | Command::SetTriggerConfig { stage, .. } => {
                trace!(stage, ?command, "Ignoring trigger stage command");
            }
            Command::SetDivider(divider) => {
                self.session.set_divider(divider);
                debug!(divider, "Divider set");
            }
            Command::SetReadDelayCount { read, delay } => {
                self.session.set_read_delay_count(read, delay);
                debug!(
                    read_count = self.session.read_count,
                    delay_count = self.session.delay_count,
                    "Read/delay count set"
                );
            }
            Command::SetBigReadCount(count) => {
                self.session.set_big_read_count(count);
                debug!(read_count = self.session.read_count, "Big read count set");
            }
            Command::SetFlags(flags) => {
                debug!(?flags, "Flags received, not applied");
                self.session.flags = Some(flags);
            }
            Command::Unknown(byte) => trace!(opcode = byte, "Ignoring unknown opcode"),
        }
        Ok(())
    }

    async fn arm<T: Transport>(&mut self, transport: &mut T) -> Result<(), SumpError> {
        let hw = self.hw_params();
        if !self.session.read_count_is_set() {
            self.session.read_count = hw.min_sample_cnt;
        }
        let config = prepare_capture(&self.session, &self.settings, &hw);

        info!(
            samples = config.sample_count,
            rate = config.sample_rate,
            channels = %config.channels,
            trigger_gpio = ?config.trigger_gpio(),
            edge = %config.trigger_edge,
            "Arming capture"
        );

        let handle = match self.engine.start_capture(&config) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Capture did not start, host will time out: {e}");
                return Ok(());
            }
        };

        let Some(batch) = handle.wait().await else {
            warn!("Capture abandoned by the engine, no samples sent");
            return Ok(());
        };

        // The host reads exactly the count it asked for, whatever the engine captured
        let requested = self.session.read_count as usize;
        let mut encoder = SampleEncoder::new(&batch, requested);
        info!(
            delivered = batch.count,
            captured = config.sample_count,
            requested,
            clock = batch.clock,
            bytes = encoder.stream_len(),
            "Capture complete, sending samples"
        );
        while let Some(chunk) = encoder.next_chunk(STREAM_CHUNK_UNITS) {
            transport.write_all(&chunk).await?;
        }
        transport.flush().await?;
        Ok(())
    }
}
