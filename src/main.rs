use anyhow::{Context, Result, bail, ensure};
use clap::Parser;
use std::fs::File;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio::net::TcpListener;

use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use sump_lib::constants::TRIGGER_CHANNELS;
use sump_lib::{ChannelWidth, DeviceSettings, SimulatedEngine, SimulatedHardware, SplitLink, SumpDevice, SumpError};

/// SUMP / OpenBench Logic Sniffer device emulator backed by a simulated capture engine.
///
/// Serves one host at a time over TCP, or a single session over stdin/stdout.
/// Session state (divider, count, trigger) carries over between connections.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to accept host connections on.
    #[arg(short, long, default_value = "127.0.0.1:5555")]
    listen: SocketAddr,
    /// Speak SUMP on stdin/stdout instead of TCP. Logs go to stderr.
    #[arg(long, conflicts_with = "listen")]
    stdio: bool,
    /// Logical channels per sample.
    #[arg(short, long, default_value = "8", value_parser = parse_channels)]
    channels: ChannelWidth,
    /// GPIO behind each logical channel, comma separated, channel 0 first.
    #[arg(long, value_delimiter = ',')]
    pins: Option<Vec<u8>>,
    /// Lowest sample rate in Hz.
    #[arg(long, default_value_t = 5_000)]
    min_rate: u32,
    /// Highest sample rate in Hz, also the divider base.
    #[arg(long, default_value_t = 40_000_000)]
    max_rate: u32,
    /// Smallest capture in samples.
    #[arg(long, default_value_t = 100)]
    min_samples: u32,
    /// Largest capture in samples. Defaults to what sample memory holds.
    #[arg(long)]
    max_samples: Option<u32>,
    /// Store samples in PSRAM: more memory, burst-aligned sample counts.
    #[arg(long)]
    psram: bool,
    /// PSRAM captures are rounded down to a multiple of this many samples.
    #[arg(long, default_value_t = 64, requires = "psram")]
    burst_align: usize,
    /// Abandon captures that would run longer than this.
    #[arg(long, default_value_t = 20_000)]
    measure_timeout_ms: u64,
    /// Clear divider, count and trigger on RESET.
    #[arg(long)]
    reset_clears_session: bool,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(long)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

fn parse_channels(s: &str) -> Result<ChannelWidth, String> {
    let bits: u8 = s.parse().map_err(|e| format!("{e}"))?;
    ChannelWidth::try_from(bits).map_err(|_| SumpError::InvalidChannelWidth(bits).to_string())
}

impl Cli {
    fn hardware(&self) -> Result<SimulatedHardware> {
        ensure!(self.max_rate > 0, "--max-rate must be above zero");
        ensure!(
            self.min_rate <= self.max_rate,
            "--min-rate {} is above --max-rate {}",
            self.min_rate,
            self.max_rate
        );
        if let Some(max) = self.max_samples {
            ensure!(
                self.min_samples <= max,
                "--min-samples {} is above --max-samples {}",
                self.min_samples,
                max
            );
        }
        Ok(SimulatedHardware {
            min_sample_rate: self.min_rate,
            max_sample_rate: self.max_rate,
            min_sample_cnt: self.min_samples,
            max_sample_cnt: self.max_samples,
            burst_align: self.burst_align,
            ..SimulatedHardware::default()
        })
    }

    fn settings(&self) -> Result<DeviceSettings> {
        let mut settings = DeviceSettings {
            channels: self.channels,
            samples_to_psram: self.psram,
            measure_timeout: Duration::from_millis(self.measure_timeout_ms),
            reset_clears_session: self.reset_clears_session,
            ..DeviceSettings::default()
        };
        if let Some(pins) = &self.pins {
            if pins.len() > TRIGGER_CHANNELS {
                bail!("--pins takes at most {TRIGGER_CHANNELS} entries, got {}", pins.len());
            }
            settings.pins[..pins.len()].copy_from_slice(pins);
        }
        Ok(settings)
    }
}

fn setup_logging(
    log_file_path: Option<PathBuf>,
    verbosity: &Verbosity<InfoLevel>,
    stdio: bool,
) -> Result<Option<WorkerGuard>> {
    // stdout carries the sample stream in stdio mode
    let console_writer = if stdio {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(console_writer)
        .with_target(false)
        .with_thread_ids(false)
        .without_time();

    let (file_layer, guard) = if let Some(ref path) = log_file_path {
        let log_file = File::create(path).with_context(|| format!("Failed to create log file at: {:?}", path))?;
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(log_file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_target(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // INFO by default, DEBUG with -v (one line per command), TRACE with -vv
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file_path {
        info!("Logging to file: {:?}", path);
    }

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_file.clone(), &cli.verbose, cli.stdio)?;

    if let Err(e) = run_device(cli).await {
        error!("Device emulator failed: {:?}", e);
        process::exit(1);
    }

    Ok(())
}

async fn run_device(cli: Cli) -> Result<()> {
    let engine = SimulatedEngine::new(cli.hardware()?);
    let mut device = SumpDevice::new(engine, cli.settings()?);

    let hw = device.hw_params();
    info!(
        channels = %hw.channels,
        min_rate = hw.min_sample_rate,
        max_rate = hw.max_sample_rate,
        min_samples = hw.min_sample_cnt,
        max_samples = hw.max_sample_cnt,
        psram = hw.samples_to_psram,
        "Simulated analyzer ready"
    );

    if cli.stdio {
        let mut link = SplitLink::new(tokio::io::stdin(), tokio::io::stdout());
        device.run(&mut link).await.context("SUMP session on stdio failed")?;
        return Ok(());
    }

    let listener = TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("Failed to listen on {}", cli.listen))?;
    info!(addr = %cli.listen, "Waiting for SUMP hosts");

    loop {
        let (mut stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted.context("Failed to accept connection")?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                return Ok(());
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            warn!(%peer, "Could not disable Nagle: {e}");
        }

        info!(%peer, "Host connected");
        match device.run(&mut stream).await {
            Ok(()) => info!(%peer, captures = device.engine().captures_started(), "Host disconnected"),
            Err(e) => warn!(%peer, "Session ended: {e}"),
        }
    }
}
