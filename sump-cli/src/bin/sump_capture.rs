use anyhow::{Context, Result, bail};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use sump_lib::{CaptureSetup, ChannelWidth, SumpClient, SumpError};
use tokio::net::TcpStream;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Configure and run one SUMP capture, then dump the sample stream.
///
/// Samples arrive newest first, exactly as the device sends them.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Device address.
    #[arg(short, long, default_value = "127.0.0.1:5555")]
    connect: SocketAddr,
    /// Samples to capture.
    #[arg(short, long, default_value_t = 1000)]
    samples: u32,
    /// Raw rate divider: rate = max_rate / (divider + 1).
    #[arg(short, long, conflicts_with = "rate")]
    divider: Option<u32>,
    /// Sample rate in Hz; the divider is derived from the device's maximum rate.
    #[arg(short, long)]
    rate: Option<u32>,
    /// Channel width the device is configured for (4, 8 or 16).
    #[arg(long, default_value_t = 8)]
    channels: u8,
    /// Trigger mask, hex. The lowest set bit selects the trigger channel.
    #[arg(long, value_parser = parse_hex_u16)]
    trigger_mask: Option<u16>,
    /// Trigger levels, hex. A 1 at the trigger channel selects a rising edge.
    #[arg(long, value_parser = parse_hex_u16, default_value = "0", requires = "trigger_mask")]
    trigger_values: u16,
    /// Seconds to wait for the capture to arrive.
    #[arg(long, default_value_t = 30)]
    capture_timeout: u64,
    /// Write the raw sample stream here instead of printing hex.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("{s:?} is not a 16-bit hex value: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let channels = ChannelWidth::try_from(cli.channels).map_err(|_| SumpError::InvalidChannelWidth(cli.channels))?;

    let stream = TcpStream::connect(cli.connect)
        .await
        .with_context(|| format!("Failed to connect to {}", cli.connect))?;
    let mut client =
        SumpClient::new(stream).with_timeouts(Duration::from_secs(2), Duration::from_secs(cli.capture_timeout));

    client.reset().await.context("Failed to reset device")?;
    client.identify().await.context("Not a SUMP device")?;

    let divider = match (cli.divider, cli.rate) {
        (Some(divider), _) => divider,
        (None, Some(rate)) => {
            let metadata = client.metadata().await.context("Failed to read metadata")?;
            let Some(max_rate) = metadata.max_sample_rate else {
                bail!("Device does not report a maximum sample rate, pass --divider instead");
            };
            if rate == 0 || rate > max_rate {
                bail!("Rate {rate} Hz outside 1..={max_rate} Hz");
            }
            max_rate / rate - 1
        }
        (None, None) => 0,
    };

    let setup = CaptureSetup {
        divider,
        samples: cli.samples,
        delay: cli.samples,
        trigger: cli.trigger_mask.map(|mask| (mask, cli.trigger_values)),
        flags: None,
    };
    client.configure(&setup).await.context("Failed to configure capture")?;
    info!(?setup, "Capture configured, arming");

    let data = client
        .capture(cli.samples, channels)
        .await
        .context("Capture did not arrive")?;

    match cli.output {
        Some(path) => {
            tokio::fs::write(&path, &data)
                .await
                .with_context(|| format!("Failed to write {:?}", path))?;
            info!(bytes = data.len(), "Wrote sample stream to {:?}", path);
        }
        None => {
            for (row, chunk) in data.chunks(32).enumerate() {
                println!("{:08x}: {}", row * 32, hex::encode(chunk));
            }
        }
    }

    Ok(())
}
