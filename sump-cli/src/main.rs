use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use sump_lib::SumpClient;
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

/// Probe a SUMP device: reset it, check its ID and print its metadata.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Device address.
    #[arg(short, long, default_value = "127.0.0.1:5555")]
    connect: SocketAddr,
    /// Reply timeout in milliseconds.
    #[arg(long, default_value_t = 2_000)]
    timeout_ms: u64,
    /// Print the result as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let stream = TcpStream::connect(cli.connect)
        .await
        .with_context(|| format!("Failed to connect to {}", cli.connect))?;
    let reply = Duration::from_millis(cli.timeout_ms);
    let mut client = SumpClient::new(stream).with_timeouts(reply, reply);

    client.reset().await.context("Failed to reset device")?;
    let id = client.query_id().await.context("Device did not answer QUERY")?;
    let metadata = client.metadata().await.context("Failed to read metadata")?;

    if cli.json {
        let report = serde_json::json!({
            "address": cli.connect.to_string(),
            "id": String::from_utf8_lossy(&id),
            "metadata": metadata,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Connected to {}", cli.connect);
    println!("  ID: {} ({})", String::from_utf8_lossy(&id), hex::encode(id));
    println!("Metadata:");
    if let Some(name) = &metadata.device_name {
        println!("  Device:   {name}");
    }
    if let Some(version) = &metadata.firmware_version {
        println!("  Firmware: {version}");
    }
    if let Some(memory) = metadata.sample_memory {
        println!("  Memory:   {memory} bytes");
    }
    if let Some(rate) = metadata.max_sample_rate {
        println!("  Max rate: {:.3} MHz", rate as f64 / 1e6);
    }
    if let Some(probes) = metadata.probes {
        println!("  Probes:   {probes}");
    }
    if let Some(protocol) = metadata.protocol_version {
        println!("  Protocol: {protocol}");
    }

    Ok(())
}
