// ofscan — offline-finding scanner CLI
//
// Replays recorded BLE advertisement captures through the scan engine,
// inspects candidate key material, and decodes single OF payloads.

mod replay;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use ofscan_core::{
    describe_status_byte, potential_mac_for_key, DetectionRecord, ScanConfig,
    ScanSessionController, SessionEvent, OF_VENDOR_ID,
};
use replay::{FileSource, ReplayFacility};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ofscan")]
#[command(about = "Offline-Finding advertisement scanner", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay an advertisement capture against a candidate key file
    Scan {
        /// Candidate key file (JSON, backend response shape)
        #[arg(short, long)]
        keys: PathBuf,
        /// Capture file: "<source> <rssi|-> <hex>" per line
        #[arg(short, long)]
        capture: PathBuf,
        /// Session duration cap in seconds
        #[arg(short, long, default_value = "300")]
        duration: u64,
        /// Delay between replayed advertisements in milliseconds
        #[arg(short, long, default_value = "10")]
        interval: u64,
    },
    /// List candidate key material from a key file
    Keys {
        /// Candidate key file (JSON)
        #[arg(short, long)]
        keys: PathBuf,
        /// Derive missing potential MACs from the advertised keys
        #[arg(long)]
        derive: bool,
    },
    /// Decode a single advertisement payload from hex
    Decode {
        /// Manufacturer data bytes as hex (starting at the type byte)
        data: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Scan {
            keys,
            capture,
            duration,
            interval,
        } => run_scan(keys, capture, duration, interval).await,
        Commands::Keys { keys, derive } => list_keys(keys, derive),
        Commands::Decode { data } => decode_one(&data),
    }
}

async fn run_scan(keys: PathBuf, capture: PathBuf, duration: u64, interval: u64) -> Result<()> {
    let lines = replay::parse_capture(&capture)?;
    println!(
        "Replaying {} advertisements from {}",
        lines.len(),
        capture.display()
    );

    let facility = ReplayFacility::new(lines, Duration::from_millis(interval));
    let controller = ScanSessionController::new(
        Arc::new(facility),
        Arc::new(FileSource::new(keys)),
        ScanConfig {
            scan_duration: Duration::from_secs(duration),
            vendor_id: OF_VENDOR_ID,
        },
    );

    let mut events = controller
        .start()
        .await
        .context("failed to start scan session")?;

    let mut latest: Vec<DetectionRecord> = Vec::new();
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::DetectionsUpdated(records) => {
                let matched = records.iter().filter(|r| r.is_matched()).count();
                println!(
                    "  OF packets: {} | matched: {}",
                    records.len().to_string().bold(),
                    matched.to_string().green().bold()
                );
                latest = records;
            }
            SessionEvent::Stopped(summary) => {
                println!();
                println!(
                    "Scan ended ({}): {} distinct sources, {} matched",
                    summary.reason,
                    summary.total_sources,
                    summary.matched_sources.to_string().green().bold()
                );
                break;
            }
        }
    }

    // The capture closes the stream; flush the final table either way
    if latest.is_empty() {
        latest = controller.detections();
    }
    for record in &latest {
        print_record(record);
    }
    Ok(())
}

fn print_record(record: &DetectionRecord) {
    let header = if record.is_matched() {
        format!("{} {}", "MATCHED".green().bold(), record.source_id)
    } else {
        format!("{} {}", "unknown".dimmed(), record.source_id)
    };
    println!("{}", header);

    if let Some(candidate) = &record.matched {
        println!(
            "    device: {} ({}) [{:?}]",
            candidate.name.bold(),
            candidate.device_id,
            candidate.key_kind
        );
    }
    if let Some(key) = &record.reconstructed_key {
        println!("    key:    {}", key);
    }
    if let Some(payload) = &record.payload {
        println!("    status: {}", describe_status_byte(payload.status));
    }
    match record.rssi {
        Some(rssi) => println!("    signal: {} dBm ({})", rssi, proximity(rssi)),
        None => println!("    signal: n/a"),
    }
    if let Some(hex) = &record.raw_payload_hex {
        println!("    raw:    {}", hex.dimmed());
    }
}

/// RSSI distance buckets matching the dashboard's display thresholds
fn proximity(rssi: i32) -> &'static str {
    if rssi > -65 {
        "Very Near"
    } else if rssi > -75 {
        "Near"
    } else if rssi > -85 {
        "Mid Range"
    } else {
        "Far"
    }
}

fn list_keys(keys: PathBuf, derive: bool) -> Result<()> {
    let candidates = replay::load_candidates(&keys)?;
    println!("{} candidates in {}", candidates.len(), keys.display());
    for candidate in &candidates {
        let mac = match (&candidate.potential_mac, derive) {
            (Some(mac), _) => mac.clone(),
            (None, true) => potential_mac_for_key(&candidate.adv_key_b64)
                .map(|mac| format!("{} (derived)", mac))
                .unwrap_or_else(|| "invalid key".red().to_string()),
            (None, false) => "-".to_string(),
        };
        println!(
            "  {} [{:?}] {}  mac: {}",
            candidate.device_id.bold(),
            candidate.key_kind,
            candidate.adv_key_b64,
            mac
        );
    }
    Ok(())
}

fn decode_one(data_hex: &str) -> Result<()> {
    let data = hex::decode(data_hex.trim()).context("payload must be valid hex")?;
    match ofscan_core::decode(OF_VENDOR_ID, &data) {
        Ok(payload) => {
            println!("{}", "Offline-finding payload".bold());
            println!("  status:     0x{:02x} — {}", payload.status, payload.battery());
            println!("  middle:     {}", hex::encode(payload.middle));
            println!("  mac prefix: 0x{:02x}", payload.mac_prefix);
        }
        Err(_) => {
            println!("{}", "Not an offline-finding advertisement".yellow());
        }
    }
    Ok(())
}
