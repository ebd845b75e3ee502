//! Host-side OTA transfer replay.
//!
//! Splits an image file into BLE-sized chunks and feeds them through a
//! transfer session backed by a file writer, exactly as the ESP32 GATT
//! service would. Useful for checking images and sender behaviour without
//! hardware.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ota-host -- firmware.bin --out /tmp/received.bin --duplicates
//! ```
//!
//! MTU, magic and version range come from `OTA_MTU`, `OTA_MAGIC`,
//! `OTA_MIN_VERSION` and `OTA_MAX_VERSION`.

use log::{error, info, warn};
use ota_rs_esp32::config::OtaConfig;
use ota_rs_esp32::ota::{Chunker, Status, TransferSession};
use ota_rs_esp32::storage_host::{default_image_path, FileChunkWriter};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::process::exit;

struct Args {
    image: PathBuf,
    out: Option<PathBuf>,
    version: u16,
    duplicates: bool,
}

#[derive(Serialize)]
struct Summary {
    image_len: usize,
    packets: usize,
    status: String,
    source_sha256: String,
    received_sha256: Option<String>,
    stats: ota_rs_esp32::ota::StatsSnapshot,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args();
    if let Err(e) = run(args) {
        error!("{}", e);
        exit(1);
    }
}

fn print_usage(program: &str) {
    println!("OTA Host Replay");
    println!();
    println!("Usage:");
    println!("  {} <IMAGE> [OPTIONS]", program);
    println!();
    println!("Options:");
    println!("  --out, -o PATH     Where to write the received image");
    println!("  --version, -v N    Image version to send (default 1)");
    println!("  --duplicates, -d   Send every chunk twice");
    println!("  --help             Show this help");
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("ota-host");

    let mut image = None;
    let mut out = None;
    let mut version = 1;
    let mut duplicates = false;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--out" | "-o" => out = iter.next().map(PathBuf::from),
            "--version" | "-v" => {
                version = match iter.next().and_then(|v| v.parse().ok()) {
                    Some(v) => v,
                    None => {
                        eprintln!("--version expects a number between 0 and 65535");
                        exit(2);
                    }
                }
            }
            "--duplicates" | "-d" => duplicates = true,
            "--help" | "-h" => {
                print_usage(program);
                exit(0);
            }
            other if image.is_none() && !other.starts_with('-') => {
                image = Some(PathBuf::from(other));
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                print_usage(program);
                exit(2);
            }
        }
    }

    let Some(image) = image else {
        print_usage(program);
        exit(2);
    };

    Args {
        image,
        out,
        version,
        duplicates,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = OtaConfig::from_env()?;
    let image = std::fs::read(&args.image)?;
    info!(
        "Loaded {:?}: {} bytes, MTU {}",
        args.image,
        image.len(),
        config.mtu
    );

    let out = match args.out {
        Some(path) => path,
        None => default_image_path()?,
    };
    let writer = FileChunkWriter::new(&out)?;
    let mut session = TransferSession::new(writer, &config);

    let packets = Chunker::new(&config).chunk(&image, args.version)?;
    let sends = if args.duplicates { 2 } else { 1 };

    let mut status = Status::Accepted;
    'transfer: for packet in &packets {
        for _ in 0..sends {
            status = session.on_write(packet);
            if !status.is_accepted() {
                if let Some(kind) = status.validation_result().reason {
                    warn!("Chunk rejected: {}", kind);
                }
                break 'transfer;
            }
            if status == Status::AcceptedFinal {
                break 'transfer;
            }
        }
    }

    let received_sha256 = match status {
        Status::AcceptedFinal => {
            info!("Image written to {:?}", out);
            Some(sha256_hex(&std::fs::read(&out)?))
        }
        _ => None,
    };

    let summary = Summary {
        image_len: image.len(),
        packets: packets.len(),
        status: session.state().to_ble_string(),
        source_sha256: sha256_hex(&image),
        received_sha256,
        stats: session.stats().snapshot(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if status != Status::AcceptedFinal {
        return Err(format!("transfer did not complete: {}", summary.status).into());
    }
    Ok(())
}
