//! Entry point for `ota-updater`.
//!
//! Parses CLI arguments, loads the firmware image, opens the requested
//! transport, and hands everything to [`ota_updater::send_firmware`].
//! `main.rs` owns only process setup (logging, argument parsing, exit code).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ota_updater::serial::{SerialTransport, DEFAULT_BAUD_RATE};
use ota_updater::socket::TcpTransport;
use ota_updater::transfer::plan;
use ota_updater::{send_firmware, TransferConfig, Transport};

/// Flash firmware to a device over the OTA packet protocol.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    link: Link,
}

#[derive(Subcommand)]
enum Link {
    /// Send over a TCP connection.
    Tcp {
        #[command(flatten)]
        common: Common,
        /// Device address.
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        addr: String,
    },
    /// Send over a serial line (8N1, no flow control).
    Serial {
        #[command(flatten)]
        common: Common,
        /// Serial device path (e.g. /dev/ttyUSB0).
        #[arg(short, long)]
        device: PathBuf,
        /// Line speed.
        #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
        baud: u32,
    },
}

#[derive(Args)]
struct Common {
    /// Firmware image to send.
    image: PathBuf,
    /// Time allowed for each write and each read, in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,
    /// Largest Data packet payload, 1..=256.
    #[arg(long, default_value_t = ota_updater::packet::MAX_PAYLOAD)]
    max_payload: usize,
}

impl Common {
    fn config(&self) -> TransferConfig {
        TransferConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            max_payload: self.max_payload,
            ..TransferConfig::default()
        }
    }
}

fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let (common, target) = match cli.link {
        Link::Tcp { common, addr } => (common, Target::Tcp(addr)),
        Link::Serial {
            common,
            device,
            baud,
        } => (common, Target::Serial(device, baud)),
    };

    // Reject an unusable image before touching the link.
    let config = common.config();
    let image = load_image(&common.image)?;
    plan(&image, &config).context("firmware image rejected")?;

    let mut transport = target.open(config.timeout)?;
    let result = send_firmware(&mut transport, &image, &config).context("firmware update failed");

    // Close on every path; a failed close never masks the transfer outcome.
    if let Err(e) = transport.close() {
        log::warn!("error closing transport: {e}");
    }

    let report = result?;
    log::info!(
        "firmware update complete: {} bytes in {} data packets",
        report.bytes_sent,
        report.data_packets
    );
    Ok(())
}

enum Target {
    Tcp(String),
    Serial(PathBuf, u32),
}

impl Target {
    fn open(&self, timeout: Duration) -> Result<Box<dyn Transport>> {
        Ok(match self {
            Self::Tcp(addr) => {
                log::info!("connecting to {addr}");
                let transport = TcpTransport::connect(addr.as_str(), timeout)
                    .with_context(|| format!("error opening TCP connection to {addr}"))?;
                Box::new(transport)
            }
            Self::Serial(device, baud) => {
                log::info!("opening serial device {} at {baud} baud", device.display());
                let transport = SerialTransport::open(device, *baud, timeout)
                    .with_context(|| format!("error opening serial device {}", device.display()))?;
                Box::new(transport)
            }
        })
    }
}

fn load_image(path: &Path) -> Result<Vec<u8>> {
    log::info!("opening firmware image at {}", path.display());
    let image = std::fs::read(path)
        .with_context(|| format!("error reading firmware image {}", path.display()))?;
    log::info!("opened firmware image, size: {} bytes", image.len());
    Ok(image)
}
