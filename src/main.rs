//! Modbus RTU Slave Service (`rtusrv`)
//!
//! Thin I/O wrapper around the engine: parses command-line arguments,
//! initializes logging, loads the configuration, opens the serial port and
//! hands control to the serve loop. Only an unopenable port at startup is
//! fatal; once serving, the engine recovers from everything.

use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rtusrv::{RtuServer, SerialOpener, ServerConfig};

/// Command-line arguments for rtusrv
#[derive(Parser)]
#[command(
    name = "rtusrv",
    version,
    about = "Modbus RTU slave server",
    long_about = None
)]
struct Args {
    /// Path to YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Serial device path (overrides the config file)
    #[arg(long)]
    device: Option<String>,

    /// Slave ID (overrides the config file)
    #[arg(long)]
    slave_id: Option<u8>,

    /// Baud rate (overrides the config file)
    #[arg(long)]
    baud_rate: Option<u32>,

    /// Seed demo values into the data store at startup
    #[arg(long)]
    demo: bool,
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_yaml_file(path)?,
        None => ServerConfig::default(),
    };

    if let Some(device) = &args.device {
        config.device = device.clone();
    }
    if let Some(slave_id) = args.slave_id {
        config.slave_id = slave_id;
    }
    if let Some(baud_rate) = args.baud_rate {
        config.baud_rate = baud_rate;
    }
    if args.demo {
        config.seed_demo_values = true;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config = load_config(&args)?;
    info!(
        "Starting Modbus RTU server on {}, slave ID: {}, baudrate: {}",
        config.device, config.slave_id, config.baud_rate
    );

    let opener = SerialOpener::new(&config);
    let mut server = RtuServer::new(config, opener);

    // Startup open failure is a configuration fault: report once, exit
    // non-zero, let the supervisor (systemd or similar) decide
    if let Err(e) = server.connect().await {
        error!("cannot open serial port: {e}");
        return Err(e.into());
    }

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            ctrl_c_cancel.cancel();
        }
    });

    server.serve(cancel).await;

    let stats = server.stats();
    info!(
        "server stopped: {} frames, {} replies ({} exceptions), {} CRC errors, {} reconnects",
        stats.frames_received,
        stats.replies_sent,
        stats.exception_replies,
        stats.crc_errors,
        stats.reconnects
    );
    Ok(())
}
