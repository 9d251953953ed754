//! mlight device service — entry point.
//!
//! ```text
//! mlight-device                  Run in the foreground
//! mlight-device --config <path>  Load a custom config TOML
//! mlight-device --gen-config    Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mlight_core::net::discovery::{Advertiser, Beacon, SERVICE_INSTRUCTION};
use mlight_core::{MinStripeTable, Session};

use mlight_device::camera::SimulatedCamera;
use mlight_device::config::DeviceConfig;
use mlight_device::service::CaptureService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mlight-device", about = "mlight capture device service")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "mlight-device.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&DeviceConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let config = DeviceConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("mlight-device v{}", env!("CARGO_PKG_VERSION"));
    info!("listen port: {}", config.network.listen_port);
    info!(
        "sensor: {}x{}, mount angle {} deg",
        config.camera.width, config.camera.height, config.camera.angle_degrees
    );

    // The min-SW table is loaded once; a bad path is fatal at startup
    // rather than mid-sweep.
    let table = if config.camera.minsw_table.is_empty() {
        None
    } else {
        info!("loading code table {}", config.camera.minsw_table);
        Some(Arc::new(MinStripeTable::load(&config.camera.minsw_table)?))
    };

    let listener = TcpListener::bind(("0.0.0.0", config.network.listen_port)).await?;
    info!("listening on {}", listener.local_addr()?);

    let _advertiser = if config.network.advertise {
        Some(
            Advertiser::spawn(
                Beacon::new(SERVICE_INSTRUCTION, config.network.listen_port),
                Duration::from_millis(config.network.beacon_interval_ms),
            )
            .await?,
        )
    } else {
        None
    };

    // One controller at a time; the next connection is accepted after
    // the current session ends.
    loop {
        let accept = tokio::select! {
            result = listener.accept() => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received — shutting down");
                return Ok(());
            }
        };

        let (stream, peer) = match accept {
            Ok(pair) => pair,
            Err(e) => {
                warn!("accept error: {e}");
                continue;
            }
        };
        info!("controller connected from {peer}");

        let camera = SimulatedCamera::new(config.camera.width, config.camera.height);
        let camera = match &table {
            Some(t) => camera.with_table(Arc::clone(t)),
            None => camera,
        };
        let service = CaptureService::new(
            Session::new(stream),
            camera,
            table.clone(),
            config.camera.angle_degrees,
        );

        if let Err(e) = service.run().await {
            warn!("session with {peer} failed: {e}");
        }
        info!("session with {peer} ended");
    }
}
