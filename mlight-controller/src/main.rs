//! mlight controller — entry point.
//!
//! ```text
//! mlight-controller                  Run the capture prompt
//! mlight-controller --config <path>  Load a custom config TOML
//! mlight-controller --gen-config     Write default config to stdout
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mlight_core::net::discovery::{self, SERVICE_INSTRUCTION};
use mlight_core::{ConnectionInfo, PipelineRunner, SceneCoordinator, SceneDirs, Session};

use mlight_controller::app::{ControllerApp, Flow};
use mlight_controller::commands;
use mlight_controller::config::ControllerConfig;
use mlight_controller::stage::{NullStage, NullSwitcher};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mlight-controller", about = "mlight structured-light scene controller")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "mlight-controller.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ControllerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let config = ControllerConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("mlight-controller v{}", env!("CARGO_PKG_VERSION"));
    info!("scene: {}/{}", config.scene.root, config.scene.name);

    // Dial an explicit host, or browse for the device beacon.
    let info = if config.network.device_host.is_empty() {
        info!("discovering capture device...");
        let addr = discovery::browse(
            SERVICE_INSTRUCTION,
            Duration::from_millis(config.network.discovery_timeout_ms),
        )
        .await?;
        ConnectionInfo::new(addr.ip().to_string(), addr.port())
    } else {
        ConnectionInfo::new(config.network.device_host.clone(), config.network.device_port)
    };
    info!("connecting to device at {info}");
    let session = Session::connect(&info).await?;

    let dirs = SceneDirs::new(&config.scene.root, &config.scene.name);
    let pipeline = if config.scene.pipeline_exe.is_empty() {
        None
    } else {
        Some(PipelineRunner::new(&config.scene.pipeline_exe))
    };
    let scene = SceneCoordinator::new(dirs, pipeline);

    let mut app = ControllerApp::new(
        session,
        scene,
        config.sweep.clone(),
        Box::new(NullStage::default()),
        Box::new(NullSwitcher),
    );

    // Prompt loop.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break; // EOF
        };
        if line.trim().is_empty() {
            continue;
        }

        let cmd = match commands::parse(&line) {
            Ok(cmd) => cmd,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        match app.execute(cmd).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(e) => eprintln!("command failed: {e}"),
        }
    }

    info!("controller exiting");
    Ok(())
}
