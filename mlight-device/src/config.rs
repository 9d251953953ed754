//! Configuration for the capture device service.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Camera settings.
    pub camera: CameraConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP port for controller connections.
    pub listen_port: u16,
    /// Broadcast a discovery beacon while listening.
    pub advertise: bool,
    /// Beacon interval in milliseconds.
    pub beacon_interval_ms: u64,
}

/// Camera configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Simulated sensor width in pixels.
    pub width: usize,
    /// Simulated sensor height in pixels.
    pub height: usize,
    /// Mount angle in degrees, recorded in sweep metadata.
    pub angle_degrees: f64,
    /// Path to the min-stripe-width `.dat` table. Empty = Gray-code
    /// sweeps only.
    pub minsw_table: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            camera: CameraConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_port: 7412,
            advertise: true,
            beacon_interval_ms: 1000,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            angle_degrees: 0.0,
            minsw_table: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl DeviceConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
