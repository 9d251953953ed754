//! Configuration for the scene controller.

use std::path::Path;

use serde::{Deserialize, Serialize};

use mlight_core::{CodeSystem, DeviceOrientation, ExposureBracket, MlightError, Resolution};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Scene directory settings.
    pub scene: SceneConfig,
    /// Sweep parameters.
    pub sweep: SweepConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Device host. Empty = discover via the UDP beacon.
    pub device_host: String,
    /// Device TCP port (used with an explicit host).
    pub device_port: u16,
    /// Discovery timeout in milliseconds.
    pub discovery_timeout_ms: u64,
}

/// Scene directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Root directory holding all scenes.
    pub root: String,
    /// Name of the scene being captured.
    pub name: String,
    /// External post-processing executable. Empty = skip refinement.
    pub pipeline_exe: String,
}

/// Sweep parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Bit-planes per sweep.
    pub bit_count: u32,
    /// Code system: "gray" or "minsw".
    pub system: String,
    /// Device orientation: "upright" or "portrait".
    pub orientation: String,
    /// Default resolution preset.
    pub resolution: String,
    /// Exposure durations in seconds, parallel with `exposure_isos`.
    pub exposure_durations: Vec<f64>,
    pub exposure_isos: Vec<f32>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            scene: SceneConfig::default(),
            sweep: SweepConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            device_host: String::new(),
            device_port: 7412,
            discovery_timeout_ms: 10_000,
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            root: "scenes".into(),
            name: "scene".into(),
            pipeline_exe: String::new(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            bit_count: 10,
            system: "gray".into(),
            orientation: "portrait".into(),
            resolution: "high".into(),
            exposure_durations: vec![0.01],
            exposure_isos: vec![100.0],
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

// ── Loading / conversion ─────────────────────────────────────────

impl ControllerConfig {
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

impl SweepConfig {
    pub fn code_system(&self) -> Result<CodeSystem, MlightError> {
        match self.system.as_str() {
            "gray" => Ok(CodeSystem::GrayCode),
            "minsw" => Ok(CodeSystem::MinStripeWidth),
            other => Err(MlightError::InvalidCommand(format!(
                "unknown code system {other:?}"
            ))),
        }
    }

    pub fn orientation(&self) -> Result<DeviceOrientation, MlightError> {
        match self.orientation.as_str() {
            "upright" => Ok(DeviceOrientation::Upright),
            "portrait" => Ok(DeviceOrientation::Portrait),
            other => Err(MlightError::InvalidCommand(format!(
                "unknown orientation {other:?}"
            ))),
        }
    }

    pub fn resolution(&self) -> Result<Resolution, MlightError> {
        self.resolution.parse()
    }

    /// Build the validated exposure bracket.
    pub fn bracket(&self) -> Result<ExposureBracket, MlightError> {
        ExposureBracket::new(self.exposure_durations.clone(), self.exposure_isos.clone())
    }
}

// ── Tests ────────────────────────────────────────────────────────
