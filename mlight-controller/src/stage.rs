//! Stage and projector-power boundaries.
//!
//! The linear stage and the projector power switcher are external
//! hardware reached over serial links. Those links stay behind these
//! traits; the shipped implementations only log the motion so the rest
//! of the controller runs without the rig.

use async_trait::async_trait;
use tracing::info;

use mlight_core::MlightError;

/// Which projector a power command addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectorTarget {
    All,
    Id(u32),
}

impl std::fmt::Display for ProjectorTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectorTarget::All => write!(f, "all"),
            ProjectorTarget::Id(id) => write!(f, "{id}"),
        }
    }
}

/// Linear-stage motion control.
#[async_trait]
pub trait StageControl: Send {
    /// Move the arm to a numbered stage position and settle.
    async fn move_to(&mut self, position: u32) -> Result<(), MlightError>;
}

/// Projector power switching.
#[async_trait]
pub trait ProjectorSwitcher: Send {
    async fn set_power(&mut self, target: ProjectorTarget, on: bool) -> Result<(), MlightError>;
}

// ── Logging no-op implementations ────────────────────────────────

/// Stage stand-in for rigs without the serial link.
#[derive(Debug, Default)]
pub struct NullStage {
    position: Option<u32>,
}

impl NullStage {
    pub fn position(&self) -> Option<u32> {
        self.position
    }
}

#[async_trait]
impl StageControl for NullStage {
    async fn move_to(&mut self, position: u32) -> Result<(), MlightError> {
        info!("stage: move to position {position}");
        self.position = Some(position);
        Ok(())
    }
}

/// Projector switcher stand-in.
#[derive(Debug, Default)]
pub struct NullSwitcher;

#[async_trait]
impl ProjectorSwitcher for NullSwitcher {
    async fn set_power(&mut self, target: ProjectorTarget, on: bool) -> Result<(), MlightError> {
        info!(
            "projector {target}: {}",
            if on { "on" } else { "off" }
        );
        Ok(())
    }
}
