//! Command dispatcher.
//!
//! Owns the capture sequencer, the scene coordinator, and the stage /
//! projector hardware boundaries; executes parsed prompt commands
//! against them.

use tracing::{info, warn};

use mlight_core::{
    CaptureSequencer, Instruction, MlightError, PatternDisplay, Reply, Resolution,
    SceneCoordinator, Session, SolidColor, SweepAxis, SweepDescriptor,
};

use crate::commands::{help_text, ControllerCommand};
use crate::config::SweepConfig;
use crate::display::LoggingDisplay;
use crate::stage::{ProjectorSwitcher, ProjectorTarget, StageControl};

/// Whether the prompt loop should keep running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// The controller's top-level state.
pub struct ControllerApp {
    sequencer: CaptureSequencer<LoggingDisplay>,
    scene: SceneCoordinator,
    stage: Box<dyn StageControl>,
    switcher: Box<dyn ProjectorSwitcher>,
    sweep: SweepConfig,
}

impl ControllerApp {
    pub fn new(
        session: Session,
        scene: SceneCoordinator,
        sweep: SweepConfig,
        stage: Box<dyn StageControl>,
        switcher: Box<dyn ProjectorSwitcher>,
    ) -> Self {
        Self {
            sequencer: CaptureSequencer::new(session, LoggingDisplay::default()),
            scene,
            stage,
            switcher,
            sweep,
        }
    }

    /// Execute one parsed command.
    pub async fn execute(&mut self, cmd: ControllerCommand) -> Result<Flow, MlightError> {
        match cmd {
            ControllerCommand::TakeFull {
                projector,
                position,
                resolution,
            } => {
                self.take_full(projector, position, resolution).await?;
                Ok(Flow::Continue)
            }
            ControllerCommand::Calibrate { n_photos } => {
                self.calibrate(n_photos).await?;
                Ok(Flow::Continue)
            }
            ControllerCommand::MoveArm { position } => {
                self.stage.move_to(position).await?;
                Ok(Flow::Continue)
            }
            ControllerCommand::Projector { target, on } => {
                self.switcher.set_power(target, on).await?;
                Ok(Flow::Continue)
            }
            ControllerCommand::FocusPoint { x, y } => {
                self.send_acked(Instruction::FocusPoint { x, y }).await?;
                Ok(Flow::Continue)
            }
            ControllerCommand::Checkerboard => {
                self.sequencer.display_mut().show_checkerboard(64);
                Ok(Flow::Continue)
            }
            ControllerCommand::Black => {
                self.sequencer.display_mut().show_solid(SolidColor::Black);
                Ok(Flow::Continue)
            }
            ControllerCommand::White => {
                self.sequencer.display_mut().show_solid(SolidColor::White);
                Ok(Flow::Continue)
            }
            ControllerCommand::Status => {
                let session = self.sequencer.session();
                println!(
                    "link: {}  ready: {}  phase: {:?}",
                    if session.is_connected() { "up" } else { "down" },
                    session.is_ready(),
                    self.sequencer.phase()
                );
                Ok(Flow::Continue)
            }
            ControllerCommand::Help => {
                println!("{}", help_text());
                Ok(Flow::Continue)
            }
            ControllerCommand::Quit => {
                if let Err(e) = self.send_acked(Instruction::EndSession).await {
                    warn!("session teardown failed: {e}");
                }
                Ok(Flow::Quit)
            }
        }
    }

    /// Both sweeps at one (projector, position), vertical then
    /// horizontal, each recorded into the scene as it completes.
    async fn take_full(
        &mut self,
        projector: u32,
        position: u32,
        resolution: Option<Resolution>,
    ) -> Result<(), MlightError> {
        self.stage.move_to(position).await?;
        self.switcher
            .set_power(ProjectorTarget::Id(projector), true)
            .await?;

        for axis in [SweepAxis::Vertical, SweepAxis::Horizontal] {
            let desc = self.descriptor(projector, position, axis, resolution)?;
            let outcome = self.sequencer.run_sweep(&desc).await?;
            let path = self.scene.record(&outcome).await?;
            info!("take {axis} done: {}", path.display());
        }

        // Leave the projector dark between takes.
        self.sequencer
            .display_mut()
            .show_solid(SolidColor::Black);
        Ok(())
    }

    async fn calibrate(&mut self, n_photos: u32) -> Result<(), MlightError> {
        let dir = self.scene.dirs().calibration();
        tokio::fs::create_dir_all(&dir).await?;
        let resolution = self.sweep.resolution()?;

        for i in 0..n_photos {
            let reply = self.send_acked(Instruction::CaptureStill { resolution }).await?;
            let Reply::Photo { data, .. } = reply else {
                return Err(MlightError::UnexpectedReply("expected calibration photo"));
            };
            let path = dir.join(format!("calib-{i:02}.raw"));
            tokio::fs::write(&path, &data).await?;
            info!("calibration photo {} -> {}", i, path.display());
        }
        Ok(())
    }

    fn descriptor(
        &self,
        projector: u32,
        position: u32,
        axis: SweepAxis,
        resolution: Option<Resolution>,
    ) -> Result<SweepDescriptor, MlightError> {
        Ok(SweepDescriptor {
            projector,
            position,
            axis,
            system: self.sweep.code_system()?,
            bit_count: self.sweep.bit_count,
            resolution: match resolution {
                Some(r) => r,
                None => self.sweep.resolution()?,
            },
            bracket: self.sweep.bracket()?,
            orientation: self.sweep.orientation()?,
        })
    }

    /// Register-then-send a single instruction; an error reply becomes
    /// an `Err`, anything else is returned.
    async fn send_acked(&self, inst: Instruction) -> Result<Reply, MlightError> {
        let slot = self.sequencer.session().expect();
        self.sequencer.session().send(inst).await?;
        match slot.recv_reply().await? {
            Reply::Error { message } => Err(MlightError::Other(message)),
            reply => Ok(reply),
        }
    }
}
