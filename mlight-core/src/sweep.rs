//! Capture sequencer: drives one structured-light sweep over a
//! transport session.
//!
//! ## State machine
//!
//! ```text
//! Idle ──start──► SweepStarted ──► CapturingBit(0, normal)
//!                                   │ Status(CapturedNormalBinaryCode)
//!                                   ▼
//!                                  CapturingBit(0, inverted)
//!                                   │ non-error reply
//!                                   ▼
//!                                  CapturingBit(1, normal) … ──► SweepEnding ──► Idle
//! ```
//!
//! Every transition is driven by exactly one awaited reply; the next
//! one-shot handler is registered before the instruction that will
//! produce its message is sent, preserving strict causal ordering.
//! Any error reply aborts the sweep back to `Idle` with no raster
//! emitted. A sequencer runs one sweep at a time; concurrent sweeps
//! need independent sequencers bound to independent sessions.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::MlightError;
use crate::message::{
    CodeSystem, DeviceOrientation, ExposureBracket, Instruction, Reply, Resolution, StatusUpdate,
    SweepAxis,
};
use crate::net::Session;

// ── Display driver boundary ──────────────────────────────────────

/// Solid fill colors the projector display must support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolidColor {
    Black,
    White,
}

/// External display driver: renders full-screen patterns on the
/// projector for the bit currently being captured.
pub trait PatternDisplay: Send {
    /// Set stripe orientation and inversion for subsequent patterns.
    fn configure(&mut self, axis: SweepAxis, inverted: bool);

    /// Show the structured pattern for one bit of a code system.
    fn show_code_bit(&mut self, bit: u32, system: CodeSystem);

    /// Show a solid fill.
    fn show_solid(&mut self, color: SolidColor);

    /// Show the checkerboard test pattern with the given square size.
    fn show_checkerboard(&mut self, square_px: u32);
}

// ── Sweep descriptor / outcome ───────────────────────────────────

/// Immutable parameters for one sweep.
#[derive(Debug, Clone)]
pub struct SweepDescriptor {
    /// Projector being captured (directory bookkeeping only).
    pub projector: u32,
    /// Linear-stage position (directory bookkeeping only).
    pub position: u32,
    pub axis: SweepAxis,
    pub system: CodeSystem,
    pub bit_count: u32,
    pub resolution: Resolution,
    pub bracket: ExposureBracket,
    pub orientation: DeviceOrientation,
}

/// Everything a completed sweep hands to the scene coordinator.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub projector: u32,
    pub position: u32,
    pub axis: SweepAxis,
    /// The finished correspondence raster, PFM-serialized.
    pub raster_pfm: Vec<u8>,
    /// Capture-angle / exposure metadata YAML from the device.
    pub metadata_yaml: Option<String>,
}

// ── Sweep phase ──────────────────────────────────────────────────

/// Observable sequencer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SweepPhase {
    #[default]
    Idle,
    SweepStarted,
    CapturingBit {
        bit: u32,
        inverted: bool,
    },
    SweepEnding,
}

impl SweepPhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, SweepPhase::Idle)
    }
}

// ── CaptureSequencer ─────────────────────────────────────────────

/// Drives sweeps over an owned session and display driver.
pub struct CaptureSequencer<D: PatternDisplay> {
    session: Session,
    display: D,
    phase: SweepPhase,
    cancel: CancellationToken,
}

impl<D: PatternDisplay> CaptureSequencer<D> {
    pub fn new(session: Session, display: D) -> Self {
        Self {
            session,
            display,
            phase: SweepPhase::Idle,
            cancel: CancellationToken::new(),
        }
    }

    pub fn phase(&self) -> SweepPhase {
        self.phase
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    /// Token that cancels the active sweep at the next bit transition.
    /// In-flight hardware operations on the device are not preempted.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one full sweep: `bit_count` normal/inverted pairs on one
    /// axis, ending with the decoded raster from the device.
    ///
    /// Rejected with [`MlightError::NotReady`] (state unchanged) if
    /// the session is not ready. On an error reply the sweep aborts to
    /// `Idle` and no raster is emitted.
    pub async fn run_sweep(
        &mut self,
        desc: &SweepDescriptor,
    ) -> Result<SweepOutcome, MlightError> {
        if !self.session.is_ready() {
            return Err(MlightError::NotReady);
        }
        self.cancel = CancellationToken::new();
        // Stale replies from an earlier aborted sweep must not satisfy
        // this sweep's expectations.
        self.session.drain_backlog();
        self.phase = SweepPhase::SweepStarted;
        info!(
            "sweep start: proj {} pos {} axis {} system {} bits {}",
            desc.projector, desc.position, desc.axis, desc.system, desc.bit_count
        );

        let result = self.drive(desc).await;
        self.phase = SweepPhase::Idle;
        if let Err(e) = &result {
            warn!("sweep failed: {e}");
        }
        result
    }

    async fn drive(&mut self, desc: &SweepDescriptor) -> Result<SweepOutcome, MlightError> {
        self.session
            .send(Instruction::StartSweep {
                axis: desc.axis,
                system: desc.system,
                bit_count: desc.bit_count,
                resolution: desc.resolution,
                orientation: desc.orientation,
            })
            .await?;

        for bit in 0..desc.bit_count {
            // Cancellation is only honoured between bit transitions;
            // a pair capture in flight on the device runs to completion.
            if self.cancel.is_cancelled() {
                return Err(MlightError::Cancelled);
            }
            self.capture_pair(desc, bit).await?;
        }

        self.phase = SweepPhase::SweepEnding;
        debug!("sweep ending: requesting raster");

        let raster_slot = self.session.expect();
        self.session.send(Instruction::EndSweep).await?;
        let raster_pfm = match raster_slot.recv_reply().await? {
            Reply::Raster { axis, data } if axis == desc.axis => data,
            Reply::Raster { .. } => {
                return Err(self.abort(desc, desc.bit_count, "raster for wrong axis"))
            }
            Reply::Error { message } => return Err(self.abort(desc, desc.bit_count, &message)),
            _ => return Err(self.abort(desc, desc.bit_count, "expected raster reply")),
        };

        let metadata_yaml = match self.session.expect().recv_reply().await? {
            Reply::Metadata { yaml } => Some(yaml),
            Reply::Error { message } => return Err(self.abort(desc, desc.bit_count, &message)),
            _ => None,
        };

        info!(
            "sweep complete: proj {} pos {} axis {} ({} bytes)",
            desc.projector,
            desc.position,
            desc.axis,
            raster_pfm.len()
        );
        Ok(SweepOutcome {
            projector: desc.projector,
            position: desc.position,
            axis: desc.axis,
            raster_pfm,
            metadata_yaml,
        })
    }

    /// One normal/inverted pair for a single bit-plane.
    async fn capture_pair(
        &mut self,
        desc: &SweepDescriptor,
        bit: u32,
    ) -> Result<(), MlightError> {
        // Normal phase.
        self.phase = SweepPhase::CapturingBit {
            bit,
            inverted: false,
        };
        self.display.configure(desc.axis, false);
        self.display.show_code_bit(bit, desc.system);

        let slot = self.session.expect();
        self.session
            .send(Instruction::CaptureNormalInvertedPair {
                bit,
                bracket: desc.bracket.clone(),
                resolution: desc.resolution,
            })
            .await?;
        match slot.recv_reply().await? {
            Reply::Status(StatusUpdate::CapturedNormalBinaryCode) => {}
            Reply::Error { message } => return Err(self.abort(desc, bit, &message)),
            _ => return Err(self.abort(desc, bit, "expected normal-capture status")),
        }

        // Inverted phase.
        self.phase = SweepPhase::CapturingBit {
            bit,
            inverted: true,
        };
        self.display.configure(desc.axis, true);
        self.display.show_code_bit(bit, desc.system);

        let slot = self.session.expect();
        self.session
            .send(Instruction::FinishCapturePair {
                bit,
                bracket: desc.bracket.clone(),
                resolution: desc.resolution,
            })
            .await?;
        match slot.recv_reply().await? {
            Reply::Error { message } => Err(self.abort(desc, bit, &message)),
            _ => Ok(()),
        }
    }

    fn abort(&mut self, desc: &SweepDescriptor, bit: u32, reason: &str) -> MlightError {
        self.phase = SweepPhase::Idle;
        MlightError::SweepAborted {
            projector: desc.projector,
            position: desc.position,
            axis: desc.axis,
            bit,
            reason: reason.to_string(),
        }
    }
}
