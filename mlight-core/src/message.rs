//! Protocol message types for the controller ↔ capture-device link.
//!
//! Two message families travel over the wire:
//!
//! - [`Instruction`] — controller → device. Drives camera configuration
//!   and the structured-light capture sequence.
//! - [`Reply`] — device → controller. Carries photos, status signals,
//!   decoded rasters, scene metadata, or a capture error.
//!
//! Both are closed sum types with exhaustive matching; malformed
//! combinations (e.g. an exposure bracket with mismatched duration/ISO
//! lists) are rejected at construction time, never at the point of use.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MlightError;

// ── SweepAxis ────────────────────────────────────────────────────

/// Which projector coordinate a sweep decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SweepAxis {
    /// Vertical stripes; decodes the projector x (u) coordinate.
    Vertical,
    /// Horizontal stripes; decodes the projector y (v) coordinate.
    Horizontal,
}

impl SweepAxis {
    /// Single-letter tag used in file names (`result-u.pfm` etc.).
    pub fn letter(self) -> char {
        match self {
            SweepAxis::Vertical => 'u',
            SweepAxis::Horizontal => 'v',
        }
    }

    /// The axis captured after this one in a full take.
    pub fn other(self) -> Self {
        match self {
            SweepAxis::Vertical => SweepAxis::Horizontal,
            SweepAxis::Horizontal => SweepAxis::Vertical,
        }
    }
}

impl fmt::Display for SweepAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepAxis::Vertical => write!(f, "u"),
            SweepAxis::Horizontal => write!(f, "v"),
        }
    }
}

// ── CodeSystem ───────────────────────────────────────────────────

/// Binary code family used for the projected stripe patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeSystem {
    /// Reflected-binary Gray code.
    GrayCode,
    /// Table-driven min-stripe-width code.
    MinStripeWidth,
}

impl fmt::Display for CodeSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeSystem::GrayCode => write!(f, "gray"),
            CodeSystem::MinStripeWidth => write!(f, "minsw"),
        }
    }
}

// ── Resolution ───────────────────────────────────────────────────

/// Capture resolution preset understood by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    Max,
    High,
    Medium,
    Low,
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::High
    }
}

impl std::str::FromStr for Resolution {
    type Err = MlightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "max" => Ok(Resolution::Max),
            "high" => Ok(Resolution::High),
            "medium" => Ok(Resolution::Medium),
            "low" => Ok(Resolution::Low),
            other => Err(MlightError::InvalidCommand(format!(
                "unknown resolution {other:?}"
            ))),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Resolution::Max => "max",
            Resolution::High => "high",
            Resolution::Medium => "medium",
            Resolution::Low => "low",
        };
        write!(f, "{s}")
    }
}

// ── DeviceOrientation ────────────────────────────────────────────

/// Physical orientation of the capture device at capture time.
///
/// Determines the rotation applied to the decoded raster before
/// serialization so downstream tools always see projector-aligned
/// images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceOrientation {
    /// Sensor rows already match raster rows; no transform.
    Upright,
    /// Device held portrait against a landscape projector; the raster
    /// is rotated a quarter turn (dimensions swap).
    Portrait,
}

impl Default for DeviceOrientation {
    fn default() -> Self {
        DeviceOrientation::Portrait
    }
}

// ── TorchMode ────────────────────────────────────────────────────

/// Device torch (flash LED) setting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TorchMode {
    Off,
    /// On at the given level in `(0.0, 1.0]`.
    On(f32),
}

// ── ExposureBracket ──────────────────────────────────────────────

/// A validated set of (duration, ISO) exposure pairs captured per
/// instruction.
///
/// The two lists are parallel and must have equal length; the
/// constructor enforces this so a mismatched bracket can never be
/// built, serialized, or sent. Deserialization funnels through the
/// same check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBracket", into = "RawBracket")]
pub struct ExposureBracket {
    durations_s: Vec<f64>,
    isos: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawBracket {
    durations_s: Vec<f64>,
    isos: Vec<f32>,
}

impl TryFrom<RawBracket> for ExposureBracket {
    type Error = MlightError;

    fn try_from(raw: RawBracket) -> Result<Self, Self::Error> {
        ExposureBracket::new(raw.durations_s, raw.isos)
    }
}

impl From<ExposureBracket> for RawBracket {
    fn from(b: ExposureBracket) -> Self {
        RawBracket {
            durations_s: b.durations_s,
            isos: b.isos,
        }
    }
}

impl ExposureBracket {
    /// Build a bracket, rejecting mismatched list lengths.
    pub fn new(durations_s: Vec<f64>, isos: Vec<f32>) -> Result<Self, MlightError> {
        if durations_s.len() != isos.len() {
            return Err(MlightError::BracketMismatch {
                durations: durations_s.len(),
                isos: isos.len(),
            });
        }
        Ok(Self { durations_s, isos })
    }

    /// A single-exposure bracket.
    pub fn single(duration_s: f64, iso: f32) -> Self {
        Self {
            durations_s: vec![duration_s],
            isos: vec![iso],
        }
    }

    pub fn len(&self) -> usize {
        self.durations_s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations_s.is_empty()
    }

    pub fn durations_s(&self) -> &[f64] {
        &self.durations_s
    }

    pub fn isos(&self) -> &[f32] {
        &self.isos
    }

    /// Iterate over (duration, ISO) pairs.
    pub fn exposures(&self) -> impl Iterator<Item = (f64, f32)> + '_ {
        self.durations_s
            .iter()
            .copied()
            .zip(self.isos.iter().copied())
    }
}

// ── Instruction ──────────────────────────────────────────────────

/// Controller → device operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Capture one still photo at the given resolution.
    CaptureStill { resolution: Resolution },

    /// Capture an exposure bracket of still photos.
    CaptureBracket { bracket: ExposureBracket },

    /// Capture the normal (non-inverted) photo of a binary-code pair.
    ///
    /// The device holds the photo until [`Instruction::FinishCapturePair`]
    /// delivers the inverted exposure for differencing.
    CaptureNormalInvertedPair {
        bit: u32,
        bracket: ExposureBracket,
        resolution: Resolution,
    },

    /// Capture the inverted photo of the current pair, difference and
    /// threshold on-device, and accumulate the bit-plane.
    FinishCapturePair {
        bit: u32,
        bracket: ExposureBracket,
        resolution: Resolution,
    },

    /// Begin a structured-light sweep; the device allocates fresh
    /// decoder state for it.
    StartSweep {
        axis: SweepAxis,
        system: CodeSystem,
        bit_count: u32,
        resolution: Resolution,
        orientation: DeviceOrientation,
    },

    /// Finish the active sweep; the device decodes and returns the
    /// correspondence raster.
    EndSweep,

    // ── Camera configuration ─────────────────────────────────────
    /// Drive the lens to a fixed position in `[0.0, 1.0]`.
    SetFocus { lens_position: f32 },
    LockFocus,
    AutoFocus,
    /// Focus on a normalized point of interest.
    FocusPoint { x: f32, y: f32 },

    SetExposure { duration_s: f64, iso: f32 },
    LockExposure,
    AutoExposure,

    LockWhiteBalance,

    SetTorch { mode: TorchMode },

    /// Tear down the capture session on the device.
    EndSession,
}

impl Instruction {
    /// Short tag for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::CaptureStill { .. } => "CaptureStill",
            Instruction::CaptureBracket { .. } => "CaptureBracket",
            Instruction::CaptureNormalInvertedPair { .. } => "CaptureNormalInvertedPair",
            Instruction::FinishCapturePair { .. } => "FinishCapturePair",
            Instruction::StartSweep { .. } => "StartSweep",
            Instruction::EndSweep => "EndSweep",
            Instruction::SetFocus { .. } => "SetFocus",
            Instruction::LockFocus => "LockFocus",
            Instruction::AutoFocus => "AutoFocus",
            Instruction::FocusPoint { .. } => "FocusPoint",
            Instruction::SetExposure { .. } => "SetExposure",
            Instruction::LockExposure => "LockExposure",
            Instruction::AutoExposure => "AutoExposure",
            Instruction::LockWhiteBalance => "LockWhiteBalance",
            Instruction::SetTorch { .. } => "SetTorch",
            Instruction::EndSession => "EndSession",
        }
    }
}

// ── Reply ────────────────────────────────────────────────────────

/// Status signal carried in a [`Reply::Status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusUpdate {
    /// Acknowledgement with nothing to report.
    None,
    /// White balance gains are now locked.
    LockedWhiteBalance,
    /// The normal (non-inverted) binary-code photo is captured; the
    /// controller may display the inverted pattern.
    CapturedNormalBinaryCode,
}

/// What a photo payload contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhotoKind {
    Still,
    Ambient,
    Calibration,
    /// Pre-threshold intensity-difference image.
    IntensityDiff,
    /// Three-level thresholded image.
    Thresholded,
}

/// Device → controller results.
///
/// Error and payload are separate variants, so a reply can never carry
/// both — the mutual-exclusion invariant holds by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    /// An image payload.
    Photo {
        kind: PhotoKind,
        data: Vec<u8>,
        /// Index within the exposure bracket, if bracketed.
        bracket_index: Option<u32>,
        /// Lens position echo, if the instruction touched focus.
        lens_position: Option<f32>,
        /// (duration seconds, ISO) actually used.
        exposure: Option<(f64, f32)>,
    },

    /// A status signal with no payload.
    Status(StatusUpdate),

    /// The finished correspondence raster for a completed sweep,
    /// serialized as a PFM image.
    Raster { axis: SweepAxis, data: Vec<u8> },

    /// Scene metadata (capture angle, exposure list) as YAML text.
    Metadata { yaml: String },

    /// The device failed to execute the current instruction. Receivers
    /// must abort the in-flight sweep and ignore any buffered data.
    Error { message: String },
}

impl Reply {
    /// Status-only acknowledgement.
    pub fn ack() -> Self {
        Reply::Status(StatusUpdate::None)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error { .. })
    }
}

// ── WireMessage ──────────────────────────────────────────────────

/// Everything that can travel inside one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireMessage {
    Instruction(Instruction),
    Reply(Reply),
}

impl From<Instruction> for WireMessage {
    fn from(i: Instruction) -> Self {
        WireMessage::Instruction(i)
    }
}

impl From<Reply> for WireMessage {
    fn from(r: Reply) -> Self {
        WireMessage::Reply(r)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracket_rejects_mismatched_lengths() {
        let err = ExposureBracket::new(vec![0.01, 0.02], vec![100.0]).unwrap_err();
        assert!(matches!(
            err,
            MlightError::BracketMismatch {
                durations: 2,
                isos: 1
            }
        ));
    }

    #[test]
    fn bracket_accepts_equal_lengths() {
        let b = ExposureBracket::new(vec![0.01, 0.02], vec![100.0, 200.0]).unwrap();
        assert_eq!(b.len(), 2);
        let pairs: Vec<_> = b.exposures().collect();
        assert_eq!(pairs[1], (0.02, 200.0f32));
    }

    #[test]
    fn bracket_mismatch_rejected_on_deserialize() {
        // Hand-craft the raw form with unequal lists; deserialization
        // must funnel through the validating constructor.
        let raw = RawBracket {
            durations_s: vec![0.01],
            isos: vec![100.0, 200.0],
        };
        let bytes = bincode::serialize(&raw).unwrap();
        let res: Result<ExposureBracket, _> = bincode::deserialize(&bytes);
        assert!(res.is_err());
    }

    #[test]
    fn resolution_parse() {
        assert_eq!("high".parse::<Resolution>().unwrap(), Resolution::High);
        assert!("giant".parse::<Resolution>().is_err());
    }

    #[test]
    fn axis_letters() {
        assert_eq!(SweepAxis::Vertical.letter(), 'u');
        assert_eq!(SweepAxis::Horizontal.letter(), 'v');
        assert_eq!(SweepAxis::Vertical.other(), SweepAxis::Horizontal);
    }

    #[test]
    fn reply_error_exclusivity() {
        let r = Reply::Error {
            message: "lens stuck".into(),
        };
        assert!(r.is_error());
        assert!(!Reply::ack().is_error());
    }
}
