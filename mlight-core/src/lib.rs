//! # mlight-core
//!
//! Core library for the mlight structured-light capture suite.
//!
//! This crate contains:
//! - **Protocol types**: `Instruction`, `Reply`, `WireMessage` and the
//!   capture parameter types (`ExposureBracket`, `Resolution`, ...)
//! - **Codec**: `FrameCodec` for length-prefixed, checksummed framed
//!   TCP I/O via `tokio_util`
//! - **Net**: `Session` for ordered, single-outstanding-write message
//!   exchange, plus UDP beacon service discovery
//! - **Code**: binary-code decode engine — Gray code, min-stripe-width
//!   tables, threshold images, the per-sweep `Decoder`, and PFM
//!   raster serialization
//! - **Sweep**: `CaptureSequencer`, the controller-side sweep state
//!   machine over a `PatternDisplay` driver
//! - **Scene**: on-disk scene hierarchy, sweep metadata, and the
//!   external post-processing pipeline adapter
//! - **Error**: `MlightError` — typed, `thiserror`-based error hierarchy

pub mod code;
pub mod codec;
pub mod error;
pub mod message;
pub mod net;
pub mod scene;
pub mod sweep;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use code::{
    Decoder, MinStripeTable, Raster, Threshold, ThresholdImage, MAX_BIT_COUNT, NO_MATCH,
};
pub use codec::{FrameCodec, MAX_FRAME_SIZE, WIRE_VERSION};
pub use error::MlightError;
pub use message::{
    CodeSystem, DeviceOrientation, ExposureBracket, Instruction, PhotoKind, Reply, Resolution,
    StatusUpdate, SweepAxis, TorchMode, WireMessage,
};
pub use net::{Advertiser, Beacon, ConnectionInfo, Expectation, Session};
pub use scene::{PipelineRunner, SceneCoordinator, SceneDirs, SweepMetadata};
pub use sweep::{
    CaptureSequencer, PatternDisplay, SolidColor, SweepDescriptor, SweepOutcome, SweepPhase,
};
