//! # mlight-controller — Scene Controller
//!
//! Line-oriented command prompt driving structured-light captures: it
//! dials (or discovers) the capture device, runs sweeps through the
//! core sequencer, and records outcomes into the scene hierarchy.
//!
//! Stage motion and projector power are trait boundaries
//! ([`stage::StageControl`], [`stage::ProjectorSwitcher`]); the shipped
//! implementations log instead of driving serial hardware.

pub mod app;
pub mod commands;
pub mod config;
pub mod display;
pub mod stage;
