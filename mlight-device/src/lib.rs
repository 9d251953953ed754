//! # mlight-device — Capture Device Service
//!
//! Remote service owning the camera and the on-device decode engine.
//! Listens for a controller, executes capture instructions, and
//! accumulates structured-light bit-planes into a correspondence
//! raster that is returned when the sweep ends.
//!
//! The hardware boundary is the async [`camera::Camera`] trait;
//! [`camera::SimulatedCamera`] runs the full loop against a synthetic
//! planar scene.

pub mod camera;
pub mod config;
pub mod service;
