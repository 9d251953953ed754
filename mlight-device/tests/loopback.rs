//! Loopback tests — a real controller-side sequencer driving the
//! device service over localhost TCP, with the simulated camera
//! standing in for hardware.

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use mlight_core::code::pfm;
use mlight_core::{
    CaptureSequencer, CodeSystem, DeviceOrientation, ExposureBracket, MlightError, PatternDisplay,
    Resolution, Session, SolidColor, SweepAxis, SweepDescriptor, NO_MATCH,
};
use mlight_device::camera::SimulatedCamera;
use mlight_device::service::CaptureService;

// ── Helpers ──────────────────────────────────────────────────────

struct NullDisplay;

impl PatternDisplay for NullDisplay {
    fn configure(&mut self, _axis: SweepAxis, _inverted: bool) {}
    fn show_code_bit(&mut self, _bit: u32, _system: CodeSystem) {}
    fn show_solid(&mut self, _color: SolidColor) {}
    fn show_checkerboard(&mut self, _square_px: u32) {}
}

/// Controller session + running device service over localhost.
async fn loopback(camera: SimulatedCamera) -> Session {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let dial = tokio::spawn(async move { Session::new(TcpStream::connect(addr).await.unwrap()) });
    let (stream, _) = listener.accept().await.unwrap();

    let service = CaptureService::new(Session::new(stream), camera, None, 35.0);
    tokio::spawn(service.run());

    dial.await.unwrap()
}

fn descriptor(axis: SweepAxis, bit_count: u32) -> SweepDescriptor {
    SweepDescriptor {
        projector: 0,
        position: 0,
        axis,
        system: CodeSystem::GrayCode,
        bit_count,
        resolution: Resolution::High,
        bracket: ExposureBracket::single(0.01, 100.0),
        orientation: DeviceOrientation::Upright,
    }
}

// ── Full sweep ───────────────────────────────────────────────────

#[tokio::test]
async fn vertical_sweep_recovers_ground_truth() {
    let session = loopback(SimulatedCamera::new(8, 4)).await;
    let mut seq = CaptureSequencer::new(session, NullDisplay);

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        seq.run_sweep(&descriptor(SweepAxis::Vertical, 3)),
    )
    .await
    .expect("timeout")
    .unwrap();

    assert_eq!(outcome.axis, SweepAxis::Vertical);
    let raster = pfm::read(&outcome.raster_pfm).unwrap();
    assert_eq!(raster.width(), 8);
    assert_eq!(raster.height(), 4);
    // Planar scene: every pixel's correspondence is its column.
    for y in 0..4 {
        for x in 0..8 {
            assert_eq!(raster.get(x, y), Some(x as f32), "pixel ({x}, {y})");
        }
    }

    let yaml = outcome.metadata_yaml.expect("metadata");
    let meta = mlight_core::SweepMetadata::from_yaml(&yaml).unwrap();
    assert_eq!(meta.angle, 35.0);
    assert_eq!(meta.exposure_durations, vec![0.01]);
    assert!(seq.phase().is_idle());
}

#[tokio::test]
async fn horizontal_sweep_decodes_rows() {
    let session = loopback(SimulatedCamera::new(4, 8)).await;
    let mut seq = CaptureSequencer::new(session, NullDisplay);

    let outcome = seq
        .run_sweep(&descriptor(SweepAxis::Horizontal, 3))
        .await
        .unwrap();
    let raster = pfm::read(&outcome.raster_pfm).unwrap();
    for y in 0..8 {
        for x in 0..4 {
            assert_eq!(raster.get(x, y), Some(y as f32));
        }
    }
}

#[tokio::test]
async fn shadowed_pixel_is_no_match() {
    let session = loopback(SimulatedCamera::new(8, 1).shadow(3, 0)).await;
    let mut seq = CaptureSequencer::new(session, NullDisplay);

    let outcome = seq
        .run_sweep(&descriptor(SweepAxis::Vertical, 3))
        .await
        .unwrap();
    let raster = pfm::read(&outcome.raster_pfm).unwrap();
    assert_eq!(raster.get(3, 0), Some(NO_MATCH));
    assert_eq!(raster.matched_count(), 7);
}

#[tokio::test]
async fn portrait_sweep_swaps_raster_dimensions() {
    let session = loopback(SimulatedCamera::new(8, 4)).await;
    let mut seq = CaptureSequencer::new(session, NullDisplay);

    let mut desc = descriptor(SweepAxis::Vertical, 3);
    desc.orientation = DeviceOrientation::Portrait;
    let outcome = seq.run_sweep(&desc).await.unwrap();
    let raster = pfm::read(&outcome.raster_pfm).unwrap();
    assert_eq!(raster.width(), 4);
    assert_eq!(raster.height(), 8);
}

// ── Error mid-sweep ──────────────────────────────────────────────

#[tokio::test]
async fn camera_fault_aborts_sweep_then_next_sweep_succeeds() {
    let session = loopback(SimulatedCamera::new(8, 1).fail_inverted_at(1)).await;
    let mut seq = CaptureSequencer::new(session, NullDisplay);

    let err = seq
        .run_sweep(&descriptor(SweepAxis::Vertical, 3))
        .await
        .unwrap_err();
    match err {
        MlightError::SweepAborted { bit, axis, .. } => {
            assert_eq!(bit, 1);
            assert_eq!(axis, SweepAxis::Vertical);
        }
        other => panic!("expected SweepAborted, got {other}"),
    }
    assert!(seq.phase().is_idle());

    // The service dropped its decoder; a fresh sweep over the same
    // session must run clean on the bits the fault never reaches.
    let outcome = seq
        .run_sweep(&descriptor(SweepAxis::Vertical, 1))
        .await
        .unwrap();
    let raster = pfm::read(&outcome.raster_pfm).unwrap();
    // One bit resolves positions 0 and 1 only.
    assert_eq!(raster.get(0, 0), Some(0.0));
    assert_eq!(raster.get(1, 0), Some(1.0));
}
