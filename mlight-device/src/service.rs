//! Device-side capture service.
//!
//! Owns the transport session and the per-sweep decoder. Each inbound
//! instruction is handled to completion before the next is read; any
//! failure produces a [`Reply::Error`] and drops the active sweep's
//! decoder, so an aborted sweep leaves no decode state behind.

use std::sync::Arc;

use tracing::{debug, info, warn};

use mlight_core::code::pfm;
use mlight_core::scene::SweepMetadata;
use mlight_core::{
    Decoder, ExposureBracket, Instruction, MinStripeTable, MlightError, PhotoKind, Reply,
    Resolution, Session, StatusUpdate,
};

use crate::camera::{Camera, SweepContext};

// ── Active sweep state ───────────────────────────────────────────

struct ActiveSweep {
    ctx: SweepContext,
    decoder: Decoder,
    bit_count: u32,
    /// Bracket from the most recent pair capture, echoed in metadata.
    last_bracket: Option<ExposureBracket>,
}

// ── CaptureService ───────────────────────────────────────────────

/// One connected controller's capture service.
pub struct CaptureService<C: Camera> {
    session: Session,
    camera: C,
    table: Option<Arc<MinStripeTable>>,
    /// Device mount angle, recorded in sweep metadata.
    angle_degrees: f64,
    sweep: Option<ActiveSweep>,
}

impl<C: Camera> CaptureService<C> {
    pub fn new(
        session: Session,
        camera: C,
        table: Option<Arc<MinStripeTable>>,
        angle_degrees: f64,
    ) -> Self {
        Self {
            session,
            camera,
            table,
            angle_degrees,
            sweep: None,
        }
    }

    /// Whether a sweep currently holds decoder state.
    pub fn has_active_sweep(&self) -> bool {
        self.sweep.is_some()
    }

    /// Serve instructions until `EndSession` or link loss.
    pub async fn run(mut self) -> Result<(), MlightError> {
        info!("capture service running");
        loop {
            let inst = match self.session.expect().recv_instruction().await {
                Ok(i) => i,
                Err(MlightError::LinkLost) => {
                    info!("controller disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            debug!("instruction: {}", inst.name());

            let stop = matches!(inst, Instruction::EndSession);
            if let Err(e) = self.handle(inst).await {
                warn!("instruction failed: {e}");
                // Error reply and a dead decoder, never a partial raster.
                self.sweep = None;
                self.session
                    .send(Reply::Error {
                        message: e.to_string(),
                    })
                    .await?;
            }
            if stop {
                info!("session ended by controller");
                return Ok(());
            }
        }
    }

    async fn handle(&mut self, inst: Instruction) -> Result<(), MlightError> {
        match inst {
            Instruction::CaptureStill { resolution } => {
                let data = self.camera.capture_still(resolution).await?;
                self.session
                    .send(Reply::Photo {
                        kind: PhotoKind::Still,
                        data,
                        bracket_index: None,
                        lens_position: None,
                        exposure: None,
                    })
                    .await
            }

            Instruction::CaptureBracket { bracket } => {
                for (i, (duration_s, iso)) in bracket.exposures().enumerate() {
                    self.camera.set_exposure(duration_s, iso).await?;
                    let data = self.camera.capture_still(Resolution::High).await?;
                    self.session
                        .send(Reply::Photo {
                            kind: PhotoKind::Calibration,
                            data,
                            bracket_index: Some(i as u32),
                            lens_position: None,
                            exposure: Some((duration_s, iso)),
                        })
                        .await?;
                }
                Ok(())
            }

            Instruction::StartSweep {
                axis,
                system,
                bit_count,
                resolution,
                orientation,
            } => {
                if self.sweep.is_some() {
                    warn!("sweep restarted with a sweep in flight; dropping old state");
                }
                let (width, height) = self.camera.sensor_size(resolution);
                let decoder =
                    Decoder::new(width, height, system, orientation, self.table.clone())?;
                self.sweep = Some(ActiveSweep {
                    ctx: SweepContext {
                        axis,
                        system,
                        resolution,
                    },
                    decoder,
                    bit_count,
                    last_bracket: None,
                });
                info!("sweep started: axis {axis} system {system} bits {bit_count}");
                // No reply; the controller proceeds straight to bit 0.
                Ok(())
            }

            Instruction::CaptureNormalInvertedPair {
                bit,
                bracket,
                resolution: _,
            } => {
                let sweep = self.sweep.as_mut().ok_or(MlightError::NotReady)?;
                let ctx = sweep.ctx;
                self.camera.capture_pair_normal(&ctx, bit, &bracket).await?;
                sweep.last_bracket = Some(bracket);
                self.session
                    .send(Reply::Status(StatusUpdate::CapturedNormalBinaryCode))
                    .await
            }

            Instruction::FinishCapturePair {
                bit,
                bracket,
                resolution: _,
            } => {
                let sweep = self.sweep.as_mut().ok_or(MlightError::NotReady)?;
                let ctx = sweep.ctx;
                let image = self
                    .camera
                    .capture_pair_inverted(&ctx, bit, &bracket)
                    .await?;
                sweep.decoder.accumulate_bit(&image, bit)?;
                sweep.last_bracket = Some(bracket);
                debug!("accumulated bit {bit}/{}", sweep.bit_count);
                self.session.send(Reply::ack()).await
            }

            Instruction::EndSweep => {
                let sweep = self.sweep.take().ok_or(MlightError::NotReady)?;
                let axis = sweep.ctx.axis;
                let raster = sweep.decoder.finish();
                info!(
                    "sweep finished: axis {axis}, {}/{} pixels matched",
                    raster.matched_count(),
                    raster.data().len()
                );
                self.session
                    .send(Reply::Raster {
                        axis,
                        data: pfm::write(&raster),
                    })
                    .await?;

                let metadata = self.metadata(sweep.last_bracket.as_ref());
                self.session
                    .send(Reply::Metadata {
                        yaml: metadata.to_yaml()?,
                    })
                    .await
            }

            Instruction::SetFocus { lens_position } => {
                self.camera.set_focus(lens_position).await?;
                self.session.send(Reply::ack()).await
            }
            Instruction::LockFocus => {
                let lens_position = self.camera.lock_focus().await?;
                debug!("focus locked at {lens_position}");
                self.session.send(Reply::ack()).await
            }
            Instruction::AutoFocus => {
                self.camera.auto_focus().await?;
                self.session.send(Reply::ack()).await
            }
            Instruction::FocusPoint { x, y } => {
                self.camera.focus_point(x, y).await?;
                self.session.send(Reply::ack()).await
            }

            Instruction::SetExposure { duration_s, iso } => {
                self.camera.set_exposure(duration_s, iso).await?;
                self.session.send(Reply::ack()).await
            }
            Instruction::LockExposure => {
                self.camera.lock_exposure().await?;
                self.session.send(Reply::ack()).await
            }
            Instruction::AutoExposure => {
                self.camera.auto_exposure().await?;
                self.session.send(Reply::ack()).await
            }

            Instruction::LockWhiteBalance => {
                self.camera.lock_white_balance().await?;
                self.session
                    .send(Reply::Status(StatusUpdate::LockedWhiteBalance))
                    .await
            }

            Instruction::SetTorch { mode } => {
                self.camera.set_torch(mode).await?;
                self.session.send(Reply::ack()).await
            }

            Instruction::EndSession => {
                self.sweep = None;
                self.session.send(Reply::ack()).await
            }
        }
    }

    fn metadata(&self, bracket: Option<&ExposureBracket>) -> SweepMetadata {
        SweepMetadata {
            angle: self.angle_degrees,
            exposure_durations: bracket.map(|b| b.durations_s().to_vec()).unwrap_or_default(),
            exposure_isos: bracket.map(|b| b.isos().to_vec()).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SimulatedCamera;
    use mlight_core::{CodeSystem, SweepAxis};

    async fn service_pair() -> (Session, CaptureService<SimulatedCamera>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let dial = tokio::spawn(async move {
            Session::new(tokio::net::TcpStream::connect(addr).await.unwrap())
        });
        let (stream, _) = listener.accept().await.unwrap();
        let device = Session::new(stream);
        let controller = dial.await.unwrap();
        let camera = SimulatedCamera::new(8, 1);
        (controller, CaptureService::new(device, camera, None, 0.0))
    }

    #[tokio::test]
    async fn metadata_echoes_last_bracket() {
        let (_controller, mut svc) = service_pair().await;
        svc.angle_degrees = 17.5;
        let bracket = ExposureBracket::new(vec![0.01, 0.02], vec![100.0, 200.0]).unwrap();

        let meta = svc.metadata(Some(&bracket));
        assert_eq!(meta.angle, 17.5);
        assert_eq!(meta.exposure_durations, vec![0.01, 0.02]);
        assert_eq!(meta.exposure_isos, vec![100.0, 200.0]);

        let empty = svc.metadata(None);
        assert!(empty.exposure_durations.is_empty());
    }

    #[tokio::test]
    async fn pair_before_sweep_yields_error_reply() {
        let (controller, service) = service_pair().await;
        let run = tokio::spawn(service.run());

        controller
            .send(Instruction::FinishCapturePair {
                bit: 0,
                bracket: ExposureBracket::single(0.01, 100.0),
                resolution: Resolution::High,
            })
            .await
            .unwrap();
        let reply = controller.expect().recv_reply().await.unwrap();
        assert!(reply.is_error());

        controller.send(Instruction::EndSession).await.unwrap();
        let ack = controller.expect().recv_reply().await.unwrap();
        assert!(!ack.is_error());
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn minsw_sweep_without_table_errors_at_start() {
        let (controller, service) = service_pair().await;
        let run = tokio::spawn(service.run());

        controller
            .send(Instruction::StartSweep {
                axis: SweepAxis::Vertical,
                system: CodeSystem::MinStripeWidth,
                bit_count: 10,
                resolution: Resolution::High,
                orientation: mlight_core::DeviceOrientation::Upright,
            })
            .await
            .unwrap();

        // The failure surfaces as a buffered error reply.
        let reply = controller.expect().recv_reply().await.unwrap();
        assert!(reply.is_error());

        controller.send(Instruction::EndSession).await.unwrap();
        let _ = controller.expect().recv_reply().await.unwrap();
        run.await.unwrap().unwrap();
    }
}
