//! Capture-hardware boundary.
//!
//! [`Camera`] is the only surface the service touches; everything the
//! real sensor stack would do (focus motors, exposure, the per-pair
//! difference-and-threshold filters) sits behind it.
//! [`SimulatedCamera`] implements it against a synthetic planar scene
//! so the full capture loop runs end-to-end without hardware.

use std::sync::Arc;

use async_trait::async_trait;

use mlight_core::code::gray;
use mlight_core::{
    CodeSystem, ExposureBracket, MinStripeTable, MlightError, Resolution, SweepAxis, Threshold,
    ThresholdImage, TorchMode,
};

/// Sweep parameters the camera needs while pair instructions are in
/// flight.
#[derive(Debug, Clone, Copy)]
pub struct SweepContext {
    pub axis: SweepAxis,
    pub system: CodeSystem,
    pub resolution: Resolution,
}

/// Async capture-hardware interface.
#[async_trait]
pub trait Camera: Send {
    /// Sensor dimensions for a resolution preset.
    fn sensor_size(&self, resolution: Resolution) -> (usize, usize);

    async fn set_focus(&mut self, lens_position: f32) -> Result<(), MlightError>;
    /// Freeze the lens; returns the locked position.
    async fn lock_focus(&mut self) -> Result<f32, MlightError>;
    async fn auto_focus(&mut self) -> Result<(), MlightError>;
    /// Focus on a normalized point of interest.
    async fn focus_point(&mut self, x: f32, y: f32) -> Result<(), MlightError>;

    async fn set_exposure(&mut self, duration_s: f64, iso: f32) -> Result<(), MlightError>;
    async fn lock_exposure(&mut self) -> Result<(), MlightError>;
    async fn auto_exposure(&mut self) -> Result<(), MlightError>;

    async fn lock_white_balance(&mut self) -> Result<(), MlightError>;

    async fn set_torch(&mut self, mode: TorchMode) -> Result<(), MlightError>;

    /// One still frame, encoded for transport.
    async fn capture_still(&mut self, resolution: Resolution) -> Result<Vec<u8>, MlightError>;

    /// Photograph the normal pattern of a code pair and hold it for
    /// differencing.
    async fn capture_pair_normal(
        &mut self,
        ctx: &SweepContext,
        bit: u32,
        bracket: &ExposureBracket,
    ) -> Result<(), MlightError>;

    /// Photograph the inverted pattern, difference it against the held
    /// normal photo, and threshold the result into three levels.
    async fn capture_pair_inverted(
        &mut self,
        ctx: &SweepContext,
        bit: u32,
        bracket: &ExposureBracket,
    ) -> Result<ThresholdImage, MlightError>;
}

// ── SimulatedCamera ──────────────────────────────────────────────

/// Camera aimed at a synthetic planar scene.
///
/// Sensor pixel `(x, y)` sees projector column `x` and row `y`
/// directly, so the ground-truth correspondence for a vertical sweep
/// is `x` and for a horizontal sweep `y`. Thresholding is perfect
/// except for pixels explicitly marked shadowed.
pub struct SimulatedCamera {
    width: usize,
    height: usize,
    lens_position: f32,
    exposure: (f64, f32),
    torch: TorchMode,
    table: Option<Arc<MinStripeTable>>,
    /// Pixels reported ambiguous on every bit-plane (shadowed).
    shadowed: Vec<(usize, usize)>,
    /// Simulated sensor fault: the inverted capture of this bit fails.
    fail_inverted_at: Option<u32>,
    /// Bit whose normal photo is currently held.
    held_normal: Option<u32>,
}

impl SimulatedCamera {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            lens_position: 0.5,
            exposure: (1.0 / 60.0, 100.0),
            torch: TorchMode::Off,
            table: None,
            shadowed: Vec::new(),
            fail_inverted_at: None,
            held_normal: None,
        }
    }

    /// Supply the min-stripe-width bijection for minSW sweeps.
    pub fn with_table(mut self, table: Arc<MinStripeTable>) -> Self {
        self.table = Some(table);
        self
    }

    /// Mark a pixel as shadowed (always ambiguous).
    pub fn shadow(mut self, x: usize, y: usize) -> Self {
        self.shadowed.push((x, y));
        self
    }

    /// Inject a sensor fault at the inverted capture of `bit`.
    pub fn fail_inverted_at(mut self, bit: u32) -> Self {
        self.fail_inverted_at = Some(bit);
        self
    }

    pub fn lens_position(&self) -> f32 {
        self.lens_position
    }

    pub fn exposure(&self) -> (f64, f32) {
        self.exposure
    }

    pub fn torch(&self) -> TorchMode {
        self.torch
    }

    /// Whether `bit` is lit at projector position `pos` under the
    /// sweep's code system.
    fn pattern_bit(&self, ctx: &SweepContext, pos: u32, bit: u32) -> Result<bool, MlightError> {
        match ctx.system {
            CodeSystem::GrayCode => Ok(gray::bit_of(pos, bit)),
            CodeSystem::MinStripeWidth => {
                let table = self.table.as_ref().ok_or(MlightError::DecodeTableMissing)?;
                Ok(table.bit_of(pos, bit))
            }
        }
    }
}

#[async_trait]
impl Camera for SimulatedCamera {
    fn sensor_size(&self, _resolution: Resolution) -> (usize, usize) {
        (self.width, self.height)
    }

    async fn set_focus(&mut self, lens_position: f32) -> Result<(), MlightError> {
        self.lens_position = lens_position.clamp(0.0, 1.0);
        Ok(())
    }

    async fn lock_focus(&mut self) -> Result<f32, MlightError> {
        Ok(self.lens_position)
    }

    async fn auto_focus(&mut self) -> Result<(), MlightError> {
        self.lens_position = 0.5;
        Ok(())
    }

    async fn focus_point(&mut self, _x: f32, _y: f32) -> Result<(), MlightError> {
        Ok(())
    }

    async fn set_exposure(&mut self, duration_s: f64, iso: f32) -> Result<(), MlightError> {
        self.exposure = (duration_s, iso);
        Ok(())
    }

    async fn lock_exposure(&mut self) -> Result<(), MlightError> {
        Ok(())
    }

    async fn auto_exposure(&mut self) -> Result<(), MlightError> {
        Ok(())
    }

    async fn lock_white_balance(&mut self) -> Result<(), MlightError> {
        Ok(())
    }

    async fn set_torch(&mut self, mode: TorchMode) -> Result<(), MlightError> {
        self.torch = mode;
        Ok(())
    }

    async fn capture_still(&mut self, resolution: Resolution) -> Result<Vec<u8>, MlightError> {
        let (w, h) = self.sensor_size(resolution);
        // Flat mid-gray frame, one byte per pixel.
        Ok(vec![128u8; w * h])
    }

    async fn capture_pair_normal(
        &mut self,
        _ctx: &SweepContext,
        bit: u32,
        _bracket: &ExposureBracket,
    ) -> Result<(), MlightError> {
        self.held_normal = Some(bit);
        Ok(())
    }

    async fn capture_pair_inverted(
        &mut self,
        ctx: &SweepContext,
        bit: u32,
        _bracket: &ExposureBracket,
    ) -> Result<ThresholdImage, MlightError> {
        if self.held_normal.take() != Some(bit) {
            return Err(MlightError::Other(format!(
                "no held normal photo for bit {bit}"
            )));
        }
        if self.fail_inverted_at == Some(bit) {
            return Err(MlightError::Other(format!(
                "sensor readout failed at bit {bit}"
            )));
        }

        let mut image = ThresholdImage::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let pos = match ctx.axis {
                    SweepAxis::Vertical => x as u32,
                    SweepAxis::Horizontal => y as u32,
                };
                let level = if self.shadowed.contains(&(x, y)) {
                    Threshold::Ambiguous
                } else if self.pattern_bit(ctx, pos, bit)? {
                    Threshold::White
                } else {
                    Threshold::Black
                };
                image.set(x, y, level);
            }
        }
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(axis: SweepAxis) -> SweepContext {
        SweepContext {
            axis,
            system: CodeSystem::GrayCode,
            resolution: Resolution::High,
        }
    }

    #[tokio::test]
    async fn vertical_pattern_follows_column_code() {
        let mut cam = SimulatedCamera::new(8, 2);
        let bracket = ExposureBracket::single(0.01, 100.0);
        cam.capture_pair_normal(&ctx(SweepAxis::Vertical), 1, &bracket)
            .await
            .unwrap();
        let img = cam
            .capture_pair_inverted(&ctx(SweepAxis::Vertical), 1, &bracket)
            .await
            .unwrap();
        for x in 0..8 {
            let want = if gray::bit_of(x as u32, 1) {
                Threshold::White
            } else {
                Threshold::Black
            };
            assert_eq!(img.get(x, 0), Some(want));
            assert_eq!(img.get(x, 1), Some(want));
        }
    }

    #[tokio::test]
    async fn inverted_without_normal_is_rejected() {
        let mut cam = SimulatedCamera::new(4, 1);
        let bracket = ExposureBracket::single(0.01, 100.0);
        let err = cam
            .capture_pair_inverted(&ctx(SweepAxis::Vertical), 0, &bracket)
            .await
            .unwrap_err();
        assert!(matches!(err, MlightError::Other(_)));
    }

    #[tokio::test]
    async fn shadowed_pixels_are_ambiguous() {
        let mut cam = SimulatedCamera::new(4, 1).shadow(2, 0);
        let bracket = ExposureBracket::single(0.01, 100.0);
        cam.capture_pair_normal(&ctx(SweepAxis::Vertical), 0, &bracket)
            .await
            .unwrap();
        let img = cam
            .capture_pair_inverted(&ctx(SweepAxis::Vertical), 0, &bracket)
            .await
            .unwrap();
        assert_eq!(img.get(2, 0), Some(Threshold::Ambiguous));
    }

    #[tokio::test]
    async fn minsw_without_table_fails() {
        let mut cam = SimulatedCamera::new(4, 1);
        let bracket = ExposureBracket::single(0.01, 100.0);
        let ctx = SweepContext {
            axis: SweepAxis::Vertical,
            system: CodeSystem::MinStripeWidth,
            resolution: Resolution::High,
        };
        cam.capture_pair_normal(&ctx, 0, &bracket).await.unwrap();
        let err = cam
            .capture_pair_inverted(&ctx, 0, &bracket)
            .await
            .unwrap_err();
        assert!(matches!(err, MlightError::DecodeTableMissing));
    }
}
