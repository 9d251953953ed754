//! Per-sweep bit-plane accumulation and final decode.
//!
//! A [`Decoder`] is created when a sweep starts, fed one threshold
//! image per bit-plane, and consumed exactly once by
//! [`Decoder::finish`] when the sweep ends. It is owned exclusively by
//! its sweep; concurrent sweeps each get their own instance.

use std::sync::Arc;

use crate::code::{gray, MinStripeTable, Raster, ThresholdImage, NO_MATCH};
use crate::error::MlightError;
use crate::message::{CodeSystem, DeviceOrientation};

/// Widest code the `u32` bit planes can hold.
pub const MAX_BIT_COUNT: u32 = 32;

/// Accumulated decode state for one in-flight sweep.
#[derive(Debug)]
pub struct Decoder {
    system: CodeSystem,
    orientation: DeviceOrientation,
    width: usize,
    height: usize,
    /// Accumulated code bits per pixel.
    value: Vec<u32>,
    /// Bitmask of ambiguous bit-planes per pixel.
    unknown: Vec<u32>,
    table: Option<Arc<MinStripeTable>>,
}

impl Decoder {
    /// Allocate decode state for a sweep.
    ///
    /// Min-stripe-width sweeps fail here with
    /// [`MlightError::DecodeTableMissing`] if no conversion table is
    /// supplied — at sweep start, not partway through.
    pub fn new(
        width: usize,
        height: usize,
        system: CodeSystem,
        orientation: DeviceOrientation,
        table: Option<Arc<MinStripeTable>>,
    ) -> Result<Self, MlightError> {
        if system == CodeSystem::MinStripeWidth && table.is_none() {
            return Err(MlightError::DecodeTableMissing);
        }
        Ok(Self {
            system,
            orientation,
            width,
            height,
            value: vec![0; width * height],
            unknown: vec![0; width * height],
            table,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Accumulated code planes (for inspection/tests).
    pub fn value_planes(&self) -> &[u32] {
        &self.value
    }

    /// Ambiguity masks (for inspection/tests).
    pub fn unknown_masks(&self) -> &[u32] {
        &self.unknown
    }

    /// Fold one bit-plane's threshold image into the state.
    ///
    /// Order-independent across bit indices as long as each index is
    /// accumulated exactly once.
    pub fn accumulate_bit(
        &mut self,
        image: &ThresholdImage,
        bit: u32,
    ) -> Result<(), MlightError> {
        if image.width() != self.width || image.height() != self.height {
            return Err(MlightError::DimensionMismatch {
                expected_w: self.width,
                expected_h: self.height,
                actual_w: image.width(),
                actual_h: image.height(),
            });
        }
        if bit >= MAX_BIT_COUNT {
            return Err(MlightError::BitOutOfRange {
                bit,
                max: MAX_BIT_COUNT - 1,
            });
        }

        let mask = 1u32 << bit;
        for (i, pixel) in image.pixels().iter().enumerate() {
            match pixel {
                crate::code::Threshold::Black => {}
                crate::code::Threshold::White => self.value[i] |= mask,
                crate::code::Threshold::Ambiguous => self.unknown[i] |= mask,
            }
        }
        Ok(())
    }

    /// Consume the state and decode every pixel.
    ///
    /// A pixel with any ambiguous bit-plane, or a code outside the
    /// min-stripe-width table's domain, becomes [`NO_MATCH`]. The
    /// raster is rotated to match the device's physical orientation
    /// before serialization.
    pub fn finish(self) -> Raster {
        let len = self.width * self.height;
        let decode_pixel = |i: usize| -> f32 {
            if self.unknown[i] != 0 {
                return NO_MATCH;
            }
            let code = self.value[i];
            match self.system {
                CodeSystem::GrayCode => gray::decode(code) as f32,
                CodeSystem::MinStripeWidth => self
                    .table
                    .as_ref()
                    .and_then(|t| t.code_to_pos(code))
                    .map(|pos| pos as f32)
                    .unwrap_or(NO_MATCH),
            }
        };

        match self.orientation {
            DeviceOrientation::Upright => {
                let data = (0..len).map(decode_pixel).collect();
                Raster::from_data(self.width, self.height, data)
                    .expect("decoder arrays sized width*height")
            }
            DeviceOrientation::Portrait => {
                // Quarter-turn: sensor (x, y) lands at rotated index
                // len-1 - height*x - y; output dimensions swap.
                let mut data = vec![0.0f32; len];
                let last = len - 1;
                for i in 0..len {
                    let i_rot = last - self.height * (i % self.width) - i / self.width;
                    data[i_rot] = decode_pixel(i);
                }
                Raster::from_data(self.height, self.width, data)
                    .expect("decoder arrays sized width*height")
            }
        }
    }
}
