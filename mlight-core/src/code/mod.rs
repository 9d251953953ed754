//! Binary code engine: code tables, per-sweep bit accumulation, and
//! raster serialization.
//!
//! The engine runs on the capture device. Each sweep owns one
//! [`Decoder`]; threshold images are folded into it bit-plane by
//! bit-plane, and [`Decoder::finish`] turns the accumulated codes into
//! a floating-point correspondence [`Raster`].

pub mod decoder;
pub mod gray;
pub mod minsw;
pub mod pfm;
pub mod threshold;

pub use decoder::{Decoder, MAX_BIT_COUNT};
pub use minsw::MinStripeTable;
pub use threshold::{Threshold, ThresholdImage};

/// Sentinel for a pixel with no decodable correspondence.
///
/// Serialized as `+inf` in PFM output.
pub const NO_MATCH: f32 = f32::INFINITY;

// ── Raster ───────────────────────────────────────────────────────

/// A decoded correspondence map: one projector position (or
/// [`NO_MATCH`]) per pixel, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Raster {
    /// Build from row-major data. The vector length must be
    /// `width * height`.
    pub fn from_data(width: usize, height: usize, data: Vec<f32>) -> Result<Self, crate::MlightError> {
        if data.len() != width * height {
            return Err(crate::MlightError::DimensionMismatch {
                expected_w: width,
                expected_h: height,
                actual_w: data.len(),
                actual_h: 1,
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Value at (x, y); `None` outside bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x < self.width && y < self.height {
            Some(self.data[y * self.width + x])
        } else {
            None
        }
    }

    /// Pixels holding a real correspondence (not [`NO_MATCH`]).
    pub fn matched_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_finite()).count()
    }
}
