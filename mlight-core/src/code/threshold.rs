//! Three-level threshold images.
//!
//! The device's image filters classify every pixel of a
//! normal/inverted intensity-difference pair as black, white, or
//! ambiguous. The raw-byte values (0 / 255 / 128) are a convention of
//! the capture filters, not the protocol; only the three-way
//! discrimination matters to the decoder.

/// One pixel's classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    /// The inverted pattern was brighter: bit is 0.
    Black,
    /// The normal pattern was brighter: bit is 1.
    White,
    /// Difference below the confidence band: bit unknown.
    Ambiguous,
}

impl Threshold {
    pub const BLACK_RAW: u8 = 0;
    pub const AMBIGUOUS_RAW: u8 = 128;
    pub const WHITE_RAW: u8 = 255;

    /// Classify a raw filter byte; `None` for values the filters
    /// should never produce.
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            Self::BLACK_RAW => Some(Threshold::Black),
            Self::AMBIGUOUS_RAW => Some(Threshold::Ambiguous),
            Self::WHITE_RAW => Some(Threshold::White),
            _ => None,
        }
    }

    pub fn to_raw(self) -> u8 {
        match self {
            Threshold::Black => Self::BLACK_RAW,
            Threshold::Ambiguous => Self::AMBIGUOUS_RAW,
            Threshold::White => Self::WHITE_RAW,
        }
    }
}

/// A full-frame threshold classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdImage {
    width: usize,
    height: usize,
    pixels: Vec<Threshold>,
}

impl ThresholdImage {
    /// All-black image.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![Threshold::Black; width * height],
        }
    }

    /// Build by evaluating `f(x, y)` per pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> Threshold) -> Self {
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Classify a raw filter buffer (one byte per pixel, row-major).
    ///
    /// A byte outside the three-level convention is a logic error in
    /// the upstream filters: loud in debug builds, treated as black
    /// (bit untouched) in release.
    pub fn from_raw(width: usize, height: usize, raw: &[u8]) -> Result<Self, crate::MlightError> {
        if raw.len() != width * height {
            return Err(crate::MlightError::DimensionMismatch {
                expected_w: width,
                expected_h: height,
                actual_w: raw.len(),
                actual_h: 1,
            });
        }
        let pixels = raw
            .iter()
            .map(|&b| {
                Threshold::from_raw(b).unwrap_or_else(|| {
                    debug_assert!(false, "unexpected threshold byte {b}");
                    Threshold::Black
                })
            })
            .collect();
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[Threshold] {
        &self.pixels
    }

    pub fn get(&self, x: usize, y: usize) -> Option<Threshold> {
        if x < self.width && y < self.height {
            Some(self.pixels[y * self.width + x])
        } else {
            None
        }
    }

    pub fn set(&mut self, x: usize, y: usize, value: Threshold) {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = value;
        }
    }

    /// Raw one-byte-per-pixel form.
    pub fn to_raw(&self) -> Vec<u8> {
        self.pixels.iter().map(|p| p.to_raw()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_roundtrip() {
        let img = ThresholdImage::from_fn(3, 2, |x, y| match (x + y) % 3 {
            0 => Threshold::Black,
            1 => Threshold::White,
            _ => Threshold::Ambiguous,
        });
        let back = ThresholdImage::from_raw(3, 2, &img.to_raw()).unwrap();
        assert_eq!(back, img);
    }

    #[test]
    fn raw_length_checked() {
        assert!(ThresholdImage::from_raw(4, 4, &[0u8; 15]).is_err());
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn unknown_raw_byte_skipped_in_release() {
        let img = ThresholdImage::from_raw(2, 1, &[7, 255]).unwrap();
        assert_eq!(img.get(0, 0), Some(Threshold::Black));
        assert_eq!(img.get(1, 0), Some(Threshold::White));
    }

    #[test]
    fn get_out_of_bounds_is_none() {
        let img = ThresholdImage::new(2, 2);
        assert_eq!(img.get(2, 0), None);
        assert_eq!(img.get(0, 2), None);
    }
}
