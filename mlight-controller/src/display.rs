//! Pattern display driver.
//!
//! Actual on-screen pattern rendering is out of scope here; the
//! projector output window is a separate process. This driver records
//! and logs what would be shown so the sequencer's display calls are
//! observable.

use tracing::info;

use mlight_core::{CodeSystem, PatternDisplay, SolidColor, SweepAxis};

/// What the display was last asked to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shown {
    Nothing,
    CodeBit { bit: u32 },
    Solid(SolidColor),
    Checkerboard { square_px: u32 },
}

/// Logging display driver.
#[derive(Debug)]
pub struct LoggingDisplay {
    axis: SweepAxis,
    inverted: bool,
    shown: Shown,
}

impl Default for LoggingDisplay {
    fn default() -> Self {
        Self {
            axis: SweepAxis::Vertical,
            inverted: false,
            shown: Shown::Nothing,
        }
    }
}

impl LoggingDisplay {
    pub fn shown(&self) -> Shown {
        self.shown
    }
}

impl PatternDisplay for LoggingDisplay {
    fn configure(&mut self, axis: SweepAxis, inverted: bool) {
        self.axis = axis;
        self.inverted = inverted;
    }

    fn show_code_bit(&mut self, bit: u32, system: CodeSystem) {
        info!(
            "display: {} bit {bit} axis {} inverted {}",
            system, self.axis, self.inverted
        );
        self.shown = Shown::CodeBit { bit };
    }

    fn show_solid(&mut self, color: SolidColor) {
        info!("display: solid {color:?}");
        self.shown = Shown::Solid(color);
    }

    fn show_checkerboard(&mut self, square_px: u32) {
        info!("display: checkerboard {square_px}px");
        self.shown = Shown::Checkerboard { square_px };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_last_pattern() {
        let mut d = LoggingDisplay::default();
        assert_eq!(d.shown(), Shown::Nothing);
        d.configure(SweepAxis::Horizontal, true);
        d.show_code_bit(5, CodeSystem::GrayCode);
        assert_eq!(d.shown(), Shown::CodeBit { bit: 5 });
        d.show_solid(SolidColor::White);
        assert_eq!(d.shown(), Shown::Solid(SolidColor::White));
    }
}
