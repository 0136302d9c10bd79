use std::fmt;
use std::str::FromStr;

use super::{Operation, Size};
use crate::error::ImageError;

/// Rotation in degrees clockwise, optionally preceded by a horizontal mirror.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rotation {
    degrees: f64,
    mirror: bool,
}

impl Rotation {
    /// # Errors
    ///
    /// Returns `InvalidParameter` unless `degrees` is in `[0, 360)`.
    pub fn new(degrees: f64, mirror: bool) -> Result<Self, ImageError> {
        if !degrees.is_finite() || !(0.0..360.0).contains(&degrees) {
            return Err(ImageError::InvalidParameter(format!(
                "rotation must be in [0, 360), got {}",
                degrees
            )));
        }
        // Normalise -0.0 so the canonical form never prints a sign.
        let degrees = if degrees == 0.0 { 0.0 } else { degrees };
        Ok(Self { degrees, mirror })
    }

    pub fn degrees(&self) -> f64 {
        self.degrees
    }

    pub fn mirror(&self) -> bool {
        self.mirror
    }

    /// Whether the angle is a multiple of 90.
    pub fn is_right_angle(&self) -> bool {
        self.degrees % 90.0 == 0.0
    }
}

impl Operation for Rotation {
    /// Bounding box of the rotated input.
    fn resulting_size(&self, input: Size) -> Size {
        if self.is_right_angle() {
            return if self.degrees == 90.0 || self.degrees == 270.0 {
                Size::new(input.height, input.width)
            } else {
                input
            };
        }
        let radians = self.degrees.to_radians();
        let (sin, cos) = (radians.sin().abs(), radians.cos().abs());
        let w = input.width as f64;
        let h = input.height as f64;
        Size::new(
            (w * cos + h * sin).round() as u32,
            (h * cos + w * sin).round() as u32,
        )
    }

    fn is_no_op(&self) -> bool {
        self.degrees == 0.0 && !self.mirror
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mirror {
            f.write_str("!")?;
        }
        write!(f, "{}", self.degrees)
    }
}

impl FromStr for Rotation {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mirror, value) = match s.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let well_formed = !value.is_empty()
            && value.bytes().all(|b| b.is_ascii_digit() || b == b'.');
        let degrees = value
            .parse::<f64>()
            .ok()
            .filter(|_| well_formed)
            .ok_or_else(|| ImageError::InvalidParameter(format!("invalid rotation: {}", s)))?;
        Rotation::new(degrees, mirror)
    }
}
