use std::fmt;
use std::str::FromStr;

use super::decimal::{format_percent, parse_percent};
use super::{Operation, Rect, Size, FRACTION_EPSILON};
use crate::error::ImageError;

/// Crop applied before every other operation.
///
/// Fraction regions are resolved against the full source size by rounding
/// each component, then clipped to the source bounds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Region {
    /// The whole image.
    #[default]
    Full,

    /// Absolute pixel rectangle.
    Pixels {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    /// Rectangle relative to the full size, every component in `0..=1`.
    Fraction {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
}

impl Region {
    /// Pixel region. Width and height must be positive.
    pub fn pixels(x: u32, y: u32, width: u32, height: u32) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::InvalidParameter(format!(
                "region width and height must be positive, got {}x{}",
                width, height
            )));
        }
        Ok(Region::Pixels {
            x,
            y,
            width,
            height,
        })
    }

    /// Fraction region. Origin must lie in `[0, 1]`, extent in `(0, 1]`.
    pub fn fraction(x: f64, y: f64, width: f64, height: f64) -> Result<Self, ImageError> {
        for (name, value) in [("x", x), ("y", y)] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ImageError::InvalidParameter(format!(
                    "region {} must be between 0 and 100 percent",
                    name
                )));
            }
        }
        for (name, value) in [("width", width), ("height", height)] {
            if !value.is_finite() || value <= 0.0 || value > 1.0 {
                return Err(ImageError::InvalidParameter(format!(
                    "region {} must be greater than 0 and at most 100 percent",
                    name
                )));
            }
        }
        Ok(Region::Fraction {
            x,
            y,
            width,
            height,
        })
    }

    /// Pixel rectangle within `full`, clipped to its bounds. May be empty.
    pub fn rectangle(&self, full: Size) -> Rect {
        let rect = match *self {
            Region::Full => return Rect::full(full),
            Region::Pixels {
                x,
                y,
                width,
                height,
            } => Rect::new(x, y, width, height),
            Region::Fraction {
                x,
                y,
                width,
                height,
            } => {
                let w = full.width as f64;
                let h = full.height as f64;
                Rect::new(
                    (x * w).round() as u32,
                    (y * h).round() as u32,
                    (width * w).round() as u32,
                    (height * h).round() as u32,
                )
            }
        };
        rect.clip_to(full)
    }

    /// Like [`Region::rectangle`], but rejects a rectangle with no pixels.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` when nothing remains after clipping.
    pub fn resolve(&self, full: Size) -> Result<Rect, ImageError> {
        let rect = self.rectangle(full);
        if rect.is_empty() {
            return Err(ImageError::InvalidParameter(format!(
                "region {} lies outside the {} source",
                self, full
            )));
        }
        Ok(rect)
    }
}

impl Operation for Region {
    fn resulting_size(&self, input: Size) -> Size {
        self.rectangle(input).size()
    }

    /// Origin is deliberately not inspected for fraction regions.
    fn is_no_op(&self) -> bool {
        match *self {
            Region::Full => true,
            Region::Pixels { .. } => false,
            Region::Fraction { width, height, .. } => {
                (width - 1.0).abs() < FRACTION_EPSILON && (height - 1.0).abs() < FRACTION_EPSILON
            }
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Region::Full => f.write_str("full"),
            Region::Pixels {
                x,
                y,
                width,
                height,
            } => write!(f, "{},{},{},{}", x, y, width, height),
            Region::Fraction {
                x,
                y,
                width,
                height,
            } => write!(
                f,
                "pct:{},{},{},{}",
                format_percent(x),
                format_percent(y),
                format_percent(width),
                format_percent(height)
            ),
        }
    }
}

impl FromStr for Region {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "full" {
            return Ok(Region::Full);
        }
        let invalid = || ImageError::InvalidParameter(format!("invalid region: {}", s));

        if let Some(rest) = s.strip_prefix("pct:") {
            let values = rest
                .split(',')
                .map(parse_percent)
                .collect::<Option<Vec<f64>>>()
                .ok_or_else(invalid)?;
            return match values.as_slice() {
                [x, y, w, h] => Region::fraction(*x, *y, *w, *h),
                _ => Err(invalid()),
            };
        }

        let values = s
            .split(',')
            .map(|v| v.parse::<u32>().ok())
            .collect::<Option<Vec<u32>>>()
            .ok_or_else(invalid)?;
        match values.as_slice() {
            [x, y, w, h] => Region::pixels(*x, *y, *w, *h),
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!("full".parse::<Region>().unwrap(), Region::Full);
        assert_eq!(
            "10,20,30,40".parse::<Region>().unwrap(),
            Region::Pixels {
                x: 10,
                y: 20,
                width: 30,
                height: 40
            }
        );
        assert_eq!(
            "pct:20,20,50,50".parse::<Region>().unwrap(),
            Region::Fraction {
                x: 0.2,
                y: 0.2,
                width: 0.5,
                height: 0.5
            }
        );
    }

    #[test]
    fn test_parse_rejects_invalid() {
        for bad in [
            "", "square", "1,2,3", "1,2,3,4,5", "-1,0,10,10", "0,0,0,10", "0,0,10,0",
            "pct:0,0,0,50", "pct:0,0,101,50", "pct:101,0,50,50", "pct:a,b,c,d", "1.5,0,10,10",
        ] {
            assert!(bad.parse::<Region>().is_err(), "{:?} should not parse", bad);
        }
    }

    #[test]
    fn test_fraction_rectangle_is_rounded_and_clipped() {
        let region = Region::fraction(0.2, 0.2, 0.5, 0.5).unwrap();
        assert_eq!(
            region.rectangle(Size::new(594, 522)),
            Rect::new(119, 104, 297, 261)
        );

        let region = Region::fraction(0.8, 0.9, 0.5, 0.5).unwrap();
        let rect = region.rectangle(Size::new(100, 100));
        assert_eq!(rect, Rect::new(80, 90, 20, 10));
    }

    #[test]
    fn test_fraction_rectangle_stays_in_bounds() {
        let full = Size::new(333, 127);
        let steps = [0.0, 0.01, 0.25, 0.5, 0.999, 1.0];
        for &x in &steps {
            for &y in &steps {
                for &w in &steps[1..] {
                    for &h in &steps[1..] {
                        let rect = Region::fraction(x, y, w, h).unwrap().rectangle(full);
                        assert!(rect.x as u64 + rect.width as u64 <= full.width as u64);
                        assert!(rect.y as u64 + rect.height as u64 <= full.height as u64);
                    }
                }
            }
        }
    }

    #[test]
    fn test_pixel_rectangle_clipped() {
        let region = Region::pixels(90, 90, 50, 50).unwrap();
        assert_eq!(
            region.rectangle(Size::new(100, 120)),
            Rect::new(90, 90, 10, 30)
        );
    }

    #[test]
    fn test_resolve_rejects_empty() {
        let region = Region::pixels(200, 0, 50, 50).unwrap();
        assert!(matches!(
            region.resolve(Size::new(100, 100)),
            Err(ImageError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_is_no_op() {
        assert!(Region::Full.is_no_op());
        assert!(Region::fraction(0.0, 0.0, 1.0, 1.0).unwrap().is_no_op());
        assert!(Region::fraction(0.0, 0.0, 0.9999995, 1.0).unwrap().is_no_op());
        assert!(!Region::fraction(0.0, 0.0, 0.5, 1.0).unwrap().is_no_op());
        assert!(!Region::pixels(0, 0, 100, 100).unwrap().is_no_op());
    }

    #[test]
    fn test_display_round_trip() {
        for text in ["full", "0,0,256,256", "pct:20,20,50,50", "pct:12.5,0,87.5,100"] {
            let region: Region = text.parse().unwrap();
            assert_eq!(region.to_string(), text);
            assert_eq!(region.to_string().parse::<Region>().unwrap(), region);
        }
    }
}
