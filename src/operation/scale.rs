use std::fmt;
use std::str::FromStr;

use super::decimal::{format_percent, parse_percent};
use super::{Operation, Size, FRACTION_EPSILON};
use crate::error::ImageError;

/// Resize applied to the cropped region.
///
/// Scaling only ever reduces: a target larger than the input leaves that
/// axis at the input size. Percent scales are limited to `(0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Scale {
    /// Keep the cropped size.
    #[default]
    Full,

    /// `w,` - exact width, height follows the aspect ratio.
    AspectFitWidth { width: u32 },

    /// `,h` - exact height, width follows the aspect ratio.
    AspectFitHeight { height: u32 },

    /// `!w,h` - largest size fitting inside the box, aspect ratio kept.
    AspectFitInside { width: u32, height: u32 },

    /// `w,h` - exact size, aspect ratio ignored.
    NonAspectFill { width: u32, height: u32 },

    /// `pct:n` - both dimensions multiplied by a fraction.
    Percent(f64),
}

fn positive(name: &str, value: u32) -> Result<u32, ImageError> {
    if value == 0 {
        return Err(ImageError::InvalidParameter(format!(
            "size {} must be positive",
            name
        )));
    }
    Ok(value)
}

impl Scale {
    pub fn fit_width(width: u32) -> Result<Self, ImageError> {
        Ok(Scale::AspectFitWidth {
            width: positive("width", width)?,
        })
    }

    pub fn fit_height(height: u32) -> Result<Self, ImageError> {
        Ok(Scale::AspectFitHeight {
            height: positive("height", height)?,
        })
    }

    pub fn fit_inside(width: u32, height: u32) -> Result<Self, ImageError> {
        Ok(Scale::AspectFitInside {
            width: positive("width", width)?,
            height: positive("height", height)?,
        })
    }

    pub fn fill(width: u32, height: u32) -> Result<Self, ImageError> {
        Ok(Scale::NonAspectFill {
            width: positive("width", width)?,
            height: positive("height", height)?,
        })
    }

    /// Percent scale, `fraction` in `(0, 1]`.
    pub fn percent(fraction: f64) -> Result<Self, ImageError> {
        if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
            return Err(ImageError::InvalidParameter(format!(
                "size percent must be greater than 0 and at most 100, got {}",
                fraction * 100.0
            )));
        }
        Ok(Scale::Percent(fraction))
    }

    /// Whether the requested dimensions are larger than `input` on any axis.
    ///
    /// Such requests need the `sizeAboveFull` feature even though the
    /// result is clamped to `input`.
    pub fn exceeds(&self, input: Size) -> bool {
        match *self {
            Scale::Full | Scale::Percent(_) => false,
            Scale::AspectFitWidth { width } => width > input.width,
            Scale::AspectFitHeight { height } => height > input.height,
            Scale::AspectFitInside { width, height } | Scale::NonAspectFill { width, height } => {
                width > input.width || height > input.height
            }
        }
    }
}

fn scaled(value: u32, ratio: f64) -> u32 {
    ((value as f64 * ratio).round() as u32).max(1)
}

impl Operation for Scale {
    fn resulting_size(&self, input: Size) -> Size {
        if input.is_empty() {
            return input;
        }
        let w = input.width as f64;
        let h = input.height as f64;

        match *self {
            Scale::Full => input,
            Scale::AspectFitWidth { width } if width < input.width => {
                Size::new(width, scaled(input.height, width as f64 / w))
            }
            Scale::AspectFitHeight { height } if height < input.height => {
                Size::new(scaled(input.width, height as f64 / h), height)
            }
            Scale::AspectFitInside { width, height } => {
                let ratio = (width as f64 / w).min(height as f64 / h);
                if ratio >= 1.0 {
                    return input;
                }
                Size::new(scaled(input.width, ratio), scaled(input.height, ratio))
            }
            Scale::NonAspectFill { width, height } => {
                Size::new(width.min(input.width), height.min(input.height))
            }
            Scale::AspectFitWidth { .. } | Scale::AspectFitHeight { .. } => input,
            Scale::Percent(pct) => Size::new(scaled(input.width, pct), scaled(input.height, pct)),
        }
    }

    fn is_no_op(&self) -> bool {
        match *self {
            Scale::Full => true,
            Scale::Percent(pct) => (pct - 1.0).abs() < FRACTION_EPSILON,
            _ => false,
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Scale::Full => f.write_str("full"),
            Scale::AspectFitWidth { width } => write!(f, "{},", width),
            Scale::AspectFitHeight { height } => write!(f, ",{}", height),
            Scale::AspectFitInside { width, height } => write!(f, "!{},{}", width, height),
            Scale::NonAspectFill { width, height } => write!(f, "{},{}", width, height),
            Scale::Percent(pct) => write!(f, "pct:{}", format_percent(pct)),
        }
    }
}

impl FromStr for Scale {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ImageError::InvalidParameter(format!("invalid size: {}", s));

        if s == "full" {
            return Ok(Scale::Full);
        }
        if let Some(pct) = s.strip_prefix("pct:") {
            return Scale::percent(parse_percent(pct).ok_or_else(invalid)?);
        }

        let (inside, dims) = match s.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (w, h) = dims.split_once(',').ok_or_else(invalid)?;
        let number = |v: &str| v.parse::<u32>().map_err(|_| invalid());

        match (w.is_empty(), h.is_empty(), inside) {
            (false, false, true) => Scale::fit_inside(number(w)?, number(h)?),
            (false, false, false) => Scale::fill(number(w)?, number(h)?),
            (false, true, false) => Scale::fit_width(number(w)?),
            (true, false, false) => Scale::fit_height(number(h)?),
            _ => Err(invalid()),
        }
    }
}
