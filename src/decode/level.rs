//! Resolution level selection.
//!
//! A level is usable when its pixel density relative to the full image is
//! at least what the requested scale needs relative to the crop rectangle.
//! Levels are tried from the smallest up, so the most reduced usable level
//! wins; level 0 is the fallback.

use crate::operation::{Rect, Scale, Size};

/// How much smaller a level is than the full image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReductionFactor {
    /// `level width / full width`.
    pub scale: f64,
}

impl ReductionFactor {
    pub const NONE: ReductionFactor = ReductionFactor { scale: 1.0 };

    pub fn new(scale: f64) -> Self {
        Self { scale }
    }

    /// Nearest power-of-two exponent, so 0.25 gives 2.
    pub fn factor(&self) -> u32 {
        if self.scale <= 0.0 || self.scale >= 1.0 {
            return 0;
        }
        (-self.scale.log2()).round() as u32
    }
}

/// Level chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelSelection {
    pub level: usize,
    pub reduction: ReductionFactor,
}

impl LevelSelection {
    pub const FULL: LevelSelection = LevelSelection {
        level: 0,
        reduction: ReductionFactor::NONE,
    };
}

/// Whether a level with `level_scale` has enough pixels for `scale` of `crop`.
fn is_usable(level_scale: f64, scale: &Scale, crop: Rect, full: Size) -> bool {
    let crop_w = crop.width as f64;
    let crop_h = crop.height as f64;
    match *scale {
        Scale::Full => level_scale >= 1.0,
        Scale::AspectFitWidth { width } => width as f64 / crop_w <= level_scale,
        Scale::AspectFitHeight { height } => height as f64 / crop_h <= level_scale,
        Scale::AspectFitInside { width, height } | Scale::NonAspectFill { width, height } => {
            width as f64 / crop_w <= level_scale && height as f64 / crop_h <= level_scale
        }
        Scale::Percent(pct) => {
            pct * full.width as f64 / crop_w <= level_scale
                && pct * full.height as f64 / crop_h <= level_scale
        }
    }
}

/// Pick the smallest level that still satisfies `scale` for `crop`.
///
/// `levels` lists level sizes largest first; `crop` is in full-resolution
/// coordinates and must be non-empty.
pub fn select_level(levels: &[Size], crop: Rect, scale: &Scale) -> LevelSelection {
    let Some(full) = levels.first().copied() else {
        return LevelSelection::FULL;
    };
    if full.width == 0 || crop.is_empty() {
        return LevelSelection::FULL;
    }

    levels
        .iter()
        .enumerate()
        .rev()
        .map(|(level, size)| (level, size.width as f64 / full.width as f64))
        .find(|&(_, level_scale)| is_usable(level_scale, scale, crop, full))
        .map(|(level, level_scale)| LevelSelection {
            level,
            reduction: ReductionFactor::new(level_scale),
        })
        .unwrap_or(LevelSelection::FULL)
}
