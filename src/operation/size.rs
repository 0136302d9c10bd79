use std::fmt;

use serde::{Deserialize, Serialize};

/// Pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of pixels.
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Integer pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering all of `size`.
    pub const fn full(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Intersect with `[0, bounds.width] x [0, bounds.height]`.
    pub fn clip_to(&self, bounds: Size) -> Rect {
        let x = self.x.min(bounds.width);
        let y = self.y.min(bounds.height);
        Rect {
            x,
            y,
            width: self.width.min(bounds.width - x),
            height: self.height.min(bounds.height - y),
        }
    }

    /// Map into a coordinate space `scale` times the size of this one.
    ///
    /// Non-empty rectangles stay at least one pixel wide and tall.
    pub fn scaled(&self, scale: f64) -> Rect {
        let apply = |v: u32| (v as f64 * scale).round() as u32;
        let keep = |orig: u32, v: u32| if orig > 0 { v.max(1) } else { v };
        Rect {
            x: apply(self.x),
            y: apply(self.y),
            width: keep(self.width, apply(self.width)),
            height: keep(self.height, apply(self.height)),
        }
    }
}
