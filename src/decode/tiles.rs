//! Tile-range arithmetic and raster assembly.
//!
//! ```text
//!   tile_x1             tile_x2
//!   ┌───────┬───────┬───────┐
//!   │  ┌────┼───────┼──┐    │ tile_y1
//!   ├──┼────┼───────┼──┼────┤
//!   │  └────┼───────┼──┘    │ tile_y2
//!   └───────┴───────┴───────┘
//!   ◄─►
//!   offset_x: rect.x - tile_x1 * tile_width
//! ```

use image::{imageops, DynamicImage, RgbImage, RgbaImage};

use super::container::TileLayout;
use crate::operation::Rect;

/// Inclusive range of tiles covering a rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub tile_x1: u32,
    pub tile_x2: u32,
    pub tile_y1: u32,
    pub tile_y2: u32,
    /// Position of the rectangle's origin inside the first tile.
    pub offset_x: u32,
    pub offset_y: u32,
}

impl TileRange {
    /// Tiles of `layout` that intersect `rect`, clipped to the grid.
    ///
    /// `rect` must be non-empty.
    pub fn covering(rect: Rect, layout: &TileLayout) -> Self {
        let (tw, th) = (layout.tile_width, layout.tile_height);
        let last_x = layout.tiles_across.saturating_sub(1);
        let last_y = layout.tiles_down.saturating_sub(1);

        let tile_x1 = (rect.x / tw).min(last_x);
        let tile_y1 = (rect.y / th).min(last_y);
        let end_x = rect.x as u64 + rect.width as u64;
        let end_y = rect.y as u64 + rect.height as u64;
        let tile_x2 = ((end_x.div_ceil(tw as u64) as u32).saturating_sub(1)).min(last_x);
        let tile_y2 = ((end_y.div_ceil(th as u64) as u32).saturating_sub(1)).min(last_y);

        Self {
            tile_x1,
            tile_x2: tile_x2.max(tile_x1),
            tile_y1,
            tile_y2: tile_y2.max(tile_y1),
            offset_x: rect.x - tile_x1 * tw,
            offset_y: rect.y - tile_y1 * th,
        }
    }

    pub fn tile_count(&self) -> usize {
        (self.tile_x2 - self.tile_x1 + 1) as usize * (self.tile_y2 - self.tile_y1 + 1) as usize
    }

    /// Every tile in row-major order.
    pub fn tiles(&self) -> impl Iterator<Item = (u32, u32)> {
        let (x1, x2) = (self.tile_x1, self.tile_x2);
        (self.tile_y1..=self.tile_y2).flat_map(move |y| (x1..=x2).map(move |x| (x, y)))
    }
}

/// Output raster, RGB or RGBA depending on the first tile decoded.
pub(crate) enum Canvas {
    Rgb(RgbImage),
    Rgba(RgbaImage),
}

impl Canvas {
    /// Allocate a `width` x `height` raster able to hold `tile`'s pixels.
    pub(crate) fn for_tile(tile: &DynamicImage, width: u32, height: u32) -> Self {
        if tile.color().has_alpha() {
            Canvas::Rgba(RgbaImage::new(width, height))
        } else {
            Canvas::Rgb(RgbImage::new(width, height))
        }
    }

    /// Copy `tile` with its top-left corner at (`x`, `y`), clipping to the raster.
    pub(crate) fn place(&mut self, tile: &DynamicImage, x: i64, y: i64) {
        match self {
            Canvas::Rgb(raster) => match tile {
                DynamicImage::ImageRgb8(rgb) => imageops::replace(raster, rgb, x, y),
                other => imageops::replace(raster, &other.to_rgb8(), x, y),
            },
            Canvas::Rgba(raster) => match tile {
                DynamicImage::ImageRgba8(rgba) => imageops::replace(raster, rgba, x, y),
                other => imageops::replace(raster, &other.to_rgba8(), x, y),
            },
        }
    }

    pub(crate) fn into_image(self) -> DynamicImage {
        match self {
            Canvas::Rgb(raster) => DynamicImage::ImageRgb8(raster),
            Canvas::Rgba(raster) => DynamicImage::ImageRgba8(raster),
        }
    }
}
