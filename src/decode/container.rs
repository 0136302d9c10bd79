//! Containers: a source viewed as resolution levels and, optionally, tiles.

use async_trait::async_trait;
use image::DynamicImage;

use crate::error::DecodeError;
use crate::operation::Size;

/// Tile grid of one resolution level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_across: u32,
    pub tiles_down: u32,
}

impl TileLayout {
    /// Grid of `tile_width` x `tile_height` tiles covering `level`.
    pub fn covering(level: Size, tile_width: u32, tile_height: u32) -> Self {
        Self {
            tile_width,
            tile_height,
            tiles_across: level.width.div_ceil(tile_width),
            tiles_down: level.height.div_ceil(tile_height),
        }
    }
}

/// Decodable image with one or more resolution levels.
///
/// Level 0 is the full resolution; each following level is smaller.
/// Containers exposing a [`TileLayout`] for a level can decode tiles of it
/// independently; the others only decode whole levels.
#[async_trait]
pub trait ImageContainer: Send + Sync {
    fn level_count(&self) -> usize;

    fn level_size(&self, level: usize) -> Option<Size>;

    /// Tile grid of `level`, if tiles can be decoded on their own.
    fn tile_layout(&self, level: usize) -> Option<TileLayout>;

    /// Decode one tile. Edge tiles may be larger than the level's remainder.
    async fn decode_tile(
        &self,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<DynamicImage, DecodeError>;

    /// Decode a whole level.
    async fn decode_level(&self, level: usize) -> Result<DynamicImage, DecodeError>;

    /// Sizes of every level, largest first.
    fn level_sizes(&self) -> Vec<Size> {
        (0..self.level_count())
            .filter_map(|level| self.level_size(level))
            .collect()
    }

    /// Size of level 0.
    fn full_size(&self) -> Option<Size> {
        self.level_size(0)
    }
}
