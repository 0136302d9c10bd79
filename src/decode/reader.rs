//! Tile-aware decoding.
//!
//! # Flow
//!
//! ```text
//! Region + Scale
//!      │
//!      ▼
//! crop rect (full coords) ──► select_level ──► crop rect (level coords)
//!                                                   │
//!                         tile layout? ─── no ──► decode whole level
//!                              │ yes                (crop still pending)
//!                              ▼
//!                first tile inline (picks RGB / RGBA)
//!                              │
//!                              ▼
//!           remaining tiles on a bounded JoinSet, one timeout
//!                              │
//!                              ▼
//!                  cropped raster (already_cropped)
//! ```
//!
//! Tile tasks return their decoded pixels and the joining task copies them
//! into the raster. Tiles cover disjoint areas, so completion order does not
//! matter. The first failure or the timeout aborts every remaining task.

use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use super::container::{ImageContainer, TileLayout};
use super::level::{select_level, LevelSelection, ReductionFactor};
use super::tiles::{Canvas, TileRange};
use crate::error::DecodeError;
use crate::operation::{Operation, Rect, Region, Scale, Size};

/// Default wall-clock limit for decoding the tiles of one request.
pub const DEFAULT_DECODE_TIMEOUT: Duration = Duration::from_secs(300);

/// Hints returned alongside a decoded raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReaderHints {
    /// The raster already covers only the requested region.
    pub already_cropped: bool,
}

/// Output of [`TileAwareDecoder::decode`].
#[derive(Debug, Clone)]
pub struct DecodedRaster {
    pub image: DynamicImage,
    /// Level the pixels came from.
    pub level: usize,
    pub reduction: ReductionFactor,
    pub hints: ReaderHints,
}

/// Decodes the smallest raster that satisfies a region and scale.
#[derive(Debug, Clone)]
pub struct TileAwareDecoder {
    workers: usize,
    timeout: Duration,
}

impl Default for TileAwareDecoder {
    fn default() -> Self {
        Self::new(0, DEFAULT_DECODE_TIMEOUT)
    }
}

impl TileAwareDecoder {
    /// `workers` of 0 uses the available hardware parallelism.
    pub fn new(workers: usize, timeout: Duration) -> Self {
        let workers = if workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            workers
        };
        Self { workers, timeout }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Decode `region` of `container` at the smallest level usable for `scale`.
    ///
    /// # Errors
    ///
    /// `DecodeError::EmptyRegion` when the clipped region has no pixels,
    /// `DecodeError::Timeout` when tile decoding exceeds the timeout, and
    /// the first tile failure otherwise.
    pub async fn decode(
        &self,
        container: Arc<dyn ImageContainer>,
        region: &Region,
        scale: &Scale,
    ) -> Result<DecodedRaster, DecodeError> {
        let full = container
            .full_size()
            .ok_or(DecodeError::LevelOutOfRange(0))?;
        let crop = region.rectangle(full);
        if crop.is_empty() {
            return Err(DecodeError::EmptyRegion {
                width: full.width,
                height: full.height,
            });
        }

        let selection = if scale.is_no_op() {
            LevelSelection::FULL
        } else {
            select_level(&container.level_sizes(), crop, scale)
        };
        let level = selection.level;
        let level_size = container
            .level_size(level)
            .ok_or(DecodeError::LevelOutOfRange(level))?;
        debug!(
            level,
            level_size = %level_size,
            reduction = selection.reduction.scale,
            "selected resolution level"
        );

        let Some(layout) = container.tile_layout(level) else {
            let image = container.decode_level(level).await?;
            return Ok(DecodedRaster {
                image,
                level,
                reduction: selection.reduction,
                hints: ReaderHints::default(),
            });
        };

        let scaled = crop.scaled(selection.reduction.scale).clip_to(level_size);
        if scaled.is_empty() {
            return Err(DecodeError::EmptyRegion {
                width: level_size.width,
                height: level_size.height,
            });
        }

        let image = self
            .read_tiles(container, level, &layout, scaled, level_size)
            .await?;
        Ok(DecodedRaster {
            image,
            level,
            reduction: selection.reduction,
            hints: ReaderHints {
                already_cropped: true,
            },
        })
    }

    /// Decode the tiles covering `rect` and assemble them into one raster.
    async fn read_tiles(
        &self,
        container: Arc<dyn ImageContainer>,
        level: usize,
        layout: &TileLayout,
        rect: Rect,
        level_size: Size,
    ) -> Result<DynamicImage, DecodeError> {
        let range = TileRange::covering(rect, layout);
        debug!(
            level,
            tiles = range.tile_count(),
            x = ?(range.tile_x1, range.tile_x2),
            y = ?(range.tile_y1, range.tile_y2),
            "reading tiles"
        );

        let width = rect.width.min(level_size.width - rect.x);
        let height = rect.height.min(level_size.height - rect.y);
        let origin = |tile_x: u32, tile_y: u32| {
            (
                tile_x as i64 * layout.tile_width as i64 - rect.x as i64,
                tile_y as i64 * layout.tile_height as i64 - rect.y as i64,
            )
        };

        let first = container
            .decode_tile(level, range.tile_x1, range.tile_y1)
            .await?;
        let mut canvas = Canvas::for_tile(&first, width, height);
        let (x, y) = origin(range.tile_x1, range.tile_y1);
        canvas.place(&first, x, y);
        drop(first);

        let remaining: Vec<(u32, u32)> = range.tiles().skip(1).collect();
        if remaining.is_empty() {
            return Ok(canvas.into_image());
        }

        let fill = async {
            if self.workers <= 1 {
                for (tile_x, tile_y) in remaining {
                    let tile = container.decode_tile(level, tile_x, tile_y).await?;
                    let (x, y) = origin(tile_x, tile_y);
                    canvas.place(&tile, x, y);
                }
                return Ok(());
            }

            let permits = Arc::new(Semaphore::new(self.workers));
            let mut tasks = JoinSet::new();
            for (tile_x, tile_y) in remaining {
                let container = Arc::clone(&container);
                let permits = Arc::clone(&permits);
                tasks.spawn(async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|e| DecodeError::TileTask(e.to_string()))?;
                    let tile = container.decode_tile(level, tile_x, tile_y).await?;
                    Ok::<_, DecodeError>((tile_x, tile_y, tile))
                });
            }

            while let Some(joined) = tasks.join_next().await {
                let (tile_x, tile_y, tile) =
                    joined.map_err(|e| DecodeError::TileTask(e.to_string()))??;
                let (x, y) = origin(tile_x, tile_y);
                canvas.place(&tile, x, y);
            }
            Ok::<(), DecodeError>(())
        };

        match tokio::time::timeout(self.timeout, fill).await {
            Ok(result) => result?,
            Err(_) => return Err(DecodeError::Timeout(self.timeout)),
        }
        Ok(canvas.into_image())
    }
}
