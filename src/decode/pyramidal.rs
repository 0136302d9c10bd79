use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, RgbImage, RgbaImage};

use super::container::{ImageContainer, TileLayout};
use super::tiles::Canvas;
use crate::error::{DecodeError, TiffError};
use crate::io::RangeReader;
use crate::operation::Size;
use crate::tiff::{complete_jpeg, TileCompression, TiffLevel, TiffPyramid};

/// Tiled TIFF whose tiles are read on demand through a [`RangeReader`].
pub struct PyramidalTiff {
    reader: Arc<dyn RangeReader>,
    pyramid: TiffPyramid,
}

impl PyramidalTiff {
    /// Parse the directory chain. Fails for files the tile reader cannot address.
    pub async fn open(reader: Arc<dyn RangeReader>) -> Result<Self, TiffError> {
        let pyramid = TiffPyramid::open(reader.as_ref()).await?;
        Ok(Self { reader, pyramid })
    }

    pub fn pyramid(&self) -> &TiffPyramid {
        &self.pyramid
    }

    fn level(&self, level: usize) -> Result<&TiffLevel, DecodeError> {
        self.pyramid
            .level(level)
            .ok_or(DecodeError::LevelOutOfRange(level))
    }
}

/// Turn raw tile bytes into pixels.
fn decode_tile_bytes(
    data: &[u8],
    compression: TileCompression,
    jpeg_tables: Option<&Bytes>,
    tile_width: u32,
    tile_height: u32,
    samples_per_pixel: u16,
) -> Result<DynamicImage, DecodeError> {
    match compression {
        TileCompression::Jpeg => {
            let jpeg = complete_jpeg(jpeg_tables.map(|t| t.as_ref()), data);
            image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
                .map_err(|e| DecodeError::Codec(e.to_string()))
        }
        TileCompression::None => {
            let expected = tile_width as usize * tile_height as usize * samples_per_pixel as usize;
            if data.len() < expected {
                return Err(DecodeError::Codec(format!(
                    "uncompressed tile has {} bytes, expected {}",
                    data.len(),
                    expected
                )));
            }
            let pixels = data[..expected].to_vec();
            let short = || DecodeError::Codec("tile buffer size mismatch".to_string());
            let image = match samples_per_pixel {
                1 => DynamicImage::ImageLuma8(
                    GrayImage::from_raw(tile_width, tile_height, pixels).ok_or_else(short)?,
                ),
                2 => DynamicImage::ImageLumaA8(
                    GrayAlphaImage::from_raw(tile_width, tile_height, pixels).ok_or_else(short)?,
                ),
                3 => DynamicImage::ImageRgb8(
                    RgbImage::from_raw(tile_width, tile_height, pixels).ok_or_else(short)?,
                ),
                4 => DynamicImage::ImageRgba8(
                    RgbaImage::from_raw(tile_width, tile_height, pixels).ok_or_else(short)?,
                ),
                other => {
                    return Err(DecodeError::Codec(format!("{} samples per pixel", other)))
                }
            };
            Ok(image)
        }
    }
}

#[async_trait]
impl ImageContainer for PyramidalTiff {
    fn level_count(&self) -> usize {
        self.pyramid.level_count()
    }

    fn level_size(&self, level: usize) -> Option<Size> {
        self.pyramid
            .level(level)
            .map(|l| Size::new(l.width, l.height))
    }

    fn tile_layout(&self, level: usize) -> Option<TileLayout> {
        self.pyramid.level(level).map(|l| TileLayout {
            tile_width: l.tile_width,
            tile_height: l.tile_height,
            tiles_across: l.tiles_across(),
            tiles_down: l.tiles_down(),
        })
    }

    async fn decode_tile(
        &self,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<DynamicImage, DecodeError> {
        let info = self.level(level)?;
        let (offset, length) =
            info.tile_location(tile_x, tile_y)
                .ok_or(DecodeError::TileOutOfRange {
                    level,
                    tile_x,
                    tile_y,
                })?;
        let length = usize::try_from(length)
            .map_err(|_| DecodeError::Codec(format!("tile of {} bytes", length)))?;
        let data = self.reader.read_exact_at(offset, length).await?;

        let compression = info.compression;
        let tables = info.jpeg_tables.clone();
        let (tile_width, tile_height) = (info.tile_width, info.tile_height);
        let samples = info.samples_per_pixel;

        tokio::task::spawn_blocking(move || {
            decode_tile_bytes(
                &data,
                compression,
                tables.as_ref(),
                tile_width,
                tile_height,
                samples,
            )
        })
        .await
        .map_err(|e| DecodeError::TileTask(e.to_string()))?
    }

    async fn decode_level(&self, level: usize) -> Result<DynamicImage, DecodeError> {
        let info = self.level(level)?;
        let mut canvas: Option<Canvas> = None;
        for tile_y in 0..info.tiles_down() {
            for tile_x in 0..info.tiles_across() {
                let tile = self.decode_tile(level, tile_x, tile_y).await?;
                let canvas = canvas
                    .get_or_insert_with(|| Canvas::for_tile(&tile, info.width, info.height));
                canvas.place(
                    &tile,
                    tile_x as i64 * info.tile_width as i64,
                    tile_y as i64 * info.tile_height as i64,
                );
            }
        }
        canvas
            .map(Canvas::into_image)
            .ok_or(DecodeError::LevelOutOfRange(level))
    }
}
