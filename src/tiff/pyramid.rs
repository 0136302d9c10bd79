//! Resolution levels of a tiled TIFF.

use std::collections::HashSet;

use bytes::Bytes;
use tracing::debug;

use super::header::{TiffHeader, BIGTIFF_HEADER_SIZE};
use super::ifd::Ifd;
use super::tags;
use crate::error::TiffError;
use crate::io::RangeReader;

/// Upper bound on directories walked, guards against corrupt chains.
const MAX_DIRECTORIES: usize = 256;

/// Tile codec of a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileCompression {
    None,
    Jpeg,
}

/// One tiled directory.
#[derive(Debug, Clone)]
pub struct TiffLevel {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub samples_per_pixel: u16,
    pub compression: TileCompression,
    pub tile_offsets: Vec<u64>,
    pub tile_byte_counts: Vec<u64>,
    pub jpeg_tables: Option<Bytes>,
}

impl TiffLevel {
    pub fn tiles_across(&self) -> u32 {
        self.width.div_ceil(self.tile_width)
    }

    pub fn tiles_down(&self) -> u32 {
        self.height.div_ceil(self.tile_height)
    }

    /// File offset and length of tile (`tile_x`, `tile_y`).
    pub fn tile_location(&self, tile_x: u32, tile_y: u32) -> Option<(u64, u64)> {
        if tile_x >= self.tiles_across() || tile_y >= self.tiles_down() {
            return None;
        }
        let index = (tile_y * self.tiles_across() + tile_x) as usize;
        Some((
            *self.tile_offsets.get(index)?,
            *self.tile_byte_counts.get(index)?,
        ))
    }

    /// Read one directory as a level.
    async fn from_ifd(
        ifd: &Ifd,
        reader: &dyn RangeReader,
        header: &TiffHeader,
    ) -> Result<Self, TiffError> {
        let required = |tag: u16, name: &'static str| {
            ifd.entry(tag).ok_or(TiffError::MissingTag(name))
        };
        let number = |value: u64, name: &'static str| {
            u32::try_from(value)
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| TiffError::InvalidTagValue {
                    tag: name,
                    message: format!("{} is not a positive 32-bit value", value),
                })
        };

        let width = number(
            required(tags::IMAGE_WIDTH, "ImageWidth")?.read_first(reader, header).await?,
            "ImageWidth",
        )?;
        let height = number(
            required(tags::IMAGE_LENGTH, "ImageLength")?.read_first(reader, header).await?,
            "ImageLength",
        )?;
        let tile_width = number(
            required(tags::TILE_WIDTH, "TileWidth")?.read_first(reader, header).await?,
            "TileWidth",
        )?;
        let tile_height = number(
            required(tags::TILE_LENGTH, "TileLength")?.read_first(reader, header).await?,
            "TileLength",
        )?;

        let optional = |tag: u16, default: u64| async move {
            match ifd.entry(tag) {
                Some(entry) => entry.read_first(reader, header).await,
                None => Ok(default),
            }
        };

        let compression = match optional(tags::COMPRESSION, 1).await? {
            1 => TileCompression::None,
            7 => TileCompression::Jpeg,
            other => {
                return Err(TiffError::UnsupportedLayout(format!("compression {}", other)))
            }
        };
        if optional(tags::PLANAR_CONFIGURATION, 1).await? != 1 {
            return Err(TiffError::UnsupportedLayout("planar samples".to_string()));
        }

        let samples_per_pixel = optional(tags::SAMPLES_PER_PIXEL, 1).await?;
        if compression == TileCompression::None {
            if !(1..=4).contains(&samples_per_pixel) {
                return Err(TiffError::UnsupportedLayout(format!(
                    "{} samples per pixel",
                    samples_per_pixel
                )));
            }
            let bits = match ifd.entry(tags::BITS_PER_SAMPLE) {
                Some(entry) => entry.read_unsigned(reader, header).await?,
                None => vec![1],
            };
            if bits.iter().any(|&b| b != 8) {
                return Err(TiffError::UnsupportedLayout(format!("{:?} bits per sample", bits)));
            }
            let photometric = optional(tags::PHOTOMETRIC, 1).await?;
            if !matches!(photometric, 1 | 2) {
                return Err(TiffError::UnsupportedLayout(format!(
                    "photometric interpretation {}",
                    photometric
                )));
            }
        }

        let tile_offsets = required(tags::TILE_OFFSETS, "TileOffsets")?
            .read_unsigned(reader, header)
            .await?;
        let tile_byte_counts = required(tags::TILE_BYTE_COUNTS, "TileByteCounts")?
            .read_unsigned(reader, header)
            .await?;

        let jpeg_tables = match ifd.entry(tags::JPEG_TABLES) {
            Some(entry) if compression == TileCompression::Jpeg => {
                Some(entry.read_bytes(reader, header).await?)
            }
            _ => None,
        };

        let level = TiffLevel {
            width,
            height,
            tile_width,
            tile_height,
            samples_per_pixel: samples_per_pixel as u16,
            compression,
            tile_offsets,
            tile_byte_counts,
            jpeg_tables,
        };

        let expected = level.tiles_across() as usize * level.tiles_down() as usize;
        if level.tile_offsets.len() < expected || level.tile_byte_counts.len() < expected {
            return Err(TiffError::InvalidTagValue {
                tag: "TileOffsets",
                message: format!(
                    "expected {} tiles, found {} offsets and {} byte counts",
                    expected,
                    level.tile_offsets.len(),
                    level.tile_byte_counts.len()
                ),
            });
        }
        Ok(level)
    }

    /// Whether this level is a downsampled copy of `base`.
    fn matches_aspect(&self, base: &TiffLevel) -> bool {
        let expected = base.height as f64 * self.width as f64 / base.width as f64;
        let tolerance = (self.height as f64 * 0.01).max(2.0);
        (self.height as f64 - expected).abs() <= tolerance
    }
}

/// All usable levels of a TIFF, largest first.
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    pub header: TiffHeader,
    pub levels: Vec<TiffLevel>,
}

impl TiffPyramid {
    /// Walk the directory chain and collect the tiled levels.
    ///
    /// # Errors
    ///
    /// Fails if the header is invalid, the first tiled directory cannot be
    /// read as a level, or there is no tiled directory at all.
    pub async fn open(reader: &dyn RangeReader) -> Result<Self, TiffError> {
        let header_len = reader.size().min(BIGTIFF_HEADER_SIZE as u64) as usize;
        let header_bytes = reader.read_exact_at(0, header_len).await?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        let mut levels: Vec<TiffLevel> = Vec::new();
        let mut visited = HashSet::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && visited.len() < MAX_DIRECTORIES {
            if !visited.insert(offset) {
                return Err(TiffError::InvalidIfdOffset(offset));
            }
            let ifd = Ifd::read(reader, &header, offset).await?;
            offset = ifd.next_offset;

            if ifd.entry(tags::TILE_WIDTH).is_none() {
                debug!(identifier = reader.identifier(), "skipping untiled directory");
                continue;
            }
            match TiffLevel::from_ifd(&ifd, reader, &header).await {
                Ok(level) => levels.push(level),
                Err(err) if levels.is_empty() => return Err(err),
                Err(err) => {
                    debug!(identifier = reader.identifier(), error = %err, "skipping directory");
                }
            }
        }

        let base = levels.first().cloned().ok_or(TiffError::NoTiledLevels)?;
        levels.retain(|level| level.width <= base.width && level.matches_aspect(&base));
        levels.sort_by(|a, b| b.width.cmp(&a.width));

        Ok(TiffPyramid { header, levels })
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, index: usize) -> Option<&TiffLevel> {
        self.levels.get(index)
    }
}
