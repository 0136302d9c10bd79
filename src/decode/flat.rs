use std::io::Cursor;

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, ImageReader};

use super::container::{ImageContainer, TileLayout};
use crate::error::DecodeError;
use crate::io::RangeReader;
use crate::operation::Size;

/// Single-level image decoded in one piece by the image crate.
pub struct FlatImage {
    data: Bytes,
    format: Option<ImageFormat>,
    size: Size,
}

fn reader_for(data: &[u8], format: Option<ImageFormat>) -> Result<ImageReader<Cursor<&[u8]>>, DecodeError> {
    let cursor = Cursor::new(data);
    match format {
        Some(format) => Ok(ImageReader::with_format(cursor, format)),
        None => ImageReader::new(cursor)
            .with_guessed_format()
            .map_err(|e| DecodeError::Codec(e.to_string())),
    }
}

impl FlatImage {
    /// Buffer the source and read its dimensions from the header.
    ///
    /// `format` of `None` guesses the codec from the leading bytes.
    pub async fn open(
        reader: &dyn RangeReader,
        format: Option<ImageFormat>,
    ) -> Result<Self, DecodeError> {
        let data = reader.read_all().await?;
        Self::from_bytes(data, format)
    }

    pub fn from_bytes(data: Bytes, format: Option<ImageFormat>) -> Result<Self, DecodeError> {
        let (width, height) = reader_for(&data, format)?
            .into_dimensions()
            .map_err(|e| DecodeError::Codec(e.to_string()))?;
        Ok(Self {
            data,
            format,
            size: Size::new(width, height),
        })
    }
}

#[async_trait]
impl ImageContainer for FlatImage {
    fn level_count(&self) -> usize {
        1
    }

    fn level_size(&self, level: usize) -> Option<Size> {
        (level == 0).then_some(self.size)
    }

    fn tile_layout(&self, _level: usize) -> Option<TileLayout> {
        None
    }

    async fn decode_tile(
        &self,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<DynamicImage, DecodeError> {
        Err(DecodeError::TileOutOfRange {
            level,
            tile_x,
            tile_y,
        })
    }

    async fn decode_level(&self, level: usize) -> Result<DynamicImage, DecodeError> {
        if level != 0 {
            return Err(DecodeError::LevelOutOfRange(level));
        }
        let data = self.data.clone();
        let format = self.format;
        tokio::task::spawn_blocking(move || {
            reader_for(&data, format)?
                .decode()
                .map_err(|e| DecodeError::Codec(e.to_string()))
        })
        .await
        .map_err(|e| DecodeError::TileTask(e.to_string()))?
    }
}
