//! Test utilities for integration tests.
//!
//! This module provides a request-tracking range reader, an in-memory
//! resolver and builders for tiled TIFF pyramids and flat test images.

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use iiif_streamer::error::IoError;
use iiif_streamer::io::RangeReader;
use iiif_streamer::source::{ByteSource, ResolvedSource, Resolver, SourceFormat};

// =============================================================================
// Range Reader with Request Tracking
// =============================================================================

/// A range reader that counts read requests and the bytes they returned.
#[derive(Clone)]
pub struct TrackingReader {
    data: Bytes,
    identifier: String,
    request_count: Arc<AtomicUsize>,
    bytes_read: Arc<AtomicUsize>,
}

impl TrackingReader {
    pub fn new(data: Vec<u8>, identifier: impl Into<String>) -> Self {
        Self {
            data: Bytes::from(data),
            identifier: identifier.into(),
            request_count: Arc::new(AtomicUsize::new(0)),
            bytes_read: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn bytes_read(&self) -> usize {
        self.bytes_read.load(Ordering::SeqCst)
    }

    pub fn reset_tracking(&self) {
        self.request_count.store(0, Ordering::SeqCst);
        self.bytes_read.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl RangeReader for TrackingReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);

        let start = offset as usize;
        let end = start + len;
        if end > self.data.len() {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.data.len() as u64,
            });
        }
        self.bytes_read.fetch_add(len, Ordering::SeqCst);
        Ok(self.data.slice(start..end))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// In-Memory Resolver
// =============================================================================

/// Resolver over a map of identifier to bytes.
///
/// Sources can be added and removed while a service holds the resolver.
#[derive(Default)]
pub struct MemoryResolver {
    sources: Mutex<HashMap<String, Vec<u8>>>,
    resolve_count: AtomicUsize,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(self, identifier: impl Into<String>, data: Vec<u8>) -> Self {
        self.insert(identifier, data);
        self
    }

    pub fn insert(&self, identifier: impl Into<String>, data: Vec<u8>) {
        self.sources.lock().unwrap().insert(identifier.into(), data);
    }

    pub fn remove(&self, identifier: &str) {
        self.sources.lock().unwrap().remove(identifier);
    }

    pub fn resolve_count(&self) -> usize {
        self.resolve_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for MemoryResolver {
    async fn resolve(&self, identifier: &str) -> Result<ResolvedSource, IoError> {
        self.resolve_count.fetch_add(1, Ordering::SeqCst);
        let data = self
            .sources
            .lock()
            .unwrap()
            .get(identifier)
            .cloned()
            .ok_or_else(|| IoError::NotFound(identifier.to_string()))?;
        let reader = TrackingReader::new(data, format!("mem://{}", identifier));
        Ok(ResolvedSource {
            format: SourceFormat::from_identifier(identifier),
            source: ByteSource::RandomAccess(Arc::new(reader)),
        })
    }
}

// =============================================================================
// Flat Images
// =============================================================================

/// Pixel at (`x`, `y`) of the gradient used by every test image.
pub fn gradient_pixel(x: u32, y: u32) -> [u8; 3] {
    [(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]
}

pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb(gradient_pixel(x, y))
    }))
}

/// Encode a gradient image as `format`.
pub fn create_test_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    gradient_image(width, height)
        .write_to(&mut out, format)
        .unwrap();
    out.into_inner()
}

pub fn create_test_png(width: u32, height: u32) -> Vec<u8> {
    create_test_image(width, height, ImageFormat::Png)
}

// =============================================================================
// Tiled TIFF Pyramid Builder
// =============================================================================

/// Builder for little-endian classic TIFFs holding an uncompressed RGB
/// pyramid, one tiled directory per level.
///
/// Pixels come from a function of (level, x, y) so tests can tell which
/// level and which tile a decoded pixel was read from.
pub struct PyramidBuilder {
    levels: Vec<(u32, u32)>,
    tile_size: u32,
}

impl PyramidBuilder {
    pub fn new(width: u32, height: u32, tile_size: u32) -> Self {
        Self {
            levels: vec![(width, height)],
            tile_size,
        }
    }

    /// Add a reduced level.
    pub fn with_level(mut self, width: u32, height: u32) -> Self {
        self.levels.push((width, height));
        self
    }

    /// Halve the last level `count` times.
    pub fn with_halvings(mut self, count: usize) -> Self {
        for _ in 0..count {
            let (w, h) = *self.levels.last().unwrap();
            self.levels.push((w.div_ceil(2), h.div_ceil(2)));
        }
        self
    }

    /// Build the file, filling every level with `pixel(level, x, y)`.
    pub fn build(&self, pixel: impl Fn(usize, u32, u32) -> [u8; 3]) -> Vec<u8> {
        let tile = self.tile_size;
        let mut data = Vec::new();
        data.extend(b"II");
        data.extend(&42u16.to_le_bytes());
        let mut next_pointer = data.len();
        data.extend(&0u32.to_le_bytes());

        for (index, &(width, height)) in self.levels.iter().enumerate() {
            let tiles_across = width.div_ceil(tile);
            let tiles_down = height.div_ceil(tile);

            let mut offsets = Vec::new();
            let mut counts = Vec::new();
            for ty in 0..tiles_down {
                for tx in 0..tiles_across {
                    offsets.push(data.len() as u32);
                    for py in 0..tile {
                        for px in 0..tile {
                            let (x, y) = (tx * tile + px, ty * tile + py);
                            if x < width && y < height {
                                data.extend(pixel(index, x, y));
                            } else {
                                data.extend([0u8; 3]);
                            }
                        }
                    }
                    counts.push(tile * tile * 3);
                }
            }

            let offsets_at = data.len() as u32;
            for offset in &offsets {
                data.extend(&offset.to_le_bytes());
            }
            let counts_at = data.len() as u32;
            for count in &counts {
                data.extend(&count.to_le_bytes());
            }
            let bits_at = data.len() as u32;
            for _ in 0..3 {
                data.extend(&8u16.to_le_bytes());
            }
            if data.len() % 2 == 1 {
                data.push(0);
            }

            // Single-value arrays are stored inline.
            let array = |at: u32, values: &[u32]| if values.len() == 1 { values[0] } else { at };
            let tile_count = offsets.len() as u32;
            let entries: [(u16, u16, u32, u32); 11] = [
                (256, 4, 1, width),
                (257, 4, 1, height),
                (258, 3, 3, bits_at),
                (259, 3, 1, 1),
                (262, 3, 1, 2),
                (277, 3, 1, 3),
                (284, 3, 1, 1),
                (322, 4, 1, tile),
                (323, 4, 1, tile),
                (324, 4, tile_count, array(offsets_at, &offsets)),
                (325, 4, tile_count, array(counts_at, &counts)),
            ];

            let ifd_offset = data.len() as u32;
            data[next_pointer..next_pointer + 4].copy_from_slice(&ifd_offset.to_le_bytes());
            data.extend(&(entries.len() as u16).to_le_bytes());
            for (tag, field_type, count, value) in entries {
                data.extend(&tag.to_le_bytes());
                data.extend(&field_type.to_le_bytes());
                data.extend(&count.to_le_bytes());
                data.extend(&value.to_le_bytes());
            }
            next_pointer = data.len();
            data.extend(&0u32.to_le_bytes());
        }

        data
    }

    /// Build with the same gradient on every level, scaled to level 0
    /// coordinates, and the level index in the blue channel.
    pub fn build_gradient(&self) -> Vec<u8> {
        let full_width = self.levels[0].0;
        let levels = self.levels.clone();
        self.build(move |level, x, y| {
            let factor = full_width / levels[level].0;
            let [r, g, _] = gradient_pixel(x * factor, y * factor);
            [r, g, level as u8 * 50]
        })
    }
}
