//! Completion of abbreviated JPEG tile streams.
//!
//! Tiles may omit their quantization and Huffman tables, which are stored
//! once in the directory's `JPEGTables` tag (itself wrapped in SOI/EOI).
//! The complete stream is the tables without their EOI followed by the tile
//! without its SOI.

use bytes::{Bytes, BytesMut};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Prepend `tables` to `tile`, or return `tile` unchanged without tables.
pub fn complete_jpeg(tables: Option<&[u8]>, tile: &[u8]) -> Bytes {
    let tables = match tables {
        Some(t) if t.len() > 4 => t,
        _ => return Bytes::copy_from_slice(tile),
    };

    let tables = tables.strip_suffix(&EOI).unwrap_or(tables);
    let tile = tile.strip_prefix(&SOI).unwrap_or(tile);

    let mut merged = BytesMut::with_capacity(tables.len() + tile.len());
    merged.extend_from_slice(tables);
    merged.extend_from_slice(tile);
    merged.freeze()
}
