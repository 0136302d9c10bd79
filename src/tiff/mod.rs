//! Minimal pyramidal TIFF reader.
//!
//! Reads just enough of a TIFF or BigTIFF file to address individual tiles:
//!
//! ```text
//! header ──► IFD 0 (full resolution, tiled)
//!              │ next
//!              ▼
//!            IFD 1 (reduced, tiled) ──► IFD 2 ... ──► 0
//! ```
//!
//! Each tiled IFD whose aspect ratio matches the first becomes a
//! [`TiffLevel`]; label, macro and strip-organised directories are skipped.
//! Tiles must be 8-bit chunky samples, either uncompressed or JPEG
//! (abbreviated streams are completed with the `JPEGTables` tag).
//! Anything else fails to open, which callers treat as "not pyramidal".

mod header;
mod ifd;
mod jpeg;
mod pyramid;

pub use header::{ByteOrder, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use ifd::{Ifd, IfdEntry};
pub use jpeg::complete_jpeg;
pub use pyramid::{TileCompression, TiffLevel, TiffPyramid};

/// Tag numbers this reader understands.
pub mod tags {
    pub const NEW_SUBFILE_TYPE: u16 = 254;
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const BITS_PER_SAMPLE: u16 = 258;
    pub const COMPRESSION: u16 = 259;
    pub const PHOTOMETRIC: u16 = 262;
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    pub const PLANAR_CONFIGURATION: u16 = 284;
    pub const TILE_WIDTH: u16 = 322;
    pub const TILE_LENGTH: u16 = 323;
    pub const TILE_OFFSETS: u16 = 324;
    pub const TILE_BYTE_COUNTS: u16 = 325;
    pub const JPEG_TABLES: u16 = 347;
}
