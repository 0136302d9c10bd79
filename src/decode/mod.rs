//! Multi-resolution, tile-aware decoding.
//!
//! - [`ImageContainer`] abstracts a decodable source: flat images have one
//!   untiled level, pyramidal TIFFs have several tiled levels.
//! - [`select_level`] picks the most reduced level that still satisfies a
//!   requested scale.
//! - [`TileAwareDecoder`] decodes only the tiles covering the crop, in
//!   parallel, and reports whether cropping is already done.

mod container;
mod flat;
mod level;
mod pyramidal;
mod reader;
mod tiles;

pub use container::{ImageContainer, TileLayout};
pub use flat::FlatImage;
pub use level::{select_level, LevelSelection, ReductionFactor};
pub use pyramidal::PyramidalTiff;
pub use reader::{DecodedRaster, ReaderHints, TileAwareDecoder, DEFAULT_DECODE_TIMEOUT};
pub use tiles::TileRange;
