//! # IIIF Streamer
//!
//! An image derivative engine for IIIF-style requests over local or
//! S3-hosted sources.
//!
//! A request names a source and a fixed sequence of transforms. The engine
//! reads only the tiles of the most suitable pyramid level, crops, scales,
//! rotates and filters the result, encodes it, and streams it to the caller
//! while populating a rendition cache.
//!
//! ## Features
//!
//! - **Tile-aware decoding**: Pyramidal TIFF levels and tile grids are read with byte-range requests
//! - **Concurrent tile pool**: Covering tiles are decoded in parallel under a hard timeout
//! - **Capability negotiation**: Processors declare formats, features and qualities; compliance levels are derived from them
//! - **TTL caching**: Dimension and rendition caches in memory or on disk, with commit-or-discard writes
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`operation`] - Region, size, rotation, quality and format operations
//! - [`source`] - Identifier resolution and source format detection
//! - [`io`] - Range readers for files, memory and S3
//! - [`tiff`] - Pyramidal TIFF structure parsing
//! - [`decode`] - Image containers and the tile-aware decoder
//! - [`processor`] - Processors, capabilities, compliance and the transform pipeline
//! - [`cache`] - Dimension and rendition caches
//! - [`service`] - The image service tying everything together
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use iiif_streamer::{FilesystemResolver, ImageService, MemoryCache, OperationList, ProcessorRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), iiif_streamer::ImageError> {
//!     let service = ImageService::new(
//!         Arc::new(FilesystemResolver::new("/srv/images")),
//!         ProcessorRegistry::default(),
//!     )
//!     .with_cache(Arc::new(MemoryCache::default()));
//!
//!     let ops = OperationList::parse("page.tif/pct:20,20,50,50/pct:50/0/default.jpg")?;
//!     let rendition = service.render(&ops).await?;
//!     println!("{} bytes of {}", rendition.data.len(), rendition.media_type);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod decode;
pub mod error;
pub mod io;
pub mod operation;
pub mod processor;
pub mod service;
pub mod source;
pub mod tiff;

// Re-export commonly used types
pub use cache::{
    Cache, FilesystemCache, MemoryCache, RenditionKey, RenditionStream, RenditionWriter, Ttl,
};
pub use config::{CacheBackend, Command, Config};
pub use decode::{
    DecodedRaster, FlatImage, ImageContainer, PyramidalTiff, TileAwareDecoder, TileLayout,
};
pub use error::{CacheError, DecodeError, ImageError, IoError, TiffError};
pub use io::{create_s3_client, FileRangeReader, MemoryReader, RangeReader, S3RangeReader};
pub use operation::{
    Operation, OperationList, OutputFormat, Quality, Rect, Region, Rotation, Scale, Size,
};
pub use processor::{
    CapabilitySet, ComplianceLevel, Processor, ProcessorFeature, ProcessorKind, ProcessorRegistry,
    ProcessorSettings,
};
pub use service::{ImageService, RenderOutcome, Rendition, ServiceSettings};
pub use source::{
    ByteSource, FilesystemResolver, ResolvedSource, Resolver, S3Resolver, SourceFormat,
};
