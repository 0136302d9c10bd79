//! Configuration management for IIIF Streamer.
//!
//! Options come from command-line arguments or `IIIF_` environment variables,
//! with defaults for everything except the source location.
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use iiif_streamer::config::Config;
//!
//! let config = Config::parse();
//! config.validate()?;
//! let registry = config.build_registry()?;
//! ```
//!
//! # Environment Variables
//!
//! - `IIIF_SOURCE_ROOT` - Directory holding source images
//! - `IIIF_S3_BUCKET` - S3 bucket holding source images
//! - `IIIF_S3_PREFIX` - Key prefix prepended to identifiers
//! - `IIIF_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `IIIF_S3_REGION` - AWS region (default: us-east-1)
//! - `IIIF_PROCESSORS` - Per-format processors, e.g. `tif=tiled,png=stream`
//! - `IIIF_FALLBACK_PROCESSOR` - Processor for unassigned formats (default: tiled)
//! - `IIIF_CACHE` - `none`, `memory` or `filesystem` (default: memory)
//! - `IIIF_CACHE_DIR` - Filesystem cache root
//! - `IIIF_CACHE_TTL` - Cache time-to-live in seconds, 0 = forever (default: 0)
//! - `IIIF_CACHE_CAPACITY` - Memory cache rendition entries (default: 1000)
//! - `IIIF_PURGE_MISSING` - Purge cached entries of vanished sources (default: false)
//! - `IIIF_RESOLVE_FIRST` - Resolve sources before the rendition cache (default: false)
//! - `IIIF_MAX_PIXELS` - Largest output in pixels, 0 = unlimited (default: 0)
//! - `IIIF_JPEG_QUALITY` - JPEG encode quality (default: 80)
//! - `IIIF_DECODE_WORKERS` - Tile pool size, 0 = one per core (default: 0)
//! - `IIIF_DECODE_TIMEOUT` - Tile pool timeout in seconds (default: 300)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use crate::cache::{Cache, FilesystemCache, MemoryCache, Ttl, DEFAULT_RENDITION_CAPACITY};
use crate::decode::{TileAwareDecoder, DEFAULT_DECODE_TIMEOUT};
use crate::processor::{ProcessorKind, ProcessorRegistry, ProcessorSettings, DEFAULT_JPEG_QUALITY};
use crate::service::ServiceSettings;
use crate::source::SourceFormat;

// =============================================================================
// Default Values
// =============================================================================

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default processor for formats without an assignment.
pub const DEFAULT_FALLBACK_PROCESSOR: &str = "tiled";

/// Value of `--fallback-processor` that disables the fallback.
pub const NO_FALLBACK: &str = "none";

// =============================================================================
// CLI Arguments
// =============================================================================

/// Where renditions and dimensions are cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheBackend {
    None,
    Memory,
    Filesystem,
}

/// IIIF Streamer - image derivatives from pyramidal and flat sources.
///
/// Crops, scales, rotates and re-encodes source images, reading only the
/// tiles a request touches, and caches the results.
#[derive(Parser, Debug, Clone)]
#[command(name = "iiif-streamer")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Source Configuration
    // =========================================================================
    /// Directory holding source images.
    #[arg(long, env = "IIIF_SOURCE_ROOT", global = true)]
    pub source_root: Option<PathBuf>,

    /// S3 bucket holding source images.
    #[arg(long, env = "IIIF_S3_BUCKET", global = true)]
    pub s3_bucket: Option<String>,

    /// Key prefix prepended to every identifier.
    #[arg(long, env = "IIIF_S3_PREFIX", global = true)]
    pub s3_prefix: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "IIIF_S3_ENDPOINT", global = true)]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "IIIF_S3_REGION", global = true)]
    pub s3_region: String,

    // =========================================================================
    // Processor Configuration
    // =========================================================================
    /// Processor per source format, as comma-separated `format=kind` pairs.
    #[arg(
        long = "processor",
        env = "IIIF_PROCESSORS",
        value_delimiter = ',',
        value_parser = parse_assignment,
        global = true
    )]
    pub processors: Vec<(SourceFormat, ProcessorKind)>,

    /// Processor for formats without an assignment, or `none`.
    #[arg(
        long,
        default_value = DEFAULT_FALLBACK_PROCESSOR,
        env = "IIIF_FALLBACK_PROCESSOR",
        global = true
    )]
    pub fallback_processor: String,

    /// JPEG encode quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "IIIF_JPEG_QUALITY", global = true)]
    pub jpeg_quality: u8,

    /// Concurrent tile decodes per request; 0 uses one per core.
    #[arg(long, default_value_t = 0, env = "IIIF_DECODE_WORKERS", global = true)]
    pub decode_workers: usize,

    /// Seconds before a tile decode is abandoned.
    #[arg(
        long,
        default_value_t = DEFAULT_DECODE_TIMEOUT.as_secs(),
        env = "IIIF_DECODE_TIMEOUT",
        global = true
    )]
    pub decode_timeout: u64,

    /// Largest output in pixels; 0 disables the limit.
    #[arg(long, default_value_t = 0, env = "IIIF_MAX_PIXELS", global = true)]
    pub max_pixels: u64,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Cache backend.
    #[arg(long, value_enum, default_value_t = CacheBackend::Memory, env = "IIIF_CACHE", global = true)]
    pub cache: CacheBackend,

    /// Root directory of the filesystem cache.
    #[arg(long, env = "IIIF_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Cache time-to-live in seconds; 0 keeps entries forever.
    #[arg(long, default_value_t = 0, env = "IIIF_CACHE_TTL", global = true)]
    pub cache_ttl: u64,

    /// Maximum renditions held by the memory cache.
    #[arg(
        long,
        default_value_t = DEFAULT_RENDITION_CAPACITY,
        env = "IIIF_CACHE_CAPACITY",
        global = true
    )]
    pub cache_capacity: usize,

    /// Purge an identifier's cached entries when its source disappears.
    #[arg(long, env = "IIIF_PURGE_MISSING", global = true)]
    pub purge_missing: bool,

    /// Resolve the source before consulting the rendition cache.
    #[arg(long, env = "IIIF_RESOLVE_FIRST", global = true)]
    pub resolve_first: bool,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Actions the binary can perform.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Render a request such as `page.tif/full/full/0/default.jpg`.
    Render {
        request: String,

        /// Output file; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the full-resolution size of a source.
    Info { identifier: String },

    /// Print the compliance level available for a source.
    Compliance { identifier: String },

    /// Remove every cached entry of an identifier.
    Purge { identifier: String },

    /// Remove every cached entry.
    Flush,

    /// Remove expired cached entries.
    FlushExpired,
}

/// Parse one `format=kind` processor assignment.
fn parse_assignment(value: &str) -> Result<(SourceFormat, ProcessorKind), String> {
    let (format, kind) = value
        .split_once('=')
        .ok_or_else(|| format!("expected format=kind, got '{}'", value))?;
    let format = match SourceFormat::from_name(format.trim()) {
        SourceFormat::Unknown => return Err(format!("unknown source format '{}'", format)),
        format => format,
    };
    Ok((format, kind.trim().parse()?))
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        match (&self.source_root, &self.s3_bucket) {
            (None, None) => {
                return Err(
                    "No source location. Set --source-root / IIIF_SOURCE_ROOT \
                     or --s3-bucket / IIIF_S3_BUCKET"
                        .to_string(),
                )
            }
            (Some(_), Some(_)) => {
                return Err("--source-root and --s3-bucket are mutually exclusive".to_string())
            }
            _ => {}
        }

        if matches!(&self.s3_bucket, Some(bucket) if bucket.is_empty()) {
            return Err("S3 bucket name must not be empty".to_string());
        }

        if self.cache == CacheBackend::Filesystem && self.cache_dir.is_none() {
            return Err(
                "The filesystem cache needs a directory. Set --cache-dir or IIIF_CACHE_DIR"
                    .to_string(),
            );
        }

        if self.cache == CacheBackend::Memory && self.cache_capacity == 0 {
            return Err("cache_capacity must be greater than 0".to_string());
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        if self.decode_timeout == 0 {
            return Err("decode_timeout must be greater than 0".to_string());
        }

        self.fallback()?;
        Ok(())
    }

    /// Fallback processor kind, `None` when disabled.
    pub fn fallback(&self) -> Result<Option<ProcessorKind>, String> {
        if self.fallback_processor.eq_ignore_ascii_case(NO_FALLBACK) {
            return Ok(None);
        }
        self.fallback_processor.parse().map(Some)
    }

    pub fn ttl(&self) -> Ttl {
        Ttl::from_secs(self.cache_ttl)
    }

    pub fn processor_settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            decoder: TileAwareDecoder::new(
                self.decode_workers,
                Duration::from_secs(self.decode_timeout),
            ),
            jpeg_quality: self.jpeg_quality,
        }
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            max_pixels: self.max_pixels,
            purge_missing: self.purge_missing,
            resolve_first: self.resolve_first,
        }
    }

    /// Registry with the configured assignments and fallback.
    pub fn build_registry(&self) -> Result<ProcessorRegistry, String> {
        let registry = self.processors.iter().fold(
            ProcessorRegistry::new(self.processor_settings()).with_fallback(self.fallback()?),
            |registry, &(format, kind)| registry.with_assignment(format, kind),
        );
        Ok(registry)
    }

    /// The configured cache, `None` when caching is off.
    pub fn build_cache(&self) -> Option<Arc<dyn Cache>> {
        match self.cache {
            CacheBackend::None => None,
            CacheBackend::Memory => Some(Arc::new(MemoryCache::new(self.cache_capacity, self.ttl()))),
            CacheBackend::Filesystem => self
                .cache_dir
                .as_ref()
                .map(|dir| Arc::new(FilesystemCache::new(dir, self.ttl())) as Arc<dyn Cache>),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
