use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

/// I/O errors that can occur when reading source bytes
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Object exists but may not be read
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Local filesystem failure
    #[error("Local I/O error: {0}")]
    Local(String),
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => IoError::AccessDenied(err.to_string()),
            _ => IoError::Local(err.to_string()),
        }
    }
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or loops back)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Pixel layout the tile reader cannot address
    #[error("Unsupported layout: {0}")]
    UnsupportedLayout(String),

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),

    /// No tiled image directory was found
    #[error("No tiled levels found")]
    NoTiledLevels,
}

/// Errors raised while decoding a source into a raster
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// The pixel codec rejected the data
    #[error("Codec error: {0}")]
    Codec(String),

    /// Level or tile index outside the container's grid
    #[error("Tile ({tile_x}, {tile_y}) out of range at level {level}")]
    TileOutOfRange { level: usize, tile_x: u32, tile_y: u32 },

    #[error("Level {0} does not exist")]
    LevelOutOfRange(usize),

    /// Clipped crop rectangle has no pixels
    #[error("Region is empty after clipping to {width}x{height}")]
    EmptyRegion { width: u32, height: u32 },

    /// A tile task panicked or was cancelled
    #[error("Tile task failed: {0}")]
    TileTask(String),

    /// The tile pool did not finish in time
    #[error("Tile decode timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors raised by a cache backing store.
///
/// These never fail a request; the service logs them and renders uncached.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(String),

    /// Stored record could not be decoded
    #[error("Corrupt cache record: {0}")]
    Corrupt(String),

    /// Writer used after commit
    #[error("Rendition writer already committed")]
    AlreadyCommitted,
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err.to_string())
    }
}

// =============================================================================
// Request Errors
// =============================================================================

/// Errors surfaced to callers of the image service.
///
/// Each variant maps to exactly one HTTP status through [`ImageError::status_code`].
#[derive(Debug, Clone, Error)]
pub enum ImageError {
    /// Malformed or out-of-range region, size, rotation, quality or format
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No processor can read this source format
    #[error("Unsupported source format: {0}")]
    UnsupportedSourceFormat(String),

    /// The selected processor cannot write the requested format
    #[error("The {processor} processor cannot write {format} for this source")]
    UnsupportedOutputFormat { processor: String, format: String },

    /// The resolver reported that the source does not exist
    #[error("Source not found: {identifier}")]
    SourceNotFound { identifier: String },

    /// The resolver reported that the source may not be read
    #[error("Access denied: {identifier}")]
    AccessDenied { identifier: String },

    /// Resulting image exceeds the configured pixel ceiling
    #[error("Requested {width}x{height} exceeds the limit of {max_pixels} pixels")]
    PayloadTooLarge {
        width: u32,
        height: u32,
        max_pixels: u64,
    },

    /// Decoder or encoder failure
    #[error("{processor} processor failed: {message}")]
    BackendExecution { processor: String, message: String },

    /// Server-side misconfiguration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Byte source failure not covered above
    #[error("I/O error: {0}")]
    Io(IoError),
}

impl ImageError {
    /// Build the resolver-failure variant for `identifier`.
    pub fn from_io(identifier: &str, err: IoError) -> Self {
        match err {
            IoError::NotFound(_) => ImageError::SourceNotFound {
                identifier: identifier.to_string(),
            },
            IoError::AccessDenied(_) => ImageError::AccessDenied {
                identifier: identifier.to_string(),
            },
            other => ImageError::Io(other),
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ImageError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            ImageError::UnsupportedSourceFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ImageError::UnsupportedOutputFormat { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ImageError::SourceNotFound { .. } => StatusCode::NOT_FOUND,
            ImageError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            ImageError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ImageError::BackendExecution { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ImageError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ImageError::Io(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Whether the failure was caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}
