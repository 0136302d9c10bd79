use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use super::format::{SourceFormat, SNIFF_LEN};
use crate::error::IoError;
use crate::io::{MemoryReader, RangeReader};

// =============================================================================
// Byte Sources
// =============================================================================

/// How a source's bytes can be read.
pub enum ByteSource {
    /// Seekable source; tiles can be read independently.
    RandomAccess(Arc<dyn RangeReader>),

    /// Forward-only stream; must be consumed from the start.
    Sequential(Box<dyn AsyncRead + Send + Unpin>),
}

impl ByteSource {
    pub fn is_random_access(&self) -> bool {
        matches!(self, ByteSource::RandomAccess(_))
    }

    /// Random-access view of this source, buffering a stream if needed.
    pub async fn into_reader(self, identifier: &str) -> Result<Arc<dyn RangeReader>, IoError> {
        match self {
            ByteSource::RandomAccess(reader) => Ok(reader),
            ByteSource::Sequential(stream) => {
                let reader = MemoryReader::from_stream(stream, identifier).await?;
                Ok(Arc::new(reader))
            }
        }
    }
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ByteSource::RandomAccess(reader) => {
                f.debug_tuple("RandomAccess").field(&reader.identifier()).finish()
            }
            ByteSource::Sequential(_) => f.write_str("Sequential"),
        }
    }
}

/// A resolved identifier.
#[derive(Debug)]
pub struct ResolvedSource {
    pub format: SourceFormat,
    pub source: ByteSource,
}

// =============================================================================
// Resolver Trait
// =============================================================================

/// Locates the bytes behind an identifier.
///
/// Implementations report a missing source as `IoError::NotFound` and a
/// forbidden one as `IoError::AccessDenied`; the service relies on those
/// two kinds to pick the response and to purge stale cache entries.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, identifier: &str) -> Result<ResolvedSource, IoError>;
}

/// Format from the identifier's extension, falling back to magic bytes.
pub async fn detect_format(
    identifier: &str,
    reader: &dyn RangeReader,
) -> Result<SourceFormat, IoError> {
    let format = SourceFormat::from_identifier(identifier);
    if format != SourceFormat::Unknown {
        return Ok(format);
    }
    let len = reader.size().min(SNIFF_LEN as u64) as usize;
    let header = reader.read_exact_at(0, len).await?;
    Ok(SourceFormat::sniff(&header))
}
