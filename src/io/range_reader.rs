use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Random-access view of a source's bytes.
///
/// Pyramidal decoding reads only the header, directories and the tiles a
/// request needs, so every byte source that can seek implements this.
/// Implementations must be thread-safe: tile workers read concurrently.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns an error if the range is out of bounds or if the read fails.
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Get the total size of the resource in bytes.
    fn size(&self) -> u64;

    /// Get a unique identifier for this resource (for logging).
    fn identifier(&self) -> &str;

    /// Read the whole resource.
    async fn read_all(&self) -> Result<Bytes, IoError> {
        let len = usize::try_from(self.size()).map_err(|_| {
            IoError::Local(format!("{} is too large to buffer", self.identifier()))
        })?;
        self.read_exact_at(0, len).await
    }
}

/// Reject reads past `size`, the shared bounds rule for every reader.
pub(crate) fn check_range(offset: u64, len: usize, size: u64) -> Result<(), IoError> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(()),
        _ => Err(IoError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size,
        }),
    }
}
