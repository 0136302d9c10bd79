//! Dimension and rendition caches.
//!
//! Two kinds of record are kept:
//!
//! - **dimensions**: identifier → full-resolution [`Size`]
//! - **renditions**: canonical request string → encoded bytes
//!
//! Every record carries the time it was written. With a non-zero [`Ttl`],
//! a read that finds a record older than `now - ttl` deletes it and reports
//! a miss; [`Cache::flush_expired`] sweeps all such records at once.
//!
//! Renditions are written through a [`RenditionWriter`]. Bytes become
//! visible to readers only after [`RenditionWriter::commit`]; a writer that
//! is dropped before committing discards everything it wrote.
//!
//! ```text
//!   rendition_writer(key) ──► write(chunk)* ──► commit() ──► visible
//!                                   │
//!                                   └── drop / error ──► discarded
//! ```

mod filesystem;
mod memory;

use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tracing::warn;

use crate::error::CacheError;
use crate::operation::{OperationList, Size};

pub use filesystem::FilesystemCache;
pub use memory::{MemoryCache, DEFAULT_RENDITION_CAPACITY};

/// Stream of a committed rendition's bytes.
pub type RenditionStream = Pin<Box<dyn AsyncRead + Send>>;

// =============================================================================
// Keys and TTL
// =============================================================================

/// Cache key of one rendition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenditionKey {
    /// Identifier the rendition was made from, used for purging.
    pub identifier: Arc<str>,

    /// Canonical request string.
    pub canonical: String,

    /// File extension of the encoded format.
    pub extension: &'static str,
}

impl RenditionKey {
    pub fn new(ops: &OperationList) -> Self {
        Self {
            identifier: Arc::from(ops.identifier()),
            canonical: ops.canonical(),
            extension: ops.format().extension(),
        }
    }
}

/// Maximum age of a cache record. Zero means records never expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ttl(Option<Duration>);

impl Ttl {
    pub const INFINITE: Ttl = Ttl(None);

    pub fn new(ttl: Duration) -> Self {
        if ttl.is_zero() {
            Ttl::INFINITE
        } else {
            Ttl(Some(ttl))
        }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn duration(&self) -> Option<Duration> {
        self.0
    }

    /// Oldest modification time still considered valid.
    pub fn cutoff(&self) -> Option<SystemTime> {
        self.0.and_then(|ttl| SystemTime::now().checked_sub(ttl))
    }

    /// Whether a record last modified at `modified` has expired.
    pub fn is_expired(&self, modified: SystemTime) -> bool {
        self.cutoff().is_some_and(|cutoff| modified < cutoff)
    }
}

// =============================================================================
// Rendition Writer
// =============================================================================

/// Backend half of a rendition write.
#[async_trait]
pub trait PendingWrite: Send {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), CacheError>;

    /// Make the written bytes visible under the key, replacing any previous
    /// entry. On failure nothing may stay visible.
    async fn commit(self: Box<Self>) -> Result<(), CacheError>;

    /// Throw the written bytes away. Must not block for long.
    fn discard(self: Box<Self>);
}

/// Incremental writer for one rendition.
///
/// Dropping the writer without a successful [`commit`](Self::commit)
/// discards the partial entry, so every early return and every error on the
/// producing side leaves nothing behind.
pub struct RenditionWriter {
    key: String,
    pending: Option<Box<dyn PendingWrite>>,
}

impl RenditionWriter {
    pub fn new(key: impl Into<String>, pending: Box<dyn PendingWrite>) -> Self {
        Self {
            key: key.into(),
            pending: Some(pending),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append `chunk`.
    ///
    /// # Errors
    ///
    /// `AlreadyCommitted` after [`commit`](Self::commit), or the backend error.
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), CacheError> {
        let pending = self.pending.as_mut().ok_or(CacheError::AlreadyCommitted)?;
        pending.write(chunk).await
    }

    /// Publish everything written so far.
    ///
    /// # Errors
    ///
    /// `AlreadyCommitted` when called twice, or the backend error.
    pub async fn commit(&mut self) -> Result<(), CacheError> {
        let pending = self.pending.take().ok_or(CacheError::AlreadyCommitted)?;
        pending.commit().await
    }
}

impl Drop for RenditionWriter {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            warn!(key = %self.key, "discarding incomplete rendition");
            pending.discard();
        }
    }
}

impl std::fmt::Debug for RenditionWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenditionWriter")
            .field("key", &self.key)
            .field("committed", &self.pending.is_none())
            .finish()
    }
}

// =============================================================================
// Cache Trait
// =============================================================================

/// Shared store of dimensions and renditions.
///
/// All methods are safe to call concurrently. Two writers racing on the same
/// key both succeed; the store keeps one complete entry.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get_dimension(&self, identifier: &str) -> Result<Option<Size>, CacheError>;

    async fn put_dimension(&self, identifier: &str, size: Size) -> Result<(), CacheError>;

    /// Reader for a committed, unexpired rendition.
    async fn rendition_reader(
        &self,
        key: &RenditionKey,
    ) -> Result<Option<RenditionStream>, CacheError>;

    async fn rendition_writer(&self, key: &RenditionKey) -> Result<RenditionWriter, CacheError>;

    /// Remove the dimension and every rendition of `identifier`.
    async fn purge_identifier(&self, identifier: &str) -> Result<(), CacheError>;

    async fn purge_rendition(&self, key: &RenditionKey) -> Result<(), CacheError>;

    /// Remove everything.
    async fn flush(&self) -> Result<(), CacheError>;

    /// Remove every expired record and return how many were removed.
    async fn flush_expired(&self) -> Result<usize, CacheError>;
}
