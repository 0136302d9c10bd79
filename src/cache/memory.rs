//! In-process cache.
//!
//! Dimensions live in a plain map; renditions live in an LRU bounded by
//! entry count so the process cannot grow without limit.

use std::collections::HashMap;
use std::io::Cursor;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{Cache, PendingWrite, RenditionKey, RenditionStream, RenditionWriter, Ttl};
use crate::error::CacheError;
use crate::operation::Size;

/// Default maximum number of cached renditions.
pub const DEFAULT_RENDITION_CAPACITY: usize = 1000;

struct Entry<T> {
    value: T,
    modified: SystemTime,
}

impl<T> Entry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            modified: SystemTime::now(),
        }
    }
}

struct Inner {
    ttl: Ttl,
    dimensions: RwLock<HashMap<String, Entry<Size>>>,
    renditions: RwLock<LruCache<RenditionKey, Entry<Bytes>>>,
}

/// Cache held entirely in memory. Cloning shares the same store.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Arc<Inner>,
}

impl MemoryCache {
    /// Cache holding at most `capacity` renditions. A capacity of 0 is raised to 1.
    pub fn new(capacity: usize, ttl: Ttl) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Inner {
                ttl,
                dimensions: RwLock::new(HashMap::new()),
                renditions: RwLock::new(LruCache::new(capacity)),
            }),
        }
    }

    /// Number of renditions currently held, expired or not.
    pub async fn rendition_count(&self) -> usize {
        self.inner.renditions.read().await.len()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_RENDITION_CAPACITY, Ttl::INFINITE)
    }
}

/// Buffer published into the LRU on commit.
struct MemoryWrite {
    inner: Arc<Inner>,
    key: RenditionKey,
    buffer: Vec<u8>,
}

#[async_trait]
impl PendingWrite for MemoryWrite {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), CacheError> {
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), CacheError> {
        let MemoryWrite { inner, key, buffer } = *self;
        let len = buffer.len();
        inner
            .renditions
            .write()
            .await
            .put(key.clone(), Entry::new(Bytes::from(buffer)));
        debug!(key = %key.canonical, bytes = len, "committed rendition");
        Ok(())
    }

    fn discard(self: Box<Self>) {}
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get_dimension(&self, identifier: &str) -> Result<Option<Size>, CacheError> {
        {
            let dimensions = self.inner.dimensions.read().await;
            match dimensions.get(identifier) {
                Some(entry) if !self.inner.ttl.is_expired(entry.modified) => {
                    return Ok(Some(entry.value));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: evict, unless a writer refreshed it after the read lock was released.
        let mut dimensions = self.inner.dimensions.write().await;
        if let Some(entry) = dimensions.get(identifier) {
            if !self.inner.ttl.is_expired(entry.modified) {
                return Ok(Some(entry.value));
            }
            dimensions.remove(identifier);
        }
        Ok(None)
    }

    async fn put_dimension(&self, identifier: &str, size: Size) -> Result<(), CacheError> {
        self.inner
            .dimensions
            .write()
            .await
            .insert(identifier.to_string(), Entry::new(size));
        Ok(())
    }

    async fn rendition_reader(
        &self,
        key: &RenditionKey,
    ) -> Result<Option<RenditionStream>, CacheError> {
        let mut renditions = self.inner.renditions.write().await;
        let expired = match renditions.get(key) {
            Some(entry) if !self.inner.ttl.is_expired(entry.modified) => {
                let stream: RenditionStream = Box::pin(Cursor::new(entry.value.clone()));
                return Ok(Some(stream));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            renditions.pop(key);
        }
        Ok(None)
    }

    async fn rendition_writer(&self, key: &RenditionKey) -> Result<RenditionWriter, CacheError> {
        let pending = MemoryWrite {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
            buffer: Vec::new(),
        };
        Ok(RenditionWriter::new(key.canonical.clone(), Box::new(pending)))
    }

    async fn purge_identifier(&self, identifier: &str) -> Result<(), CacheError> {
        self.inner.dimensions.write().await.remove(identifier);
        let mut renditions = self.inner.renditions.write().await;
        let keys: Vec<RenditionKey> = renditions
            .iter()
            .filter(|(key, _)| &*key.identifier == identifier)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            renditions.pop(key);
        }
        info!(identifier, renditions = keys.len(), "purged identifier");
        Ok(())
    }

    async fn purge_rendition(&self, key: &RenditionKey) -> Result<(), CacheError> {
        self.inner.renditions.write().await.pop(key);
        Ok(())
    }

    async fn flush(&self) -> Result<(), CacheError> {
        self.inner.dimensions.write().await.clear();
        self.inner.renditions.write().await.clear();
        info!("flushed memory cache");
        Ok(())
    }

    async fn flush_expired(&self) -> Result<usize, CacheError> {
        let ttl = self.inner.ttl;
        let mut removed = 0;

        {
            let mut dimensions = self.inner.dimensions.write().await;
            let before = dimensions.len();
            dimensions.retain(|_, entry| !ttl.is_expired(entry.modified));
            removed += before - dimensions.len();
        }

        let mut renditions = self.inner.renditions.write().await;
        let expired: Vec<RenditionKey> = renditions
            .iter()
            .filter(|(_, entry)| ttl.is_expired(entry.modified))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            renditions.pop(key);
        }
        removed += expired.len();

        info!(removed, "flushed expired entries");
        Ok(removed)
    }
}
