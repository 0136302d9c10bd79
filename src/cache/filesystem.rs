//! On-disk cache.
//!
//! # Layout
//!
//! ```text
//! <root>/
//! ├── info/
//! │   └── <sha256(identifier)>.json          dimension record
//! └── image/
//!     └── <sha256(identifier)>/
//!         └── <sha256(canonical)>.<ext>      rendition bytes
//! ```
//!
//! Record age is the file's modification time. Every write goes to a
//! uniquely named temporary file in the destination directory and is
//! renamed into place on commit, so readers only ever see whole files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{Cache, PendingWrite, RenditionKey, RenditionStream, RenditionWriter, Ttl};
use crate::error::CacheError;
use crate::operation::Size;

const INFO_DIR: &str = "info";
const IMAGE_DIR: &str = "image";
const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Serialize, Deserialize)]
struct DimensionRecord {
    identifier: String,
    width: u32,
    height: u32,
}

fn digest(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// `Ok(None)` for a missing file.
async fn modified(path: &Path) -> Result<Option<SystemTime>, CacheError> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta.modified()?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_file(path: &Path) -> Result<bool, CacheError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn remove_dir_all(path: &Path) -> Result<(), CacheError> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Cache stored as a file tree under a root directory.
#[derive(Debug, Clone)]
pub struct FilesystemCache {
    root: PathBuf,
    ttl: Ttl,
    sequence: Arc<AtomicU64>,
}

impl FilesystemCache {
    /// Cache rooted at `root`. Directories are created on first write.
    pub fn new(root: impl Into<PathBuf>, ttl: Ttl) -> Self {
        Self {
            root: root.into(),
            ttl,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dimension_path(&self, identifier: &str) -> PathBuf {
        self.root
            .join(INFO_DIR)
            .join(format!("{}.json", digest(identifier)))
    }

    fn identifier_dir(&self, identifier: &str) -> PathBuf {
        self.root.join(IMAGE_DIR).join(digest(identifier))
    }

    fn rendition_path(&self, key: &RenditionKey) -> PathBuf {
        self.identifier_dir(&key.identifier)
            .join(format!("{}.{}", digest(&key.canonical), key.extension))
    }

    /// Unique sibling of `target` to write into before renaming.
    fn temp_path(&self, target: &Path) -> PathBuf {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        target.with_file_name(format!(
            ".{}.{}.{}.{}{}",
            name,
            std::process::id(),
            sequence,
            nanos,
            TEMP_SUFFIX
        ))
    }

    /// Delete `path` if it is older than the TTL. Returns whether it is still valid.
    async fn check_fresh(&self, path: &Path) -> Result<bool, CacheError> {
        let Some(modified) = modified(path).await? else {
            return Ok(false);
        };
        if self.ttl.is_expired(modified) {
            debug!(path = %path.display(), "removing expired cache file");
            remove_file(path).await?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Remove expired files directly inside `dir`; returns the count.
    async fn sweep_dir(&self, dir: &Path) -> Result<usize, CacheError> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_file() && self.ttl.is_expired(meta.modified()?) && remove_file(&entry.path()).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Temporary file renamed onto the rendition path on commit.
struct FileWrite {
    file: Option<File>,
    temp: PathBuf,
    target: PathBuf,
}

#[async_trait]
impl PendingWrite for FileWrite {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), CacheError> {
        match self.file.as_mut() {
            Some(file) => Ok(file.write_all(chunk).await?),
            None => Err(CacheError::AlreadyCommitted),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), CacheError> {
        let FileWrite { file, temp, target } = *self;
        let result = async {
            if let Some(mut file) = file {
                file.flush().await?;
                file.sync_all().await?;
            }
            fs::rename(&temp, &target).await?;
            Ok::<(), CacheError>(())
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&temp).await;
        } else {
            debug!(path = %target.display(), "committed rendition");
        }
        result
    }

    fn discard(mut self: Box<Self>) {
        drop(self.file.take());
        if let Err(e) = std::fs::remove_file(&self.temp) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %self.temp.display(), error = %e, "could not remove partial rendition");
            }
        }
    }
}

#[async_trait]
impl Cache for FilesystemCache {
    async fn get_dimension(&self, identifier: &str) -> Result<Option<Size>, CacheError> {
        let path = self.dimension_path(identifier);
        if !self.check_fresh(&path).await? {
            return Ok(None);
        }
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice::<DimensionRecord>(&data) {
            Ok(record) => Ok(Some(Size::new(record.width, record.height))),
            Err(e) => {
                remove_file(&path).await?;
                Err(CacheError::Corrupt(format!("{}: {}", path.display(), e)))
            }
        }
    }

    async fn put_dimension(&self, identifier: &str, size: Size) -> Result<(), CacheError> {
        let path = self.dimension_path(identifier);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let record = DimensionRecord {
            identifier: identifier.to_string(),
            width: size.width,
            height: size.height,
        };
        let json = serde_json::to_vec(&record).map_err(|e| CacheError::Corrupt(e.to_string()))?;

        let temp = self.temp_path(&path);
        if let Err(e) = fs::write(&temp, &json).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn rendition_reader(
        &self,
        key: &RenditionKey,
    ) -> Result<Option<RenditionStream>, CacheError> {
        let path = self.rendition_path(key);
        if !self.check_fresh(&path).await? {
            return Ok(None);
        }
        match File::open(&path).await {
            Ok(file) => {
                let stream: RenditionStream = Box::pin(file);
                Ok(Some(stream))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn rendition_writer(&self, key: &RenditionKey) -> Result<RenditionWriter, CacheError> {
        let target = self.rendition_path(key);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp = self.temp_path(&target);
        let file = File::create(&temp).await?;
        let pending = FileWrite {
            file: Some(file),
            temp,
            target,
        };
        Ok(RenditionWriter::new(key.canonical.clone(), Box::new(pending)))
    }

    async fn purge_identifier(&self, identifier: &str) -> Result<(), CacheError> {
        remove_file(&self.dimension_path(identifier)).await?;
        remove_dir_all(&self.identifier_dir(identifier)).await?;
        info!(identifier, "purged identifier");
        Ok(())
    }

    async fn purge_rendition(&self, key: &RenditionKey) -> Result<(), CacheError> {
        remove_file(&self.rendition_path(key)).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), CacheError> {
        remove_dir_all(&self.root.join(INFO_DIR)).await?;
        remove_dir_all(&self.root.join(IMAGE_DIR)).await?;
        info!(root = %self.root.display(), "flushed filesystem cache");
        Ok(())
    }

    async fn flush_expired(&self) -> Result<usize, CacheError> {
        if self.ttl.duration().is_none() {
            return Ok(0);
        }

        let mut removed = self.sweep_dir(&self.root.join(INFO_DIR)).await?;

        let image_dir = self.root.join(IMAGE_DIR);
        let mut identifiers = match fs::read_dir(&image_dir).await {
            Ok(entries) => Some(entries),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        if let Some(entries) = identifiers.as_mut() {
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_dir() {
                    continue;
                }
                let dir = entry.path();
                removed += self.sweep_dir(&dir).await?;
                // only succeeds once the directory is empty
                let _ = fs::remove_dir(&dir).await;
            }
        }

        info!(removed, root = %self.root.display(), "flushed expired entries");
        Ok(removed)
    }
}
