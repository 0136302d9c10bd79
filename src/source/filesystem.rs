use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::resolver::{detect_format, ByteSource, ResolvedSource, Resolver};
use super::SourceFormat;
use crate::error::IoError;
use crate::io::{FileRangeReader, RangeReader};

/// Resolves identifiers to files below a root directory.
///
/// Identifiers are relative paths. Absolute paths and `..` components are
/// refused with `AccessDenied` so nothing outside the root is reachable.
#[derive(Debug, Clone)]
pub struct FilesystemResolver {
    root: PathBuf,
    sequential: bool,
}

impl FilesystemResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sequential: false,
        }
    }

    /// Hand out forward-only streams instead of random-access readers.
    pub fn sequential(mut self) -> Self {
        self.sequential = true;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `identifier` below the root.
    pub fn path_for(&self, identifier: &str) -> Result<PathBuf, IoError> {
        let relative = Path::new(identifier);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if identifier.is_empty() || escapes {
            return Err(IoError::AccessDenied(identifier.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Resolver for FilesystemResolver {
    async fn resolve(&self, identifier: &str) -> Result<ResolvedSource, IoError> {
        let path = self.path_for(identifier)?;
        debug!(identifier, path = %path.display(), "resolving from filesystem");

        if self.sequential {
            let file = tokio::fs::File::open(&path).await?;
            if !file.metadata().await?.is_file() {
                return Err(IoError::NotFound(path.display().to_string()));
            }
            return Ok(ResolvedSource {
                format: SourceFormat::from_identifier(identifier),
                source: ByteSource::Sequential(Box::new(file)),
            });
        }

        let reader: Arc<dyn RangeReader> = Arc::new(FileRangeReader::open(&path).await?);
        let format = detect_format(identifier, reader.as_ref()).await?;
        Ok(ResolvedSource {
            format,
            source: ByteSource::RandomAccess(reader),
        })
    }
}
