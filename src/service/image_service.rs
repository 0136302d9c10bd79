//! Image service: the entry point for rendering requests.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          ImageService                            │
//! │                                                                  │
//! │  render_to(ops, sink)                                            │
//! │   1. rendition cache hit? ──────────────────────► copy to sink   │
//! │   2. resolve source (purge identifier if gone)                   │
//! │   3. negotiate processor, check byte source                      │
//! │   4. no-op? ─────────────────────────────────────► source bytes  │
//! │   5. full size (dimension cache) + payload check                 │
//! │   6. tile-aware decode + pipeline                                │
//! │   7. tee encoded bytes ──► sink                                  │
//! │         └──► rendition writer (commit on success, else discard)  │
//! └──────────────────────────────────────────────────────────────────┘
//!          │                  │                    │
//!          ▼                  ▼                    ▼
//!    ┌──────────┐   ┌───────────────────┐   ┌───────────┐
//!    │ Resolver │   │ ProcessorRegistry │   │   Cache   │
//!    └──────────┘   └───────────────────┘   └───────────┘
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::cache::{Cache, RenditionKey, RenditionWriter};
use crate::decode::ImageContainer;
use crate::error::{CacheError, ImageError, IoError};
use crate::io::RangeReader;
use crate::operation::{OperationList, Size};
use crate::processor::{ComplianceLevel, Processor, ProcessorRegistry};
use crate::source::{ResolvedSource, Resolver, SourceFormat};

/// Bytes written to the client and the cache per step of the tee.
pub const TEE_CHUNK_SIZE: usize = 64 * 1024;

// =============================================================================
// Settings and Results
// =============================================================================

/// Behaviour switches of the service.
#[derive(Debug, Clone, Default)]
pub struct ServiceSettings {
    /// Largest output in pixels; 0 disables the check.
    pub max_pixels: u64,

    /// Purge an identifier's cache entries when its source disappears.
    pub purge_missing: bool,

    /// Resolve the source before consulting the rendition cache.
    pub resolve_first: bool,
}

/// Summary of a [`ImageService::render_to`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOutcome {
    pub media_type: &'static str,
    pub cache_hit: bool,
    /// Bytes written to the sink.
    pub bytes: u64,
}

/// A fully buffered rendition.
#[derive(Debug, Clone)]
pub struct Rendition {
    pub data: Bytes,
    pub media_type: &'static str,
    pub cache_hit: bool,
}

fn sink_error(err: std::io::Error) -> ImageError {
    ImageError::Io(IoError::Connection(err.to_string()))
}

// =============================================================================
// Image Service
// =============================================================================

/// Renders derivatives of resolved sources, caching dimensions and renditions.
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct ImageService {
    resolver: Arc<dyn Resolver>,
    processors: ProcessorRegistry,
    cache: Option<Arc<dyn Cache>>,
    settings: ServiceSettings,
}

impl ImageService {
    /// Service without a cache and with default settings.
    pub fn new(resolver: Arc<dyn Resolver>, processors: ProcessorRegistry) -> Self {
        Self {
            resolver,
            processors,
            cache: None,
            settings: ServiceSettings::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn processors(&self) -> &ProcessorRegistry {
        &self.processors
    }

    pub fn cache(&self) -> Option<&Arc<dyn Cache>> {
        self.cache.as_ref()
    }

    // -------------------------------------------------------------------------
    // Rendering
    // -------------------------------------------------------------------------

    /// Render `ops` into memory.
    ///
    /// # Errors
    ///
    /// See [`ImageService::render_to`].
    pub async fn render(&self, ops: &OperationList) -> Result<Rendition, ImageError> {
        let mut data = Vec::new();
        let outcome = self.render_to(ops, &mut data).await?;
        Ok(Rendition {
            data: Bytes::from(data),
            media_type: outcome.media_type,
            cache_hit: outcome.cache_hit,
        })
    }

    /// Render `ops` and stream the result into `sink`.
    ///
    /// On a cache miss the image is fully encoded in memory first (or, for a
    /// pass-through, the source is read whole). Those bytes are then written
    /// in chunks to the sink and the rendition cache together. The cache
    /// entry is committed only when the sink accepted every byte.
    ///
    /// # Errors
    ///
    /// Any [`ImageError`]. Cache failures are logged and never returned.
    pub async fn render_to<W>(
        &self,
        ops: &OperationList,
        sink: &mut W,
    ) -> Result<RenderOutcome, ImageError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let identifier = ops.identifier();
        let media_type = ops.format().media_type();
        let key = RenditionKey::new(ops);

        let mut resolved = if self.settings.resolve_first {
            Some(self.resolve(identifier).await?)
        } else {
            None
        };

        if let Some(bytes) = self.serve_cached(&key, sink).await? {
            return Ok(RenderOutcome {
                media_type,
                cache_hit: true,
                bytes,
            });
        }

        let ResolvedSource { format, source } = match resolved.take() {
            Some(resolved) => resolved,
            None => self.resolve(identifier).await?,
        };
        let processor = self.processors.negotiate(format, ops.format())?;
        ProcessorRegistry::check_source(processor, &source)?;
        let reader = source
            .into_reader(identifier)
            .await
            .map_err(|e| ImageError::from_io(identifier, e))?;

        let data = if ops.is_no_op(format) {
            if self.settings.max_pixels > 0 {
                let full = self
                    .full_size(identifier, processor, Arc::clone(&reader), format)
                    .await?;
                self.check_payload(full)?;
            }
            debug!(request = %ops, "passing source through unchanged");
            reader
                .read_all()
                .await
                .map_err(|e| ImageError::from_io(identifier, e))?
        } else {
            let container = processor.open(Arc::clone(&reader), format).await?;
            let full = self.container_size(identifier, processor, container.as_ref()).await?;
            ProcessorRegistry::check_request(processor, format, ops, full)?;
            self.check_payload(ops.resulting_size(full)?)?;
            Bytes::from(processor.process(container, ops, full).await?)
        };

        let bytes = self.tee(&key, &data, sink).await?;
        Ok(RenderOutcome {
            media_type,
            cache_hit: false,
            bytes,
        })
    }

    /// Copy a cached rendition into `sink`; `None` on a miss or cache failure.
    async fn serve_cached<W>(&self, key: &RenditionKey, sink: &mut W) -> Result<Option<u64>, ImageError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        match cache.rendition_reader(key).await {
            Ok(Some(mut stream)) => {
                debug!(key = %key.canonical, "rendition cache hit");
                let bytes = tokio::io::copy(&mut stream, sink).await.map_err(sink_error)?;
                sink.flush().await.map_err(sink_error)?;
                Ok(Some(bytes))
            }
            Ok(None) => {
                debug!(key = %key.canonical, "rendition cache miss");
                Ok(None)
            }
            Err(e) => {
                warn!(key = %key.canonical, error = %e, "rendition cache read failed");
                Ok(None)
            }
        }
    }

    /// Write `data` to `sink` and, when caching, to a rendition writer.
    async fn tee<W>(&self, key: &RenditionKey, data: &[u8], sink: &mut W) -> Result<u64, ImageError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut writer = match &self.cache {
            Some(cache) => match cache.rendition_writer(key).await {
                Ok(writer) => Some(writer),
                Err(e) => {
                    warn!(key = %key.canonical, error = %e, "could not open rendition writer");
                    None
                }
            },
            None => None,
        };

        for chunk in data.chunks(TEE_CHUNK_SIZE) {
            sink.write_all(chunk).await.map_err(sink_error)?;
            if let Some(active) = writer.as_mut() {
                if let Err(e) = active.write(chunk).await {
                    warn!(key = %key.canonical, error = %e, "rendition cache write failed");
                    writer = None;
                }
            }
        }
        sink.flush().await.map_err(sink_error)?;

        if let Some(writer) = writer.as_mut() {
            commit(writer).await;
        }
        Ok(data.len() as u64)
    }

    // -------------------------------------------------------------------------
    // Metadata
    // -------------------------------------------------------------------------

    /// Full-resolution size of `identifier`, from the dimension cache when possible.
    ///
    /// # Errors
    ///
    /// Resolver, negotiation and decode failures.
    pub async fn get_size(&self, identifier: &str) -> Result<Size, ImageError> {
        if let Some(size) = self.cached_dimension(identifier).await {
            return Ok(size);
        }
        let ResolvedSource { format, source } = self.resolve(identifier).await?;
        let processor = self.processors.processor_for(format)?;
        ProcessorRegistry::check_source(processor, &source)?;
        let reader = source
            .into_reader(identifier)
            .await
            .map_err(|e| ImageError::from_io(identifier, e))?;
        self.full_size(identifier, processor, reader, format).await
    }

    /// Compliance level of the processor that serves `identifier`.
    ///
    /// The format comes from the identifier's extension; the source is only
    /// resolved when that is inconclusive.
    ///
    /// # Errors
    ///
    /// Resolver and negotiation failures.
    pub async fn compliance_level(&self, identifier: &str) -> Result<ComplianceLevel, ImageError> {
        let format = match SourceFormat::from_identifier(identifier) {
            SourceFormat::Unknown => self.resolve(identifier).await?.format,
            format => format,
        };
        self.processors.compliance_level(format)
    }

    // -------------------------------------------------------------------------
    // Cache maintenance
    // -------------------------------------------------------------------------

    /// Remove every cache entry of `identifier`.
    pub async fn purge(&self, identifier: &str) -> Result<(), CacheError> {
        match &self.cache {
            Some(cache) => cache.purge_identifier(identifier).await,
            None => Ok(()),
        }
    }

    pub async fn flush(&self) -> Result<(), CacheError> {
        match &self.cache {
            Some(cache) => cache.flush().await,
            None => Ok(()),
        }
    }

    /// Remove expired cache entries; returns how many were removed.
    pub async fn flush_expired(&self) -> Result<usize, CacheError> {
        match &self.cache {
            Some(cache) => cache.flush_expired().await,
            None => Ok(0),
        }
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    async fn resolve(&self, identifier: &str) -> Result<ResolvedSource, ImageError> {
        match self.resolver.resolve(identifier).await {
            Ok(resolved) => {
                debug!(identifier, format = %resolved.format, source = ?resolved.source, "resolved source");
                Ok(resolved)
            }
            Err(e) => {
                let err = ImageError::from_io(identifier, e);
                if matches!(err, ImageError::SourceNotFound { .. }) && self.settings.purge_missing {
                    if let Err(purge) = self.purge(identifier).await {
                        warn!(identifier, error = %purge, "purge of missing source failed");
                    } else {
                        info!(identifier, "source missing, purged cached entries");
                    }
                }
                Err(err)
            }
        }
    }

    async fn cached_dimension(&self, identifier: &str) -> Option<Size> {
        let cache = self.cache.as_ref()?;
        match cache.get_dimension(identifier).await {
            Ok(size) => size,
            Err(e) => {
                warn!(identifier, error = %e, "dimension cache read failed");
                None
            }
        }
    }

    async fn store_dimension(&self, identifier: &str, size: Size) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put_dimension(identifier, size).await {
                warn!(identifier, error = %e, "dimension cache write failed");
            }
        }
    }

    /// Size from the dimension cache, else read from the source and cached.
    async fn full_size(
        &self,
        identifier: &str,
        processor: &Processor,
        reader: Arc<dyn RangeReader>,
        format: SourceFormat,
    ) -> Result<Size, ImageError> {
        if let Some(size) = self.cached_dimension(identifier).await {
            return Ok(size);
        }
        let size = processor.read_size(reader, format).await?;
        self.store_dimension(identifier, size).await;
        Ok(size)
    }

    /// Size of an opened container, recorded in the dimension cache.
    async fn container_size(
        &self,
        identifier: &str,
        processor: &Processor,
        container: &dyn ImageContainer,
    ) -> Result<Size, ImageError> {
        let size = container.full_size().ok_or_else(|| ImageError::BackendExecution {
            processor: processor.name().to_string(),
            message: "source has no resolution levels".to_string(),
        })?;
        if self.cached_dimension(identifier).await != Some(size) {
            self.store_dimension(identifier, size).await;
        }
        Ok(size)
    }

    fn check_payload(&self, size: Size) -> Result<(), ImageError> {
        let max_pixels = self.settings.max_pixels;
        if max_pixels > 0 && size.pixel_count() > max_pixels {
            return Err(ImageError::PayloadTooLarge {
                width: size.width,
                height: size.height,
                max_pixels,
            });
        }
        Ok(())
    }
}

async fn commit(writer: &mut RenditionWriter) {
    match writer.commit().await {
        Ok(()) => debug!(key = writer.key(), "cached rendition"),
        Err(e) => warn!(key = writer.key(), error = %e, "rendition cache commit failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, Ttl};
    use crate::io::MemoryReader;
    use crate::operation::OutputFormat;
    use crate::source::ByteSource;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapResolver {
        files: Mutex<HashMap<String, Vec<u8>>>,
        calls: AtomicUsize,
    }

    impl MapResolver {
        fn insert(&self, identifier: &str, data: Vec<u8>) {
            self.files.lock().unwrap().insert(identifier.to_string(), data);
        }

        fn remove(&self, identifier: &str) {
            self.files.lock().unwrap().remove(identifier);
        }
    }

    #[async_trait]
    impl Resolver for MapResolver {
        async fn resolve(&self, identifier: &str) -> Result<ResolvedSource, IoError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let data = self
                .files
                .lock()
                .unwrap()
                .get(identifier)
                .cloned()
                .ok_or_else(|| IoError::NotFound(identifier.to_string()))?;
            Ok(ResolvedSource {
                format: SourceFormat::from_identifier(identifier),
                source: ByteSource::RandomAccess(Arc::new(MemoryReader::new(data, identifier))),
            })
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([10, 200, 30]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn service(resolver: Arc<MapResolver>, cache: Arc<MemoryCache>) -> ImageService {
        ImageService::new(resolver, ProcessorRegistry::default()).with_cache(cache)
    }

    #[tokio::test]
    async fn test_render_then_cache_hit() {
        let resolver = Arc::new(MapResolver::default());
        resolver.insert("a.png", png(40, 30));
        let cache = Arc::new(MemoryCache::default());
        let service = service(resolver.clone(), cache.clone());
        let ops = OperationList::parse("a.png/full/20,/0/default.jpg").unwrap();

        let first = service.render(&ops).await.unwrap();
        assert!(!first.cache_hit);
        assert_eq!(first.media_type, "image/jpeg");
        let image = image::load_from_memory(&first.data).unwrap();
        assert_eq!((image.width(), image.height()), (20, 15));

        let second = service.render(&ops).await.unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.data, first.data);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.get_dimension("a.png").await.unwrap(),
            Some(Size::new(40, 30))
        );
    }

    #[tokio::test]
    async fn test_no_op_passes_source_through() {
        let resolver = Arc::new(MapResolver::default());
        let source = png(8, 8);
        resolver.insert("a.png", source.clone());
        let service = ImageService::new(resolver, ProcessorRegistry::default());
        let ops = OperationList::new("a.png", OutputFormat::Png);
        let rendition = service.render(&ops).await.unwrap();
        assert_eq!(rendition.data.as_ref(), source.as_slice());
    }

    #[tokio::test]
    async fn test_missing_source_purges_when_configured() {
        let resolver = Arc::new(MapResolver::default());
        resolver.insert("a.png", png(8, 8));
        let cache = Arc::new(MemoryCache::default());
        let service = service(resolver.clone(), cache.clone()).with_settings(ServiceSettings {
            purge_missing: true,
            resolve_first: true,
            ..Default::default()
        });
        let ops = OperationList::parse("a.png/full/4,/0/default.png").unwrap();
        service.render(&ops).await.unwrap();
        assert_eq!(cache.rendition_count().await, 1);

        resolver.remove("a.png");
        let err = service.render(&ops).await.unwrap_err();
        assert!(matches!(err, ImageError::SourceNotFound { .. }));
        assert_eq!(cache.rendition_count().await, 0);
        assert_eq!(cache.get_dimension("a.png").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cached_rendition_served_without_resolving() {
        let resolver = Arc::new(MapResolver::default());
        resolver.insert("a.png", png(8, 8));
        let cache = Arc::new(MemoryCache::default());
        let service = service(resolver.clone(), cache);
        let ops = OperationList::parse("a.png/full/4,/0/default.png").unwrap();
        service.render(&ops).await.unwrap();

        resolver.remove("a.png");
        assert!(service.render(&ops).await.unwrap().cache_hit);
    }

    #[tokio::test]
    async fn test_payload_too_large() {
        let resolver = Arc::new(MapResolver::default());
        resolver.insert("a.png", png(100, 100));
        let service = ImageService::new(resolver, ProcessorRegistry::default()).with_settings(
            ServiceSettings {
                max_pixels: 1000,
                ..Default::default()
            },
        );
        let ops = OperationList::parse("a.png/full/full/0/default.jpg").unwrap();
        let err = service.render(&ops).await.unwrap_err();
        assert!(matches!(err, ImageError::PayloadTooLarge { width: 100, height: 100, .. }));

        let ops = OperationList::parse("a.png/full/30,/0/default.jpg").unwrap();
        assert!(service.render(&ops).await.is_ok());
    }

    #[tokio::test]
    async fn test_get_size_uses_dimension_cache() {
        let resolver = Arc::new(MapResolver::default());
        resolver.insert("a.png", png(12, 7));
        let cache = Arc::new(MemoryCache::new(10, Ttl::INFINITE));
        let service = service(resolver.clone(), cache);
        assert_eq!(service.get_size("a.png").await.unwrap(), Size::new(12, 7));
        assert_eq!(service.get_size("a.png").await.unwrap(), Size::new(12, 7));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_compliance_level() {
        let resolver = Arc::new(MapResolver::default());
        let service = ImageService::new(resolver, ProcessorRegistry::default());
        assert_eq!(
            service.compliance_level("x.tif").await.unwrap(),
            ComplianceLevel::Level2
        );
        assert!(matches!(
            service.compliance_level("noext").await,
            Err(ImageError::SourceNotFound { .. })
        ));
    }

    /// Sink that fails after accepting `limit` bytes.
    struct FailingSink {
        written: usize,
        limit: usize,
    }

    impl AsyncWrite for FailingSink {
        fn poll_write(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            if self.written >= self.limit {
                return std::task::Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()));
            }
            let n = buf.len().min(self.limit - self.written);
            self.written += n;
            std::task::Poll::Ready(Ok(n))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    /// Accepts everything and records the size of each write.
    #[derive(Default)]
    struct RecordingSink {
        data: Vec<u8>,
        writes: Vec<usize>,
    }

    impl AsyncWrite for RecordingSink {
        fn poll_write(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            self.data.extend_from_slice(buf);
            self.writes.push(buf.len());
            std::task::Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_encoded_output_is_written_in_chunks() {
        let resolver = Arc::new(MapResolver::default());
        resolver.insert("a.png", png(200, 200));
        let cache = Arc::new(MemoryCache::default());
        let service = service(resolver, cache.clone());
        // Uncompressed TIFF: larger than a single chunk.
        let ops = OperationList::new("a.png", OutputFormat::Tif);

        let mut sink = RecordingSink::default();
        let outcome = service.render_to(&ops, &mut sink).await.unwrap();

        let total = sink.data.len();
        assert!(total > TEE_CHUNK_SIZE);
        assert_eq!(outcome.bytes, total as u64);
        assert_eq!(sink.writes.len(), total.div_ceil(TEE_CHUNK_SIZE));
        assert!(sink.writes.iter().all(|&n| n <= TEE_CHUNK_SIZE));

        let cached = service.render(&ops).await.unwrap();
        assert!(cached.cache_hit);
        assert_eq!(cached.data.as_ref(), sink.data.as_slice());
    }

    #[tokio::test]
    async fn test_client_disconnect_discards_rendition() {
        let resolver = Arc::new(MapResolver::default());
        resolver.insert("a.png", png(8, 8));
        let cache = Arc::new(MemoryCache::default());
        let service = service(resolver, cache.clone());
        let ops = OperationList::new("a.png", OutputFormat::Png);

        let mut sink = FailingSink {
            written: 0,
            limit: 10,
        };
        let err = service.render_to(&ops, &mut sink).await.unwrap_err();
        assert!(matches!(err, ImageError::Io(IoError::Connection(_))));
        assert_eq!(cache.rendition_count().await, 0);
    }
}
