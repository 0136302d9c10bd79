//! Image service tests against real files.
//!
//! These tests verify end-to-end behaviour including:
//! - Filesystem resolution, format sniffing and access checks
//! - Processor negotiation for random-access and sequential sources
//! - Purge of cached entries when a source disappears
//! - Pass-through of unmodified sources and the payload ceiling
//! - Compliance levels per source format

use std::path::Path;
use std::sync::Arc;

use http::StatusCode;

use iiif_streamer::cache::{Cache, MemoryCache};
use iiif_streamer::error::ImageError;
use iiif_streamer::operation::{OperationList, Size};
use iiif_streamer::processor::{ComplianceLevel, ProcessorKind, ProcessorRegistry};
use iiif_streamer::service::{ImageService, ServiceSettings};
use iiif_streamer::source::{FilesystemResolver, SourceFormat};

use super::test_utils::{create_test_png, PyramidBuilder};

fn write_sources(dir: &Path) {
    std::fs::write(dir.join("page.png"), create_test_png(200, 100)).unwrap();
    std::fs::write(dir.join("noext"), create_test_png(200, 100)).unwrap();
    std::fs::write(
        dir.join("scan.tif"),
        PyramidBuilder::new(256, 192, 64).with_halvings(2).build_gradient(),
    )
    .unwrap();
}

fn filesystem_service(dir: &Path) -> ImageService {
    ImageService::new(
        Arc::new(FilesystemResolver::new(dir)),
        ProcessorRegistry::default(),
    )
}

async fn render_size(service: &ImageService, request: &str) -> Result<(u32, u32), ImageError> {
    let rendition = service.render(&OperationList::parse(request)?).await?;
    let image = image::load_from_memory(&rendition.data).unwrap();
    Ok((image.width(), image.height()))
}

// =============================================================================
// Resolution
// =============================================================================

#[tokio::test]
async fn test_filesystem_sources_render() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let service = filesystem_service(dir.path());

    assert_eq!(render_size(&service, "scan.tif/full/64,/0/default.png").await.unwrap(), (64, 48));
    assert_eq!(render_size(&service, "page.png/full/100,/0/default.jpg").await.unwrap(), (100, 50));
    assert_eq!(service.get_size("scan.tif").await.unwrap(), Size::new(256, 192));
}

#[tokio::test]
async fn test_format_sniffed_without_extension() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let service = filesystem_service(dir.path());

    assert_eq!(render_size(&service, "noext/full/50,/0/default.png").await.unwrap(), (50, 25));
    assert_eq!(
        service.compliance_level("noext").await.unwrap(),
        ComplianceLevel::Level2
    );
}

#[tokio::test]
async fn test_missing_and_escaping_identifiers() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let service = filesystem_service(dir.path());

    let err = render_size(&service, "gone.png/full/full/0/default.png").await.unwrap_err();
    assert!(matches!(err, ImageError::SourceNotFound { .. }));
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

    let err = render_size(&service, "..%2Fpage.png/full/full/0/default.png").await.unwrap_err();
    assert!(matches!(err, ImageError::AccessDenied { .. }));
    assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
}

// =============================================================================
// Processor Negotiation
// =============================================================================

#[tokio::test]
async fn test_sequential_source_needs_stream_processor() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let resolver = Arc::new(FilesystemResolver::new(dir.path()).sequential());

    let service = ImageService::new(resolver.clone(), ProcessorRegistry::default());
    let err = render_size(&service, "page.png/full/50,/0/default.png").await.unwrap_err();
    assert!(matches!(err, ImageError::Configuration(_)));
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

    let registry =
        ProcessorRegistry::default().with_assignment(SourceFormat::Png, ProcessorKind::Stream);
    let service = ImageService::new(resolver, registry);
    assert_eq!(render_size(&service, "page.png/full/50,/0/default.png").await.unwrap(), (50, 25));
}

#[tokio::test]
async fn test_compliance_levels_follow_assignment() {
    let registry = ProcessorRegistry::default()
        .with_assignment(SourceFormat::Png, ProcessorKind::Stream)
        .with_fallback(None);
    let service = ImageService::new(Arc::new(FilesystemResolver::new(".")), registry);

    assert_eq!(
        service.compliance_level("a.png").await.unwrap(),
        ComplianceLevel::Level2
    );
    assert!(matches!(
        service.compliance_level("a.tif").await,
        Err(ImageError::Configuration(_))
    ));
}

// =============================================================================
// Cache Interaction
// =============================================================================

#[tokio::test]
async fn test_purge_when_source_disappears() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let cache = Arc::new(MemoryCache::default());
    let service = filesystem_service(dir.path())
        .with_cache(cache.clone())
        .with_settings(ServiceSettings {
            purge_missing: true,
            resolve_first: true,
            ..Default::default()
        });

    render_size(&service, "page.png/full/50,/0/default.png").await.unwrap();
    assert_eq!(cache.rendition_count().await, 1);
    assert!(cache.get_dimension("page.png").await.unwrap().is_some());

    std::fs::remove_file(dir.path().join("page.png")).unwrap();
    let err = render_size(&service, "page.png/full/50,/0/default.png").await.unwrap_err();
    assert!(matches!(err, ImageError::SourceNotFound { .. }));
    assert_eq!(cache.rendition_count().await, 0);
    assert_eq!(cache.get_dimension("page.png").await.unwrap(), None);
}

#[tokio::test]
async fn test_cache_hit_skips_resolution() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let service = filesystem_service(dir.path())
        .with_cache(Arc::new(MemoryCache::default()))
        .with_settings(ServiceSettings {
            purge_missing: true,
            ..Default::default()
        });
    let ops = OperationList::parse("page.png/full/50,/0/default.png").unwrap();

    service.render(&ops).await.unwrap();
    std::fs::remove_file(dir.path().join("page.png")).unwrap();
    assert!(service.render(&ops).await.unwrap().cache_hit);
}

// =============================================================================
// Pass-Through and Limits
// =============================================================================

#[tokio::test]
async fn test_unmodified_source_passes_through() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let service = filesystem_service(dir.path());

    let ops = OperationList::parse("page.png/full/full/0/default.png").unwrap();
    let rendition = service.render(&ops).await.unwrap();
    let source = std::fs::read(dir.path().join("page.png")).unwrap();
    assert_eq!(rendition.data.as_ref(), source.as_slice());
}

#[tokio::test]
async fn test_payload_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let service = filesystem_service(dir.path()).with_settings(ServiceSettings {
        max_pixels: 5_000,
        ..Default::default()
    });

    let err = render_size(&service, "page.png/full/full/0/default.jpg").await.unwrap_err();
    assert!(matches!(err, ImageError::PayloadTooLarge { width: 200, height: 100, .. }));
    assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

    // Pass-through is held to the same ceiling.
    let err = render_size(&service, "page.png/full/full/0/default.png").await.unwrap_err();
    assert!(matches!(err, ImageError::PayloadTooLarge { .. }));

    assert_eq!(render_size(&service, "page.png/full/50,/0/default.png").await.unwrap(), (50, 25));
}

#[tokio::test]
async fn test_render_to_file() {
    let dir = tempfile::tempdir().unwrap();
    write_sources(dir.path());
    let service = filesystem_service(dir.path());
    let output = dir.path().join("out.png");

    let mut file = tokio::fs::File::create(&output).await.unwrap();
    let ops = OperationList::parse("scan.tif/0,0,128,128/64,/90/gray.png").unwrap();
    let outcome = service.render_to(&ops, &mut file).await.unwrap();
    drop(file);

    assert_eq!(outcome.media_type, "image/png");
    assert!(!outcome.cache_hit);
    let written = std::fs::read(&output).unwrap();
    assert_eq!(outcome.bytes, written.len() as u64);
    let image = image::load_from_memory(&written).unwrap();
    assert_eq!((image.width(), image.height()), (64, 64));
    assert_eq!(image.color(), image::ColorType::L8);
}
