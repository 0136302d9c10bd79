//! Cache integration tests.
//!
//! These tests verify that:
//! - Racing writers on one key leave exactly one complete rendition
//! - Renditions survive across service instances on the filesystem
//! - Expired entries are re-rendered and swept
//! - A failing cache never fails a request

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;

use iiif_streamer::cache::{Cache, FilesystemCache, MemoryCache, RenditionKey, Ttl};
use iiif_streamer::operation::{OperationList, Size};
use iiif_streamer::processor::ProcessorRegistry;
use iiif_streamer::service::ImageService;

use super::test_utils::{create_test_png, MemoryResolver};

const REQUEST: &str = "page.png/full/50,/0/default.png";

fn key() -> RenditionKey {
    RenditionKey::new(&OperationList::parse(REQUEST).unwrap())
}

async fn read_rendition(cache: &dyn Cache, key: &RenditionKey) -> Option<Vec<u8>> {
    let mut stream = cache.rendition_reader(key).await.unwrap()?;
    let mut data = Vec::new();
    stream.read_to_end(&mut data).await.unwrap();
    Some(data)
}

fn service_with(resolver: Arc<MemoryResolver>, cache: Arc<dyn Cache>) -> ImageService {
    ImageService::new(resolver, ProcessorRegistry::default()).with_cache(cache)
}

fn resolver() -> Arc<MemoryResolver> {
    Arc::new(MemoryResolver::new().with_source("page.png", create_test_png(120, 80)))
}

// =============================================================================
// Concurrent Writers
// =============================================================================

async fn racing_writers_keep_one_entry(cache: Arc<dyn Cache>) {
    let key = key();
    let first = vec![b'a'; 300_000];
    let second = vec![b'b'; 200_000];

    let write = |data: Vec<u8>| {
        let cache = Arc::clone(&cache);
        let key = key.clone();
        async move {
            let mut writer = cache.rendition_writer(&key).await.unwrap();
            for chunk in data.chunks(4096) {
                writer.write(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
            writer.commit().await.unwrap();
        }
    };
    let (a, b) = tokio::join!(
        tokio::spawn(write(first.clone())),
        tokio::spawn(write(second.clone()))
    );
    a.unwrap();
    b.unwrap();

    let stored = read_rendition(cache.as_ref(), &key).await.unwrap();
    assert!(stored == first || stored == second, "mixed rendition of {} bytes", stored.len());
}

#[tokio::test]
async fn test_racing_writers_memory() {
    racing_writers_keep_one_entry(Arc::new(MemoryCache::default())).await;
}

#[tokio::test]
async fn test_racing_writers_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    racing_writers_keep_one_entry(Arc::new(FilesystemCache::new(dir.path(), Ttl::INFINITE))).await;
}

#[tokio::test]
async fn test_abandoned_writer_leaves_previous_entry() {
    let dir = tempfile::tempdir().unwrap();
    let cache = FilesystemCache::new(dir.path(), Ttl::INFINITE);
    let key = key();

    let mut writer = cache.rendition_writer(&key).await.unwrap();
    writer.write(b"complete").await.unwrap();
    writer.commit().await.unwrap();

    let mut writer = cache.rendition_writer(&key).await.unwrap();
    writer.write(b"half").await.unwrap();
    drop(writer);

    assert_eq!(read_rendition(&cache, &key).await.unwrap(), b"complete");
}

// =============================================================================
// Service with Filesystem Cache
// =============================================================================

#[tokio::test]
async fn test_renditions_persist_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = resolver();
    let ops = OperationList::parse(REQUEST).unwrap();

    let first = service_with(
        resolver.clone(),
        Arc::new(FilesystemCache::new(dir.path(), Ttl::INFINITE)),
    );
    let rendered = first.render(&ops).await.unwrap();
    assert!(!rendered.cache_hit);

    let second = service_with(
        resolver.clone(),
        Arc::new(FilesystemCache::new(dir.path(), Ttl::INFINITE)),
    );
    let cached = second.render(&ops).await.unwrap();
    assert!(cached.cache_hit);
    assert_eq!(cached.data, rendered.data);
    assert_eq!(second.get_size("page.png").await.unwrap(), Size::new(120, 80));
    assert_eq!(resolver.resolve_count(), 1);
}

#[tokio::test]
async fn test_expired_rendition_is_rendered_again() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(FilesystemCache::new(dir.path(), Ttl::new(Duration::from_millis(500))));
    let service = service_with(resolver(), cache);
    let ops = OperationList::parse(REQUEST).unwrap();

    service.render(&ops).await.unwrap();
    assert!(service.render(&ops).await.unwrap().cache_hit);

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(!service.render(&ops).await.unwrap().cache_hit);
}

#[tokio::test]
async fn test_flush_expired_through_service() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(FilesystemCache::new(dir.path(), Ttl::new(Duration::from_millis(500))));
    let service = service_with(resolver(), cache.clone());
    service
        .render(&OperationList::parse(REQUEST).unwrap())
        .await
        .unwrap();

    assert_eq!(service.flush_expired().await.unwrap(), 0);
    tokio::time::sleep(Duration::from_millis(700)).await;

    // One dimension record and one rendition.
    assert_eq!(service.flush_expired().await.unwrap(), 2);
    assert_eq!(read_rendition(cache.as_ref(), &key()).await, None);
}

#[tokio::test]
async fn test_purge_removes_renditions_and_dimension() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(FilesystemCache::new(dir.path(), Ttl::INFINITE));
    let service = service_with(resolver(), cache.clone());
    service
        .render(&OperationList::parse(REQUEST).unwrap())
        .await
        .unwrap();

    service.purge("page.png").await.unwrap();
    assert_eq!(read_rendition(cache.as_ref(), &key()).await, None);
    assert_eq!(cache.get_dimension("page.png").await.unwrap(), None);
}

#[tokio::test]
async fn test_broken_cache_does_not_fail_requests() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let cache = Arc::new(FilesystemCache::new(blocker.join("cache"), Ttl::INFINITE));
    let service = service_with(resolver(), cache);
    let ops = OperationList::parse(REQUEST).unwrap();

    let first = service.render(&ops).await.unwrap();
    let second = service.render(&ops).await.unwrap();
    assert!(!first.cache_hit);
    assert!(!second.cache_hit);
    assert_eq!(first.data, second.data);
}
