//! Pyramidal TIFF decoding tests.
//!
//! These tests build real tiled TIFF files and verify that:
//! - The directory chain is read as a resolution pyramid
//! - Only the tiles covering a region are fetched
//! - The smallest sufficient level is decoded for a downscale

use std::sync::Arc;
use std::time::Duration;

use iiif_streamer::decode::{ImageContainer, PyramidalTiff, TileAwareDecoder, TileLayout};
use iiif_streamer::error::{DecodeError, TiffError};
use iiif_streamer::io::RangeReader;
use iiif_streamer::operation::{Region, Scale, Size};

use super::test_utils::{gradient_pixel, PyramidBuilder, TrackingReader};

const TILE: u32 = 64;

fn pyramid_reader() -> TrackingReader {
    let data = PyramidBuilder::new(256, 192, TILE)
        .with_halvings(2)
        .build_gradient();
    TrackingReader::new(data, "mem://pyramid.tif")
}

async fn open(reader: &TrackingReader) -> Arc<dyn ImageContainer> {
    let reader: Arc<dyn RangeReader> = Arc::new(reader.clone());
    Arc::new(PyramidalTiff::open(reader).await.unwrap())
}

// =============================================================================
// Structure
// =============================================================================

#[tokio::test]
async fn test_open_reads_every_level() {
    let reader = pyramid_reader();
    let container = open(&reader).await;

    assert_eq!(container.level_count(), 3);
    assert_eq!(
        container.level_sizes(),
        vec![Size::new(256, 192), Size::new(128, 96), Size::new(64, 48)]
    );
    assert_eq!(
        container.tile_layout(0),
        Some(TileLayout {
            tile_width: TILE,
            tile_height: TILE,
            tiles_across: 4,
            tiles_down: 3,
        })
    );
    assert_eq!(container.tile_layout(2).unwrap().tiles_across, 1);
}

#[tokio::test]
async fn test_open_rejects_non_tiff() {
    let reader: Arc<dyn RangeReader> =
        Arc::new(TrackingReader::new(b"not a tiff file at all".to_vec(), "mem://x"));
    let result = PyramidalTiff::open(reader).await;
    assert!(matches!(result, Err(TiffError::InvalidMagic(_))));
}

#[tokio::test]
async fn test_decode_single_tile_pixels() {
    let reader = pyramid_reader();
    let container = open(&reader).await;

    let tile = container.decode_tile(0, 2, 1).await.unwrap().to_rgb8();
    assert_eq!((tile.width(), tile.height()), (TILE, TILE));
    let [r, g, _] = gradient_pixel(2 * TILE + 5, TILE + 7);
    assert_eq!(tile.get_pixel(5, 7).0, [r, g, 0]);
}

// =============================================================================
// Tile-Aware Reads
// =============================================================================

#[tokio::test]
async fn test_region_reads_only_covering_tiles() {
    let reader = pyramid_reader();
    let container = open(&reader).await;
    reader.reset_tracking();

    let region = Region::pixels(64, 64, 64, 64).unwrap();
    let raster = TileAwareDecoder::default()
        .decode(container, &region, &Scale::Full)
        .await
        .unwrap();

    assert_eq!(raster.level, 0);
    assert!(raster.hints.already_cropped);
    assert_eq!((raster.image.width(), raster.image.height()), (64, 64));
    assert_eq!(raster.image.to_rgb8().get_pixel(0, 0).0, [64, 64, 0]);

    // Exactly one tile of uncompressed RGB was fetched.
    assert_eq!(reader.request_count(), 1);
    assert_eq!(reader.bytes_read(), (TILE * TILE * 3) as usize);
}

#[tokio::test]
async fn test_region_spanning_tiles_is_assembled() {
    let reader = pyramid_reader();
    let container = open(&reader).await;
    reader.reset_tracking();

    let region = Region::pixels(40, 50, 100, 60).unwrap();
    let raster = TileAwareDecoder::new(4, Duration::from_secs(10))
        .decode(container, &region, &Scale::Full)
        .await
        .unwrap();

    // Columns 0..=2, rows 0..=1.
    assert_eq!(reader.request_count(), 6);
    let image = raster.image.to_rgb8();
    assert_eq!((image.width(), image.height()), (100, 60));
    for (x, y) in [(0, 0), (99, 0), (0, 59), (99, 59), (30, 20)] {
        let [r, g, _] = gradient_pixel(40 + x, 50 + y);
        assert_eq!(image.get_pixel(x, y).0, [r, g, 0], "pixel ({}, {})", x, y);
    }
}

#[tokio::test]
async fn test_single_worker_matches_pool() {
    let reader = pyramid_reader();
    let region = Region::pixels(10, 10, 200, 150).unwrap();

    let pooled = TileAwareDecoder::new(8, Duration::from_secs(10))
        .decode(open(&reader).await, &region, &Scale::Full)
        .await
        .unwrap();
    let inline = TileAwareDecoder::new(1, Duration::from_secs(10))
        .decode(open(&reader).await, &region, &Scale::Full)
        .await
        .unwrap();

    assert_eq!(pooled.image.to_rgb8(), inline.image.to_rgb8());
}

#[tokio::test]
async fn test_region_clipped_at_edge() {
    let reader = pyramid_reader();
    let container = open(&reader).await;

    let region = Region::pixels(200, 150, 500, 500).unwrap();
    let raster = TileAwareDecoder::default()
        .decode(container, &region, &Scale::Full)
        .await
        .unwrap();
    assert_eq!((raster.image.width(), raster.image.height()), (56, 42));
}

#[tokio::test]
async fn test_region_outside_image_is_empty() {
    let reader = pyramid_reader();
    let container = open(&reader).await;

    let region = Region::pixels(300, 0, 10, 10).unwrap();
    let result = TileAwareDecoder::default()
        .decode(container, &region, &Scale::Full)
        .await;
    assert!(matches!(result, Err(DecodeError::EmptyRegion { .. })));
}

// =============================================================================
// Level Selection
// =============================================================================

#[tokio::test]
async fn test_downscale_uses_reduced_level() {
    let reader = pyramid_reader();
    let container = open(&reader).await;
    reader.reset_tracking();

    let raster = TileAwareDecoder::default()
        .decode(container, &Region::Full, &Scale::fit_width(64).unwrap())
        .await
        .unwrap();

    assert_eq!(raster.level, 2);
    assert_eq!((raster.image.width(), raster.image.height()), (64, 48));
    assert_eq!(raster.image.to_rgb8().get_pixel(10, 10).0[2], 100);
    assert_eq!(reader.request_count(), 1);
}

#[tokio::test]
async fn test_downscaled_region_maps_into_level_space() {
    let reader = pyramid_reader();
    let container = open(&reader).await;

    // 64px out of a 128px crop needs half density: the 128px-wide level.
    let region = Region::pixels(128, 64, 128, 128).unwrap();
    let raster = TileAwareDecoder::default()
        .decode(container, &region, &Scale::fit_width(64).unwrap())
        .await
        .unwrap();

    assert_eq!(raster.level, 1);
    let image = raster.image.to_rgb8();
    assert_eq!((image.width(), image.height()), (64, 64));
    let [r, g, _] = gradient_pixel(128, 64);
    assert_eq!(image.get_pixel(0, 0).0, [r, g, 50]);
}

#[tokio::test]
async fn test_cropped_percent_is_measured_against_full_size() {
    let reader = pyramid_reader();

    // 0.5 * 256 / 128 = 1.0: only the full level qualifies.
    let container = open(&reader).await;
    let region = Region::pixels(128, 64, 128, 128).unwrap();
    let raster = TileAwareDecoder::default()
        .decode(container, &region, &Scale::percent(0.5).unwrap())
        .await
        .unwrap();
    assert_eq!(raster.level, 0);
    assert!((raster.reduction.scale - 1.0).abs() < 1e-9);
    assert_eq!((raster.image.width(), raster.image.height()), (128, 128));
    assert_eq!(raster.image.to_rgb8().get_pixel(0, 0).0[2], 0);

    // Full width, half height: 0.25 * 192 / 96 = 0.5 selects level 1.
    let container = open(&reader).await;
    let region = Region::pixels(0, 0, 256, 96).unwrap();
    let raster = TileAwareDecoder::default()
        .decode(container, &region, &Scale::percent(0.25).unwrap())
        .await
        .unwrap();
    assert_eq!(raster.level, 1);
    assert!((raster.reduction.scale - 0.5).abs() < 1e-9);
    assert_eq!((raster.image.width(), raster.image.height()), (128, 48));

    // Uncropped, the percent maps straight onto the level scale.
    let container = open(&reader).await;
    let raster = TileAwareDecoder::default()
        .decode(container, &Region::Full, &Scale::percent(0.25).unwrap())
        .await
        .unwrap();
    assert_eq!(raster.level, 2);
}
