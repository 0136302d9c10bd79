//! End-to-end rendering tests.
//!
//! These tests run requests through the image service and check the
//! decoded output of each stage: crop, scale, rotate, filter and encode.

use std::sync::Arc;

use image::{ColorType, DynamicImage};

use iiif_streamer::error::ImageError;
use iiif_streamer::operation::OperationList;
use iiif_streamer::processor::{ProcessorKind, ProcessorRegistry};
use iiif_streamer::service::ImageService;
use iiif_streamer::source::SourceFormat;

use super::test_utils::{create_test_png, gradient_pixel, MemoryResolver, PyramidBuilder};

fn service() -> ImageService {
    let resolver = MemoryResolver::new()
        .with_source("page.png", create_test_png(594, 522))
        .with_source("square.png", create_test_png(100, 100))
        .with_source(
            "slide.tif",
            PyramidBuilder::new(256, 192, 64)
                .with_halvings(2)
                .build_gradient(),
        );
    ImageService::new(Arc::new(resolver), ProcessorRegistry::default())
}

async fn render(service: &ImageService, request: &str) -> DynamicImage {
    let ops = OperationList::parse(request).unwrap();
    let rendition = service.render(&ops).await.unwrap();
    image::load_from_memory(&rendition.data).unwrap()
}

fn rgb(image: &DynamicImage, x: u32, y: u32) -> [u8; 3] {
    image.to_rgb8().get_pixel(x, y).0
}

// =============================================================================
// Crop and Scale
// =============================================================================

#[tokio::test]
async fn test_percent_region_then_percent_size() {
    let service = service();
    let image = render(&service, "page.png/pct:20,20,50,50/pct:50/0/default.png").await;
    assert_eq!((image.width(), image.height()), (149, 131));
}

#[tokio::test]
async fn test_percent_region_keeps_source_pixels() {
    let service = service();
    let image = render(&service, "page.png/pct:20,20,50,50/full/0/default.png").await;
    assert_eq!((image.width(), image.height()), (297, 261));
    assert_eq!(rgb(&image, 0, 0), gradient_pixel(119, 104));
}

#[tokio::test]
async fn test_tiled_crop_is_pixel_exact() {
    let service = service();
    let image = render(&service, "slide.tif/64,64,128,64/full/0/default.png").await;
    assert_eq!((image.width(), image.height()), (128, 64));

    for (x, y) in [(0, 0), (127, 0), (5, 63), (100, 30)] {
        let [r, g, _] = gradient_pixel(64 + x, 64 + y);
        assert_eq!(rgb(&image, x, y), [r, g, 0]);
    }
}

#[tokio::test]
async fn test_fit_width_reads_reduced_level() {
    let service = service();
    let image = render(&service, "slide.tif/full/64,/0/default.png").await;
    assert_eq!((image.width(), image.height()), (64, 48));
    // Blue carries the level index times 50.
    assert_eq!(rgb(&image, 20, 20)[2], 100);
}

#[tokio::test]
async fn test_fit_inside_and_forced_size() {
    let service = service();
    let image = render(&service, "page.png/full/!100,100/0/default.png").await;
    assert_eq!((image.width(), image.height()), (100, 88));

    let image = render(&service, "page.png/full/50,70/0/default.png").await;
    assert_eq!((image.width(), image.height()), (50, 70));
}

#[tokio::test]
async fn test_region_outside_source_is_invalid() {
    let service = service();
    let ops = OperationList::parse("page.png/600,0,10,10/full/0/default.png").unwrap();
    let err = service.render(&ops).await.unwrap_err();
    assert!(matches!(err, ImageError::InvalidParameter(_)));
}

// =============================================================================
// Rotation
// =============================================================================

#[tokio::test]
async fn test_rotate_90_swaps_dimensions() {
    let service = service();
    let image = render(&service, "slide.tif/0,0,100,50/full/90/default.png").await;
    assert_eq!((image.width(), image.height()), (50, 100));

    // Clockwise: the bottom-left source pixel lands top-left.
    let [r, g, _] = gradient_pixel(0, 49);
    assert_eq!(rgb(&image, 0, 0), [r, g, 0]);
}

#[tokio::test]
async fn test_mirror_flips_horizontally() {
    let service = service();
    let image = render(&service, "slide.tif/0,0,100,50/full/!0/default.png").await;
    assert_eq!((image.width(), image.height()), (100, 50));

    let [r, g, _] = gradient_pixel(99, 0);
    assert_eq!(rgb(&image, 0, 0), [r, g, 0]);
}

#[tokio::test]
async fn test_arbitrary_rotation_expands_canvas() {
    let service = service();
    let image = render(&service, "square.png/full/full/45/default.png").await;
    assert_eq!((image.width(), image.height()), (141, 141));
    assert!(image.color().has_alpha());
    assert_eq!(image.to_rgba8().get_pixel(0, 0).0[3], 0);
    assert_eq!(image.to_rgba8().get_pixel(70, 70).0[3], 255);
}

#[tokio::test]
async fn test_stream_processor_cannot_rotate_arbitrarily() {
    let resolver = MemoryResolver::new().with_source("square.png", create_test_png(100, 100));
    let registry = ProcessorRegistry::default().with_assignment(SourceFormat::Png, ProcessorKind::Stream);
    let service = ImageService::new(Arc::new(resolver), registry);

    let ops = OperationList::parse("square.png/full/full/45/default.png").unwrap();
    let err = service.render(&ops).await.unwrap_err();
    assert!(matches!(err, ImageError::InvalidParameter(_)));

    let ops = OperationList::parse("square.png/full/full/90/default.png").unwrap();
    assert!(service.render(&ops).await.is_ok());
}

// =============================================================================
// Quality and Encoding
// =============================================================================

#[tokio::test]
async fn test_gray_quality() {
    let service = service();
    let image = render(&service, "page.png/full/100,/0/gray.png").await;
    assert_eq!(image.color(), ColorType::L8);
}

#[tokio::test]
async fn test_bitonal_quality() {
    let service = service();
    let image = render(&service, "page.png/0,0,200,200/full/0/bitonal.png").await;
    assert!(image
        .to_luma8()
        .pixels()
        .all(|p| p.0[0] == 0 || p.0[0] == 255));
}

#[tokio::test]
async fn test_jpeg_output() {
    let service = service();
    let ops = OperationList::parse("slide.tif/full/128,/0/default.jpg").unwrap();
    let rendition = service.render(&ops).await.unwrap();

    assert_eq!(rendition.media_type, "image/jpeg");
    assert_eq!(&rendition.data[..2], &[0xFF, 0xD8]);
    let image = image::load_from_memory(&rendition.data).unwrap();
    assert_eq!((image.width(), image.height()), (128, 96));
}

#[tokio::test]
async fn test_unwritable_output_format() {
    let service = service();
    let ops = OperationList::parse("page.png/full/full/0/default.jp2").unwrap();
    let err = service.render(&ops).await.unwrap_err();
    assert!(matches!(err, ImageError::UnsupportedOutputFormat { .. }));
}
