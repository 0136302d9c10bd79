//! Fixed-order transform pipeline.
//!
//! ```text
//! DecodedRaster ─► crop ─► scale ─► mirror/rotate ─► filter ─► encode
//!                   │        │
//!                   │        └ target size computed at full resolution
//!                   └ skipped when the decoder already cropped
//! ```
//!
//! Every step is synchronous and CPU-bound; callers run the whole pipeline
//! on a blocking thread.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, Luma, Rgba, RgbaImage};

use crate::decode::DecodedRaster;
use crate::error::DecodeError;
use crate::operation::{Operation, OperationList, OutputFormat, Quality, Rotation, Size};

/// Luma value at or above which a bitonal pixel turns white.
pub const BITONAL_THRESHOLD: u8 = 128;

/// Apply crop, scale, rotation and filter of `ops` to a decoded raster.
///
/// `full` is the size of the source's full-resolution level. Geometry is
/// always computed in full-resolution coordinates and mapped onto the level
/// the raster came from.
pub fn transform(raster: DecodedRaster, ops: &OperationList, full: Size) -> DynamicImage {
    let crop = ops.region().rectangle(full);
    let mut image = raster.image;

    if !raster.hints.already_cropped {
        let (width, height) = image.dimensions();
        let rect = crop
            .scaled(raster.reduction.scale)
            .clip_to(Size::new(width, height));
        if (rect.x, rect.y, rect.width, rect.height) != (0, 0, width, height) {
            image = image.crop_imm(rect.x, rect.y, rect.width, rect.height);
        }
    }

    let target = ops.scale().resulting_size(crop.size());
    image = resize(image, target);
    image = rotate(image, ops.rotation());
    filter(image, ops.quality())
}

fn resize(image: DynamicImage, target: Size) -> DynamicImage {
    let (width, height) = image.dimensions();
    if (width, height) == (target.width, target.height) || target.is_empty() {
        return image;
    }
    let shrinking = target.width < width || target.height < height;
    let filter = if shrinking {
        FilterType::CatmullRom
    } else {
        FilterType::Triangle
    };
    image.resize_exact(target.width, target.height, filter)
}

/// Mirror horizontally, then rotate clockwise.
fn rotate(image: DynamicImage, rotation: &Rotation) -> DynamicImage {
    let image = if rotation.mirror() { image.fliph() } else { image };
    match rotation.degrees() {
        d if d == 0.0 => image,
        d if d == 90.0 => image.rotate90(),
        d if d == 180.0 => image.rotate180(),
        d if d == 270.0 => image.rotate270(),
        d => DynamicImage::ImageRgba8(rotate_arbitrary(&image.to_rgba8(), d, rotation)),
    }
}

/// Rotate by `degrees` clockwise onto a transparent canvas sized to the
/// rotated bounding box, sampling bilinearly.
fn rotate_arbitrary(source: &RgbaImage, degrees: f64, rotation: &Rotation) -> RgbaImage {
    let (src_w, src_h) = source.dimensions();
    let out = rotation.resulting_size(Size::new(src_w, src_h));
    let mut canvas = RgbaImage::new(out.width.max(1), out.height.max(1));

    let (sin, cos) = degrees.to_radians().sin_cos();
    let src_cx = src_w as f64 / 2.0;
    let src_cy = src_h as f64 / 2.0;
    let out_cx = canvas.width() as f64 / 2.0;
    let out_cy = canvas.height() as f64 / 2.0;

    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        let dx = x as f64 + 0.5 - out_cx;
        let dy = y as f64 + 0.5 - out_cy;
        // inverse of a clockwise rotation in y-down coordinates
        let sx = dx * cos + dy * sin + src_cx - 0.5;
        let sy = -dx * sin + dy * cos + src_cy - 0.5;
        if let Some(sampled) = sample_bilinear(source, sx, sy) {
            *pixel = sampled;
        }
    }
    canvas
}

fn sample_bilinear(source: &RgbaImage, x: f64, y: f64) -> Option<Rgba<u8>> {
    let (w, h) = source.dimensions();
    if x < -0.5 || y < -0.5 || x > w as f64 - 0.5 || y > h as f64 - 0.5 {
        return None;
    }
    let x = x.clamp(0.0, (w - 1) as f64);
    let y = y.clamp(0.0, (h - 1) as f64);
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (fx, fy) = (x - x0 as f64, y - y0 as f64);

    let p00 = source.get_pixel(x0, y0).0;
    let p10 = source.get_pixel(x1, y0).0;
    let p01 = source.get_pixel(x0, y1).0;
    let p11 = source.get_pixel(x1, y1).0;

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Some(Rgba(out))
}

fn filter(image: DynamicImage, quality: Quality) -> DynamicImage {
    match quality {
        Quality::Default | Quality::Color => image,
        Quality::Gray => DynamicImage::ImageLuma8(image.to_luma8()),
        Quality::Bitonal => {
            let luma = image.to_luma8();
            let (w, h) = luma.dimensions();
            let bitonal = GrayImage::from_fn(w, h, |x, y| {
                if luma.get_pixel(x, y).0[0] >= BITONAL_THRESHOLD {
                    Luma([255])
                } else {
                    Luma([0])
                }
            });
            DynamicImage::ImageLuma8(bitonal)
        }
    }
}

/// Encode `image` as `format`.
///
/// # Errors
///
/// `DecodeError::Codec` when the format has no encoder or encoding fails.
pub fn encode(
    image: &DynamicImage,
    format: OutputFormat,
    jpeg_quality: u8,
) -> Result<Vec<u8>, DecodeError> {
    let image_format = format
        .image_format()
        .ok_or_else(|| DecodeError::Codec(format!("no encoder for {}", format)))?;
    let mut out = Vec::new();

    match format {
        OutputFormat::Jpg => {
            let mut encoder = JpegEncoder::new_with_quality(&mut out, jpeg_quality.clamp(1, 100));
            let result = match image {
                DynamicImage::ImageLuma8(gray) => encoder.encode_image(gray),
                other => encoder.encode_image(&other.to_rgb8()),
            };
            result.map_err(|e| DecodeError::Codec(e.to_string()))?;
        }
        OutputFormat::Gif => {
            DynamicImage::ImageRgba8(image.to_rgba8())
                .write_to(&mut Cursor::new(&mut out), image_format)
                .map_err(|e| DecodeError::Codec(e.to_string()))?;
        }
        OutputFormat::Webp | OutputFormat::Tif => {
            let normalized = match image {
                DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image.clone(),
                DynamicImage::ImageLuma8(_) if format == OutputFormat::Tif => image.clone(),
                other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
                other => DynamicImage::ImageRgb8(other.to_rgb8()),
            };
            normalized
                .write_to(&mut Cursor::new(&mut out), image_format)
                .map_err(|e| DecodeError::Codec(e.to_string()))?;
        }
        _ => {
            image
                .write_to(&mut Cursor::new(&mut out), image_format)
                .map_err(|e| DecodeError::Codec(e.to_string()))?;
        }
    }
    Ok(out)
}
