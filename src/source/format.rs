//! Source format detection.
//!
//! The identifier's extension is trusted first, matching how sources are
//! usually named. When the extension is missing or unknown the first bytes
//! of the source are sniffed for a magic number.

use std::fmt;

use image::ImageFormat;

use crate::operation::OutputFormat;

// =============================================================================
// SourceFormat
// =============================================================================

/// Encoding of a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceFormat {
    Bmp,
    Gif,
    Jp2,
    Jpg,
    Pdf,
    Png,
    Tif,
    Webp,
    Unknown,
}

/// Bytes needed by [`SourceFormat::sniff`].
pub const SNIFF_LEN: usize = 12;

impl SourceFormat {
    pub const KNOWN: [SourceFormat; 8] = [
        SourceFormat::Bmp,
        SourceFormat::Gif,
        SourceFormat::Jp2,
        SourceFormat::Jpg,
        SourceFormat::Pdf,
        SourceFormat::Png,
        SourceFormat::Tif,
        SourceFormat::Webp,
    ];

    /// Canonical short name, also accepted by [`SourceFormat::from_name`].
    pub const fn name(&self) -> &'static str {
        match self {
            SourceFormat::Bmp => "bmp",
            SourceFormat::Gif => "gif",
            SourceFormat::Jp2 => "jp2",
            SourceFormat::Jpg => "jpg",
            SourceFormat::Pdf => "pdf",
            SourceFormat::Png => "png",
            SourceFormat::Tif => "tif",
            SourceFormat::Webp => "webp",
            SourceFormat::Unknown => "unknown",
        }
    }

    /// Parse a format name or file extension, case-insensitively.
    pub fn from_name(name: &str) -> SourceFormat {
        match name.to_ascii_lowercase().as_str() {
            "bmp" => SourceFormat::Bmp,
            "gif" => SourceFormat::Gif,
            "jp2" | "j2k" | "jpx" => SourceFormat::Jp2,
            "jpg" | "jpeg" => SourceFormat::Jpg,
            "pdf" => SourceFormat::Pdf,
            "png" => SourceFormat::Png,
            "tif" | "tiff" | "ptif" | "svs" => SourceFormat::Tif,
            "webp" => SourceFormat::Webp,
            _ => SourceFormat::Unknown,
        }
    }

    /// Format implied by the extension of `identifier`.
    pub fn from_identifier(identifier: &str) -> SourceFormat {
        let file_name = identifier.rsplit('/').next().unwrap_or(identifier);
        match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => SourceFormat::from_name(ext),
            _ => SourceFormat::Unknown,
        }
    }

    /// Identify a format from its leading magic bytes.
    pub fn sniff(header: &[u8]) -> SourceFormat {
        let starts = |magic: &[u8]| header.starts_with(magic);

        if starts(b"II*\0") || starts(b"MM\0*") || starts(b"II+\0") || starts(b"MM\0+") {
            SourceFormat::Tif
        } else if starts(&[0xFF, 0xD8, 0xFF]) {
            SourceFormat::Jpg
        } else if starts(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            SourceFormat::Png
        } else if starts(b"GIF87a") || starts(b"GIF89a") {
            SourceFormat::Gif
        } else if starts(b"BM") {
            SourceFormat::Bmp
        } else if starts(b"%PDF") {
            SourceFormat::Pdf
        } else if header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WEBP" {
            SourceFormat::Webp
        } else if starts(&[0x00, 0x00, 0x00, 0x0C, b'j', b'P', b' ', b' '])
            || starts(&[0xFF, 0x4F, 0xFF, 0x51])
        {
            SourceFormat::Jp2
        } else {
            SourceFormat::Unknown
        }
    }

    /// Codec used to read this format, if the image crate has one.
    pub fn image_format(&self) -> Option<ImageFormat> {
        match self {
            SourceFormat::Bmp => Some(ImageFormat::Bmp),
            SourceFormat::Gif => Some(ImageFormat::Gif),
            SourceFormat::Jpg => Some(ImageFormat::Jpeg),
            SourceFormat::Png => Some(ImageFormat::Png),
            SourceFormat::Tif => Some(ImageFormat::Tiff),
            SourceFormat::Webp => Some(ImageFormat::WebP),
            SourceFormat::Jp2 | SourceFormat::Pdf | SourceFormat::Unknown => None,
        }
    }

    /// Output format producing byte-identical files, used for pass-through.
    pub fn as_output(&self) -> Option<OutputFormat> {
        match self {
            SourceFormat::Gif => Some(OutputFormat::Gif),
            SourceFormat::Jp2 => Some(OutputFormat::Jp2),
            SourceFormat::Jpg => Some(OutputFormat::Jpg),
            SourceFormat::Pdf => Some(OutputFormat::Pdf),
            SourceFormat::Png => Some(OutputFormat::Png),
            SourceFormat::Tif => Some(OutputFormat::Tif),
            SourceFormat::Webp => Some(OutputFormat::Webp),
            SourceFormat::Bmp | SourceFormat::Unknown => None,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
