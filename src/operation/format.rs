use std::fmt;
use std::str::FromStr;

use image::ImageFormat;

use crate::error::ImageError;

/// Encoded output format, named by its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutputFormat {
    Gif,
    Jp2,
    Jpg,
    Pdf,
    Png,
    Tif,
    Webp,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 7] = [
        OutputFormat::Gif,
        OutputFormat::Jp2,
        OutputFormat::Jpg,
        OutputFormat::Pdf,
        OutputFormat::Png,
        OutputFormat::Tif,
        OutputFormat::Webp,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Gif => "gif",
            OutputFormat::Jp2 => "jp2",
            OutputFormat::Jpg => "jpg",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Png => "png",
            OutputFormat::Tif => "tif",
            OutputFormat::Webp => "webp",
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            OutputFormat::Gif => "image/gif",
            OutputFormat::Jp2 => "image/jp2",
            OutputFormat::Jpg => "image/jpeg",
            OutputFormat::Pdf => "application/pdf",
            OutputFormat::Png => "image/png",
            OutputFormat::Tif => "image/tiff",
            OutputFormat::Webp => "image/webp",
        }
    }

    /// Codec used to write this format, if the image crate has one.
    pub fn image_format(&self) -> Option<ImageFormat> {
        match self {
            OutputFormat::Gif => Some(ImageFormat::Gif),
            OutputFormat::Jpg => Some(ImageFormat::Jpeg),
            OutputFormat::Png => Some(ImageFormat::Png),
            OutputFormat::Tif => Some(ImageFormat::Tiff),
            OutputFormat::Webp => Some(ImageFormat::WebP),
            OutputFormat::Jp2 | OutputFormat::Pdf => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputFormat::ALL
            .into_iter()
            .find(|f| f.extension() == s)
            .ok_or_else(|| ImageError::InvalidParameter(format!("invalid format: {}", s)))
    }
}
