use std::fmt;
use std::str::FromStr;

use super::{Operation, OutputFormat, Quality, Region, Rotation, Scale, Size};
use crate::error::ImageError;
use crate::source::SourceFormat;

/// Identifier, the four transforms, and the output format of one request.
///
/// The transforms are held in fixed slots so a list carries at most one of
/// each and always applies them as crop, scale, rotate, filter.
///
/// The [`Display`](fmt::Display) form is canonical:
/// `{identifier}/{region}/{size}/{rotation}/{quality}.{format}` with the
/// identifier percent-encoded. Parsing that string yields an equal list.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationList {
    identifier: String,
    region: Region,
    scale: Scale,
    rotation: Rotation,
    quality: Quality,
    format: OutputFormat,
}

impl OperationList {
    /// List that returns the whole source unchanged in `format`.
    pub fn new(identifier: impl Into<String>, format: OutputFormat) -> Self {
        Self {
            identifier: identifier.into(),
            region: Region::Full,
            scale: Scale::Full,
            rotation: Rotation::default(),
            quality: Quality::Default,
            format,
        }
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    pub fn with_scale(mut self, scale: Scale) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn scale(&self) -> &Scale {
        &self.scale
    }

    pub fn rotation(&self) -> &Rotation {
        &self.rotation
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// The transforms in the order they are applied.
    pub fn operations(&self) -> [&dyn Operation; 4] {
        [&self.region, &self.scale, &self.rotation, &self.quality]
    }

    /// Canonical string, used as the rendition cache key.
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// Size of the image this list produces from a `full`-sized source.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` when the region leaves no pixels.
    pub fn resulting_size(&self, full: Size) -> Result<Size, ImageError> {
        self.region.resolve(full)?;
        Ok(self
            .operations()
            .iter()
            .fold(full, |size, op| op.resulting_size(size)))
    }

    /// Whether the source bytes can be returned as they are.
    pub fn is_no_op(&self, source: SourceFormat) -> bool {
        self.operations().iter().all(|op| op.is_no_op())
            && source.as_output() == Some(self.format)
    }

    /// Parse `{identifier}/{region}/{size}/{rotation}/{quality}.{format}`.
    ///
    /// The identifier is percent-decoded. Unencoded slashes are kept as part
    /// of the identifier since the four parameters are split off the end.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for a missing segment or any malformed value.
    pub fn parse(path: &str) -> Result<Self, ImageError> {
        let mut parts = path.rsplitn(5, '/');
        let mut next = |name: &str| {
            parts
                .next()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| ImageError::InvalidParameter(format!("missing {} in {}", name, path)))
        };
        let quality_format = next("quality and format")?;
        let rotation = next("rotation")?;
        let size = next("size")?;
        let region = next("region")?;
        let identifier = next("identifier")?;

        let (quality, format) = quality_format.rsplit_once('.').ok_or_else(|| {
            ImageError::InvalidParameter(format!("missing format in {}", quality_format))
        })?;
        let identifier = urlencoding::decode(identifier)
            .map_err(|_| ImageError::InvalidParameter(format!("invalid identifier: {}", identifier)))?;

        Ok(Self {
            identifier: identifier.into_owned(),
            region: region.parse()?,
            scale: size.parse()?,
            rotation: rotation.parse()?,
            quality: quality.parse()?,
            format: format.parse()?,
        })
    }
}

impl fmt::Display for OperationList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}.{}",
            urlencoding::encode(&self.identifier),
            self.region,
            self.scale,
            self.rotation,
            self.quality,
            self.format
        )
    }
}

impl FromStr for OperationList {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationList::parse(s)
    }
}
