//! Processor kinds and the per-request decode/encode entry points.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, error};

use super::capabilities::{CapabilitySet, ProcessorFeature};
use super::pipeline;
use crate::decode::{FlatImage, ImageContainer, PyramidalTiff, TileAwareDecoder};
use crate::error::{DecodeError, ImageError};
use crate::io::RangeReader;
use crate::operation::{OperationList, OutputFormat, Quality, Size};
use crate::source::SourceFormat;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

// =============================================================================
// Processor Kinds
// =============================================================================

/// The closed set of processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProcessorKind {
    /// Random-access sources, pyramid-aware for tiled TIFF, every feature.
    Tiled,

    /// Any source, buffered and decoded in one piece. No arbitrary rotation.
    Stream,
}

impl ProcessorKind {
    pub const ALL: [ProcessorKind; 2] = [ProcessorKind::Tiled, ProcessorKind::Stream];

    pub fn name(&self) -> &'static str {
        match self {
            ProcessorKind::Tiled => "tiled",
            ProcessorKind::Stream => "stream",
        }
    }

    /// Whether this kind can only read seekable sources.
    pub fn requires_random_access(&self) -> bool {
        matches!(self, ProcessorKind::Tiled)
    }

    fn features(&self) -> impl Iterator<Item = ProcessorFeature> + '_ {
        ProcessorFeature::ALL.into_iter().filter(move |feature| {
            !(matches!(self, ProcessorKind::Stream)
                && *feature == ProcessorFeature::RotationArbitrary)
        })
    }

    /// Probe the image codec for what this kind can read and write.
    fn probe(&self) -> BTreeMap<SourceFormat, CapabilitySet> {
        let outputs: Vec<OutputFormat> = OutputFormat::ALL
            .into_iter()
            .filter(|format| {
                format
                    .image_format()
                    .is_some_and(|image_format| image_format.writing_enabled())
            })
            .collect();

        SourceFormat::KNOWN
            .into_iter()
            .filter(|format| {
                format
                    .image_format()
                    .is_some_and(|image_format| image_format.reading_enabled())
            })
            .map(|format| {
                let capabilities =
                    CapabilitySet::new(outputs.iter().copied(), self.features(), Quality::ALL);
                (format, capabilities)
            })
            .collect()
    }
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProcessorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tiled" => Ok(ProcessorKind::Tiled),
            "stream" => Ok(ProcessorKind::Stream),
            other => Err(format!(
                "unknown processor '{}', expected 'tiled' or 'stream'",
                other
            )),
        }
    }
}

// =============================================================================
// Processor
// =============================================================================

/// Settings shared by every processor of a registry.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub decoder: TileAwareDecoder,
    pub jpeg_quality: u8,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            decoder: TileAwareDecoder::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// A processor kind with its probed capabilities.
#[derive(Debug)]
pub struct Processor {
    kind: ProcessorKind,
    capabilities: BTreeMap<SourceFormat, CapabilitySet>,
    empty: CapabilitySet,
    settings: ProcessorSettings,
}

impl Processor {
    /// Build a processor, probing its capabilities once.
    pub fn new(kind: ProcessorKind, settings: ProcessorSettings) -> Self {
        let capabilities = kind.probe();
        debug!(
            processor = kind.name(),
            formats = capabilities.len(),
            "probed processor capabilities"
        );
        Self {
            kind,
            capabilities,
            empty: CapabilitySet::default(),
            settings,
        }
    }

    pub fn kind(&self) -> ProcessorKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn requires_random_access(&self) -> bool {
        self.kind.requires_random_access()
    }

    /// Capabilities for `format`; empty when the format cannot be read.
    pub fn capabilities(&self, format: SourceFormat) -> &CapabilitySet {
        self.capabilities.get(&format).unwrap_or(&self.empty)
    }

    fn backend_error(&self, err: impl fmt::Display) -> ImageError {
        ImageError::BackendExecution {
            processor: self.name().to_string(),
            message: err.to_string(),
        }
    }

    /// Open `reader` as a decodable container.
    ///
    /// The tiled processor reads tiled TIFFs level by level and falls back
    /// to whole-image decoding for everything else.
    ///
    /// # Errors
    ///
    /// `BackendExecution` when the codec cannot read the source.
    pub async fn open(
        &self,
        reader: Arc<dyn RangeReader>,
        format: SourceFormat,
    ) -> Result<Arc<dyn ImageContainer>, ImageError> {
        if self.kind == ProcessorKind::Tiled && format == SourceFormat::Tif {
            match PyramidalTiff::open(Arc::clone(&reader)).await {
                Ok(tiff) => {
                    debug!(
                        source = reader.identifier(),
                        levels = tiff.level_count(),
                        "opened pyramidal TIFF"
                    );
                    return Ok(Arc::new(tiff));
                }
                Err(err) => {
                    debug!(
                        source = reader.identifier(),
                        error = %err,
                        "not a tiled TIFF, decoding whole image"
                    );
                }
            }
        }

        let flat = FlatImage::open(reader.as_ref(), format.image_format())
            .await
            .map_err(|e| {
                error!(processor = self.name(), source = reader.identifier(), error = %e, "open failed");
                self.backend_error(e)
            })?;
        Ok(Arc::new(flat))
    }

    /// Full-resolution size of `reader`.
    ///
    /// # Errors
    ///
    /// `BackendExecution` when the codec cannot read the source.
    pub async fn read_size(
        &self,
        reader: Arc<dyn RangeReader>,
        format: SourceFormat,
    ) -> Result<Size, ImageError> {
        let container = self.open(reader, format).await?;
        container
            .full_size()
            .ok_or_else(|| self.backend_error("source has no resolution levels"))
    }

    /// Decode, transform and encode `container` according to `ops`.
    ///
    /// `full` is the size of the container's full-resolution level.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` when the region is empty after clipping,
    /// `BackendExecution` for any decode or encode failure.
    pub async fn process(
        &self,
        container: Arc<dyn ImageContainer>,
        ops: &OperationList,
        full: Size,
    ) -> Result<Vec<u8>, ImageError> {
        let raster = self
            .settings
            .decoder
            .decode(container, ops.region(), ops.scale())
            .await
            .map_err(|e| self.decode_error(ops, e))?;

        let ops_owned = ops.clone();
        let quality = self.settings.jpeg_quality;
        let encoded = tokio::task::spawn_blocking(move || {
            let image = pipeline::transform(raster, &ops_owned, full);
            pipeline::encode(&image, ops_owned.format(), quality)
        })
        .await
        .map_err(|e| self.backend_error(e))?;

        encoded.map_err(|e| self.decode_error(ops, e))
    }

    fn decode_error(&self, ops: &OperationList, err: DecodeError) -> ImageError {
        match err {
            DecodeError::EmptyRegion { width, height } => ImageError::InvalidParameter(format!(
                "region {} lies outside the {}x{} source",
                ops.region(),
                width,
                height
            )),
            other => {
                error!(
                    processor = self.name(),
                    request = %ops,
                    error = %other,
                    "processing failed"
                );
                self.backend_error(other)
            }
        }
    }
}
