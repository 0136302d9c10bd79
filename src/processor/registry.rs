//! Processor negotiation.
//!
//! ```text
//! source format ──► assignment? ──► fallback? ──► Configuration error
//!                        │              │
//!                        └──────┬───────┘
//!                               ▼
//!                 capabilities(format) empty? ──► UnsupportedSourceFormat
//!                               │
//!                 output format declared?  ────► UnsupportedOutputFormat
//!                               │
//!                 byte source compatible?  ────► Configuration error
//!                               │
//!                 required features declared? ─► InvalidParameter
//! ```

use std::collections::HashMap;

use tracing::debug;

use super::capabilities::required_features;
use super::compliance::ComplianceLevel;
use super::kind::{Processor, ProcessorKind, ProcessorSettings};
use crate::error::ImageError;
use crate::operation::{OperationList, OutputFormat, Size};
use crate::source::{ByteSource, SourceFormat};

/// Maps source formats to processors.
///
/// Built once at startup and shared by handle; every processor kind is
/// probed exactly once, when the registry is created.
#[derive(Debug)]
pub struct ProcessorRegistry {
    processors: HashMap<ProcessorKind, Processor>,
    assignments: HashMap<SourceFormat, ProcessorKind>,
    fallback: Option<ProcessorKind>,
}

impl ProcessorRegistry {
    /// Registry with no assignments and the tiled processor as fallback.
    pub fn new(settings: ProcessorSettings) -> Self {
        let processors = ProcessorKind::ALL
            .into_iter()
            .map(|kind| (kind, Processor::new(kind, settings.clone())))
            .collect();
        Self {
            processors,
            assignments: HashMap::new(),
            fallback: Some(ProcessorKind::Tiled),
        }
    }

    /// Use `kind` for sources in `format`.
    pub fn with_assignment(mut self, format: SourceFormat, kind: ProcessorKind) -> Self {
        self.assignments.insert(format, kind);
        self
    }

    /// Processor for formats without an assignment; `None` rejects them.
    pub fn with_fallback(mut self, kind: Option<ProcessorKind>) -> Self {
        self.fallback = kind;
        self
    }

    pub fn processor(&self, kind: ProcessorKind) -> Option<&Processor> {
        self.processors.get(&kind)
    }

    /// Processor configured for `format`.
    ///
    /// # Errors
    ///
    /// `Configuration` when neither an assignment nor a fallback exists,
    /// `UnsupportedSourceFormat` when the processor cannot read `format`.
    pub fn processor_for(&self, format: SourceFormat) -> Result<&Processor, ImageError> {
        let kind = self
            .assignments
            .get(&format)
            .copied()
            .or(self.fallback)
            .ok_or_else(|| {
                ImageError::Configuration(format!("no processor configured for {}", format))
            })?;
        let processor = self.processors.get(&kind).ok_or_else(|| {
            ImageError::Configuration(format!("processor {} is not available", kind))
        })?;

        if processor.capabilities(format).is_empty() {
            return Err(ImageError::UnsupportedSourceFormat(format.to_string()));
        }
        Ok(processor)
    }

    /// Processor able to turn `format` into `output`.
    ///
    /// # Errors
    ///
    /// As [`ProcessorRegistry::processor_for`], plus `UnsupportedOutputFormat`.
    pub fn negotiate(
        &self,
        format: SourceFormat,
        output: OutputFormat,
    ) -> Result<&Processor, ImageError> {
        let processor = self.processor_for(format)?;
        if !processor.capabilities(format).supports_output(output) {
            return Err(ImageError::UnsupportedOutputFormat {
                processor: processor.name().to_string(),
                format: output.to_string(),
            });
        }
        debug!(source_format = %format, output = %output, processor = processor.name(), "negotiated processor");
        Ok(processor)
    }

    /// Reject a sequential source for a processor that needs random access.
    ///
    /// # Errors
    ///
    /// `Configuration`, since only a misconfigured resolver/processor pairing
    /// produces this.
    pub fn check_source(processor: &Processor, source: &ByteSource) -> Result<(), ImageError> {
        if processor.requires_random_access() && !source.is_random_access() {
            return Err(ImageError::Configuration(format!(
                "the {} processor requires random access but the source is sequential",
                processor.name()
            )));
        }
        Ok(())
    }

    /// Reject requests needing a feature or quality the processor lacks.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` naming the first missing feature or the quality.
    pub fn check_request(
        processor: &Processor,
        format: SourceFormat,
        ops: &OperationList,
        full: Size,
    ) -> Result<(), ImageError> {
        let capabilities = processor.capabilities(format);
        if let Some(missing) = required_features(ops, full)
            .into_iter()
            .find(|feature| !capabilities.supports_feature(*feature))
        {
            return Err(ImageError::InvalidParameter(format!(
                "the {} processor does not support {}",
                processor.name(),
                missing
            )));
        }
        if !capabilities.supports_quality(ops.quality()) {
            return Err(ImageError::InvalidParameter(format!(
                "the {} processor does not support {} quality",
                processor.name(),
                ops.quality()
            )));
        }
        Ok(())
    }

    /// Compliance level of the processor serving `format`.
    ///
    /// # Errors
    ///
    /// As [`ProcessorRegistry::processor_for`].
    pub fn compliance_level(&self, format: SourceFormat) -> Result<ComplianceLevel, ImageError> {
        let processor = self.processor_for(format)?;
        Ok(ComplianceLevel::compute(processor.capabilities(format)))
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new(ProcessorSettings::default())
    }
}
