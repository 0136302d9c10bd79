//! Processors: capability declaration, negotiation and the transform pipeline.
//!
//! A [`Processor`] is one of a closed set of [`ProcessorKind`]s. Each kind
//! declares a [`CapabilitySet`] per source format, probed from the image
//! codec when the [`ProcessorRegistry`] is built. The registry picks the
//! processor for a request and validates it against those declarations;
//! [`ComplianceLevel::compute`] turns the same declarations into a protocol
//! tier.

mod capabilities;
mod compliance;
mod kind;
pub mod pipeline;
mod registry;

pub use capabilities::{required_features, CapabilitySet, ProcessorFeature};
pub use compliance::ComplianceLevel;
pub use kind::{Processor, ProcessorKind, ProcessorSettings, DEFAULT_JPEG_QUALITY};
pub use registry::ProcessorRegistry;
