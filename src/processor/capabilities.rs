//! What a processor can do for one source format.

use std::collections::BTreeSet;
use std::fmt;

use crate::operation::{Operation, OperationList, OutputFormat, Quality, Region, Scale, Size};

/// Optional transform a processor may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProcessorFeature {
    Mirroring,
    RegionByPercent,
    RegionByPixels,
    RotationArbitrary,
    RotationBy90s,
    SizeAboveFull,
    SizeByForcedWidthHeight,
    SizeByHeight,
    SizeByPercent,
    SizeByWidth,
    SizeByWidthHeight,
}

impl ProcessorFeature {
    pub const ALL: [ProcessorFeature; 11] = [
        ProcessorFeature::Mirroring,
        ProcessorFeature::RegionByPercent,
        ProcessorFeature::RegionByPixels,
        ProcessorFeature::RotationArbitrary,
        ProcessorFeature::RotationBy90s,
        ProcessorFeature::SizeAboveFull,
        ProcessorFeature::SizeByForcedWidthHeight,
        ProcessorFeature::SizeByHeight,
        ProcessorFeature::SizeByPercent,
        ProcessorFeature::SizeByWidth,
        ProcessorFeature::SizeByWidthHeight,
    ];

    /// Protocol name of the feature.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorFeature::Mirroring => "mirroring",
            ProcessorFeature::RegionByPercent => "regionByPct",
            ProcessorFeature::RegionByPixels => "regionByPx",
            ProcessorFeature::RotationArbitrary => "rotationArbitrary",
            ProcessorFeature::RotationBy90s => "rotationBy90s",
            ProcessorFeature::SizeAboveFull => "sizeAboveFull",
            ProcessorFeature::SizeByForcedWidthHeight => "sizeByForcedWh",
            ProcessorFeature::SizeByHeight => "sizeByH",
            ProcessorFeature::SizeByPercent => "sizeByPct",
            ProcessorFeature::SizeByWidth => "sizeByW",
            ProcessorFeature::SizeByWidthHeight => "sizeByWh",
        }
    }
}

impl fmt::Display for ProcessorFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output formats, features and qualities declared for one source format.
///
/// Immutable once built. An empty output set means the source format cannot
/// be read at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    pub output_formats: BTreeSet<OutputFormat>,
    pub features: BTreeSet<ProcessorFeature>,
    pub qualities: BTreeSet<Quality>,
}

impl CapabilitySet {
    pub fn new(
        output_formats: impl IntoIterator<Item = OutputFormat>,
        features: impl IntoIterator<Item = ProcessorFeature>,
        qualities: impl IntoIterator<Item = Quality>,
    ) -> Self {
        Self {
            output_formats: output_formats.into_iter().collect(),
            features: features.into_iter().collect(),
            qualities: qualities.into_iter().collect(),
        }
    }

    /// Whether no output format is available.
    pub fn is_empty(&self) -> bool {
        self.output_formats.is_empty()
    }

    pub fn supports_output(&self, format: OutputFormat) -> bool {
        self.output_formats.contains(&format)
    }

    pub fn supports_feature(&self, feature: ProcessorFeature) -> bool {
        self.features.contains(&feature)
    }

    pub fn supports_quality(&self, quality: Quality) -> bool {
        self.qualities.contains(&quality)
    }
}

/// Features `ops` needs from a processor when applied to a `full`-sized source.
///
/// A region covering the whole image and a size equal to the cropped size
/// need nothing.
pub fn required_features(ops: &OperationList, full: Size) -> BTreeSet<ProcessorFeature> {
    let mut features = BTreeSet::new();

    match ops.region() {
        Region::Full => {}
        Region::Pixels {
            x,
            y,
            width,
            height,
        } => {
            let whole = *x == 0 && *y == 0 && *width >= full.width && *height >= full.height;
            if !whole {
                features.insert(ProcessorFeature::RegionByPixels);
            }
        }
        region @ Region::Fraction { .. } => {
            if !region.is_no_op() {
                features.insert(ProcessorFeature::RegionByPercent);
            }
        }
    }

    let cropped = ops.region().rectangle(full).size();
    let scale = ops.scale();
    match scale {
        Scale::Full => {}
        Scale::AspectFitWidth { .. } => {
            features.insert(ProcessorFeature::SizeByWidth);
        }
        Scale::AspectFitHeight { .. } => {
            features.insert(ProcessorFeature::SizeByHeight);
        }
        Scale::AspectFitInside { .. } => {
            features.insert(ProcessorFeature::SizeByWidthHeight);
        }
        Scale::NonAspectFill { .. } => {
            features.insert(ProcessorFeature::SizeByForcedWidthHeight);
        }
        Scale::Percent(_) => {
            if !scale.is_no_op() {
                features.insert(ProcessorFeature::SizeByPercent);
            }
        }
    }
    if scale.exceeds(cropped) {
        features.insert(ProcessorFeature::SizeAboveFull);
    }

    let rotation = ops.rotation();
    if rotation.mirror() {
        features.insert(ProcessorFeature::Mirroring);
    }
    if rotation.degrees() != 0.0 {
        features.insert(if rotation.is_right_angle() {
            ProcessorFeature::RotationBy90s
        } else {
            ProcessorFeature::RotationArbitrary
        });
    }

    features
}
