//! Compliance level computation.
//!
//! Levels are cumulative: each one requires everything the previous level
//! requires plus its own additions.
//!
//! ```text
//! Level0  quality default                      format jpg
//! Level1  + regionByPx sizeByW sizeByH sizeByPct
//! Level2  + regionByPct sizeByForcedWh sizeByWh rotationBy90s
//!         + quality color gray bitonal         + format png
//! ```

use std::fmt;

use super::capabilities::{CapabilitySet, ProcessorFeature};
use crate::operation::{OutputFormat, Quality};

/// Protocol conformance tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComplianceLevel {
    Level0,
    Level1,
    Level2,
}

impl ComplianceLevel {
    /// Lowest level first.
    pub const ALL: [ComplianceLevel; 3] = [
        ComplianceLevel::Level0,
        ComplianceLevel::Level1,
        ComplianceLevel::Level2,
    ];

    pub fn number(&self) -> u8 {
        match self {
            ComplianceLevel::Level0 => 0,
            ComplianceLevel::Level1 => 1,
            ComplianceLevel::Level2 => 2,
        }
    }

    /// Requirements added by this level alone.
    fn additions(
        &self,
    ) -> (
        &'static [ProcessorFeature],
        &'static [Quality],
        &'static [OutputFormat],
    ) {
        match self {
            ComplianceLevel::Level0 => (&[], &[Quality::Default], &[OutputFormat::Jpg]),
            ComplianceLevel::Level1 => (
                &[
                    ProcessorFeature::RegionByPixels,
                    ProcessorFeature::SizeByWidth,
                    ProcessorFeature::SizeByHeight,
                    ProcessorFeature::SizeByPercent,
                ],
                &[],
                &[],
            ),
            ComplianceLevel::Level2 => (
                &[
                    ProcessorFeature::RegionByPercent,
                    ProcessorFeature::SizeByForcedWidthHeight,
                    ProcessorFeature::SizeByWidthHeight,
                    ProcessorFeature::RotationBy90s,
                ],
                &[Quality::Color, Quality::Gray, Quality::Bitonal],
                &[OutputFormat::Png],
            ),
        }
    }

    fn is_met_by(&self, capabilities: &CapabilitySet) -> bool {
        let (features, qualities, formats) = self.additions();
        features.iter().all(|f| capabilities.supports_feature(*f))
            && qualities.iter().all(|q| capabilities.supports_quality(*q))
            && formats.iter().all(|f| capabilities.supports_output(*f))
    }

    /// Highest level whose cumulative requirements `capabilities` satisfies.
    ///
    /// Never lower than [`ComplianceLevel::Level0`].
    pub fn compute(capabilities: &CapabilitySet) -> ComplianceLevel {
        let mut reached = ComplianceLevel::Level0;
        for level in ComplianceLevel::ALL {
            if !level.is_met_by(capabilities) {
                break;
            }
            reached = level;
        }
        reached
    }
}

impl fmt::Display for ComplianceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "level{}", self.number())
    }
}
