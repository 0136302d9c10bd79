use std::fmt;
use std::str::FromStr;

use super::{Operation, Size};
use crate::error::ImageError;

/// Tonal filter applied after geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Quality {
    #[default]
    Default,
    Color,
    Gray,
    Bitonal,
}

impl Quality {
    pub const ALL: [Quality; 4] = [
        Quality::Default,
        Quality::Color,
        Quality::Gray,
        Quality::Bitonal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Default => "default",
            Quality::Color => "color",
            Quality::Gray => "gray",
            Quality::Bitonal => "bitonal",
        }
    }
}

impl Operation for Quality {
    fn resulting_size(&self, input: Size) -> Size {
        input
    }

    fn is_no_op(&self) -> bool {
        matches!(self, Quality::Default | Quality::Color)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quality::ALL
            .into_iter()
            .find(|q| q.as_str() == s)
            .ok_or_else(|| ImageError::InvalidParameter(format!("invalid quality: {}", s)))
    }
}
