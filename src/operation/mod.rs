//! Operation model for image requests.
//!
//! A request names an identifier and four transforms, always applied in the
//! same order, followed by an encode step:
//!
//! ```text
//! {identifier}/{region}/{size}/{rotation}/{quality}.{format}
//!       │          │       │        │         │        │
//!       │        Region  Scale  Rotation   Quality  OutputFormat
//!       │          └───────┴────────┴─────────┘
//!       │                 OperationList
//!       └── percent-encoded in the canonical form
//! ```
//!
//! Every transform implements [`Operation`], which exposes the size it
//! produces and whether it can be skipped. [`OperationList`] composes them
//! and owns the canonical string used as the rendition cache key.
//!
//! Percentages are stored as `0..=1` fractions. The protocol's `0..=100`
//! notation only exists at the string boundary.

mod decimal;
mod format;
mod list;
mod quality;
mod region;
mod rotation;
mod scale;
mod size;

pub use format::OutputFormat;
pub use list::OperationList;
pub use quality::Quality;
pub use region::Region;
pub use rotation::Rotation;
pub use scale::Scale;
pub use size::{Rect, Size};

/// Tolerance used when comparing fractional values against 1.
pub const FRACTION_EPSILON: f64 = 1e-6;

/// A single geometric or tonal transform.
pub trait Operation {
    /// Dimensions produced when this operation is applied to `input`.
    fn resulting_size(&self, input: Size) -> Size;

    /// Whether applying this operation leaves the image unchanged.
    fn is_no_op(&self) -> bool;
}
