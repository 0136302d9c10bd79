//! Source resolution.
//!
//! A [`Resolver`] turns an identifier into a [`SourceFormat`] and a
//! [`ByteSource`]. Byte sources are either random-access (anything with a
//! [`RangeReader`](crate::io::RangeReader)) or sequential streams; processors
//! declare which kind they accept.

mod filesystem;
mod format;
mod resolver;
mod s3;

pub use filesystem::FilesystemResolver;
pub use format::{SourceFormat, SNIFF_LEN};
pub use resolver::{detect_format, ByteSource, ResolvedSource, Resolver};
pub use s3::S3Resolver;
