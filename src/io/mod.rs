//! Byte access for sources.
//!
//! Everything the decoder reads goes through [`RangeReader`]: local files,
//! S3 objects via HTTP range requests, and buffered sequential streams.

mod file_reader;
mod memory_reader;
mod range_reader;
mod s3_reader;

pub use file_reader::FileRangeReader;
pub use memory_reader::MemoryReader;
pub use range_reader::RangeReader;
pub use s3_reader::{create_s3_client, S3RangeReader};
