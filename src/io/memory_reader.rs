use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::range_reader::check_range;
use super::RangeReader;
use crate::error::IoError;

/// Range reader over bytes already held in memory.
///
/// Sequential sources are buffered into one of these so the rest of the
/// decode path only deals with random access.
#[derive(Clone)]
pub struct MemoryReader {
    data: Bytes,
    identifier: String,
}

impl MemoryReader {
    pub fn new(data: impl Into<Bytes>, identifier: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            identifier: identifier.into(),
        }
    }

    /// Drain `stream` to its end.
    pub async fn from_stream<S>(mut stream: S, identifier: impl Into<String>) -> Result<Self, IoError>
    where
        S: AsyncRead + Unpin,
    {
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;
        Ok(Self::new(buf, identifier))
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }
}

#[async_trait]
impl RangeReader for MemoryReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size())?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + len))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
