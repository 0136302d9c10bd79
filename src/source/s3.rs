use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use tracing::debug;

use super::resolver::{detect_format, ByteSource, ResolvedSource, Resolver};
use crate::error::IoError;
use crate::io::{RangeReader, S3RangeReader};

/// Resolves identifiers to objects in an S3 bucket.
///
/// The object key is the optional prefix followed by the identifier.
/// Objects are read with HTTP range requests, so sources are random-access.
#[derive(Clone)]
pub struct S3Resolver {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Resolver {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: String::new(),
        }
    }

    /// Prepend `prefix` to every key, adding a `/` separator if missing.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.prefix = prefix;
        self
    }

    pub fn key_for(&self, identifier: &str) -> String {
        format!("{}{}", self.prefix, identifier)
    }
}

#[async_trait]
impl Resolver for S3Resolver {
    async fn resolve(&self, identifier: &str) -> Result<ResolvedSource, IoError> {
        let key = self.key_for(identifier);
        debug!(identifier, bucket = %self.bucket, key = %key, "resolving from S3");

        let reader = S3RangeReader::new(self.client.clone(), self.bucket.clone(), key).await?;
        let reader: Arc<dyn RangeReader> = Arc::new(reader);
        let format = detect_format(identifier, reader.as_ref()).await?;
        Ok(ResolvedSource {
            format,
            source: ByteSource::RandomAccess(reader),
        })
    }
}
