use async_trait::async_trait;
use aws_sdk_s3::Client;
use bytes::Bytes;

use super::range_reader::check_range;
use super::RangeReader;
use crate::error::IoError;

/// Random access to one S3 object through ranged GETs.
///
/// The object length is taken from a HEAD request when the reader is built,
/// so bounds are checked locally before any request is sent.
#[derive(Clone)]
pub struct S3RangeReader {
    client: Client,
    bucket: String,
    key: String,
    size: u64,
    identifier: String,
}

/// Map an HTTP status and error text from S3 onto the resolver error kinds.
fn classify(status: Option<u16>, message: String, location: &str) -> IoError {
    match status {
        Some(404) => IoError::NotFound(location.to_string()),
        Some(401) | Some(403) => IoError::AccessDenied(location.to_string()),
        _ if message.contains("NoSuchKey") || message.contains("NotFound") => {
            IoError::NotFound(location.to_string())
        }
        _ if message.contains("AccessDenied") => IoError::AccessDenied(location.to_string()),
        _ => IoError::S3(message),
    }
}

impl S3RangeReader {
    /// Reader for `bucket`/`key`, after a HEAD request for its length.
    ///
    /// # Errors
    ///
    /// `IoError::NotFound` for a missing object, `IoError::AccessDenied` when
    /// the credentials may not read it, `IoError::S3` otherwise.
    pub async fn new(client: Client, bucket: String, key: String) -> Result<Self, IoError> {
        let identifier = format!("s3://{}/{}", bucket, key);
        let head = client
            .head_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    return IoError::NotFound(identifier.clone());
                }
                let status = e.raw_response().map(|r| r.status().as_u16());
                classify(status, e.to_string(), &identifier)
            })?;

        let size = head.content_length().unwrap_or(0).max(0) as u64;

        Ok(Self {
            client,
            bucket,
            key,
            size,
            identifier,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl RangeReader for S3RangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size)?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let last = offset + len as u64 - 1;
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .range(format!("bytes={}-{}", offset, last))
            .send()
            .await
            .map_err(|e| {
                let status = e.raw_response().map(|r| r.status().as_u16());
                classify(status, e.to_string(), &self.identifier)
            })?;

        let data = object
            .body
            .collect()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?
            .into_bytes();

        if data.len() != len {
            return Err(IoError::S3(format!(
                "short range read from {}: expected {} bytes, got {}",
                self.identifier,
                len,
                data.len()
            )));
        }
        Ok(data)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// S3 client for `region`, pointed at `endpoint_url` when given.
///
/// A custom endpoint switches to path-style addressing, which MinIO and most
/// other S3-compatible stores expect.
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()));
    let loader = match endpoint_url {
        Some(endpoint) => loader.endpoint_url(endpoint),
        None => loader,
    };

    let shared = loader.load().await;
    let config = aws_sdk_s3::config::Builder::from(&shared)
        .force_path_style(endpoint_url.is_some())
        .build();
    Client::from_conf(config)
}
