use async_trait::async_trait;
use bytes::Bytes;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use tracing::debug;

use super::{check_segment, StorageProvider};
use crate::config::StorageConfig;
use crate::types::{WorkerError, WorkerResult};

/// S3-compatible object storage (AWS S3, Cloudflare R2, MinIO).
pub struct S3Storage {
    bucket: Box<Bucket>,
    public_url: String,
}

impl S3Storage {
    pub fn from_config(config: &StorageConfig) -> WorkerResult<Self> {
        let credentials = match (&config.s3_access_key_id, &config.s3_secret_access_key) {
            (Some(access_key), Some(secret_key)) => {
                Credentials::new(Some(access_key.as_str()), Some(secret_key.as_str()), None, None, None)
            }
            _ => Credentials::default(),
        }
        .map_err(|e| WorkerError::Config(format!("invalid object storage credentials: {}", e)))?;

        let bucket = match &config.s3_endpoint {
            // Custom endpoints (R2, MinIO) need path-style addressing
            Some(endpoint) => {
                let region = Region::Custom {
                    region: config.s3_region.clone(),
                    endpoint: endpoint.trim_end_matches('/').to_string(),
                };
                Box::new(
                    Bucket::new(&config.s3_bucket, region, credentials)
                        .map_err(|e| WorkerError::Config(e.to_string()))?
                        .with_path_style(),
                )
            }
            None => {
                let region: Region = config
                    .s3_region
                    .parse()
                    .map_err(|e| WorkerError::Config(format!("invalid S3_REGION: {}", e)))?;
                Box::new(
                    Bucket::new(&config.s3_bucket, region, credentials)
                        .map_err(|e| WorkerError::Config(e.to_string()))?,
                )
            }
        };

        Ok(Self {
            bucket,
            public_url: config.public_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn public_url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_url, key)
    }
}

pub(crate) fn object_key(namespace: &str, filename: &str) -> String {
    format!("{}/{}", namespace, filename)
}

pub(crate) fn content_type_for(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[async_trait]
impl StorageProvider for S3Storage {
    async fn save(&self, namespace: &str, filename: &str, data: Bytes) -> WorkerResult<String> {
        check_segment("namespace", namespace)?;
        check_segment("filename", filename)?;

        let key = object_key(namespace, filename);
        let content_type = content_type_for(filename);

        let response = self
            .bucket
            .put_object_with_content_type(&key, &data, &content_type)
            .await
            .map_err(|e| WorkerError::Storage(format!("upload of {} failed: {}", key, e)))?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(WorkerError::Storage(format!(
                "upload of {} failed with status {}",
                key, status
            )));
        }

        debug!(key = %key, content_type = %content_type, bytes = data.len(), "object uploaded");
        Ok(self.public_url_for(&key))
    }
}
