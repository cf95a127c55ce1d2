use std::path::PathBuf;

use aws_sdk_s3::error::DisplayErrorContext;
use thiserror::Error;

use crate::feed::opml::{FeedListDocument, OpmlError};

/// SEC-014: Maximum feed list size (5 MB).
const MAX_FEED_LIST_SIZE: u64 = 5 * 1024 * 1024;

/// Errors that prevent the feed list from being loaded. Always fatal for a run.
#[derive(Debug, Error)]
pub enum FeedListError {
    #[error("Failed to read feed list from s3://{bucket}/{key}: {reason}")]
    Storage {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("Failed to read feed list file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Feed list too large: {0} bytes (max 5 MB)")]
    TooLarge(u64),

    #[error("Invalid feed list: {0}")]
    Opml(#[from] OpmlError),
}

/// Feed list stored as an object in an S3 bucket.
#[derive(Debug, Clone)]
pub struct S3FeedList {
    client: aws_sdk_s3::Client,
    bucket: String,
    key: String,
}

impl S3FeedList {
    /// Uses the default AWS credential and region chain (env, profile, IMDS).
    pub async fn from_env(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::with_client(aws_sdk_s3::Client::new(&config), bucket, key)
    }

    pub fn with_client(
        client: aws_sdk_s3::Client,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    async fn fetch(&self) -> Result<Vec<u8>, FeedListError> {
        let storage_err = |reason: String| FeedListError::Storage {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            reason,
        };

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await
            .map_err(|e| storage_err(DisplayErrorContext(&e).to_string()))?;

        if let Some(len) = response.content_length() {
            if len > 0 && len as u64 > MAX_FEED_LIST_SIZE {
                return Err(FeedListError::TooLarge(len as u64));
            }
        }

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| storage_err(e.to_string()))?;
        Ok(data.into_bytes().to_vec())
    }
}

/// Where the outline document comes from.
#[derive(Debug, Clone)]
pub enum FeedListSource {
    S3(S3FeedList),
    /// A local OPML file, for manual runs and testing.
    File(PathBuf),
}

impl FeedListSource {
    /// Loads and parses the feed list.
    pub async fn load(&self) -> Result<FeedListDocument, FeedListError> {
        let bytes = match self {
            FeedListSource::S3(s3) => s3.fetch().await?,
            FeedListSource::File(path) => {
                let meta = tokio::fs::metadata(path).await?;
                if meta.len() > MAX_FEED_LIST_SIZE {
                    return Err(FeedListError::TooLarge(meta.len()));
                }
                tokio::fs::read(path).await?
            }
        };

        let doc = FeedListDocument::from_bytes(bytes)?;
        tracing::info!(
            source = %self,
            outlines = doc.len(),
            sources = doc.source_count(),
            "Loaded feed list"
        );
        Ok(doc)
    }
}

impl std::fmt::Display for FeedListSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedListSource::S3(s3) => write!(f, "s3://{}/{}", s3.bucket, s3.key),
            FeedListSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}
