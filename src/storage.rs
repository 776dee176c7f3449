//! Direct-to-bucket object storage access.
//!
//! MS data uploads go straight to the tenant's S3 bucket using the
//! short-lived credentials issued by the backend. The [`ObjectStore`]
//! trait is the seam the upload orchestration is written against, so
//! tests can substitute a mock for the real S3 client.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::{Error, Result};
use crate::model::AwsSessionCredentials;

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads a local file to `key` in `bucket`.
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()>;
}

/// [`ObjectStore`] backed by the AWS S3 client, configured with the
/// session credentials from `auth/getawscredential`. Region and the
/// rest of the client configuration come from the default environment
/// chain.
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    pub async fn new(credentials: &AwsSessionCredentials) -> Self {
        let provider = aws_credential_types::Credentials::from_keys(
            &credentials.access_key_id,
            &credentials.secret_access_key,
            Some(credentials.session_token.clone()),
        );
        let config = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(provider)
            .load()
            .await;
        S3ObjectStore {
            client: S3Client::new(&config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        tracing::debug!(bucket, key, path = %path.display(), "uploading file");
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_a_client_from_session_credentials() {
        let credentials = AwsSessionCredentials {
            access_key_id: "AKIAEXAMPLE".into(),
            secret_access_key: "secret".into(),
            session_token: "token".into(),
            s3_bucket: Some("tenant-bucket".into()),
        };
        // Construction must not need any ambient AWS configuration.
        let _store = S3ObjectStore::new(&credentials).await;
    }
}
