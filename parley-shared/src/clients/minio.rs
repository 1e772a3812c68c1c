use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client as S3Client;
use std::time::Duration;

#[derive(Clone)]
pub struct MinioClient {
    client: S3Client,
    bucket: String,
    public_url: String,
}

impl MinioClient {
    pub fn new(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        public_url: &str,
    ) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "minio");

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(endpoint)
            .region(Region::new("us-east-1"))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let client = S3Client::from_conf(config);

        Self {
            client,
            bucket: bucket.to_string(),
            public_url: public_url.to_string(),
        }
    }

    /// Create the bucket if it does not exist yet. Called once at startup;
    /// an already-existing bucket is not an error.
    pub async fn ensure_bucket(&self) {
        let _ = self.client.create_bucket().bucket(&self.bucket).send().await;
        tracing::info!(bucket = %self.bucket, "object storage bucket ready");
    }

    /// Mint a short-lived presigned PUT URL the client uploads bytes to
    /// directly. The returned URL is the only write path into the bucket.
    pub async fn presigned_upload_url(
        &self,
        key: &str,
        expires_secs: u64,
    ) -> Result<String, String> {
        let presign_config = PresigningConfig::builder()
            .expires_in(Duration::from_secs(expires_secs))
            .build()
            .map_err(|e| format!("presign config error: {e}"))?;

        let url = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| format!("presign error: {e}"))?
            .uri()
            .to_string();

        Ok(url)
    }

    /// Externally servable URL for an uploaded object key.
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_url, self.bucket, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> MinioClient {
        MinioClient::new(
            "http://localhost:9000",
            "minioadmin",
            "minioadmin",
            "parley-media",
            "http://localhost:9000",
        )
    }

    #[test]
    fn object_url_includes_bucket_and_key() {
        let client = test_client();
        assert_eq!(
            client.object_url("uploads/abc.png"),
            "http://localhost:9000/parley-media/uploads/abc.png"
        );
    }

    #[tokio::test]
    async fn presigned_upload_url_is_minted_locally() {
        // Presigning only signs; no network round-trip is involved.
        let client = test_client();
        let url = client
            .presigned_upload_url("uploads/test-key", 900)
            .await
            .expect("presigning should not require connectivity");
        assert!(url.contains("uploads/test-key"));
        assert!(url.contains("X-Amz-Signature"));
    }
}
