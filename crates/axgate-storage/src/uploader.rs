//! Signed-URL upload client.
//!
//! Two-step exchange with the collection service: a GET hands back a
//! time-limited, pre-authorized URL for the destination key, then the file
//! bytes go up as a plain HTTP PUT. HTTP 200 is the only success on either
//! leg; anything else fails the file for this attempt.

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, StorageError};

const GZIP_CONTENT_TYPE: &str = "application/x-gzip";
const SSE_HEADER: &str = "x-amz-server-side-encryption";

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    url: String,
}

pub struct UploadClient {
    http: reqwest::Client,
    collection_endpoint: String,
    bearer_token: Option<String>,
}

impl UploadClient {
    pub fn new(collection_endpoint: String, bearer_token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            collection_endpoint,
            bearer_token,
        })
    }

    /// Upload one local file to its destination key.
    pub async fn upload_file(
        &self,
        tenant: &str,
        relative_file_path: &str,
        local_path: &Path,
    ) -> Result<()> {
        let signed_url = self.signed_url(tenant, relative_file_path).await?;
        self.put_file(local_path, &signed_url).await
    }

    /// Ask the collection endpoint for a signed PUT URL.
    async fn signed_url(&self, tenant: &str, relative_file_path: &str) -> Result<String> {
        let url = format!("{}/analytics", self.collection_endpoint);
        let mut request = self.http.get(&url).query(&[
            ("tenant", tenant),
            ("relative_file_path", relative_file_path),
            ("file_content_type", GZIP_CONTENT_TYPE),
            ("encrypt", "true"),
        ]);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if response.status() != StatusCode::OK {
            return Err(StorageError::SignedUrl(format!(
                "collection endpoint returned {}",
                response.status()
            )));
        }

        let body: SignedUrlResponse = response.json().await?;
        Ok(body.url)
    }

    /// PUT the raw compressed bytes to the signed URL, declaring the exact
    /// byte length and requesting server-side encryption.
    async fn put_file(&self, local_path: &Path, signed_url: &str) -> Result<()> {
        let bytes =
            tokio::fs::read(local_path)
                .await
                .map_err(|source| StorageError::CannotReadFile {
                    path: local_path.to_path_buf(),
                    source,
                })?;
        let length = bytes.len();

        let response = self
            .http
            .put(signed_url)
            .header(CONTENT_TYPE, GZIP_CONTENT_TYPE)
            .header(CONTENT_LENGTH, length)
            .header(SSE_HEADER, "AES256")
            .body(bytes)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(StorageError::UploadFailed(format!(
                "datastore returned {}",
                response.status()
            )));
        }

        debug!(path = %local_path.display(), bytes = length, "uploaded file");
        Ok(())
    }
}
