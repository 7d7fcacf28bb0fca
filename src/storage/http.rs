//! Hosted object storage reached over HTTP.
use anyhow::{bail, Context as _, Result};
use axum::body::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    service_key: String,
}

impl HttpStore {
    pub fn new(client: reqwest::Client, endpoint: Url, bucket: String, service_key: String) -> Self {
        Self {
            client,
            endpoint: endpoint.as_str().trim_end_matches('/').to_owned(),
            bucket,
            service_key,
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.endpoint, self.bucket, key)
    }

    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.endpoint, self.bucket, key
        )
    }

    /// Upload an object, returning its public URL.
    pub async fn put(&self, key: &str, content_type: &str, bytes: Bytes) -> Result<String> {
        debug!("uploading {key} to {}", self.endpoint);

        let res = self
            .client
            .post(self.object_url(key))
            .bearer_auth(&self.service_key)
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .context("failed to send storage request")?;

        if res.status().is_success() {
            Ok(self.public_url(key))
        } else {
            let status = res.status();
            let body = res
                .text()
                .await
                .context("failed to read storage error response")?;

            bail!("error from object storage ({status}): {body}");
        }
    }
}
