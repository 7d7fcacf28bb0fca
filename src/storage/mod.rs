//! Object storage for receipts and photos.
//!
//! Uploads are validated against [`UploadConfig`] before anything is written,
//! then stored under a content-addressed key.

mod fs;
mod http;

use std::path::Path;

use anyhow::Result;
use axum::{body::Bytes, http::StatusCode};
use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

pub use fs::FsStore;
pub use http::HttpStore;

use crate::{
    config::{StorageConfig, UploadConfig},
    metrics::UPLOADS_REJECTED,
};

/// Top-level directory an object is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Folder {
    #[default]
    Receipts,
    Photos,
}

impl Folder {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Receipts => "receipts",
            Self::Photos => "photos",
        }
    }
}

impl std::str::FromStr for Folder {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "receipts" => Ok(Self::Receipts),
            "photos" => Ok(Self::Photos),
            other => Err(UploadError::UnknownFolder(other.to_owned())),
        }
    }
}

/// A file received from a multipart form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
    pub size: u64,
    pub content_type: String,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("file is empty")]
    Empty,
    #[error("file is larger than the maximum of {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("file type {0:?} is not accepted")]
    UnsupportedType(String),
    #[error("unknown upload folder {0:?}")]
    UnknownFolder(String),
}

impl UploadError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Empty | Self::UnknownFolder(_) => StatusCode::BAD_REQUEST,
            Self::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        }
    }
}

impl From<UploadError> for crate::Error {
    fn from(err: UploadError) -> Self {
        Self::with_status(err.status(), err)
    }
}

/// Check an upload against the configured size limit and MIME allow-list.
pub fn validate(config: &UploadConfig, upload: &Upload) -> Result<(), UploadError> {
    if upload.bytes.is_empty() {
        return Err(UploadError::Empty);
    }
    if upload.bytes.len() as u64 > config.limit {
        return Err(UploadError::TooLarge {
            limit: config.limit,
        });
    }
    // Ignore parameters such as `; charset=binary`.
    let essence = upload
        .content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if !config.accept.iter().any(|m| m.eq_ignore_ascii_case(&essence)) {
        return Err(UploadError::UnsupportedType(upload.content_type.clone()));
    }
    Ok(())
}

fn extension(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}

/// `{folder}/{base32 sha-256}.{ext}`
pub fn object_key(folder: Folder, content_type: &str, bytes: &[u8]) -> String {
    let digest = base32::encode(
        base32::Alphabet::Rfc4648Lower { padding: false },
        sha2::Sha256::digest(bytes).as_slice(),
    );
    format!("{}/{}.{}", folder.as_str(), digest, extension(content_type))
}

#[derive(Clone)]
pub enum ObjectStore {
    Fs(FsStore),
    Http(HttpStore),
}

impl ObjectStore {
    pub fn from_config(config: &StorageConfig, public_url: &Url, client: reqwest::Client) -> Self {
        match config {
            StorageConfig::Fs { path } => Self::Fs(FsStore::new(path.clone(), public_url)),
            StorageConfig::Http {
                endpoint,
                bucket,
                service_key,
            } => Self::Http(HttpStore::new(
                client,
                endpoint.clone(),
                bucket.clone(),
                service_key.clone(),
            )),
        }
    }

    /// The local directory to serve under `/files`, if objects live on disk.
    pub fn serve_dir(&self) -> Option<&Path> {
        match self {
            Self::Fs(store) => Some(store.root()),
            Self::Http(_) => None,
        }
    }

    async fn put(&self, key: &str, content_type: &str, bytes: Bytes) -> Result<String> {
        match self {
            Self::Fs(store) => store.put(key, bytes).await,
            Self::Http(store) => store.put(key, content_type, bytes).await,
        }
    }

    /// Validate and store an upload. Nothing is written if validation fails.
    pub async fn store(
        &self,
        config: &UploadConfig,
        folder: Folder,
        upload: Upload,
    ) -> crate::Result<StoredObject> {
        if let Err(err) = validate(config, &upload) {
            metrics::counter!(UPLOADS_REJECTED).increment(1);
            warn!("rejected upload: {err}");
            return Err(err.into());
        }

        let content_type = upload
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let key = object_key(folder, &content_type, &upload.bytes);
        let size = upload.bytes.len() as u64;
        let url = self.put(&key, &content_type, upload.bytes).await?;

        info!("stored {key} ({size} bytes)");
        Ok(StoredObject {
            key,
            url,
            size,
            content_type,
        })
    }
}
