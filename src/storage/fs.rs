//! File system implementation of object storage.
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use axum::body::Bytes;
use tokio::{fs as async_fs, io::AsyncWriteExt as _};
use tracing::debug;
use url::Url;
use uuid::Uuid;

/// Objects stored under a local directory and served back by the app.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    base: String,
}

impl FsStore {
    pub fn new(root: PathBuf, public_url: &Url) -> Self {
        let base = format!("{}/files", public_url.as_str().trim_end_matches('/'));
        Self { root, base }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base, key)
    }

    /// Write an object, returning its public URL. Identical content maps to
    /// the same key, so an existing object is left as is.
    pub async fn put(&self, key: &str, bytes: Bytes) -> Result<String> {
        let path = self.root.join(key);
        if async_fs::try_exists(&path).await.unwrap_or(false) {
            debug!("object {key} already stored");
            return Ok(self.public_url(key));
        }

        let parent = path.parent().context("object key should have a parent")?;
        async_fs::create_dir_all(parent)
            .await
            .context("failed to create object directory")?;

        // Write to a temporary file first so readers never see a partial object.
        let tmp = parent.join(format!(".{}.tmp", Uuid::new_v4()));
        let mut file = async_fs::File::create(&tmp)
            .await
            .context("failed to create temporary object")?;
        file.write_all(&bytes)
            .await
            .context("failed to write object")?;
        file.flush().await.context("failed to flush object")?;
        drop(file);

        async_fs::rename(&tmp, &path)
            .await
            .context("failed to move object into place")?;

        debug!("stored object at {}", path.display());
        Ok(self.public_url(key))
    }
}
