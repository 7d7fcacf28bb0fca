//! Standalone file upload, and the multipart plumbing shared by receipt endpoints.
use std::collections::HashMap;

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    routing::post,
    Json, Router,
};

use super::{ok, Envelope};
use crate::{
    config::AppConfig,
    storage::{Folder, ObjectStore, StoredObject, Upload},
    AppState, Error, Result,
};

fn multipart_error(err: MultipartError) -> Error {
    Error::with_status(err.status(), err)
}

/// A parsed multipart form: text fields plus at most one file.
#[derive(Debug, Default)]
pub(super) struct Form {
    fields: HashMap<String, String>,
    file: Option<Upload>,
}

impl Form {
    /// Drain a multipart body, treating the part named `file_field` as the upload.
    pub(super) async fn read(mut multipart: Multipart, file_field: &str) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let Some(name) = field.name().map(ToOwned::to_owned) else {
                continue;
            };

            if name == file_field {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_owned();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                form.file = Some(Upload {
                    content_type,
                    bytes,
                });
            } else {
                let value = field.text().await.map_err(multipart_error)?;
                drop(form.fields.insert(name, value));
            }
        }

        Ok(form)
    }

    pub(super) fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub(super) fn require(&self, name: &str) -> Result<&str> {
        self.text(name)
            .ok_or_else(|| Error::bad_request(format!("{name} is required")))
    }

    /// Parse a required field with `FromStr`.
    pub(super) fn parse<T>(&self, name: &str) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.require(name)?
            .parse()
            .map_err(|e| Error::bad_request(format!("invalid {name}: {e}")))
    }

    /// Parse an optional field with `FromStr`.
    pub(super) fn parse_opt<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.text(name)
            .map(|v| {
                v.parse()
                    .map_err(|e| Error::bad_request(format!("invalid {name}: {e}")))
            })
            .transpose()
    }

    pub(super) fn take_file(&mut self, name: &str) -> Result<Upload> {
        self.file
            .take()
            .ok_or_else(|| Error::bad_request(format!("{name} file is required")))
    }
}

/// Store a photo or receipt and return its public URL.
/// - POST /api/upload
/// ### Request Body
/// multipart: `file`, optional `folder` (`receipts` or `photos`)
/// ### Responses
/// - 200 OK: `{key, url, size, content_type}`
/// - 413 Payload Too Large, 415 Unsupported Media Type: nothing is stored
#[tracing::instrument(skip_all)]
async fn upload(
    State(config): State<AppConfig>,
    State(store): State<ObjectStore>,
    multipart: Multipart,
) -> Result<Json<Envelope<StoredObject>>> {
    let mut form = Form::read(multipart, "file").await?;
    let folder = form.parse_opt::<Folder>("folder")?.unwrap_or_default();
    let file = form.take_file("file")?;

    let stored = store.store(&config.upload, folder, file).await?;
    Ok(ok(stored))
}

pub(super) fn routes() -> Router<AppState> {
    Router::new().route("/api/upload", post(upload))
}
