//! Root module for all endpoints.
mod admin;
mod auth;
mod contact;
mod payments;
mod posts;
mod unlock;
mod upload;

use axum::{extract::DefaultBodyLimit, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{AppState, Result};

/// Slack allowed on top of the upload limit for multipart framing and text fields.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// The JSON body every endpoint responds with.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

/// Successful response.
pub(crate) fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

/// Successful response for a newly created resource.
pub(crate) fn created<T: Serialize>(data: T) -> (StatusCode, Json<Envelope<T>>) {
    (StatusCode::CREATED, ok(data))
}

/// Health check endpoint. Returns name and version of the service.
pub(crate) async fn health() -> Result<Json<serde_json::Value>> {
    Ok(Json(json!({
        "version": concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
    })))
}

/// Register all API routes.
pub(crate) fn routes(upload_limit: u64) -> Router<AppState> {
    let body_limit = usize::try_from(upload_limit)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let uploads = Router::new()
        .merge(upload::routes())
        .merge(payments::upload_routes())
        .merge(unlock::upload_routes())
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .route("/_health", get(health))
        .merge(posts::routes())
        .merge(payments::routes())
        .merge(unlock::routes())
        .merge(contact::routes())
        .merge(auth::routes())
        .merge(admin::routes())
        .merge(uploads)
}
