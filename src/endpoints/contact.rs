use anyhow::Context as _;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use super::{created, ok, Envelope};
use crate::{
    auth::AdminUser,
    models::{ContactSubmission, NewSubmission, SubmissionQuery, SubmissionUpdate},
    status::Lifecycle as _,
    AppState, Error, Result,
};

/// Public contact form. Every call creates a new row.
/// - POST /api/contact
async fn submit(
    State(db): State<SqlitePool>,
    Json(input): Json<NewSubmission>,
) -> Result<(StatusCode, Json<Envelope<ContactSubmission>>)> {
    input.validate().map_err(Error::bad_request)?;

    let submission = ContactSubmission::insert(&input, &db)
        .await
        .context("failed to save contact submission")?;

    info!("contact submission {} received", submission.id);
    Ok(created(submission))
}

/// - GET /api/contact?status=
async fn list(
    _admin: AdminUser,
    State(db): State<SqlitePool>,
    Query(query): Query<SubmissionQuery>,
) -> Result<Json<Envelope<Vec<ContactSubmission>>>> {
    let submissions = ContactSubmission::list(&query, &db)
        .await
        .context("failed to list contact submissions")?;
    Ok(ok(submissions))
}

/// Triage a submission: status, priority and notes.
/// - PATCH /api/contact/{id}
async fn update(
    _admin: AdminUser,
    State(db): State<SqlitePool>,
    Path(id): Path<Uuid>,
    Json(update): Json<SubmissionUpdate>,
) -> Result<Json<Envelope<ContactSubmission>>> {
    let current = ContactSubmission::find(id, &db)
        .await
        .context("failed to load contact submission")?
        .ok_or_else(|| Error::not_found("contact submission"))?;

    if let Some(status) = update.status {
        let _ = current.status.transition(status)?;
    }

    let updated = ContactSubmission::update(id, current.status, &update, &db)
        .await
        .context("failed to update contact submission")?
        .ok_or_else(|| Error::conflict("contact submission was modified concurrently, retry"))?;

    Ok(ok(updated))
}

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/contact", get(list).post(submit))
        .route("/api/contact/{id}", patch(update))
}
