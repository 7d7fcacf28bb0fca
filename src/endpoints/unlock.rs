use anyhow::Context as _;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{created, ok, upload::Form, Envelope};
use crate::{
    auth::AdminUser,
    config::AppConfig,
    models::{NewPayment, Payment, UnlockQuery, UnlockRequest},
    moderation::{self, Decision},
    status::{Lifecycle as _, PaymentPurpose, UnlockStatus},
    storage::{Folder, ObjectStore},
    AppState, Error, Result,
};

#[derive(Debug, Deserialize)]
struct UnlockInput {
    post_id: Uuid,
    visitor_id: String,
}

#[derive(Debug, Deserialize)]
struct VisitorQuery {
    visitor_id: String,
    post_id: Option<Uuid>,
}

/// Result of submitting proof: the request, now paid, and the payment awaiting review.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProofReceipt {
    pub request: UnlockRequest,
    pub payment: Payment,
}

/// Open (or return the already open) unlock request for a post.
/// - POST /api/unlock-requests
async fn request_unlock(
    State(db): State<SqlitePool>,
    Json(input): Json<UnlockInput>,
) -> Result<(StatusCode, Json<Envelope<UnlockRequest>>)> {
    let request = moderation::request_unlock(&db, input.post_id, &input.visitor_id).await?;
    Ok(created(request))
}

/// A visitor's own requests.
/// - GET /api/unlock-requests?visitor_id=&post_id=
async fn list_for_visitor(
    State(db): State<SqlitePool>,
    Query(query): Query<VisitorQuery>,
) -> Result<Json<Envelope<Vec<UnlockRequest>>>> {
    if query.visitor_id.trim().is_empty() {
        return Err(Error::bad_request("visitor_id is required"));
    }

    let requests = UnlockRequest::list(
        &UnlockQuery {
            status: None,
            visitor_id: Some(query.visitor_id.trim().to_owned()),
            post_id: query.post_id,
        },
        &db,
    )
    .await
    .context("failed to list unlock requests")?;
    Ok(ok(requests))
}

/// Upload the payment proof for an unlock request.
/// - POST /api/unlock-requests/{id}/proof
/// ### Request Body
/// multipart: `amount`, `method`, file `receipt`
#[tracing::instrument(skip_all)]
async fn submit_proof(
    State(config): State<AppConfig>,
    State(db): State<SqlitePool>,
    State(store): State<ObjectStore>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Envelope<ProofReceipt>>)> {
    let mut form = Form::read(multipart, "receipt").await?;
    let amount: i64 = form.parse("amount")?;
    let method = form.require("method")?.to_owned();
    let receipt = form.take_file("receipt")?;

    let request = UnlockRequest::find(id, &db)
        .await
        .context("failed to load unlock request")?
        .ok_or_else(|| Error::not_found("unlock request"))?;
    // Refuse before anything is stored.
    let _ = request.status.transition(UnlockStatus::Paid)?;

    let stored = store
        .store(&config.upload, Folder::Receipts, receipt)
        .await?;

    let payment = moderation::create_payment(
        &db,
        &NewPayment {
            post_id: request.post_id,
            unlock_request_id: Some(request.id),
            purpose: PaymentPurpose::Unlock,
            amount,
            method,
            receipt_url: stored.url,
            note: None,
        },
    )
    .await?;

    let request = UnlockRequest::find(id, &db)
        .await
        .context("failed to reload unlock request")?
        .ok_or_else(|| Error::not_found("unlock request"))?;

    Ok(created(ProofReceipt { request, payment }))
}

/// - GET /api/admin/unlock-requests?status=
async fn admin_list(
    _admin: AdminUser,
    State(db): State<SqlitePool>,
    Query(query): Query<UnlockQuery>,
) -> Result<Json<Envelope<Vec<UnlockRequest>>>> {
    let requests = UnlockRequest::list(&query, &db)
        .await
        .context("failed to list unlock requests")?;
    Ok(ok(requests))
}

/// - POST /api/admin/unlock-requests/{id}/approve
async fn approve(
    _admin: AdminUser,
    State(db): State<SqlitePool>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<UnlockRequest>>> {
    Ok(ok(moderation::decide_unlock(&db, id, Decision::Approve).await?))
}

/// - POST /api/admin/unlock-requests/{id}/reject
async fn reject(
    _admin: AdminUser,
    State(db): State<SqlitePool>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<UnlockRequest>>> {
    Ok(ok(moderation::decide_unlock(&db, id, Decision::Reject).await?))
}

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/unlock-requests",
            get(list_for_visitor).post(request_unlock),
        )
        .route("/api/admin/unlock-requests", get(admin_list))
        .route("/api/admin/unlock-requests/{id}/approve", post(approve))
        .route("/api/admin/unlock-requests/{id}/reject", post(reject))
}

pub(super) fn upload_routes() -> Router<AppState> {
    Router::new().route("/api/unlock-requests/{id}/proof", post(submit_proof))
}
