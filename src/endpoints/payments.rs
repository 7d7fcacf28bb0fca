use anyhow::Context as _;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{created, ok, upload::Form, Envelope};
use crate::{
    auth::AdminUser,
    config::AppConfig,
    models::{NewPayment, Payment, PaymentQuery, PaymentWithPost},
    moderation::{self, Decision},
    status::PaymentPurpose,
    storage::{Folder, ObjectStore},
    AppState, Result,
};

/// Submit a payment with its receipt.
/// - POST /api/payments
/// ### Request Body
/// multipart: `post_id`, `purpose`, `amount`, `method`, optional
/// `unlock_request_id` and `note`, file `receipt`
#[tracing::instrument(skip_all)]
async fn create_payment(
    State(config): State<AppConfig>,
    State(db): State<SqlitePool>,
    State(store): State<ObjectStore>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Envelope<Payment>>)> {
    let mut form = Form::read(multipart, "receipt").await?;

    let post_id: Uuid = form.parse("post_id")?;
    let purpose: PaymentPurpose = form.parse("purpose")?;
    let amount: i64 = form.parse("amount")?;
    let method = form.require("method")?.to_owned();
    let unlock_request_id: Option<Uuid> = form.parse_opt("unlock_request_id")?;
    let note = form.text("note").map(ToOwned::to_owned);
    let receipt = form.take_file("receipt")?;

    let stored = store
        .store(&config.upload, Folder::Receipts, receipt)
        .await?;

    let payment = moderation::create_payment(
        &db,
        &NewPayment {
            post_id,
            unlock_request_id,
            purpose,
            amount,
            method,
            receipt_url: stored.url,
            note,
        },
    )
    .await?;

    Ok(created(payment))
}

/// - GET /api/admin/payments?status=&post_id=
async fn list_payments(
    _admin: AdminUser,
    State(db): State<SqlitePool>,
    Query(query): Query<PaymentQuery>,
) -> Result<Json<Envelope<Vec<PaymentWithPost>>>> {
    let payments = Payment::list(&query, &db)
        .await
        .context("failed to list payments")?;
    Ok(ok(payments))
}

/// - POST /api/admin/payments/{id}/approve
async fn approve_payment(
    _admin: AdminUser,
    State(db): State<SqlitePool>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Payment>>> {
    Ok(ok(moderation::decide_payment(&db, id, Decision::Approve).await?))
}

/// - POST /api/admin/payments/{id}/reject
async fn reject_payment(
    _admin: AdminUser,
    State(db): State<SqlitePool>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Payment>>> {
    Ok(ok(moderation::decide_payment(&db, id, Decision::Reject).await?))
}

/// - POST /api/admin/payments/{id}/hide
async fn hide_payment(
    _admin: AdminUser,
    State(db): State<SqlitePool>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Payment>>> {
    Ok(ok(moderation::hide_payment(&db, id).await?))
}

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/payments", get(list_payments))
        .route("/api/admin/payments/{id}/approve", post(approve_payment))
        .route("/api/admin/payments/{id}/reject", post(reject_payment))
        .route("/api/admin/payments/{id}/hide", post(hide_payment))
}

pub(super) fn upload_routes() -> Router<AppState> {
    Router::new().route("/api/payments", post(create_payment))
}
