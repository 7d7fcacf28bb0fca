use anyhow::Context as _;
use axum::{extract::State, routing::get, Json, Router};
use futures::try_join;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::{ok, Envelope};
use crate::{
    auth::AdminUser,
    models::{ContactSubmission, Payment, Post, UnlockRequest},
    status::{PaymentStatus, PostStatus, SubmissionStatus, UnlockStatus},
    AppState, Result,
};

/// Work waiting for an administrator.
#[derive(Debug, Serialize, Deserialize)]
pub struct Stats {
    pub pending_posts: i64,
    pub pending_payments: i64,
    pub paid_unlock_requests: i64,
    pub pending_contact_submissions: i64,
}

/// - GET /api/admin/stats
async fn stats(_admin: AdminUser, State(db): State<SqlitePool>) -> Result<Json<Envelope<Stats>>> {
    let (pending_posts, pending_payments, paid_unlock_requests, pending_contact_submissions) =
        try_join!(
            Post::count_by_status(PostStatus::Pending, &db),
            Payment::count_by_status(PaymentStatus::Pending, &db),
            UnlockRequest::count_by_status(UnlockStatus::Paid, &db),
            ContactSubmission::count_by_status(SubmissionStatus::Pending, &db),
        )
        .context("failed to count pending work")?;

    Ok(ok(Stats {
        pending_posts,
        pending_payments,
        paid_unlock_requests,
        pending_contact_submissions,
    }))
}

pub(super) fn routes() -> Router<AppState> {
    Router::new().route("/api/admin/stats", get(stats))
}
