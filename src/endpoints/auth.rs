use anyhow::Context as _;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use super::{ok, Envelope};
use crate::{
    auth::AuthenticatedUser,
    config::AppConfig,
    metrics::AUTH_FAILED,
    models::{verify_password, Session, User},
    AppState, Error, Result,
};

#[derive(Debug, Deserialize)]
struct LoginInput {
    email: String,
    password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginOutput {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

/// Exchange credentials for a bearer token.
/// - POST /api/auth/login
async fn login(
    State(db): State<SqlitePool>,
    State(config): State<AppConfig>,
    Json(input): Json<LoginInput>,
) -> Result<Json<Envelope<LoginOutput>>> {
    let user = User::find_by_email(&input.email, &db)
        .await
        .context("failed to look up user")?
        .filter(|user| verify_password(&input.password, &user.password_hash));

    let Some(user) = user else {
        metrics::counter!(AUTH_FAILED).increment(1);
        return Err(Error::unauthorized("invalid email or password"));
    };

    let session = Session::create(user.id, Duration::hours(config.session_ttl_hours), &db).await?;

    info!("{} logged in", user.email);
    Ok(ok(LoginOutput {
        token: session.token,
        expires_at: session.expires_at,
        user,
    }))
}

/// - POST /api/auth/logout
async fn logout(
    auth: AuthenticatedUser,
    State(db): State<SqlitePool>,
) -> Result<Json<Envelope<bool>>> {
    let removed = Session::delete(&auth.token, &db)
        .await
        .context("failed to end session")?;
    Ok(ok(removed))
}

/// - GET /api/auth/me
async fn me(auth: AuthenticatedUser) -> Result<Json<Envelope<User>>> {
    Ok(ok(auth.user))
}

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}
