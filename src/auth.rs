//! Authentication extractors

use anyhow::Context as _;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::{
    metrics::AUTH_FAILED,
    models::User,
    status::UserRole,
    AppState, Error,
};

/// Pull the bearer token out of the `Authorization` header.
fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// A caller holding a live session.
pub struct AuthenticatedUser {
    pub user: User,
    pub token: String,
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Err(Error::unauthorized("missing bearer token"));
        };

        let user = User::find_by_session(token, &state.db)
            .await
            .context("failed to look up session")?;

        match user {
            Some(user) => Ok(Self {
                user,
                token: token.to_owned(),
            }),
            None => {
                metrics::counter!(AUTH_FAILED).increment(1);
                Err(Error::unauthorized("invalid or expired session"))
            }
        }
    }
}

/// A caller holding a live session with the `admin` role.
pub struct AdminUser(pub User);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser { user, .. } =
            AuthenticatedUser::from_request_parts(parts, state).await?;

        if user.role == UserRole::Admin {
            Ok(Self(user))
        } else {
            metrics::counter!(AUTH_FAILED).increment(1);
            Err(Error::forbidden("administrator access required"))
        }
    }
}
