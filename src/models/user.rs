use anyhow::{Context as _, Result};
use argon2::{
    password_hash::SaltString, Argon2, PasswordHash, PasswordHasher as _, PasswordVerifier as _,
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng as _;
use serde::{Deserialize, Serialize};
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::status::UserRole;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A bearer token issued at login.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Hash a password into an argon2 PHC string.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), salt.as_salt())
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))
}

/// Check a password against a stored PHC string.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// 32 random bytes, base32 encoded.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    base32::encode(base32::Alphabet::Rfc4648Lower { padding: false }, &bytes)
}

impl User {
    pub async fn insert(
        email: &str,
        name: &str,
        role: UserRole,
        password: &str,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<Self> {
        let password_hash = hash_password(password)?;
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO users (id, email, name, role, password_hash, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email.trim().to_lowercase())
        .bind(name)
        .bind(role)
        .bind(password_hash)
        .bind(Utc::now())
        .fetch_one(executor)
        .await
        .context("failed to create user")
    }

    pub async fn find_by_email(
        email: &str,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM users WHERE email = ?")
            .bind(email.trim().to_lowercase())
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    pub async fn count_by_role(role: UserRole, executor: impl SqliteExecutor<'_>) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = ?")
            .bind(role)
            .fetch_one(executor)
            .await
            .map_err(Into::into)
    }

    /// The user behind a live session token.
    pub async fn find_by_session(
        token: &str,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT users.* FROM sessions
                JOIN users ON users.id = sessions.user_id
                WHERE sessions.token = ? AND sessions.expires_at > ?
            "#,
        )
        .bind(token)
        .bind(Utc::now())
        .fetch_optional(executor)
        .await
        .map_err(Into::into)
    }
}

impl Session {
    pub async fn create(
        user_id: Uuid,
        ttl: Duration,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<Self> {
        let now = Utc::now();
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO sessions (token, user_id, created_at, expires_at)
                VALUES (?, ?, ?, ?)
                RETURNING *
            "#,
        )
        .bind(generate_token())
        .bind(user_id)
        .bind(now)
        .bind(now + ttl)
        .fetch_one(executor)
        .await
        .context("failed to create session")
    }

    pub async fn delete(token: &str, executor: impl SqliteExecutor<'_>) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Drop sessions that are past their expiry.
    pub async fn purge_expired(executor: impl SqliteExecutor<'_>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(Utc::now())
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }
}
