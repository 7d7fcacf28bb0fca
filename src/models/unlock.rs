use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::status::UnlockStatus;

/// A visitor's request to see a post's contact field.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UnlockRequest {
    pub id: Uuid,
    pub post_id: Uuid,
    pub visitor_id: String,
    pub status: UnlockStatus,
    pub payment_proof: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnlockQuery {
    pub status: Option<UnlockStatus>,
    pub visitor_id: Option<String>,
    pub post_id: Option<Uuid>,
}

impl UnlockRequest {
    pub async fn insert(
        post_id: Uuid,
        visitor_id: &str,
        executor: impl SqliteExecutor<'_>,
    ) -> sqlx::Result<Self> {
        let now = Utc::now();
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO contact_unlock_requests (
                id, post_id, visitor_id, status, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(post_id)
        .bind(visitor_id)
        .bind(UnlockStatus::Pending)
        .bind(now)
        .bind(now)
        .fetch_one(executor)
        .await
    }

    pub async fn find(id: Uuid, executor: impl SqliteExecutor<'_>) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM contact_unlock_requests WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    /// The open (pending or paid) request for this visitor and post, if any.
    pub async fn find_active(
        post_id: Uuid,
        visitor_id: &str,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<Option<Self>> {
        let requests = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM contact_unlock_requests
                WHERE post_id = ? AND visitor_id = ?
                ORDER BY created_at DESC
            "#,
        )
        .bind(post_id)
        .bind(visitor_id)
        .fetch_all(executor)
        .await?;

        Ok(requests.into_iter().find(|r| r.status.is_active()))
    }

    /// Whether the visitor has been granted the post's contact.
    pub async fn is_unlocked(
        post_id: Uuid,
        visitor_id: &str,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<bool> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM contact_unlock_requests
                    WHERE post_id = ? AND visitor_id = ? AND status = ?
            )
            "#,
        )
        .bind(post_id)
        .bind(visitor_id)
        .bind(UnlockStatus::Approved)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    pub async fn list(
        query: &UnlockQuery,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM contact_unlock_requests
            WHERE (? IS NULL OR status = ?)
              AND (? IS NULL OR visitor_id = ?)
              AND (? IS NULL OR post_id = ?)
            ORDER BY created_at DESC
            "#,
        )
        .bind(query.status)
        .bind(query.status)
        .bind(query.visitor_id.as_deref())
        .bind(query.visitor_id.as_deref())
        .bind(query.post_id)
        .bind(query.post_id)
        .fetch_all(executor)
        .await
        .map_err(Into::into)
    }

    /// Compare-and-set the status, optionally attaching a payment proof.
    pub async fn set_status(
        id: Uuid,
        from: UnlockStatus,
        to: UnlockStatus,
        payment_proof: Option<&str>,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE contact_unlock_requests
                SET status = ?, payment_proof = COALESCE(?, payment_proof), updated_at = ?
                WHERE id = ? AND status = ?
            "#,
        )
        .bind(to)
        .bind(payment_proof)
        .bind(Utc::now())
        .bind(id)
        .bind(from)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_for_post(post_id: Uuid, executor: impl SqliteExecutor<'_>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM contact_unlock_requests WHERE post_id = ?")
            .bind(post_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn count_by_status(
        status: UnlockStatus,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM contact_unlock_requests WHERE status = ?")
            .bind(status)
            .fetch_one(executor)
            .await
            .map_err(Into::into)
    }
}
