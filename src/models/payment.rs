use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::status::{PaymentPurpose, PaymentStatus};

/// A receipt-backed payment awaiting or past an admin decision.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub post_id: Option<Uuid>,
    pub unlock_request_id: Option<Uuid>,
    pub purpose: PaymentPurpose,
    pub amount: i64,
    pub method: String,
    pub receipt_url: String,
    pub status: PaymentStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// A payment with the listing it pays for, as shown on the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentWithPost {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub payment: Payment,
    pub post_work: Option<String>,
    pub post_place: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub post_id: Uuid,
    pub unlock_request_id: Option<Uuid>,
    pub purpose: PaymentPurpose,
    pub amount: i64,
    pub method: String,
    pub receipt_url: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentQuery {
    pub status: Option<PaymentStatus>,
    pub post_id: Option<Uuid>,
}

impl Payment {
    pub async fn insert(new: &NewPayment, executor: impl SqliteExecutor<'_>) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO payments (
                id, post_id, unlock_request_id, purpose, amount, method,
                receipt_url, status, note, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.post_id)
        .bind(new.unlock_request_id)
        .bind(new.purpose)
        .bind(new.amount)
        .bind(&new.method)
        .bind(&new.receipt_url)
        .bind(PaymentStatus::Pending)
        .bind(&new.note)
        .bind(Utc::now())
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    pub async fn find(id: Uuid, executor: impl SqliteExecutor<'_>) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM payments WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    /// Dashboard listing, newest first.
    pub async fn list(
        query: &PaymentQuery,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<Vec<PaymentWithPost>> {
        sqlx::query_as::<_, PaymentWithPost>(
            r#"
            SELECT payments.*, posts.work AS post_work, posts.place AS post_place
            FROM payments
            LEFT JOIN posts ON posts.id = payments.post_id
            WHERE (? IS NULL OR payments.status = ?)
              AND (? IS NULL OR payments.post_id = ?)
            ORDER BY payments.created_at DESC
            "#,
        )
        .bind(query.status)
        .bind(query.status)
        .bind(query.post_id)
        .bind(query.post_id)
        .fetch_all(executor)
        .await
        .map_err(Into::into)
    }

    pub async fn pending_for_post(
        post_id: Uuid,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM payments WHERE post_id = ? AND status = ? ORDER BY created_at",
        )
        .bind(post_id)
        .bind(PaymentStatus::Pending)
        .fetch_all(executor)
        .await
        .map_err(Into::into)
    }

    pub async fn pending_for_unlock(
        unlock_request_id: Uuid,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM payments
                WHERE unlock_request_id = ? AND purpose = ? AND status = ?
                ORDER BY created_at
            "#,
        )
        .bind(unlock_request_id)
        .bind(PaymentPurpose::Unlock)
        .bind(PaymentStatus::Pending)
        .fetch_all(executor)
        .await
        .map_err(Into::into)
    }

    /// Compare-and-set the payment status. Approval and rejection stamp the
    /// decision time; hiding keeps it.
    pub async fn set_status(
        id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<bool> {
        let decided_at = matches!(to, PaymentStatus::Approved | PaymentStatus::Rejected)
            .then(Utc::now);
        let result = sqlx::query(
            r#"
            UPDATE payments SET status = ?, decided_at = COALESCE(?, decided_at)
                WHERE id = ? AND status = ?
            "#,
        )
        .bind(to)
        .bind(decided_at)
        .bind(id)
        .bind(from)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_for_post(post_id: Uuid, executor: impl SqliteExecutor<'_>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM payments
                WHERE post_id = ?
                   OR (purpose = ? AND unlock_request_id IN (
                       SELECT id FROM contact_unlock_requests WHERE post_id = ?
                   ))
            "#,
        )
        .bind(post_id)
        .bind(PaymentPurpose::Unlock)
        .bind(post_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn count_by_status(
        status: PaymentStatus,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE status = ?")
            .bind(status)
            .fetch_one(executor)
            .await
            .map_err(Into::into)
    }
}
