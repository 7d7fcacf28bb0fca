use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::status::{SubmissionPriority, SubmissionStatus};

/// A message left through the public contact form.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContactSubmission {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub message: String,
    pub status: SubmissionStatus,
    pub priority: SubmissionPriority,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSubmission {
    pub name: String,
    pub email: String,
    pub message: String,
}

impl NewSubmission {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".to_owned());
        }
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err("email is invalid".to_owned()),
        }
        if self.message.trim().is_empty() {
            return Err("message is required".to_owned());
        }
        if self.message.chars().count() > 5000 {
            return Err("message must be at most 5000 characters".to_owned());
        }
        Ok(())
    }
}

/// Admin triage update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionUpdate {
    pub status: Option<SubmissionStatus>,
    pub priority: Option<SubmissionPriority>,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionQuery {
    pub status: Option<SubmissionStatus>,
}

impl ContactSubmission {
    pub async fn insert(new: &NewSubmission, executor: impl SqliteExecutor<'_>) -> Result<Self> {
        let now = Utc::now();
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO contact_submissions (
                id, name, email, message, status, priority, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.name.trim())
        .bind(new.email.trim())
        .bind(new.message.trim())
        .bind(SubmissionStatus::Pending)
        .bind(SubmissionPriority::default())
        .bind(now)
        .bind(now)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    pub async fn find(id: Uuid, executor: impl SqliteExecutor<'_>) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM contact_submissions WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    pub async fn list(
        query: &SubmissionQuery,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM contact_submissions
                WHERE ? IS NULL OR status = ?
                ORDER BY created_at DESC
            "#,
        )
        .bind(query.status)
        .bind(query.status)
        .fetch_all(executor)
        .await
        .map_err(Into::into)
    }

    /// Write a triage update. The status column is compared against `from`.
    pub async fn update(
        id: Uuid,
        from: SubmissionStatus,
        update: &SubmissionUpdate,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE contact_submissions SET
                status = COALESCE(?, status),
                priority = COALESCE(?, priority),
                admin_notes = COALESCE(?, admin_notes),
                updated_at = ?
            WHERE id = ? AND status = ?
            RETURNING *
            "#,
        )
        .bind(update.status)
        .bind(update.priority)
        .bind(update.admin_notes.as_deref())
        .bind(Utc::now())
        .bind(id)
        .bind(from)
        .fetch_optional(executor)
        .await
        .map_err(Into::into)
    }

    pub async fn count_by_status(
        status: SubmissionStatus,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM contact_submissions WHERE status = ?")
            .bind(status)
            .fetch_one(executor)
            .await
            .map_err(Into::into)
    }
}
