use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::status::{HomepagePaymentStatus, PostStatus, PostType};

/// Longest accepted value for short text fields.
pub const MAX_FIELD_LEN: usize = 200;
/// Longest accepted description.
pub const MAX_DESCRIPTION_LEN: usize = 4000;

/// A job seeker's or employer's listing.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub post_type: PostType,
    pub name: String,
    pub work: String,
    pub place: String,
    pub salary: String,
    pub contact: String,
    pub description: String,
    pub photo_url: Option<String>,
    pub status: PostStatus,
    pub homepage_payment_status: HomepagePaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Submission form for a new post.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub post_type: PostType,
    #[serde(default)]
    pub name: String,
    pub work: String,
    pub place: String,
    #[serde(default)]
    pub salary: String,
    pub contact: String,
    #[serde(default)]
    pub description: String,
    pub photo_url: Option<String>,
}

/// Admin edit. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostEdit {
    pub post_type: Option<PostType>,
    pub name: Option<String>,
    pub work: Option<String>,
    pub place: Option<String>,
    pub salary: Option<String>,
    pub contact: Option<String>,
    pub description: Option<String>,
    pub photo_url: Option<String>,
    pub status: Option<PostStatus>,
}

/// Filters for the public listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostQuery {
    pub post_type: Option<PostType>,
    pub place: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PostQuery {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), String> {
    if value.chars().count() > max {
        Err(format!("{field} must be at most {max} characters"))
    } else {
        Ok(())
    }
}

fn check_required(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} is required"))
    } else {
        check_len(field, value, MAX_FIELD_LEN)
    }
}

impl NewPost {
    /// Check required fields and length caps.
    pub fn validate(&self) -> Result<(), String> {
        check_required("work", &self.work)?;
        check_required("place", &self.place)?;
        check_required("contact", &self.contact)?;
        check_len("name", &self.name, MAX_FIELD_LEN)?;
        check_len("salary", &self.salary, MAX_FIELD_LEN)?;
        check_len("description", &self.description, MAX_DESCRIPTION_LEN)
    }
}

impl PostEdit {
    pub fn validate(&self) -> Result<(), String> {
        for (field, value) in [
            ("work", &self.work),
            ("place", &self.place),
            ("contact", &self.contact),
        ] {
            if let Some(value) = value {
                check_required(field, value)?;
            }
        }
        for (field, value) in [("name", &self.name), ("salary", &self.salary)] {
            if let Some(value) = value {
                check_len(field, value, MAX_FIELD_LEN)?;
            }
        }
        if let Some(description) = &self.description {
            check_len("description", description, MAX_DESCRIPTION_LEN)?;
        }
        Ok(())
    }

    /// Whether any column other than `status` is being changed.
    pub const fn has_field_changes(&self) -> bool {
        self.post_type.is_some()
            || self.name.is_some()
            || self.work.is_some()
            || self.place.is_some()
            || self.salary.is_some()
            || self.contact.is_some()
            || self.description.is_some()
            || self.photo_url.is_some()
    }
}

impl Post {
    pub async fn insert(new: &NewPost, executor: impl SqliteExecutor<'_>) -> Result<Self> {
        let now = Utc::now();
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO posts (
                id, post_type, name, work, place, salary, contact, description,
                photo_url, status, homepage_payment_status, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.post_type)
        .bind(new.name.trim())
        .bind(new.work.trim())
        .bind(new.place.trim())
        .bind(new.salary.trim())
        .bind(new.contact.trim())
        .bind(new.description.trim())
        .bind(&new.photo_url)
        .bind(PostStatus::Pending)
        .bind(HomepagePaymentStatus::NotRequested)
        .bind(now)
        .bind(now)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    pub async fn find(id: Uuid, executor: impl SqliteExecutor<'_>) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM posts WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    /// Approved posts, homepage features first, then newest first.
    pub async fn list_public(
        query: &PostQuery,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<Vec<Self>> {
        let place = query
            .place
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM posts
            WHERE status = ?
              AND (? IS NULL OR post_type = ?)
              AND (? IS NULL OR place LIKE '%' || ? || '%')
            ORDER BY homepage_payment_status = ? DESC, created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(PostStatus::Approved)
        .bind(query.post_type)
        .bind(query.post_type)
        .bind(place)
        .bind(place)
        .bind(HomepagePaymentStatus::Approved)
        .bind(query.limit())
        .bind(query.offset())
        .fetch_all(executor)
        .await
        .map_err(Into::into)
    }

    /// Every post, optionally restricted to one status. Newest first.
    pub async fn list_by_status(
        status: Option<PostStatus>,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM posts WHERE ? IS NULL OR status = ? ORDER BY created_at DESC",
        )
        .bind(status)
        .bind(status)
        .fetch_all(executor)
        .await
        .map_err(Into::into)
    }

    /// Compare-and-set the moderation status. Returns false if the row was not
    /// in `from` anymore.
    pub async fn set_status(
        id: Uuid,
        from: PostStatus,
        to: PostStatus,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE posts SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to)
        .bind(Utc::now())
        .bind(id)
        .bind(from)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Compare-and-set the homepage feature status.
    pub async fn set_homepage_status(
        id: Uuid,
        from: HomepagePaymentStatus,
        to: HomepagePaymentStatus,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts SET homepage_payment_status = ?, updated_at = ?
                WHERE id = ? AND homepage_payment_status = ?
            "#,
        )
        .bind(to)
        .bind(Utc::now())
        .bind(id)
        .bind(from)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Apply the non-status fields of an edit.
    pub async fn update_fields(
        id: Uuid,
        edit: &PostEdit,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts SET
                post_type = COALESCE(?, post_type),
                name = COALESCE(?, name),
                work = COALESCE(?, work),
                place = COALESCE(?, place),
                salary = COALESCE(?, salary),
                contact = COALESCE(?, contact),
                description = COALESCE(?, description),
                photo_url = COALESCE(?, photo_url),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(edit.post_type)
        .bind(edit.name.as_deref().map(str::trim))
        .bind(edit.work.as_deref().map(str::trim))
        .bind(edit.place.as_deref().map(str::trim))
        .bind(edit.salary.as_deref().map(str::trim))
        .bind(edit.contact.as_deref().map(str::trim))
        .bind(edit.description.as_deref().map(str::trim))
        .bind(edit.photo_url.as_deref())
        .bind(Utc::now())
        .bind(id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn delete(id: Uuid, executor: impl SqliteExecutor<'_>) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn count_by_status(
        status: PostStatus,
        executor: impl SqliteExecutor<'_>,
    ) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE status = ?")
            .bind(status)
            .fetch_one(executor)
            .await
            .map_err(Into::into)
    }
}
