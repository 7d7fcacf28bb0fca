use anyhow::Context as _;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use super::{created, ok, Envelope};
use crate::{
    auth::AdminUser,
    metrics::POSTS_CREATED,
    models::{NewPost, Payment, Post, PostEdit, PostQuery, UnlockRequest},
    moderation,
    status::{HomepagePaymentStatus, PostStatus, PostType},
    AppState, Error, Result,
};

/// A post as shown to visitors. The contact field is withheld until unlocked.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicPost {
    pub id: Uuid,
    pub post_type: PostType,
    pub name: String,
    pub work: String,
    pub place: String,
    pub salary: String,
    pub description: String,
    pub photo_url: Option<String>,
    pub featured: bool,
    pub contact: Option<String>,
    pub contact_locked: bool,
    pub created_at: DateTime<Utc>,
}

impl PublicPost {
    fn new(post: Post, unlocked: bool) -> Self {
        Self {
            id: post.id,
            post_type: post.post_type,
            name: post.name,
            work: post.work,
            place: post.place,
            salary: post.salary,
            description: post.description,
            photo_url: post.photo_url,
            featured: post.homepage_payment_status == HomepagePaymentStatus::Approved,
            contact: unlocked.then_some(post.contact),
            contact_locked: !unlocked,
            created_at: post.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VisitorQuery {
    visitor_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusQuery {
    status: Option<PostStatus>,
}

/// Approved posts, featured ones first.
/// - GET /api/posts?post_type=&place=&limit=&offset=
async fn list_posts(
    State(db): State<SqlitePool>,
    Query(query): Query<PostQuery>,
) -> Result<Json<Envelope<Vec<PublicPost>>>> {
    let posts = Post::list_public(&query, &db)
        .await
        .context("failed to list posts")?;

    Ok(ok(posts
        .into_iter()
        .map(|p| PublicPost::new(p, false))
        .collect()))
}

/// A single approved post. The contact is included only for a visitor whose
/// unlock request was approved.
/// - GET /api/posts/{id}?visitor_id=
async fn get_post(
    State(db): State<SqlitePool>,
    Path(id): Path<Uuid>,
    Query(query): Query<VisitorQuery>,
) -> Result<Json<Envelope<PublicPost>>> {
    let post = Post::find(id, &db)
        .await
        .context("failed to load post")?
        .filter(|p| p.status == PostStatus::Approved)
        .ok_or_else(|| Error::not_found("post"))?;

    let unlocked = match query.visitor_id.as_deref().map(str::trim) {
        Some(visitor) if !visitor.is_empty() => UnlockRequest::is_unlocked(id, visitor, &db)
            .await
            .context("failed to check unlock status")?,
        _ => false,
    };

    Ok(ok(PublicPost::new(post, unlocked)))
}

/// Submit a post for review.
/// - POST /api/posts
async fn create_post(
    State(db): State<SqlitePool>,
    Json(input): Json<NewPost>,
) -> Result<(StatusCode, Json<Envelope<Post>>)> {
    input.validate().map_err(Error::bad_request)?;

    let post = Post::insert(&input, &db)
        .await
        .context("failed to create post")?;

    metrics::counter!(POSTS_CREATED).increment(1);
    info!("post {} submitted ({})", post.id, post.post_type);
    Ok(created(post))
}

/// Every post regardless of status, with contacts.
/// - GET /api/admin/posts?status=
async fn admin_list_posts(
    _admin: AdminUser,
    State(db): State<SqlitePool>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Envelope<Vec<Post>>>> {
    let posts = Post::list_by_status(query.status, &db)
        .await
        .context("failed to list posts")?;
    Ok(ok(posts))
}

/// Edit fields and/or move the post through its moderation states.
/// - PATCH /api/posts/{id}
async fn edit_post(
    AdminUser(admin): AdminUser,
    State(db): State<SqlitePool>,
    Path(id): Path<Uuid>,
    Json(edit): Json<PostEdit>,
) -> Result<Json<Envelope<Post>>> {
    let post = moderation::edit_post(&db, id, &edit).await?;
    info!("post {id} edited by {}", admin.email);
    Ok(ok(post))
}

/// Delete a post together with its payments and unlock requests.
/// - DELETE /api/posts/{id}/delete
async fn delete_post(
    AdminUser(admin): AdminUser,
    State(db): State<SqlitePool>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Uuid>>> {
    moderation::delete_post(&db, id).await?;
    info!("post {id} deleted by {}", admin.email);
    Ok(ok(id))
}

/// Approve all pending payments for a post.
/// - POST /api/admin/posts/{id}/approve-payment
async fn approve_payments(
    _admin: AdminUser,
    State(db): State<SqlitePool>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Vec<Payment>>>> {
    let payments = moderation::approve_post_payments(&db, id).await?;
    Ok(ok(payments))
}

/// Withdraw an approved homepage feature.
/// - POST /api/admin/posts/{id}/unfeature
async fn unfeature_post(
    AdminUser(admin): AdminUser,
    State(db): State<SqlitePool>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Post>>> {
    let post = moderation::unfeature_post(&db, id).await?;
    info!("post {id} unfeatured by {}", admin.email);
    Ok(ok(post))
}

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/posts", get(list_posts).post(create_post))
        .route("/api/posts/{id}", get(get_post).patch(edit_post))
        .route("/api/posts/{id}/delete", delete(delete_post))
        .route("/api/admin/posts", get(admin_list_posts))
        .route(
            "/api/admin/posts/{id}/approve-payment",
            post(approve_payments),
        )
        .route("/api/admin/posts/{id}/unfeature", post(unfeature_post))
}
