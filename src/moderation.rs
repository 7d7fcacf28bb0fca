//! Business operations that touch more than one row.
//!
//! Each operation runs in one transaction: either every status change and its
//! cascade is committed, or none is. Status changes go through the transition
//! tables in [`crate::status`] and are written compare-and-set, so a row that
//! changed underneath us yields a conflict instead of a silent overwrite.

use anyhow::Context as _;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::{
    error::is_unique_violation,
    metrics::{
        PAYMENTS_APPROVED, PAYMENTS_CREATED, PAYMENTS_REJECTED, POSTS_DELETED, UNLOCKS_REQUESTED,
    },
    models::{NewPayment, Payment, Post, PostEdit, UnlockRequest},
    status::{
        HomepagePaymentStatus, Lifecycle as _, PaymentPurpose, PaymentStatus, PostStatus,
        UnlockStatus,
    },
    Error, Result,
};

/// An administrator's verdict on a payment or unlock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    const fn payment_status(self) -> PaymentStatus {
        match self {
            Self::Approve => PaymentStatus::Approved,
            Self::Reject => PaymentStatus::Rejected,
        }
    }

    const fn unlock_status(self) -> UnlockStatus {
        match self {
            Self::Approve => UnlockStatus::Approved,
            Self::Reject => UnlockStatus::Rejected,
        }
    }

    const fn homepage_status(self) -> HomepagePaymentStatus {
        match self {
            Self::Approve => HomepagePaymentStatus::Approved,
            Self::Reject => HomepagePaymentStatus::Rejected,
        }
    }
}

fn changed_concurrently(what: &str) -> Error {
    Error::conflict(format!("{what} was modified concurrently, retry"))
}

async fn load_post(conn: &mut SqliteConnection, id: Uuid) -> Result<Post> {
    Post::find(id, &mut *conn)
        .await
        .context("failed to load post")?
        .ok_or_else(|| Error::not_found("post"))
}

async fn load_payment(conn: &mut SqliteConnection, id: Uuid) -> Result<Payment> {
    Payment::find(id, &mut *conn)
        .await
        .context("failed to load payment")?
        .ok_or_else(|| Error::not_found("payment"))
}

async fn load_unlock(conn: &mut SqliteConnection, id: Uuid) -> Result<UnlockRequest> {
    UnlockRequest::find(id, &mut *conn)
        .await
        .context("failed to load unlock request")?
        .ok_or_else(|| Error::not_found("unlock request"))
}

async fn move_post(conn: &mut SqliteConnection, post: &Post, to: PostStatus) -> Result<()> {
    if post.status.transition(to)? == post.status {
        return Ok(());
    }
    if !Post::set_status(post.id, post.status, to, &mut *conn)
        .await
        .context("failed to update post status")?
    {
        return Err(changed_concurrently("post"));
    }
    Ok(())
}

async fn move_homepage(
    conn: &mut SqliteConnection,
    post: &Post,
    to: HomepagePaymentStatus,
) -> Result<()> {
    let from = post.homepage_payment_status;
    if from.transition(to)? == from {
        return Ok(());
    }
    if !Post::set_homepage_status(post.id, from, to, &mut *conn)
        .await
        .context("failed to update homepage status")?
    {
        return Err(changed_concurrently("post"));
    }
    Ok(())
}

async fn move_payment(
    conn: &mut SqliteConnection,
    payment: &Payment,
    to: PaymentStatus,
) -> Result<()> {
    if payment.status.transition(to)? == payment.status {
        return Ok(());
    }
    if !Payment::set_status(payment.id, payment.status, to, &mut *conn)
        .await
        .context("failed to update payment status")?
    {
        return Err(changed_concurrently("payment"));
    }
    Ok(())
}

async fn move_unlock(
    conn: &mut SqliteConnection,
    request: &UnlockRequest,
    to: UnlockStatus,
    payment_proof: Option<&str>,
) -> Result<()> {
    if request.status.transition(to)? == request.status && payment_proof.is_none() {
        return Ok(());
    }
    if !UnlockRequest::set_status(request.id, request.status, to, payment_proof, &mut *conn)
        .await
        .context("failed to update unlock request status")?
    {
        return Err(changed_concurrently("unlock request"));
    }
    Ok(())
}

/// Apply an admin edit to a post: field changes and an optional status change.
pub async fn edit_post(pool: &SqlitePool, id: Uuid, edit: &PostEdit) -> Result<Post> {
    edit.validate().map_err(Error::bad_request)?;

    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let post = load_post(&mut tx, id).await?;

    if let Some(status) = edit.status {
        move_post(&mut tx, &post, status).await?;
        info!("post {id}: {} -> {status}", post.status);
    }
    if edit.has_field_changes() {
        Post::update_fields(id, edit, &mut *tx)
            .await
            .context("failed to update post")?;
    }

    let post = load_post(&mut tx, id).await?;
    tx.commit().await.context("failed to commit transaction")?;
    Ok(post)
}

/// Delete a post with its payments and unlock requests.
pub async fn delete_post(pool: &SqlitePool, id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let payments = Payment::delete_for_post(id, &mut *tx)
        .await
        .context("failed to delete payments")?;
    let unlocks = UnlockRequest::delete_for_post(id, &mut *tx)
        .await
        .context("failed to delete unlock requests")?;
    if !Post::delete(id, &mut *tx)
        .await
        .context("failed to delete post")?
    {
        return Err(Error::not_found("post"));
    }

    tx.commit().await.context("failed to commit transaction")?;

    metrics::counter!(POSTS_DELETED).increment(1);
    info!("deleted post {id} with {payments} payments and {unlocks} unlock requests");
    Ok(())
}

/// Take a post off the homepage. Only an approved feature can be withdrawn.
pub async fn unfeature_post(pool: &SqlitePool, id: Uuid) -> Result<Post> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let post = load_post(&mut tx, id).await?;
    move_homepage(&mut tx, &post, HomepagePaymentStatus::NotRequested).await?;
    let post = load_post(&mut tx, id).await?;
    tx.commit().await.context("failed to commit transaction")?;

    info!("post {id} removed from the homepage");
    Ok(post)
}

/// Record a submitted payment and flag what it pays for.
///
/// - `homepage`: the post's homepage status becomes pending.
/// - `unlock`: the linked unlock request becomes paid, with the receipt as proof.
pub async fn create_payment(pool: &SqlitePool, new: &NewPayment) -> Result<Payment> {
    if new.amount < 0 {
        return Err(Error::bad_request("amount must not be negative"));
    }
    if new.method.trim().is_empty() {
        return Err(Error::bad_request("method is required"));
    }
    if new.unlock_request_id.is_some() && new.purpose != PaymentPurpose::Unlock {
        return Err(Error::bad_request(
            "unlock_request_id is only accepted for unlock payments",
        ));
    }

    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let post = load_post(&mut tx, new.post_id).await?;

    match new.purpose {
        PaymentPurpose::Listing => {}
        PaymentPurpose::Homepage => {
            move_homepage(&mut tx, &post, HomepagePaymentStatus::Pending).await?;
        }
        PaymentPurpose::Unlock => {
            let request_id = new
                .unlock_request_id
                .ok_or_else(|| Error::bad_request("unlock_request_id is required"))?;
            let request = load_unlock(&mut tx, request_id).await?;
            if request.post_id != post.id {
                return Err(Error::bad_request(
                    "unlock request does not belong to this post",
                ));
            }
            move_unlock(&mut tx, &request, UnlockStatus::Paid, Some(&new.receipt_url)).await?;
        }
    }

    let payment = Payment::insert(new, &mut *tx)
        .await
        .context("failed to create payment")?;
    tx.commit().await.context("failed to commit transaction")?;

    metrics::counter!(PAYMENTS_CREATED).increment(1);
    info!(
        "payment {} ({}) created for post {}",
        payment.id, payment.purpose, post.id
    );
    Ok(payment)
}

/// Decide a payment and cascade the verdict, within the caller's transaction.
async fn decide_payment_in(
    conn: &mut SqliteConnection,
    payment: &Payment,
    decision: Decision,
) -> Result<()> {
    move_payment(conn, payment, decision.payment_status()).await?;

    match payment.purpose {
        PaymentPurpose::Listing => {
            if decision == Decision::Approve {
                if let Some(post_id) = payment.post_id {
                    let post = load_post(conn, post_id).await?;
                    if post.status == PostStatus::Pending {
                        move_post(conn, &post, PostStatus::Approved).await?;
                    }
                }
            }
        }
        PaymentPurpose::Homepage => {
            if let Some(post_id) = payment.post_id {
                let post = load_post(conn, post_id).await?;
                move_homepage(conn, &post, decision.homepage_status()).await?;
            }
        }
        PaymentPurpose::Unlock => {
            if let Some(request_id) = payment.unlock_request_id {
                let request = load_unlock(conn, request_id).await?;
                move_unlock(conn, &request, decision.unlock_status(), None).await?;
            }
        }
    }

    match decision {
        Decision::Approve => metrics::counter!(PAYMENTS_APPROVED).increment(1),
        Decision::Reject => metrics::counter!(PAYMENTS_REJECTED).increment(1),
    }
    Ok(())
}

/// Approve or reject one payment.
pub async fn decide_payment(pool: &SqlitePool, id: Uuid, decision: Decision) -> Result<Payment> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let payment = load_payment(&mut tx, id).await?;

    decide_payment_in(&mut tx, &payment, decision).await?;

    let payment = load_payment(&mut tx, id).await?;
    tx.commit().await.context("failed to commit transaction")?;

    info!("payment {id} decided: {}", payment.status);
    Ok(payment)
}

/// Hide a payment from the dashboard. No cascade.
pub async fn hide_payment(pool: &SqlitePool, id: Uuid) -> Result<Payment> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let payment = load_payment(&mut tx, id).await?;
    move_payment(&mut tx, &payment, PaymentStatus::Hidden).await?;
    let payment = load_payment(&mut tx, id).await?;
    tx.commit().await.context("failed to commit transaction")?;
    Ok(payment)
}

/// Approve every pending payment for a post, cascading each.
pub async fn approve_post_payments(pool: &SqlitePool, post_id: Uuid) -> Result<Vec<Payment>> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    load_post(&mut tx, post_id).await?;

    let pending = Payment::pending_for_post(post_id, &mut *tx)
        .await
        .context("failed to load pending payments")?;
    let mut approved = Vec::with_capacity(pending.len());
    for payment in &pending {
        decide_payment_in(&mut tx, payment, Decision::Approve).await?;
        approved.push(load_payment(&mut tx, payment.id).await?);
    }

    tx.commit().await.context("failed to commit transaction")?;

    info!("approved {} payments for post {post_id}", approved.len());
    Ok(approved)
}

/// Open an unlock request, or return the visitor's open one for this post.
pub async fn request_unlock(
    pool: &SqlitePool,
    post_id: Uuid,
    visitor_id: &str,
) -> Result<UnlockRequest> {
    let visitor_id = visitor_id.trim();
    if visitor_id.is_empty() {
        return Err(Error::bad_request("visitor_id is required"));
    }

    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let post = load_post(&mut tx, post_id).await?;
    if post.status != PostStatus::Approved {
        return Err(Error::not_found("post"));
    }

    if let Some(existing) = UnlockRequest::find_active(post_id, visitor_id, &mut *tx)
        .await
        .context("failed to look up unlock request")?
    {
        return Ok(existing);
    }

    let request = match UnlockRequest::insert(post_id, visitor_id, &mut *tx).await {
        Ok(request) => request,
        Err(e) if is_unique_violation(&e) => {
            return Err(Error::conflict("an unlock request is already open"));
        }
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context("failed to create unlock request")
                .into());
        }
    };
    tx.commit().await.context("failed to commit transaction")?;

    metrics::counter!(UNLOCKS_REQUESTED).increment(1);
    info!("unlock request {} opened for post {post_id}", request.id);
    Ok(request)
}

/// Approve or reject an unlock request, deciding its pending payments alongside.
pub async fn decide_unlock(
    pool: &SqlitePool,
    id: Uuid,
    decision: Decision,
) -> Result<UnlockRequest> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    let request = load_unlock(&mut tx, id).await?;

    move_unlock(&mut tx, &request, decision.unlock_status(), None).await?;

    let payments = Payment::pending_for_unlock(id, &mut *tx)
        .await
        .context("failed to load unlock payments")?;
    for payment in &payments {
        move_payment(&mut tx, payment, decision.payment_status()).await?;
    }

    let request = load_unlock(&mut tx, id).await?;
    tx.commit().await.context("failed to commit transaction")?;

    info!(
        "unlock request {id} decided: {} ({} payments)",
        request.status,
        payments.len()
    );
    Ok(request)
}
