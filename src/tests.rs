//! End-to-end tests: the real router on a local port, driven over HTTP.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{Context as _, Result};
use figment::{providers::Format as _, Figment};
use reqwest::{
    multipart::{Form, Part},
    StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    endpoints::Envelope,
    models::{ContactSubmission, Payment, Post, Session, UnlockRequest, User},
    serve::{app, bootstrap_admin},
    status::{
        HomepagePaymentStatus, PaymentStatus, PostStatus, SubmissionStatus, UnlockStatus,
        UserRole,
    },
    AppState,
};

/// Upload limit used by every test server.
const UPLOAD_LIMIT: usize = 1024;

/// A temporary test directory that will be cleaned up when the struct is dropped.
struct TempDir {
    /// The path to the directory.
    path: PathBuf,
}

impl TempDir {
    /// Create a new temporary directory.
    fn new() -> Result<Self> {
        let path = std::env::temp_dir().join(format!("citymaid-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// A running server with its own database and file store.
struct TestState {
    /// Kept alive for the duration of the test.
    temp_dir: TempDir,
    /// The address the test server is listening on.
    address: SocketAddr,
    /// The HTTP client.
    client: reqwest::Client,
    /// Bearer token of the bootstrapped administrator.
    admin_token: String,
    /// Direct database access for setting up state the API cannot reach.
    db: SqlitePool,
}

impl TestState {
    /// Start a fresh server.
    async fn start() -> Result<Self> {
        let temp_dir = TempDir::new()?;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;

        let config: AppConfig = Figment::new()
            .merge(figment::providers::Toml::string(&format!(
                r#"
                listen_address = "{address}"
                public_url = "http://{address}"
                db = "sqlite://{db}"
                admin_email = "admin@test.local"

                [upload]
                limit = {UPLOAD_LIMIT}

                [storage]
                kind = "fs"
                path = "{files}"
                "#,
                db = temp_dir.path.join("test.db").display(),
                files = temp_dir.path.join("files").display(),
            )))
            .extract()?;

        let state = AppState::new(config).await?;
        let db = state.db.clone();
        let password = bootstrap_admin(&db, "admin@test.local")
            .await?
            .context("fresh database should have no administrator")?;

        drop(tokio::spawn(async move {
            axum::serve(listener, app(state).into_make_service()).await
        }));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let mut state = Self {
            temp_dir,
            address,
            client,
            admin_token: String::new(),
            db,
        };
        state.admin_token = state.login("admin@test.local", &password).await?;
        Ok(state)
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.address, path)
    }

    fn files_dir(&self) -> PathBuf {
        self.temp_dir.path.join("files")
    }

    async fn login(&self, email: &str, password: &str) -> Result<String> {
        let res = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let body: Value = data(res, StatusCode::OK).await?;
        body["token"]
            .as_str()
            .map(ToOwned::to_owned)
            .context("login should return a token")
    }

    async fn admin_get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let res = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.admin_token)
            .send()
            .await?;
        data(res, StatusCode::OK).await
    }

    async fn admin_post(&self, path: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(self.url(path))
            .bearer_auth(&self.admin_token)
            .send()
            .await?)
    }

    async fn create_post(&self, work: &str) -> Result<Post> {
        let res = self
            .client
            .post(self.url("/api/posts"))
            .json(&json!({
                "post_type": "employer",
                "name": "Daw Hla",
                "work": work,
                "place": "Yangon",
                "salary": "250,000 MMK",
                "contact": "09 555 0101",
            }))
            .send()
            .await?;
        data(res, StatusCode::CREATED).await
    }

    async fn set_post_status(&self, id: Uuid, status: PostStatus) -> Result<reqwest::Response> {
        Ok(self
            .client
            .patch(self.url(&format!("/api/posts/{id}")))
            .bearer_auth(&self.admin_token)
            .json(&json!({ "status": status }))
            .send()
            .await?)
    }

    async fn approved_post(&self, work: &str) -> Result<Post> {
        let post = self.create_post(work).await?;
        let res = self.set_post_status(post.id, PostStatus::Approved).await?;
        data(res, StatusCode::OK).await
    }

    async fn submit_payment(
        &self,
        post_id: Uuid,
        purpose: &str,
        receipt: Vec<u8>,
    ) -> Result<reqwest::Response> {
        let form = Form::new()
            .text("post_id", post_id.to_string())
            .text("purpose", purpose.to_owned())
            .text("amount", "3000")
            .text("method", "kbzpay")
            .part("receipt", receipt_part(receipt)?);
        Ok(self
            .client
            .post(self.url("/api/payments"))
            .multipart(form)
            .send()
            .await?)
    }

    async fn public_posts(&self) -> Result<Vec<Value>> {
        let res = self.client.get(self.url("/api/posts")).send().await?;
        data(res, StatusCode::OK).await
    }

    fn stored_file_count(&self) -> usize {
        fn count(dir: &std::path::Path) -> usize {
            std::fs::read_dir(dir)
                .map(|entries| {
                    entries
                        .flatten()
                        .map(|e| {
                            let path = e.path();
                            if path.is_dir() { count(&path) } else { 1 }
                        })
                        .sum()
                })
                .unwrap_or(0)
        }
        count(&self.files_dir())
    }
}

fn receipt_part(bytes: Vec<u8>) -> Result<Part> {
    Ok(Part::bytes(bytes)
        .file_name("receipt.png")
        .mime_str("image/png")?)
}

/// Assert the status and unwrap the success envelope.
async fn data<T: DeserializeOwned>(res: reqwest::Response, expected: StatusCode) -> Result<T> {
    let status = res.status();
    let body = res.text().await?;
    anyhow::ensure!(status == expected, "expected {expected}, got {status}: {body}");

    let envelope: Envelope<T> = serde_json::from_str(&body)?;
    anyhow::ensure!(envelope.success, "envelope not successful: {body}");
    Ok(envelope.data)
}

/// Assert the status and return the error message.
async fn failure(res: reqwest::Response, expected: StatusCode) -> Result<String> {
    let status = res.status();
    let body: Value = res.json().await?;
    anyhow::ensure!(status == expected, "expected {expected}, got {status}: {body}");
    anyhow::ensure!(body["success"] == json!(false), "not a failure envelope: {body}");
    Ok(body["error"].as_str().unwrap_or_default().to_owned())
}

#[tokio::test]
async fn health_and_index() -> Result<()> {
    let state = TestState::start().await?;

    let res = state.client.get(state.url("/_health")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await?;
    assert!(body["version"].as_str().unwrap().starts_with("citymaid/"));

    let res = state.client.get(state.url("/")).send().await?;
    assert!(res.text().await?.contains("/api/"));
    Ok(())
}

#[tokio::test]
async fn approved_posts_are_listed_and_hidden_ones_are_not() -> Result<()> {
    let state = TestState::start().await?;

    let pending = state.create_post("Cook").await?;
    assert_eq!(pending.status, PostStatus::Pending);
    assert_eq!(pending.homepage_payment_status, HomepagePaymentStatus::NotRequested);

    let approved = state.approved_post("Nanny").await?;
    let posts = state.public_posts().await?;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["id"], json!(approved.id));
    assert_eq!(posts[0]["contact"], Value::Null);
    assert_eq!(posts[0]["contact_locked"], json!(true));

    let res = state.set_post_status(approved.id, PostStatus::Hidden).await?;
    let hidden: Post = data(res, StatusCode::OK).await?;
    assert_eq!(hidden.status, PostStatus::Hidden);
    assert!(state.public_posts().await?.is_empty());

    let res = state
        .client
        .get(state.url(&format!("/api/posts/{}", approved.id)))
        .send()
        .await?;
    failure(res, StatusCode::NOT_FOUND).await?;

    // Restoring a hidden post is allowed; sending it back to pending is not.
    let res = state.set_post_status(approved.id, PostStatus::Approved).await?;
    let _: Post = data(res, StatusCode::OK).await?;
    let res = state.set_post_status(approved.id, PostStatus::Pending).await?;
    let message = failure(res, StatusCode::CONFLICT).await?;
    assert!(message.contains("approved -> pending"), "{message}");
    Ok(())
}

#[tokio::test]
async fn public_listing_filters_by_type_and_place() -> Result<()> {
    let state = TestState::start().await?;
    let _employer = state.approved_post("Driver").await?;

    let res = state
        .client
        .post(state.url("/api/posts"))
        .json(&json!({
            "post_type": "employee",
            "work": "Cleaner",
            "place": "Mandalay",
            "contact": "09 777",
        }))
        .send()
        .await?;
    let employee: Post = data(res, StatusCode::CREATED).await?;
    let _: Post = data(
        state.set_post_status(employee.id, PostStatus::Approved).await?,
        StatusCode::OK,
    )
    .await?;

    let res = state
        .client
        .get(state.url("/api/posts?post_type=employee"))
        .send()
        .await?;
    let posts: Vec<Value> = data(res, StatusCode::OK).await?;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["work"], json!("Cleaner"));

    let res = state
        .client
        .get(state.url("/api/posts?place=Yang"))
        .send()
        .await?;
    let posts: Vec<Value> = data(res, StatusCode::OK).await?;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["work"], json!("Driver"));
    Ok(())
}

#[tokio::test]
async fn invalid_post_is_rejected() -> Result<()> {
    let state = TestState::start().await?;

    let res = state
        .client
        .post(state.url("/api/posts"))
        .json(&json!({
            "post_type": "employer",
            "work": "Cook",
            "place": "",
            "contact": "09 1",
        }))
        .send()
        .await?;
    let message = failure(res, StatusCode::BAD_REQUEST).await?;
    assert_eq!(message, "place is required");
    Ok(())
}

#[tokio::test]
async fn approving_payments_for_a_post_approves_the_post() -> Result<()> {
    let state = TestState::start().await?;
    let post = state.create_post("Housekeeper").await?;

    let first: Payment = data(
        state.submit_payment(post.id, "listing", vec![1; 64]).await?,
        StatusCode::CREATED,
    )
    .await?;
    let second: Payment = data(
        state.submit_payment(post.id, "listing", vec![2; 64]).await?,
        StatusCode::CREATED,
    )
    .await?;
    assert_eq!(first.status, PaymentStatus::Pending);
    assert!(first.receipt_url.contains("/files/receipts/"));

    let res = state
        .admin_post(&format!("/api/admin/posts/{}/approve-payment", post.id))
        .await?;
    let approved: Vec<Payment> = data(res, StatusCode::OK).await?;
    assert_eq!(approved.len(), 2);

    let payments: Vec<Payment> = state
        .admin_get(&format!("/api/admin/payments?post_id={}", post.id))
        .await?;
    assert_eq!(payments.len(), 2);
    for payment in &payments {
        assert_eq!(payment.status, PaymentStatus::Approved);
        assert!(payment.decided_at.is_some());
    }
    assert!(payments.iter().any(|p| p.id == first.id));
    assert!(payments.iter().any(|p| p.id == second.id));

    let posts: Vec<Post> = state.admin_get("/api/admin/posts?status=approved").await?;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].id, post.id);

    // Approved payments are never reopened.
    let res = state
        .admin_post(&format!("/api/admin/payments/{}/reject", first.id))
        .await?;
    failure(res, StatusCode::CONFLICT).await?;
    Ok(())
}

#[tokio::test]
async fn homepage_feature_follows_payment_decision() -> Result<()> {
    let state = TestState::start().await?;
    let plain = state.approved_post("Gardener").await?;
    let featured = state.approved_post("Tutor").await?;
    let rejected = state.approved_post("Cook").await?;

    let payment: Payment = data(
        state.submit_payment(featured.id, "homepage", vec![3; 32]).await?,
        StatusCode::CREATED,
    )
    .await?;
    let refused: Payment = data(
        state.submit_payment(rejected.id, "homepage", vec![4; 32]).await?,
        StatusCode::CREATED,
    )
    .await?;

    let posts: Vec<Post> = state.admin_get("/api/admin/posts").await?;
    let status_of = |id: Uuid| {
        posts
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.homepage_payment_status)
    };
    assert_eq!(status_of(featured.id), Some(HomepagePaymentStatus::Pending));

    let res = state
        .admin_post(&format!("/api/admin/payments/{}/approve", payment.id))
        .await?;
    let approved: Payment = data(res, StatusCode::OK).await?;
    assert_eq!(approved.status, PaymentStatus::Approved);

    let res = state
        .admin_post(&format!("/api/admin/payments/{}/reject", refused.id))
        .await?;
    let _: Payment = data(res, StatusCode::OK).await?;

    let posts: Vec<Post> = state.admin_get("/api/admin/posts").await?;
    let status_of = |id: Uuid| {
        posts
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.homepage_payment_status)
    };
    assert_eq!(status_of(featured.id), Some(HomepagePaymentStatus::Approved));
    assert_eq!(status_of(rejected.id), Some(HomepagePaymentStatus::Rejected));
    assert_eq!(status_of(plain.id), Some(HomepagePaymentStatus::NotRequested));

    // Featured posts come first in the public listing.
    let listing = state.public_posts().await?;
    assert_eq!(listing.len(), 3);
    assert_eq!(listing[0]["id"], json!(featured.id));
    assert_eq!(listing[0]["featured"], json!(true));

    let res = state
        .admin_post(&format!("/api/admin/posts/{}/unfeature", featured.id))
        .await?;
    let unfeatured: Post = data(res, StatusCode::OK).await?;
    assert_eq!(
        unfeatured.homepage_payment_status,
        HomepagePaymentStatus::NotRequested
    );
    let listing = state.public_posts().await?;
    assert!(listing.iter().all(|p| p["featured"] == json!(false)));

    // A rejected feature was never granted, so it cannot be withdrawn.
    let res = state
        .admin_post(&format!("/api/admin/posts/{}/unfeature", rejected.id))
        .await?;
    failure(res, StatusCode::CONFLICT).await?;
    Ok(())
}

#[tokio::test]
async fn contact_unlock_flow() -> Result<()> {
    let state = TestState::start().await?;
    let post = state.approved_post("Caregiver").await?;
    let visitor = "visitor-1";

    let request_unlock = || {
        state
            .client
            .post(state.url("/api/unlock-requests"))
            .json(&json!({ "post_id": post.id, "visitor_id": visitor }))
            .send()
    };

    let request: UnlockRequest = data(request_unlock().await?, StatusCode::CREATED).await?;
    assert_eq!(request.status, UnlockStatus::Pending);

    // Asking again returns the open request rather than creating another.
    let again: UnlockRequest = data(request_unlock().await?, StatusCode::CREATED).await?;
    assert_eq!(again.id, request.id);

    // Approval before proof is refused.
    let res = state
        .admin_post(&format!("/api/admin/unlock-requests/{}/approve", request.id))
        .await?;
    failure(res, StatusCode::CONFLICT).await?;

    let view_url = state.url(&format!("/api/posts/{}?visitor_id={visitor}", post.id));
    let view: Value = data(state.client.get(&view_url).send().await?, StatusCode::OK).await?;
    assert_eq!(view["contact_locked"], json!(true));

    let form = Form::new()
        .text("amount", "1000")
        .text("method", "wavepay")
        .part("receipt", receipt_part(vec![9; 100])?);
    let res = state
        .client
        .post(state.url(&format!("/api/unlock-requests/{}/proof", request.id)))
        .multipart(form)
        .send()
        .await?;
    let receipt: Value = data(res, StatusCode::CREATED).await?;
    assert_eq!(receipt["request"]["status"], json!("paid"));
    assert_eq!(receipt["payment"]["purpose"], json!("unlock"));
    let payment_id = receipt["payment"]["id"].as_str().unwrap().to_owned();

    let paid: Vec<UnlockRequest> = state
        .admin_get("/api/admin/unlock-requests?status=paid")
        .await?;
    assert_eq!(paid.len(), 1);

    let res = state
        .admin_post(&format!("/api/admin/payments/{payment_id}/approve"))
        .await?;
    let _: Payment = data(res, StatusCode::OK).await?;

    let view: Value = data(state.client.get(&view_url).send().await?, StatusCode::OK).await?;
    assert_eq!(view["contact_locked"], json!(false));
    assert_eq!(view["contact"], json!("09 555 0101"));

    // Another visitor still sees the contact withheld.
    let other = state.url(&format!("/api/posts/{}?visitor_id=visitor-2", post.id));
    let view: Value = data(state.client.get(&other).send().await?, StatusCode::OK).await?;
    assert_eq!(view["contact"], Value::Null);

    let mine: Vec<UnlockRequest> = data(
        state
            .client
            .get(state.url(&format!("/api/unlock-requests?visitor_id={visitor}")))
            .send()
            .await?,
        StatusCode::OK,
    )
    .await?;
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].status, UnlockStatus::Approved);
    Ok(())
}

#[tokio::test]
async fn rejecting_an_unlock_rejects_its_payment() -> Result<()> {
    let state = TestState::start().await?;
    let post = state.approved_post("Driver").await?;

    let res = state
        .client
        .post(state.url("/api/unlock-requests"))
        .json(&json!({ "post_id": post.id, "visitor_id": "v" }))
        .send()
        .await?;
    let request: UnlockRequest = data(res, StatusCode::CREATED).await?;

    let form = Form::new()
        .text("post_id", post.id.to_string())
        .text("purpose", "unlock")
        .text("unlock_request_id", request.id.to_string())
        .text("amount", "1000")
        .text("method", "cash")
        .part("receipt", receipt_part(vec![5; 10])?);
    let res = state
        .client
        .post(state.url("/api/payments"))
        .multipart(form)
        .send()
        .await?;
    let payment: Payment = data(res, StatusCode::CREATED).await?;

    let res = state
        .admin_post(&format!("/api/admin/unlock-requests/{}/reject", request.id))
        .await?;
    let rejected: UnlockRequest = data(res, StatusCode::OK).await?;
    assert_eq!(rejected.status, UnlockStatus::Rejected);

    let payments: Vec<Payment> = state
        .admin_get("/api/admin/payments?status=rejected")
        .await?;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].id, payment.id);

    // A closed request frees the visitor to open a new one.
    let res = state
        .client
        .post(state.url("/api/unlock-requests"))
        .json(&json!({ "post_id": post.id, "visitor_id": "v" }))
        .send()
        .await?;
    let reopened: UnlockRequest = data(res, StatusCode::CREATED).await?;
    assert_ne!(reopened.id, request.id);
    Ok(())
}

#[tokio::test]
async fn deleting_a_post_removes_its_payments_and_unlocks() -> Result<()> {
    let state = TestState::start().await?;
    let post = state.approved_post("Security guard").await?;
    let keep = state.approved_post("Cook").await?;

    let _: Payment = data(
        state.submit_payment(post.id, "homepage", vec![6; 16]).await?,
        StatusCode::CREATED,
    )
    .await?;
    let _: Payment = data(
        state.submit_payment(keep.id, "listing", vec![7; 16]).await?,
        StatusCode::CREATED,
    )
    .await?;
    let res = state
        .client
        .post(state.url("/api/unlock-requests"))
        .json(&json!({ "post_id": post.id, "visitor_id": "v" }))
        .send()
        .await?;
    let _: UnlockRequest = data(res, StatusCode::CREATED).await?;

    let res = state
        .client
        .delete(state.url(&format!("/api/posts/{}/delete", post.id)))
        .bearer_auth(&state.admin_token)
        .send()
        .await?;
    let _: Uuid = data(res, StatusCode::OK).await?;

    let payments: Vec<Payment> = state
        .admin_get(&format!("/api/admin/payments?post_id={}", post.id))
        .await?;
    assert!(payments.is_empty());
    let unlocks: Vec<UnlockRequest> = state
        .admin_get(&format!("/api/admin/unlock-requests?post_id={}", post.id))
        .await?;
    assert!(unlocks.is_empty());

    // Other posts are untouched.
    let remaining: Vec<Payment> = state.admin_get("/api/admin/payments").await?;
    assert_eq!(remaining.len(), 1);

    let res = state
        .client
        .delete(state.url(&format!("/api/posts/{}/delete", post.id)))
        .bearer_auth(&state.admin_token)
        .send()
        .await?;
    failure(res, StatusCode::NOT_FOUND).await?;
    Ok(())
}

#[tokio::test]
async fn identical_contact_submissions_create_two_rows() -> Result<()> {
    let state = TestState::start().await?;
    let body = json!({
        "name": "Ma Su",
        "email": "su@example.com",
        "message": "Please call me about the cook post.",
    });

    for _ in 0..2 {
        let res = state
            .client
            .post(state.url("/api/contact"))
            .json(&body)
            .send()
            .await?;
        let _: ContactSubmission = data(res, StatusCode::CREATED).await?;
    }

    let submissions: Vec<ContactSubmission> = state.admin_get("/api/contact").await?;
    assert_eq!(submissions.len(), 2);
    assert_ne!(submissions[0].id, submissions[1].id);

    let id = submissions[0].id;
    let res = state
        .client
        .patch(state.url(&format!("/api/contact/{id}")))
        .bearer_auth(&state.admin_token)
        .json(&json!({ "status": "closed", "priority": "high", "admin_notes": "called back" }))
        .send()
        .await?;
    let closed: ContactSubmission = data(res, StatusCode::OK).await?;
    assert_eq!(closed.status, SubmissionStatus::Closed);
    assert_eq!(closed.admin_notes.as_deref(), Some("called back"));

    let res = state
        .client
        .patch(state.url(&format!("/api/contact/{id}")))
        .bearer_auth(&state.admin_token)
        .json(&json!({ "status": "pending" }))
        .send()
        .await?;
    failure(res, StatusCode::CONFLICT).await?;
    Ok(())
}

#[tokio::test]
async fn oversized_upload_is_rejected_without_storage_write() -> Result<()> {
    let state = TestState::start().await?;
    let post = state.create_post("Cook").await?;

    let res = state
        .submit_payment(post.id, "listing", vec![0; UPLOAD_LIMIT * 4])
        .await?;
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(state.stored_file_count(), 0);

    // Far beyond the body limit the request is refused while streaming.
    let form = Form::new().part("file", receipt_part(vec![0; 256 * 1024])?);
    // The server may hang up before the client finishes sending.
    if let Ok(res) = state
        .client
        .post(state.url("/api/upload"))
        .multipart(form)
        .send()
        .await
    {
        assert!(res.status().is_client_error(), "{}", res.status());
    }
    assert_eq!(state.stored_file_count(), 0);

    let payments: Vec<Payment> = state.admin_get("/api/admin/payments").await?;
    assert!(payments.is_empty());
    Ok(())
}

#[tokio::test]
async fn upload_checks_type_and_serves_stored_files() -> Result<()> {
    let state = TestState::start().await?;

    let form = Form::new().part(
        "file",
        Part::bytes(b"<html></html>".to_vec())
            .file_name("page.html")
            .mime_str("text/html")?,
    );
    let res = state
        .client
        .post(state.url("/api/upload"))
        .multipart(form)
        .send()
        .await?;
    failure(res, StatusCode::UNSUPPORTED_MEDIA_TYPE).await?;
    assert_eq!(state.stored_file_count(), 0);

    let form = Form::new()
        .text("folder", "photos")
        .part("file", receipt_part(b"not really a png".to_vec())?);
    let res = state
        .client
        .post(state.url("/api/upload"))
        .multipart(form)
        .send()
        .await?;
    let stored: Value = data(res, StatusCode::OK).await?;
    assert!(stored["key"].as_str().unwrap().starts_with("photos/"));
    assert_eq!(stored["size"], json!(16));
    assert_eq!(state.stored_file_count(), 1);

    let res = state
        .client
        .get(stored["url"].as_str().unwrap())
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.bytes().await?.as_ref(), b"not really a png");
    Ok(())
}

#[tokio::test]
async fn admin_routes_require_an_admin_session() -> Result<()> {
    let state = TestState::start().await?;

    let res = state
        .client
        .get(state.url("/api/admin/payments"))
        .send()
        .await?;
    failure(res, StatusCode::UNAUTHORIZED).await?;

    let res = state
        .client
        .get(state.url("/api/admin/stats"))
        .bearer_auth("bogus")
        .send()
        .await?;
    failure(res, StatusCode::UNAUTHORIZED).await?;

    let res = state
        .client
        .post(state.url("/api/auth/login"))
        .json(&json!({ "email": "admin@test.local", "password": "wrong" }))
        .send()
        .await?;
    failure(res, StatusCode::UNAUTHORIZED).await?;

    let _ = state.create_post("Cook").await?;
    let stats: Value = state.admin_get("/api/admin/stats").await?;
    assert_eq!(stats["pending_posts"], json!(1));

    let me: Value = state.admin_get("/api/auth/me").await?;
    assert_eq!(me["role"], json!("admin"));
    assert!(me.get("password_hash").is_none());

    let res = state.admin_post("/api/auth/logout").await?;
    let removed: bool = data(res, StatusCode::OK).await?;
    assert!(removed);

    let res = state
        .client
        .get(state.url("/api/admin/stats"))
        .bearer_auth(&state.admin_token)
        .send()
        .await?;
    failure(res, StatusCode::UNAUTHORIZED).await?;
    Ok(())
}

#[tokio::test]
async fn unlock_request_id_is_refused_on_other_purposes() -> Result<()> {
    let state = TestState::start().await?;
    let featured = state.approved_post("Cook").await?;
    let unlocked = state.approved_post("Driver").await?;

    let res = state
        .client
        .post(state.url("/api/unlock-requests"))
        .json(&json!({ "post_id": unlocked.id, "visitor_id": "v" }))
        .send()
        .await?;
    let request: UnlockRequest = data(res, StatusCode::CREATED).await?;

    for purpose in ["homepage", "listing"] {
        let form = Form::new()
            .text("post_id", featured.id.to_string())
            .text("purpose", purpose)
            .text("unlock_request_id", request.id.to_string())
            .text("amount", "3000")
            .text("method", "kbzpay")
            .part("receipt", receipt_part(vec![8; 32])?);
        let res = state
            .client
            .post(state.url("/api/payments"))
            .multipart(form)
            .send()
            .await?;
        let message = failure(res, StatusCode::BAD_REQUEST).await?;
        assert!(message.contains("unlock_request_id"), "{message}");
    }

    let homepage: Payment = data(
        state.submit_payment(featured.id, "homepage", vec![8; 32]).await?,
        StatusCode::CREATED,
    )
    .await?;

    // Deciding and deleting the other post leaves this payment alone.
    let res = state
        .admin_post(&format!("/api/admin/unlock-requests/{}/reject", request.id))
        .await?;
    let _: UnlockRequest = data(res, StatusCode::OK).await?;
    let res = state
        .client
        .delete(state.url(&format!("/api/posts/{}/delete", unlocked.id)))
        .bearer_auth(&state.admin_token)
        .send()
        .await?;
    let _: Uuid = data(res, StatusCode::OK).await?;

    let payments: Vec<Payment> = state
        .admin_get(&format!("/api/admin/payments?post_id={}", featured.id))
        .await?;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].id, homepage.id);
    assert_eq!(payments[0].status, PaymentStatus::Pending);

    let posts: Vec<Post> = state.admin_get("/api/admin/posts").await?;
    let post = posts.iter().find(|p| p.id == featured.id).unwrap();
    assert_eq!(post.homepage_payment_status, HomepagePaymentStatus::Pending);
    Ok(())
}

#[tokio::test]
async fn hiding_a_payment_keeps_its_decision_time() -> Result<()> {
    let state = TestState::start().await?;
    let post = state.create_post("Cook").await?;

    let payment: Payment = data(
        state.submit_payment(post.id, "listing", vec![1; 8]).await?,
        StatusCode::CREATED,
    )
    .await?;
    let res = state
        .admin_post(&format!("/api/admin/payments/{}/approve", payment.id))
        .await?;
    let approved: Payment = data(res, StatusCode::OK).await?;
    let decided_at = approved.decided_at.context("approval should be stamped")?;

    tokio::time::sleep(Duration::from_millis(20)).await;

    let res = state
        .admin_post(&format!("/api/admin/payments/{}/hide", payment.id))
        .await?;
    let hidden: Payment = data(res, StatusCode::OK).await?;
    assert_eq!(hidden.status, PaymentStatus::Hidden);
    assert_eq!(hidden.decided_at, Some(decided_at));

    // Hiding an undecided payment does not stamp it either.
    let pending: Payment = data(
        state.submit_payment(post.id, "listing", vec![2; 8]).await?,
        StatusCode::CREATED,
    )
    .await?;
    let res = state
        .admin_post(&format!("/api/admin/payments/{}/hide", pending.id))
        .await?;
    let hidden: Payment = data(res, StatusCode::OK).await?;
    assert_eq!(hidden.decided_at, None);
    Ok(())
}

#[tokio::test]
async fn members_are_forbidden_from_admin_routes() -> Result<()> {
    let state = TestState::start().await?;
    let _member = User::insert(
        "member@test.local",
        "Member",
        UserRole::Member,
        "member-password",
        &state.db,
    )
    .await?;

    let token = state.login("member@test.local", "member-password").await?;

    let res = state
        .client
        .get(state.url("/api/admin/stats"))
        .bearer_auth(&token)
        .send()
        .await?;
    failure(res, StatusCode::FORBIDDEN).await?;

    // The session itself is valid.
    let res = state
        .client
        .get(state.url("/api/auth/me"))
        .bearer_auth(&token)
        .send()
        .await?;
    let me: Value = data(res, StatusCode::OK).await?;
    assert_eq!(me["role"], json!("member"));
    Ok(())
}

#[tokio::test]
async fn expired_sessions_are_unauthorized() -> Result<()> {
    let state = TestState::start().await?;
    let admin = User::find_by_email("admin@test.local", &state.db)
        .await?
        .context("bootstrapped admin should exist")?;

    let session = Session::create(admin.id, chrono::Duration::hours(-1), &state.db).await?;

    let res = state
        .client
        .get(state.url("/api/admin/stats"))
        .bearer_auth(&session.token)
        .send()
        .await?;
    let message = failure(res, StatusCode::UNAUTHORIZED).await?;
    assert_eq!(message, "invalid or expired session");

    assert_eq!(Session::purge_expired(&state.db).await?, 1);
    Ok(())
}
