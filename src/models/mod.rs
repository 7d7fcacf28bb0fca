//! Row types and the single-statement queries over them.
//!
//! Every query takes an executor so it can run against the pool or inside a
//! transaction opened by [`crate::moderation`].

mod payment;
mod post;
mod submission;
mod unlock;
mod user;

pub use payment::{NewPayment, Payment, PaymentQuery, PaymentWithPost};
pub use post::{NewPost, Post, PostEdit, PostQuery};
pub use submission::{ContactSubmission, NewSubmission, SubmissionQuery, SubmissionUpdate};
pub use unlock::{UnlockQuery, UnlockRequest};
pub use user::{generate_token, verify_password, Session, User};
