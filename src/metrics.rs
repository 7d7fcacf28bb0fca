//! Metric name constants.

use std::time::Duration;

use anyhow::Context;
use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config;

pub const AUTH_FAILED: &str = "citymaid.auth.failed"; // Counter.

pub const POSTS_CREATED: &str = "citymaid.posts.created"; // Counter.
pub const POSTS_DELETED: &str = "citymaid.posts.deleted"; // Counter.

pub const PAYMENTS_CREATED: &str = "citymaid.payments.created"; // Counter.
pub const PAYMENTS_APPROVED: &str = "citymaid.payments.approved"; // Counter.
pub const PAYMENTS_REJECTED: &str = "citymaid.payments.rejected"; // Counter.

pub const UNLOCKS_REQUESTED: &str = "citymaid.unlocks.requested"; // Counter.
pub const UPLOADS_REJECTED: &str = "citymaid.uploads.rejected"; // Counter.

/// Must be ran exactly once on startup. This will declare all of the instruments for `metrics`.
pub fn setup(config: Option<&config::MetricConfig>) -> anyhow::Result<()> {
    describe_counter!(AUTH_FAILED, "The number of failed authentication attempts.");

    describe_counter!(POSTS_CREATED, "Posts submitted through the public form.");
    describe_counter!(POSTS_DELETED, "Posts deleted by an administrator.");

    describe_counter!(PAYMENTS_CREATED, "Payments submitted with a receipt.");
    describe_counter!(PAYMENTS_APPROVED, "Payments approved by an administrator.");
    describe_counter!(PAYMENTS_REJECTED, "Payments rejected by an administrator.");

    describe_counter!(UNLOCKS_REQUESTED, "Contact unlock requests opened.");
    describe_counter!(
        UPLOADS_REJECTED,
        "Uploads refused for their size or file type."
    );

    if let Some(config) = config {
        match config {
            config::MetricConfig::PrometheusPush(prometheus_config) => {
                PrometheusBuilder::new()
                    .with_push_gateway(
                        prometheus_config.url.clone(),
                        Duration::from_secs(10),
                        None,
                        None,
                    )
                    .context("failed to set up push gateway")?
                    .install()
                    .context("failed to install metrics exporter")?;
            }
        }
    }

    Ok(())
}
