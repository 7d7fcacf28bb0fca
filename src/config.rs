use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use serde::Deserialize;
use url::Url;

/// Upload constraints applied to every receipt and photo.
#[derive(Deserialize, Debug, Clone)]
pub struct UploadConfig {
    /// Maximum accepted file size, in bytes.
    #[serde(default = "default_upload_limit")]
    pub limit: u64,
    /// Accepted MIME types.
    #[serde(default = "default_upload_accept")]
    pub accept: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            limit: default_upload_limit(),
            accept: default_upload_accept(),
        }
    }
}

/// Where uploaded objects are written.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Local directory, served back under `/files`.
    Fs { path: PathBuf },
    /// Hosted object storage reached over HTTP.
    Http {
        endpoint: Url,
        bucket: String,
        service_key: String,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Fs {
            path: PathBuf::from("data/files"),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct PrometheusConfig {
    pub url: Url,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricConfig {
    PrometheusPush(PrometheusConfig),
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,
    /// Base URL that public file links are built from.
    #[serde(default = "default_public_url")]
    pub public_url: Url,
    #[serde(default = "default_db")]
    pub db: String,
    /// Email of the administrator created on first startup.
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub metrics: Option<MetricConfig>,
}

fn default_listen_address() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8000)
}

fn default_public_url() -> Url {
    Url::parse("http://127.0.0.1:8000").expect("static url should parse")
}

fn default_db() -> String {
    "sqlite://data/citymaid.db".to_owned()
}

fn default_admin_email() -> String {
    "admin@citymaid.local".to_owned()
}

const fn default_session_ttl_hours() -> i64 {
    24 * 7
}

const fn default_upload_limit() -> u64 {
    5 * 1024 * 1024
}

fn default_upload_accept() -> Vec<String> {
    ["image/jpeg", "image/png", "image/webp", "application/pdf"]
        .into_iter()
        .map(ToOwned::to_owned)
        .collect()
}
