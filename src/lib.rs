//! CityMaid job marketplace service.
mod auth;
mod config;
mod db;
mod endpoints;
pub mod error;
mod metrics;
mod models;
mod moderation;
mod serve;
mod status;
mod storage;
#[cfg(test)]
mod tests;

pub use serve::{run, AppState, Error, Result};

/// The index (/) route.
async fn index() -> impl axum::response::IntoResponse {
    r"
       _ _                        _     _
   ___(_) |_ _   _ _ __ ___   __ _(_) __| |
  / __| | __| | | | '_ ` _ \ / _` | |/ _` |
 | (__| | |_| |_| | | | | | | (_| | | (_| |
  \___|_|\__|\__, |_| |_| |_|\__,_|_|\__,_|
             |___/

This is the CityMaid job marketplace API.

Most API routes are under /api/
    "
}
