use std::path::PathBuf;

use anyhow::Context as _;
use axum::{extract::FromRef, routing::get, Router};
use clap::Parser;
use clap_verbosity_flag::{log::LevelFilter, InfoLevel, Verbosity};
use figment::{providers::Format as _, Figment};
use sqlx::SqlitePool;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use super::{
    config::AppConfig,
    db::establish_pool,
    models::{generate_token, Session, User},
    status::UserRole,
    storage::ObjectStore,
};
pub use super::error::Error;

/// The application user agent. Concatenates the package name and version. e.g. `citymaid/0.0.0`.
pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Prefix for configuration supplied through the environment.
pub const ENV_PREFIX: &str = "CITYMAID_";

/// The application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Parser, Debug, Clone)]
/// Command line arguments.
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "default.toml")]
    pub config: PathBuf,
    /// The verbosity level.
    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,
}

#[derive(Clone, FromRef)]
/// The application state, shared across all routes.
pub struct AppState {
    /// The application configuration.
    pub config: AppConfig,
    /// The database connection pool.
    pub db: SqlitePool,
    /// Where receipts and photos are written.
    pub storage: ObjectStore,
}

impl AppState {
    /// Connect to the database and object storage described by `config`.
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let db = establish_pool(&config.db)
            .await
            .context("failed to establish database connection pool")?;

        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()
            .context("failed to build storage client")?;
        let storage = ObjectStore::from_config(&config.storage, &config.public_url, client);

        if let Some(dir) = storage.serve_dir() {
            tokio::fs::create_dir_all(dir)
                .await
                .context("failed to create file storage directory")?;
        }

        Ok(Self {
            config,
            db,
            storage,
        })
    }
}

/// Create the administrator account if none exists yet, returning its generated password.
pub async fn bootstrap_admin(db: &SqlitePool, email: &str) -> anyhow::Result<Option<String>> {
    let admins = User::count_by_role(UserRole::Admin, db)
        .await
        .context("failed to count administrators")?;
    if admins > 0 {
        return Ok(None);
    }

    let password: String = generate_token().chars().take(20).collect();
    let _admin = User::insert(email, "Administrator", UserRole::Admin, &password, db).await?;
    Ok(Some(password))
}

/// Build the HTTP router.
pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(super::index))
        .merge(super::endpoints::routes(state.config.upload.limit));

    if let Some(dir) = state.storage.serve_dir() {
        router = router.nest_service("/files", ServeDir::new(dir));
    }

    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The main application entry point.
pub async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    // Set up trace logging to console and account for the user-provided verbosity flag.
    if args.verbosity.log_level_filter() != LevelFilter::Off {
        let lvl = match args.verbosity.log_level_filter() {
            LevelFilter::Error => tracing::Level::ERROR,
            LevelFilter::Warn => tracing::Level::WARN,
            LevelFilter::Info | LevelFilter::Off => tracing::Level::INFO,
            LevelFilter::Debug => tracing::Level::DEBUG,
            LevelFilter::Trace => tracing::Level::TRACE,
        };
        tracing_subscriber::fmt().with_max_level(lvl).init();
    }

    if !args.config.exists() {
        // Not fatal: every setting can come from the environment, but a missing
        // file most likely means it was not mounted.
        warn!(
            "configuration file {} does not exist",
            args.config.display()
        );
    }

    // Read and parse the user-provided configuration.
    let config: AppConfig = Figment::new()
        .admerge(figment::providers::Toml::file(args.config))
        .admerge(figment::providers::Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context("failed to load configuration")?;

    // Initialize metrics reporting.
    super::metrics::setup(config.metrics.as_ref()).context("failed to set up metrics exporter")?;

    let state = AppState::new(config.clone()).await?;

    let purged = Session::purge_expired(&state.db)
        .await
        .context("failed to purge expired sessions")?;
    if purged > 0 {
        info!("purged {purged} expired sessions");
    }

    // On first startup, create an administrator and share its password via the console.
    if let Some(password) = bootstrap_admin(&state.db, &config.admin_email).await? {
        // N.B: This is a sensitive message, so we're bypassing `tracing` here and
        // logging it directly to console.
        println!("=====================================");
        println!("            FIRST STARTUP            ");
        println!("=====================================");
        println!("Administrator: {}", config.admin_email);
        println!("Password:      {password}");
        println!("=====================================");
    }

    let addr = config.listen_address;
    let listener = TcpListener::bind(&addr)
        .await
        .context("failed to bind address")?;

    info!("listening on {addr}");
    info!("connect to: http://127.0.0.1:{}", addr.port());

    axum::serve(listener, app(state).into_make_service())
        .await
        .context("failed to serve app")
}
