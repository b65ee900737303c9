use anyhow::{Context, Result};
use axum::Router;
use services::{
    AppState, disk_store::DiskObjectStore, file_registry::FileRegistry,
    health_service::HealthService, http_store::HttpObjectStore,
    metadata_store::SqliteMetadataStore, object_store::ObjectStore, sigv4::Signer,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod telemetry;
#[cfg(test)]
mod testutil;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting file-registry with config: {:?}", cfg);

    if let Some(addr) = cfg.metrics_addr {
        telemetry::install(addr).context("installing Prometheus exporter")?;
        tracing::info!("Serving metrics on http://{}/metrics", addr);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    // Create parent directory if needed
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("parsing database url `{}`", db_url))?
        .create_if_missing(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?,
    );

    // --- Schema ---
    let applied = services::metadata_store::run_migrations(&db).await?;
    tracing::info!("Applied {} schema statements", applied);
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize stores and services ---
    let objects: Arc<dyn ObjectStore> = match &cfg.object_store_endpoint {
        Some(endpoint) => {
            let signer = cfg
                .credentials
                .clone()
                .map(|creds| Signer::new(creds, cfg.region.clone()));
            if signer.is_none() {
                tracing::warn!("No AWS credentials configured; object store requests are unsigned");
            }
            tracing::info!(
                "Using remote object store {} (bucket {}, region {})",
                endpoint,
                cfg.bucket,
                cfg.region
            );
            Arc::new(HttpObjectStore::new(
                endpoint,
                cfg.bucket.clone(),
                cfg.request_timeout,
                signer,
            )?)
        }
        None => {
            if !Path::new(&cfg.storage_dir).exists() {
                fs::create_dir_all(&cfg.storage_dir)?;
                tracing::info!("Created storage directory at {}", cfg.storage_dir);
            }
            tracing::info!(
                "Using on-disk object store at {} (bucket {})",
                cfg.storage_dir,
                cfg.bucket
            );
            Arc::new(DiskObjectStore::new(&cfg.storage_dir, cfg.bucket.clone()))
        }
    };
    let metadata = Arc::new(SqliteMetadataStore::new(db.clone()));

    let state = AppState {
        files: FileRegistry::new(objects, metadata.clone()),
        health: HealthService::new(metadata),
    };

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_upload_bytes).with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
