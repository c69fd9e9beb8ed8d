use anyhow::{Context, Result};
use axum::Router;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use config::{AppConfig, BackendKind};
use services::{
    file_id::FileIdResolver,
    file_service::FileService,
    local_store::{self, LocalStore},
    memory_store::MemoryStore,
    object_store::ObjectStore,
    upload::{BulkUploader, UploadPolicy},
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting file-gateway with config: {:?}", cfg);

    // --- Object store backend ---
    let store: Arc<dyn ObjectStore> = match cfg.backend {
        BackendKind::Local => {
            let store = open_local_store(&cfg).await?;
            if migrate {
                tracing::info!("Database migration complete.");
                return Ok(()); // exit after migration
            }
            Arc::new(store)
        }
        BackendKind::Memory => {
            if migrate {
                tracing::warn!("--migrate has no effect with the memory backend");
                return Ok(());
            }
            Arc::new(MemoryStore::new())
        }
    };

    // --- Initialize core service ---
    let resolver = FileIdResolver::new(
        cfg.addressing,
        cfg.default_bucket.clone(),
        cfg.default_category.clone(),
    );
    let uploader = BulkUploader::new(
        UploadPolicy {
            max_file_size: cfg.max_file_size,
            allowed_mime_types: cfg.allowed_mime_types.clone(),
            max_batch_files: cfg.max_batch_files,
        },
        cfg.upload_concurrency,
    );
    let service = FileService::new(store, resolver, uploader);

    // A failure here is retried on first use of the bucket.
    match service.ensure_default_bucket().await {
        Ok(()) => tracing::info!("Default bucket {} ready", cfg.default_bucket),
        Err(err) => tracing::warn!(
            "Could not ensure default bucket {}: {}",
            cfg.default_bucket,
            err
        ),
    }

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.body_limit).with_state(service);

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
    axum::serve(listener, app).await?;

    Ok(())
}

/// Prepare directories, connect SQLite and apply the schema.
async fn open_local_store(cfg: &AppConfig) -> Result<LocalStore> {
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)
            .with_context(|| format!("creating storage directory {}", cfg.storage_dir))?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    let db_path = cfg
        .database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {:?}", parent))?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let db = local_store::connect_pool(&cfg.database_url)
        .await
        .with_context(|| format!("connecting to {}", cfg.database_url))?;
    let applied = local_store::run_migrations(&db)
        .await
        .context("applying SQLite schema")?;
    tracing::info!("Applied {} migration statements", applied);

    Ok(LocalStore::new(Arc::new(db), &cfg.storage_dir, &cfg.region)?)
}
