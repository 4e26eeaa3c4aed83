use anyhow::Result;
use filebox::{
    auth::{CredentialVerifier, JwtVerifier},
    config::{AppConfig, Backend, Mode},
    repositories::file_repository::{self, SqliteFileRepository},
    services::file_service::FileService,
    state::AppState,
    storage::{ObjectStore, local::LocalObjectStore, s3::S3ObjectStore},
};
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = AppConfig::from_env_and_args()?;

    let verifier = JwtVerifier::new(&cfg.jwt_secret);
    if let Mode::IssueToken(user) = &mode {
        let token = verifier.issue(user, chrono::Duration::hours(24))?;
        println!("{}", token);
        return Ok(());
    }

    tracing::info!("Starting filebox with config: {:?}", cfg);

    // --- Metadata store ---
    let db = file_repository::connect(&cfg.database_url).await?;
    file_repository::run_migrations(&db).await?;
    if mode == Mode::Migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Object store ---
    let (store, local_store): (Arc<dyn ObjectStore>, Option<Arc<LocalObjectStore>>) =
        match cfg.backend {
            Backend::Local => {
                tokio::fs::create_dir_all(&cfg.storage_dir).await?;
                let local = Arc::new(LocalObjectStore::new(
                    &cfg.storage_dir,
                    &cfg.bucket,
                    &cfg.public_url,
                    &cfg.signing_secret,
                ));
                tracing::info!("Using local object store at {}", cfg.storage_dir);
                let store: Arc<dyn ObjectStore> = local.clone();
                (store, Some(local))
            }
            Backend::S3 => {
                let s3 =
                    S3ObjectStore::from_env(&cfg.bucket, &cfg.region, cfg.endpoint_url.clone())
                        .await;
                tracing::info!("Using S3 bucket {} in {}", cfg.bucket, cfg.region);
                let store: Arc<dyn ObjectStore> = Arc::new(s3);
                (store, None)
            }
        };

    if cfg.compensate_orphans {
        tracing::warn!("Orphan compensation enabled: failed uploads delete their stored object");
    }

    // --- Initialize core service ---
    let files = FileService::new(Arc::new(SqliteFileRepository::new(db.clone())), store.clone())
        .with_orphan_compensation(cfg.compensate_orphans);
    let verifier: Arc<dyn CredentialVerifier> = Arc::new(verifier);

    let state = AppState {
        files,
        verifier,
        db,
        store,
        local_store,
    };

    // --- Build router ---
    let app = filebox::app(state, cfg.max_upload_bytes, &cfg.cors_origins);

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

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
