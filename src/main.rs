//! Archive Backend server
//!
//! Serves the storage request API and runs the upload workers against the
//! same queue database.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use archive_backend::config::Config;
use archive_backend::providers::{LocalProvider, ProviderRegistry, S3Provider};
use archive_backend::queue::QueueStore;
use archive_backend::routes;
use archive_backend::state::AppState;
use archive_backend::worker::{LocalFileSource, WorkerPool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "archive_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Archive Backend v{}", env!("CARGO_PKG_VERSION"));

    let registry = build_registry(&config).await?;
    if registry.is_empty() {
        tracing::warn!("No storage providers configured; submissions will be rejected");
    }

    // Initialize database
    let db_pool = archive_backend::db::create_pool(&config.database.url)
        .await
        .context("Failed to initialize database")?;
    tracing::info!("Database initialized at {}", config.database.url);

    let queue = QueueStore::open(db_pool, Arc::new(registry))
        .await
        .context("Failed to open queue store")?;

    let workers = WorkerPool::spawn(
        config.worker.count,
        queue.clone(),
        Arc::new(LocalFileSource::new(config.files.root.clone())),
        config.worker.poll_interval(),
    );

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let app = routes::router(AppState::new(config, queue))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    tracing::info!("Archive Backend listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    workers.shutdown().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Register every provider the configuration enables
async fn build_registry(config: &Config) -> anyhow::Result<ProviderRegistry> {
    let mut builder = ProviderRegistry::builder();

    if let Some(local) = &config.local {
        tokio::fs::create_dir_all(&local.path)
            .await
            .with_context(|| format!("Failed to create {}", local.path.display()))?;
        tracing::info!("Local provider storing under {}", local.path.display());
        builder = builder.register(Arc::new(LocalProvider::new(local.path.clone())))?;
    }

    if let Some(s3) = &config.s3 {
        tracing::info!("S3 provider: {} bucket {}", s3.endpoint, s3.bucket);
        builder = builder.register(Arc::new(S3Provider::new(s3).await))?;
    }

    Ok(builder.build())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
