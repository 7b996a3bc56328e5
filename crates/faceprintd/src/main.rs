use anyhow::{Context, Result};
use faceprint_core::OnnxFaceModel;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod http;
mod service;
mod store;
#[cfg(test)]
mod testing;

use config::Config;
use service::FaceService;
use store::EmbeddingStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(
        bind = %config.bind_addr,
        model_dir = %config.model_dir.display(),
        store = %config.store_path.display(),
        threshold = config.default_threshold,
        "faceprintd starting"
    );

    let model = OnnxFaceModel::load(&config.model_dir, &config.session_options())
        .with_context(|| format!("failed to load face models from {}", config.model_dir.display()))?;

    let store = EmbeddingStore::open(config.store_path.clone())
        .with_context(|| format!("failed to open user store {}", config.store_path.display()))?;

    let service = Arc::new(FaceService::new(Arc::new(model), store, config.default_threshold));
    let app = http::router(Arc::clone(&service));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "faceprintd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("faceprintd shutting down");
    service.shutdown();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
