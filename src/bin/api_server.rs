// src/bin/api_server.rs

use market_platform::infra::logging::init_logging;
use market_platform::workers::{ModerationQueueWorker, QuarantineCleanupWorker};
use market_platform::{create_router, ApiDoc, AppState, Config, DatabaseService};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = Config::from_env()?;
    let bind_addr = config.bind_addr;

    info!("connecting to database");
    let db_service = DatabaseService::new(&config).await?;

    let state = AppState::new(config, db_service)?;
    state.storage.ensure_layout().await?;
    info!(root = %state.storage.root().display(), "storage ready");

    // --- Background workers ---
    let moderation_worker = Arc::new(ModerationQueueWorker::new(
        state.pool().clone(),
        state.moderation.clone(),
        state.config.moderation.poll_secs,
    ));
    let cleanup_worker = Arc::new(QuarantineCleanupWorker::new(
        state.pool().clone(),
        state.storage.clone(),
        state.config.quarantine_ttl_secs,
        state.config.quarantine_sweep_secs,
    ));
    let moderation_task = moderation_worker.clone().start();
    let cleanup_task = cleanup_worker.clone().start();
    info!(
        moderation_poll_secs = state.config.moderation.poll_secs,
        quarantine_sweep_secs = state.config.quarantine_sweep_secs,
        "background workers started"
    );

    // --- API server ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = create_router(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "API server listening");
    info!("Swagger UI available at /swagger-ui");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server drained, stopping workers");
    moderation_worker.shutdown();
    cleanup_worker.shutdown();
    for task in [moderation_task, cleanup_task] {
        if let Err(e) = task.await {
            warn!(error = %e, "worker task ended abnormally");
        }
    }
    info!("graceful shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
