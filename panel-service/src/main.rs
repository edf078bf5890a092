use panel_service::{
    build_router,
    config::{PanelConfig, SeedConfig, StoreBackend},
    services::{seed::run_seed, Clock, MemoryStore, MongoStore, ServiceError, Store, SystemClock},
    utils::PasswordHasher,
    AppState,
};
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = PanelConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    let store = open_store(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    if std::env::args().nth(1).as_deref() == Some("seed") {
        return seed(&config, store.as_ref(), clock.as_ref()).await;
    }

    panel_service::services::metrics::init_metrics().map_err(AppError::InternalError)?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        store = ?config.store,
        "Starting panel service"
    );

    let addr = config.common.socket_addr();
    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );

    let state = AppState::new(config, store, clock)?;
    let app = build_router(state).await?;

    let _guard = service_span.enter();
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn open_store(config: &PanelConfig) -> Result<Arc<dyn Store>, AppError> {
    match config.store {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store - data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Mongo => {
            let store = MongoStore::connect(&config.mongodb.uri, &config.mongodb.database)
                .await
                .map_err(ServiceError::from)?;
            store
                .initialize_indexes()
                .await
                .map_err(ServiceError::from)?;
            tracing::info!("Database initialized successfully");
            Ok(Arc::new(store))
        }
    }
}

async fn seed(config: &PanelConfig, store: &dyn Store, clock: &dyn Clock) -> Result<(), AppError> {
    let seed_config = SeedConfig::from_env()?;
    let hasher = PasswordHasher::new(
        config.password.memory_kib,
        config.password.iterations,
        config.password.parallelism,
    )
    .map_err(AppError::ConfigError)?;

    let report = run_seed(store, &hasher, &seed_config, clock.now()).await?;
    tracing::info!(
        superadmin_id = ?report.superadmin_id,
        demo_user_id = ?report.demo_user_id,
        demo_site_id = %report.demo_site_id,
        "Seed data ready"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
