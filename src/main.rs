//! routerwatch - Router polling and alert escalation service
//!
//! Main entry point.

use routerwatch::{
    alert_engine::{AccessDirectoryImpl, AlertEngine, AlertRepositoryImpl},
    config_store::SettingsRepository,
    escalation_engine::EscalationEngine,
    notifier::WebhookNotifier,
    polling_scheduler::{IntervalController, PollingScheduler},
    realtime_hub::RealtimeHub,
    router_registry::{HttpRouterClient, NetwatchRepositoryImpl, RouterRepositoryImpl},
    session_tracker::{SessionRepositoryImpl, SessionTracker},
    state::{AppConfig, AppState},
    web_api,
};
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "routerwatch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting routerwatch v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        collector_url = %config.collector_url,
        webhook_configured = config.notify_webhook_url.is_some(),
        device_timeout_secs = config.device_timeout.as_secs(),
        startup_delay_secs = config.startup_delay.as_secs(),
        "Configuration loaded"
    );

    // Create database pool
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await?;

    tracing::info!("Database connected");

    // Collaborators
    let settings = SettingsRepository::new(pool.clone());
    let settings_source = Arc::new(settings.clone());
    let routers = Arc::new(RouterRepositoryImpl::new(pool.clone()));
    let netwatch = Arc::new(NetwatchRepositoryImpl::new(pool.clone()));
    let collector = Arc::new(HttpRouterClient::new(
        config.collector_url.clone(),
        config.device_timeout,
    )?);
    let notifier = Arc::new(WebhookNotifier::new(config.notify_webhook_url.clone())?);
    let realtime = Arc::new(RealtimeHub::new());

    // Alert side
    let alerts = Arc::new(AlertEngine::new(
        Arc::new(AlertRepositoryImpl::new(pool.clone())),
        routers.clone(),
        settings_source.clone(),
        Arc::new(AccessDirectoryImpl::new(pool.clone())),
        notifier,
        realtime.clone(),
    ));
    tracing::info!("AlertEngine initialized");

    let escalation = Arc::new(EscalationEngine::new(
        alerts.clone(),
        routers.clone(),
        netwatch.clone(),
    ));

    // Polling side
    let sessions = Arc::new(SessionTracker::new(
        Arc::new(SessionRepositoryImpl::new(pool.clone())),
        alerts.clone(),
    ));
    let scheduler = Arc::new(
        PollingScheduler::new(
            routers,
            collector.clone(),
            IntervalController::new(netwatch, settings_source),
            alerts.clone(),
            sessions,
            realtime.clone(),
        )
        .with_device_timeout(config.device_timeout)
        .with_startup_delay(config.startup_delay),
    );

    let state = AppState {
        pool,
        config: config.clone(),
        settings,
        collector,
        alerts,
        escalation: escalation.clone(),
        scheduler: scheduler.clone(),
        realtime,
        started_at: Instant::now(),
    };

    // Background tasks
    scheduler.start().await;
    escalation.start().await;

    let app = web_api::create_router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
