use crate::cli::ServeArgs;
use crate::infra::{seed_users, AppState, InMemoryNotifier};
use crate::routes::with_lifecycle_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use petmarket::config::AppConfig;
use petmarket::error::AppError;
use petmarket::lifecycle::{LifecycleServices, MemoryStore, Role};
use petmarket::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    // The in-memory store starts empty; one admin is needed to manage anything.
    let store = Arc::new(MemoryStore::new());
    seed_users(&store, &[(args.admin_id.as_str(), "Bootstrap Admin", Role::Admin)])?;

    let services = Arc::new(LifecycleServices::new(
        store,
        Arc::new(InMemoryNotifier::default()),
        config.policy.clone(),
    ));

    let app = with_lifecycle_routes(services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        admin = %args.admin_id,
        reason_min_chars = config.policy.reason_min_chars,
        "pet marketplace lifecycle service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
