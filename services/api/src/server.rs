use crate::cli::ServeArgs;
use crate::infra::{public_holidays, rule_handles, seeded_repository, AppState};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::{Datelike, Local};
use class_dispatch::config::AppConfig;
use class_dispatch::error::AppError;
use class_dispatch::security::LoginRateLimiter;
use class_dispatch::telemetry;
use class_dispatch::workflows::dispatch::{
    AutomationWorkflow, DispatchState, InMemoryDispatchRepository, RuleProvider,
};
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
    if let Some(path) = args.rules.take() {
        config.rules.settings_path = Some(path);
    }

    telemetry::init(&config.telemetry)?;

    let rules = rule_handles(&config.rules);
    // Refuse to start on a broken settings export rather than failing every request.
    let loaded = rules.provider.current()?;
    info!(
        source = ?config.rules.settings_path,
        tiers = loaded.session_fees.entries().count(),
        "rule settings loaded"
    );

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        rules: rules.reloader,
    };

    let today = Local::now().date_naive();
    let repository = if args.seed_demo {
        seeded_repository(today)
    } else {
        Arc::new(InMemoryDispatchRepository::default())
    };
    let workflow = Arc::new(
        AutomationWorkflow::new(repository, rules.provider)
            .with_holidays(Arc::new(public_holidays(today.year()..=today.year() + 1))),
    );

    let login = Arc::new(LoginRateLimiter::new(config.login));
    let _sweeper = login.spawn_sweeper();

    let app = with_service_routes(DispatchState::new(workflow, login))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, seeded = args.seed_demo, "class dispatch service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
