use crate::cli::ServeArgs;
use crate::infra::{AppState, Fixtures, LoggingNotifier};
use crate::routes::with_dispatch_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use claim_dispatch::config::AppConfig;
use claim_dispatch::error::AppError;
use claim_dispatch::telemetry;
use claim_dispatch::workflows::dispatch::DispatchService;
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

    let fixtures = match args.fixtures.take() {
        Some(path) => {
            info!(path = %path.display(), "loading dispatch fixtures");
            Fixtures::from_path(&path)?
        }
        None => Fixtures::default(),
    };
    let store = Arc::new(fixtures.into_store());
    let notifier = Arc::new(LoggingNotifier::default());
    let dispatch_service = Arc::new(DispatchService::new(store, notifier, &config.dispatch));

    let app = with_dispatch_routes(dispatch_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        commission_rate = %config.dispatch.commission_rate,
        "claim dispatch service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
