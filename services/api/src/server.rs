use crate::cli::ServeArgs;
use crate::infra::{build_engine, AppState, TracingEventPublisher};
use crate::routes::with_invoice_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use invoice_ai::config::AppConfig;
use invoice_ai::error::AppError;
use invoice_ai::telemetry;
use invoice_ai::workflows::invoices::{InMemoryStore, InvoiceRiskService};
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

    let engine = build_engine(&config.risk)?;
    let service = Arc::new(InvoiceRiskService::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(TracingEventPublisher),
        engine,
    ));

    let app = with_invoice_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "invoice risk engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
