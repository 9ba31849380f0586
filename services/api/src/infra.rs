use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use invoice_ai::config::RiskSettings;
use invoice_ai::error::AppError;
use invoice_ai::workflows::invoices::{
    load_scorer, EventError, EventPublisher, RiskEngine, WorkflowEvent,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Publishes workflow events to the log stream; downstream consumers tail it.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TracingEventPublisher;

impl EventPublisher for TracingEventPublisher {
    fn publish(&self, event: WorkflowEvent) -> Result<(), EventError> {
        let payload =
            serde_json::to_string(&event).map_err(|err| EventError::Transport(err.to_string()))?;
        info!(event = event.name(), %payload, "workflow event");
        Ok(())
    }
}

/// Engine from the configured policy, with the exported model when one loads.
pub(crate) fn build_engine(settings: &RiskSettings) -> Result<RiskEngine, AppError> {
    let scorer = load_scorer(settings.model_path.as_deref());
    Ok(RiskEngine::new(settings.policy.clone(), scorer)?)
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| format!("failed to parse '{raw}' as RFC 3339 or YYYY-MM-DD"))
}
