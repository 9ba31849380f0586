use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::approvals::{ApprovalError, NewApproval};
use super::audit::ReportWindow;
use super::domain::{ApprovalId, ApprovalStatus, InvoiceId, RawInvoiceRecord, Resolution};
use super::repository::{EventPublisher, RepositoryError, WorkflowStore};
use super::service::{ExtractionCorrection, InvoiceQuery, InvoiceRiskService, InvoiceServiceError};

type SharedService<S, E> = State<Arc<InvoiceRiskService<S, E>>>;

/// Router exposing ingestion, scoring, the review queue and audit rollups.
pub fn invoice_router<S, E>(service: Arc<InvoiceRiskService<S, E>>) -> Router
where
    S: WorkflowStore + 'static,
    E: EventPublisher + 'static,
{
    Router::new()
        .route(
            "/api/v1/invoices",
            post(ingest_handler::<S, E>).get(list_invoices_handler::<S, E>),
        )
        .route("/api/v1/invoices/:invoice_id", get(invoice_handler::<S, E>))
        .route(
            "/api/v1/invoices/:invoice_id/extraction",
            patch(correct_extraction_handler::<S, E>),
        )
        .route(
            "/api/v1/invoices/:invoice_id/assess",
            post(assess_handler::<S, E>),
        )
        .route(
            "/api/v1/invoices/:invoice_id/route",
            post(route_handler::<S, E>),
        )
        .route("/api/v1/risk/score", post(score_handler::<S, E>))
        .route(
            "/api/v1/approvals",
            post(create_approval_handler::<S, E>).get(list_approvals_handler::<S, E>),
        )
        .route(
            "/api/v1/approvals/pending",
            get(pending_approvals_handler::<S, E>),
        )
        .route(
            "/api/v1/approvals/:approval_id",
            get(approval_handler::<S, E>),
        )
        .route(
            "/api/v1/approvals/:approval_id/action",
            post(resolve_approval_handler::<S, E>),
        )
        .route("/api/v1/reports/summary", get(summary_handler::<S, E>))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct RouteRequest {
    pub(crate) requester: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ApprovalListQuery {
    pub(crate) status: Option<String>,
    pub(crate) limit: Option<usize>,
    pub(crate) offset: usize,
}

pub(crate) async fn ingest_handler<S, E>(
    State(service): SharedService<S, E>,
    axum::Json(record): axum::Json<RawInvoiceRecord>,
) -> Response
where
    S: WorkflowStore + 'static,
    E: EventPublisher + 'static,
{
    match service.ingest(record) {
        Ok(invoice) => (StatusCode::CREATED, axum::Json(invoice)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn list_invoices_handler<S, E>(
    State(service): SharedService<S, E>,
    Query(query): Query<InvoiceQuery>,
) -> Response
where
    S: WorkflowStore + 'static,
    E: EventPublisher + 'static,
{
    match service.list(&query) {
        Ok(invoices) => (StatusCode::OK, axum::Json(invoices)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn invoice_handler<S, E>(
    State(service): SharedService<S, E>,
    Path(invoice_id): Path<String>,
) -> Response
where
    S: WorkflowStore + 'static,
    E: EventPublisher + 'static,
{
    match service.view(&InvoiceId(invoice_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn correct_extraction_handler<S, E>(
    State(service): SharedService<S, E>,
    Path(invoice_id): Path<String>,
    axum::Json(correction): axum::Json<ExtractionCorrection>,
) -> Response
where
    S: WorkflowStore + 'static,
    E: EventPublisher + 'static,
{
    match service.correct_extraction(&InvoiceId(invoice_id), correction) {
        Ok(invoice) => (StatusCode::OK, axum::Json(invoice)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn assess_handler<S, E>(
    State(service): SharedService<S, E>,
    Path(invoice_id): Path<String>,
) -> Response
where
    S: WorkflowStore + 'static,
    E: EventPublisher + 'static,
{
    match service.assess(&InvoiceId(invoice_id)) {
        Ok(assessment) => (StatusCode::OK, axum::Json(assessment)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn route_handler<S, E>(
    State(service): SharedService<S, E>,
    Path(invoice_id): Path<String>,
    axum::Json(request): axum::Json<RouteRequest>,
) -> Response
where
    S: WorkflowStore + 'static,
    E: EventPublisher + 'static,
{
    match service.assess_and_route(&InvoiceId(invoice_id), &request.requester) {
        Ok(routed) => (StatusCode::OK, axum::Json(routed)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn score_handler<S, E>(
    State(service): SharedService<S, E>,
    axum::Json(record): axum::Json<RawInvoiceRecord>,
) -> Response
where
    S: WorkflowStore + 'static,
    E: EventPublisher + 'static,
{
    match service.score_record(&record) {
        Ok(verdict) => (StatusCode::OK, axum::Json(verdict)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn create_approval_handler<S, E>(
    State(service): SharedService<S, E>,
    axum::Json(request): axum::Json<NewApproval>,
) -> Response
where
    S: WorkflowStore + 'static,
    E: EventPublisher + 'static,
{
    match service.approvals().create(request) {
        Ok(approval) => (StatusCode::CREATED, axum::Json(approval)).into_response(),
        Err(err) => approval_error_response(err),
    }
}

pub(crate) async fn list_approvals_handler<S, E>(
    State(service): SharedService<S, E>,
    Query(query): Query<ApprovalListQuery>,
) -> Response
where
    S: WorkflowStore + 'static,
    E: EventPublisher + 'static,
{
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match ApprovalStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                let payload = json!({
                    "error": format!("unknown approval status '{raw}'"),
                });
                return (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response();
            }
        },
    };

    match service.approvals().list(status) {
        Ok(approvals) => {
            let page: Vec<_> = approvals
                .into_iter()
                .skip(query.offset)
                .take(query.limit.unwrap_or(usize::MAX))
                .collect();
            (StatusCode::OK, axum::Json(page)).into_response()
        }
        Err(err) => approval_error_response(err),
    }
}

pub(crate) async fn pending_approvals_handler<S, E>(State(service): SharedService<S, E>) -> Response
where
    S: WorkflowStore + 'static,
    E: EventPublisher + 'static,
{
    match service.approvals().list_pending() {
        Ok(approvals) => (StatusCode::OK, axum::Json(approvals)).into_response(),
        Err(err) => approval_error_response(err),
    }
}

pub(crate) async fn approval_handler<S, E>(
    State(service): SharedService<S, E>,
    Path(approval_id): Path<String>,
) -> Response
where
    S: WorkflowStore + 'static,
    E: EventPublisher + 'static,
{
    match service.approvals().get(&ApprovalId(approval_id)) {
        Ok(approval) => (StatusCode::OK, axum::Json(approval)).into_response(),
        Err(err) => approval_error_response(err),
    }
}

pub(crate) async fn resolve_approval_handler<S, E>(
    State(service): SharedService<S, E>,
    Path(approval_id): Path<String>,
    axum::Json(resolution): axum::Json<Resolution>,
) -> Response
where
    S: WorkflowStore + 'static,
    E: EventPublisher + 'static,
{
    match service
        .approvals()
        .resolve(&ApprovalId(approval_id), resolution)
    {
        Ok(approval) => (StatusCode::OK, axum::Json(approval)).into_response(),
        Err(err) => approval_error_response(err),
    }
}

pub(crate) async fn summary_handler<S, E>(
    State(service): SharedService<S, E>,
    Query(window): Query<ReportWindow>,
) -> Response
where
    S: WorkflowStore + 'static,
    E: EventPublisher + 'static,
{
    match service.summary(window) {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Err(err) => service_error_response(err),
    }
}

fn service_error_response(err: InvoiceServiceError) -> Response {
    let status = match &err {
        InvoiceServiceError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        InvoiceServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        InvoiceServiceError::Approval(inner) => return approval_error_response(inner.clone()),
        InvoiceServiceError::Repository(inner) => repository_status(inner),
        InvoiceServiceError::Audit(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({
        "error": err.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

fn approval_error_response(err: ApprovalError) -> Response {
    let status = match &err {
        ApprovalError::DuplicatePending { .. } | ApprovalError::AlreadyResolved { .. } => {
            StatusCode::CONFLICT
        }
        ApprovalError::NotFound(_) => StatusCode::NOT_FOUND,
        ApprovalError::MissingField(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ApprovalError::Repository(inner) => repository_status(inner),
    };
    let payload = json!({
        "error": err.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::Conflict
        | RepositoryError::PendingExists
        | RepositoryError::StaleStatus { .. } => StatusCode::CONFLICT,
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
