use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::invoices::approvals::Clock;
use crate::workflows::invoices::domain::{
    ApprovalId, ApprovalRequest, ApprovalStatus, ExtractionMetadata, Invoice, InvoiceId,
    RawAmount, RawInvoiceRecord, RiskAssessment,
};
use crate::workflows::invoices::features::FeatureVector;
use crate::workflows::invoices::repository::{
    ApprovalRepository, EventError, EventPublisher, InvoiceRepository, RepositoryError,
    WorkflowEvent, WorkflowStore,
};
use crate::workflows::invoices::risk::{
    RiskConfig, RiskEngine, ScorerOutcome, StatisticalScorer,
};
use crate::workflows::invoices::{InMemoryEventLog, InMemoryStore, InvoiceRiskService};

pub(super) type MemoryService = InvoiceRiskService<InMemoryStore, InMemoryEventLog>;

pub(super) fn record(vendor: &str, total: f64, po_number: Option<&str>) -> RawInvoiceRecord {
    RawInvoiceRecord {
        vendor: Some(vendor.to_string()),
        total: Some(RawAmount::Number(total)),
        currency: Some("USD".to_string()),
        po_number: po_number.map(str::to_string),
        ..RawInvoiceRecord::default()
    }
}

pub(super) fn acme_record() -> RawInvoiceRecord {
    record("Acme", 5_000.0, Some("PO-123"))
}

pub(super) fn suspicious_record() -> RawInvoiceRecord {
    record("suspicious vendor", 100_000.0, None)
}

/// Mid-sized invoice without a PO: one non-forcing rule, no low-risk signal.
pub(super) fn review_record() -> RawInvoiceRecord {
    record("Northwind Traders", 20_000.0, None)
}

pub(super) fn rules_engine() -> RiskEngine {
    RiskEngine::rules_only(RiskConfig::default()).expect("default policy is valid")
}

pub(super) fn model_engine(probability: f64) -> RiskEngine {
    RiskEngine::new(RiskConfig::default(), Arc::new(FixedScorer(probability)))
        .expect("default policy is valid")
}

pub(super) fn build_service() -> (MemoryService, Arc<InMemoryStore>, Arc<InMemoryEventLog>) {
    build_service_with(rules_engine())
}

pub(super) fn build_service_with(
    engine: RiskEngine,
) -> (MemoryService, Arc<InMemoryStore>, Arc<InMemoryEventLog>) {
    let store = Arc::new(InMemoryStore::new());
    let events = Arc::new(InMemoryEventLog::default());
    let service = InvoiceRiskService::with_clock(
        store.clone(),
        events.clone(),
        engine,
        Arc::new(SteppingClock::starting_at(base_time())),
    );
    (service, store, events)
}

pub(super) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Scorer that always reports the same probability.
pub(super) struct FixedScorer(pub(super) f64);

impl StatisticalScorer for FixedScorer {
    fn score(&self, _features: &FeatureVector) -> ScorerOutcome {
        ScorerOutcome::Probability(self.0)
    }
}

/// Clock that advances one minute per reading so creation order is observable.
pub(super) struct SteppingClock {
    next: Mutex<DateTime<Utc>>,
}

impl SteppingClock {
    pub(super) fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            next: Mutex::new(start),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut next = self.next.lock().expect("clock mutex poisoned");
        let now = *next;
        *next = now + Duration::minutes(1);
        now
    }
}

/// Clock frozen at one instant, for tie-break ordering checks.
pub(super) struct FrozenClock(pub(super) DateTime<Utc>);

impl Clock for FrozenClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Default)]
pub(super) struct FailingEvents;

impl EventPublisher for FailingEvents {
    fn publish(&self, _event: WorkflowEvent) -> Result<(), EventError> {
        Err(EventError::Transport("broker offline".to_string()))
    }
}

pub(super) struct UnavailableStore;

fn offline<T>() -> Result<T, RepositoryError> {
    Err(RepositoryError::Unavailable("database offline".to_string()))
}

impl InvoiceRepository for UnavailableStore {
    fn insert(&self, _invoice: Invoice) -> Result<Invoice, RepositoryError> {
        offline()
    }

    fn fetch(&self, _id: &InvoiceId) -> Result<Option<Invoice>, RepositoryError> {
        offline()
    }

    fn all(&self) -> Result<Vec<Invoice>, RepositoryError> {
        offline()
    }

    fn update_extraction(
        &self,
        _id: &InvoiceId,
        _extraction: ExtractionMetadata,
    ) -> Result<Invoice, RepositoryError> {
        offline()
    }

    fn put_assessment(
        &self,
        _assessment: RiskAssessment,
    ) -> Result<Option<RiskAssessment>, RepositoryError> {
        offline()
    }

    fn fetch_assessment(&self, _id: &InvoiceId) -> Result<Option<RiskAssessment>, RepositoryError> {
        offline()
    }

    fn assessments(&self) -> Result<Vec<RiskAssessment>, RepositoryError> {
        offline()
    }
}

impl ApprovalRepository for UnavailableStore {
    fn insert_pending(&self, _request: ApprovalRequest) -> Result<ApprovalRequest, RepositoryError> {
        offline()
    }

    fn fetch(&self, _id: &ApprovalId) -> Result<Option<ApprovalRequest>, RepositoryError> {
        offline()
    }

    fn compare_and_set(
        &self,
        _expected: ApprovalStatus,
        _next: ApprovalRequest,
    ) -> Result<ApprovalRequest, RepositoryError> {
        offline()
    }

    fn pending_for_invoice(
        &self,
        _invoice_id: &InvoiceId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        offline()
    }

    fn pending(&self) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        offline()
    }

    fn all(&self) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        offline()
    }
}

/// Approval store that reports the next `collisions` inserts as taken ids.
pub(super) struct TakenIdStore {
    inner: InMemoryStore,
    collisions: AtomicUsize,
}

impl TakenIdStore {
    pub(super) fn new(collisions: usize) -> Self {
        Self {
            inner: InMemoryStore::new(),
            collisions: AtomicUsize::new(collisions),
        }
    }
}

impl ApprovalRepository for TakenIdStore {
    fn insert_pending(&self, request: ApprovalRequest) -> Result<ApprovalRequest, RepositoryError> {
        let remaining = self.collisions.load(Ordering::SeqCst);
        if remaining > 0 {
            self.collisions.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::Conflict);
        }
        self.inner.insert_pending(request)
    }

    fn fetch(&self, id: &ApprovalId) -> Result<Option<ApprovalRequest>, RepositoryError> {
        ApprovalRepository::fetch(&self.inner, id)
    }

    fn compare_and_set(
        &self,
        expected: ApprovalStatus,
        next: ApprovalRequest,
    ) -> Result<ApprovalRequest, RepositoryError> {
        self.inner.compare_and_set(expected, next)
    }

    fn pending_for_invoice(
        &self,
        invoice_id: &InvoiceId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        self.inner.pending_for_invoice(invoice_id)
    }

    fn pending(&self) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        self.inner.pending()
    }

    fn all(&self) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        ApprovalRepository::all(&self.inner)
    }
}

impl WorkflowStore for UnavailableStore {}

pub(super) fn json_request(method: &str, uri: &str, payload: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::to_vec(payload).expect("payload serializes"),
        ))
        .expect("request builds")
}

pub(super) fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
