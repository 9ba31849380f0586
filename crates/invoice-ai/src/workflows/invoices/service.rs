use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::approvals::{ApprovalError, ApprovalWorkflow, Clock, NewApproval, SystemClock};
use super::audit::{summarize, AuditError, AuditSummary, ReportWindow};
use super::domain::{
    ApprovalRequest, ExtractionMetadata, InvalidInvoice, Invoice, InvoiceId, RawInvoiceRecord,
    RiskAssessment, RiskVerdict,
};
use super::repository::{
    EventPublisher, InvoiceRepository, RepositoryError, WorkflowEvent, WorkflowStore,
};
use super::risk::RiskEngine;

static INVOICE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_invoice_id() -> InvoiceId {
    let id = INVOICE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    InvoiceId(format!("inv-{id:06}"))
}

/// Listing filter for stored invoices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceQuery {
    /// Case-insensitive substring match on the vendor name.
    pub vendor: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Replacement extraction metadata from a manual correction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionCorrection {
    pub body: Option<String>,
    pub confidence: Option<f64>,
}

/// Stored invoice together with its current assessment, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceView {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub assessment: Option<RiskAssessment>,
}

/// Outcome of [`InvoiceRiskService::assess_and_route`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedAssessment {
    pub assessment: RiskAssessment,
    /// Pending review for the invoice, freshly opened or already waiting.
    pub approval: Option<ApprovalRequest>,
}

/// Facade composing ingestion, the risk engine, the approval workflow and audit rollups over
/// one store.
pub struct InvoiceRiskService<S, E> {
    store: Arc<S>,
    events: Arc<E>,
    engine: Arc<RiskEngine>,
    approvals: ApprovalWorkflow<S, E>,
    clock: Arc<dyn Clock>,
}

impl<S, E> fmt::Debug for InvoiceRiskService<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvoiceRiskService")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl<S, E> InvoiceRiskService<S, E>
where
    S: WorkflowStore + 'static,
    E: EventPublisher + 'static,
{
    pub fn new(store: Arc<S>, events: Arc<E>, engine: RiskEngine) -> Self {
        Self::with_clock(store, events, engine, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<S>,
        events: Arc<E>,
        engine: RiskEngine,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let approvals = ApprovalWorkflow::with_clock(
            Arc::clone(&store),
            Arc::clone(&events),
            Arc::clone(&clock),
        );
        Self {
            store,
            events,
            engine: Arc::new(engine),
            approvals,
            clock,
        }
    }

    pub fn engine(&self) -> &RiskEngine {
        &self.engine
    }

    pub fn approvals(&self) -> &ApprovalWorkflow<S, E> {
        &self.approvals
    }

    /// Validates a raw record and stores it under a freshly allocated id.
    pub fn ingest(&self, record: RawInvoiceRecord) -> Result<Invoice, InvoiceServiceError> {
        let invoice = Invoice::from_record(next_invoice_id(), &record, self.clock.now())?;
        let stored = InvoiceRepository::insert(self.store.as_ref(), invoice)?;
        info!(
            invoice_id = %stored.invoice_id,
            vendor = stored.vendor.as_deref().unwrap_or("-"),
            "invoice ingested"
        );
        Ok(stored)
    }

    pub fn get(&self, invoice_id: &InvoiceId) -> Result<Invoice, InvoiceServiceError> {
        InvoiceRepository::fetch(self.store.as_ref(), invoice_id)?
            .ok_or_else(|| InvoiceServiceError::NotFound(invoice_id.clone()))
    }

    pub fn view(&self, invoice_id: &InvoiceId) -> Result<InvoiceView, InvoiceServiceError> {
        let invoice = self.get(invoice_id)?;
        let assessment = self.store.fetch_assessment(invoice_id)?;
        Ok(InvoiceView {
            invoice,
            assessment,
        })
    }

    /// Newest first, then filtered and paginated.
    pub fn list(&self, query: &InvoiceQuery) -> Result<Vec<Invoice>, InvoiceServiceError> {
        let needle = query
            .vendor
            .as_deref()
            .map(str::trim)
            .filter(|needle| !needle.is_empty())
            .map(str::to_lowercase);

        let mut invoices = InvoiceRepository::all(self.store.as_ref())?;
        invoices.reverse();
        invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let matching = invoices.into_iter().filter(|invoice| match &needle {
            Some(needle) => invoice
                .vendor
                .as_deref()
                .map(|vendor| vendor.to_lowercase().contains(needle.as_str()))
                .unwrap_or(false),
            None => true,
        });

        Ok(matching
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    /// Replaces only the extraction metadata; the stored assessment is left for the caller to
    /// recompute.
    pub fn correct_extraction(
        &self,
        invoice_id: &InvoiceId,
        correction: ExtractionCorrection,
    ) -> Result<Invoice, InvoiceServiceError> {
        let extraction = ExtractionMetadata::new(correction.body, correction.confidence)?;
        let updated = match self.store.update_extraction(invoice_id, extraction) {
            Ok(updated) => updated,
            Err(RepositoryError::NotFound) => {
                return Err(InvoiceServiceError::NotFound(invoice_id.clone()))
            }
            Err(other) => return Err(other.into()),
        };
        info!(invoice_id = %invoice_id, "extraction metadata corrected");
        Ok(updated)
    }

    /// Computes and stores the invoice's assessment, replacing any previous one.
    pub fn assess(&self, invoice_id: &InvoiceId) -> Result<RiskAssessment, InvoiceServiceError> {
        let invoice = self.get(invoice_id)?;
        let assessment = self.engine.assess(&invoice, self.clock.now());

        match self.store.put_assessment(assessment.clone()) {
            Ok(_) => {}
            Err(RepositoryError::NotFound) => {
                return Err(InvoiceServiceError::NotFound(invoice_id.clone()))
            }
            Err(other) => return Err(other.into()),
        }

        info!(
            invoice_id = %invoice_id,
            level = assessment.verdict.level.label(),
            score = assessment.verdict.score,
            "invoice risk assessed"
        );
        let event = WorkflowEvent::RiskAssessed {
            invoice_id: invoice_id.clone(),
            level: assessment.verdict.level,
            action: assessment.verdict.action,
        };
        if let Err(err) = self.events.publish(event) {
            warn!(event = "risk_assessed", error = %err, "workflow event delivery failed");
        }

        Ok(assessment)
    }

    pub fn assessment(
        &self,
        invoice_id: &InvoiceId,
    ) -> Result<Option<RiskAssessment>, InvoiceServiceError> {
        Ok(self.store.fetch_assessment(invoice_id)?)
    }

    /// Scores a record without storing anything.
    pub fn score_record(
        &self,
        record: &RawInvoiceRecord,
    ) -> Result<RiskVerdict, InvoiceServiceError> {
        Ok(self.engine.score_record(record)?)
    }

    /// Assesses the invoice and, when review is required, makes sure a pending request exists.
    pub fn assess_and_route(
        &self,
        invoice_id: &InvoiceId,
        requester: &str,
    ) -> Result<RoutedAssessment, InvoiceServiceError> {
        let assessment = self.assess(invoice_id)?;
        if !assessment.verdict.action.requires_review() {
            return Ok(RoutedAssessment {
                assessment,
                approval: None,
            });
        }

        if let Some(existing) = self.approvals.pending_for_invoice(invoice_id)? {
            return Ok(RoutedAssessment {
                assessment,
                approval: Some(existing),
            });
        }

        let reason = if assessment.verdict.reasons.is_empty() {
            format!("{} risk", assessment.verdict.level.label())
        } else {
            assessment.verdict.reasons.join("; ")
        };
        let request = NewApproval {
            invoice_id: invoice_id.clone(),
            requester: requester.to_string(),
            approver: None,
            reason,
        };

        let approval = match self.approvals.create(request) {
            Ok(created) => created,
            // Another caller opened the review between the check and the insert.
            Err(ApprovalError::DuplicatePending { .. }) => self
                .approvals
                .pending_for_invoice(invoice_id)?
                .ok_or(InvoiceServiceError::Repository(RepositoryError::Conflict))?,
            Err(other) => return Err(other.into()),
        };

        Ok(RoutedAssessment {
            assessment,
            approval: Some(approval),
        })
    }

    /// Rollup over one consistent snapshot of the store.
    pub fn summary(&self, window: ReportWindow) -> Result<AuditSummary, InvoiceServiceError> {
        let snapshot = self.store.snapshot()?;
        Ok(summarize(
            &snapshot.invoices,
            &snapshot.assessments,
            &snapshot.approvals,
            window,
            self.clock.now(),
        )?)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvoiceServiceError {
    #[error(transparent)]
    Invalid(#[from] InvalidInvoice),
    #[error("invoice {0} not found")]
    NotFound(InvoiceId),
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}
