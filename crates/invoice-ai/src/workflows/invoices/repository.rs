use serde::{Deserialize, Serialize};

use super::domain::{
    ApprovalId, ApprovalRequest, ApprovalStatus, ExtractionMetadata, Invoice, InvoiceId,
    RiskAssessment, RiskLevel, SuggestedAction,
};

/// Storage for invoices and their single current assessment.
pub trait InvoiceRepository: Send + Sync {
    /// Create-if-absent; an existing id yields [`RepositoryError::Conflict`].
    fn insert(&self, invoice: Invoice) -> Result<Invoice, RepositoryError>;
    fn fetch(&self, id: &InvoiceId) -> Result<Option<Invoice>, RepositoryError>;
    /// Every stored invoice in insertion order.
    fn all(&self) -> Result<Vec<Invoice>, RepositoryError>;
    fn update_extraction(
        &self,
        id: &InvoiceId,
        extraction: ExtractionMetadata,
    ) -> Result<Invoice, RepositoryError>;
    /// Atomically replaces the invoice's assessment, returning the previous one.
    fn put_assessment(
        &self,
        assessment: RiskAssessment,
    ) -> Result<Option<RiskAssessment>, RepositoryError>;
    fn fetch_assessment(&self, id: &InvoiceId) -> Result<Option<RiskAssessment>, RepositoryError>;
    fn assessments(&self) -> Result<Vec<RiskAssessment>, RepositoryError>;
}

/// Storage for approval requests. Requests are never deleted.
pub trait ApprovalRepository: Send + Sync {
    /// Atomic check-then-insert on the invoice's pending slot. Yields
    /// [`RepositoryError::PendingExists`] when the invoice already has a pending request and
    /// [`RepositoryError::Conflict`] when the approval id is taken.
    fn insert_pending(&self, request: ApprovalRequest) -> Result<ApprovalRequest, RepositoryError>;
    fn fetch(&self, id: &ApprovalId) -> Result<Option<ApprovalRequest>, RepositoryError>;
    /// Replaces the stored request only while its status still equals `expected`.
    fn compare_and_set(
        &self,
        expected: ApprovalStatus,
        next: ApprovalRequest,
    ) -> Result<ApprovalRequest, RepositoryError>;
    fn pending_for_invoice(
        &self,
        invoice_id: &InvoiceId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError>;
    /// Pending requests, oldest first.
    fn pending(&self) -> Result<Vec<ApprovalRequest>, RepositoryError>;
    /// Every request, oldest first.
    fn all(&self) -> Result<Vec<ApprovalRequest>, RepositoryError>;
}

/// Both tables read as of one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub invoices: Vec<Invoice>,
    pub assessments: Vec<RiskAssessment>,
    pub approvals: Vec<ApprovalRequest>,
}

/// A store serving both repositories, able to read them together.
pub trait WorkflowStore: InvoiceRepository + ApprovalRepository {
    /// Reads every table. The default makes three separate reads; stores that can should
    /// override it so no write lands between them.
    fn snapshot(&self) -> Result<StoreSnapshot, RepositoryError> {
        Ok(StoreSnapshot {
            invoices: InvoiceRepository::all(self)?,
            assessments: self.assessments()?,
            approvals: ApprovalRepository::all(self)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("invoice already has a pending approval")]
    PendingExists,
    #[error("record not found")]
    NotFound,
    #[error("record status changed to {}", .current.label())]
    StaleStatus { current: ApprovalStatus },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound notification hook for orchestration collaborators. Delivery is best-effort.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: WorkflowEvent) -> Result<(), EventError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    ApprovalCreated {
        approval_id: ApprovalId,
        invoice_id: InvoiceId,
        requester: String,
        reason: String,
    },
    ApprovalResolved {
        approval_id: ApprovalId,
        invoice_id: InvoiceId,
        status: ApprovalStatus,
        approver: Option<String>,
    },
    RiskAssessed {
        invoice_id: InvoiceId,
        level: RiskLevel,
        action: SuggestedAction,
    },
}

impl WorkflowEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::ApprovalCreated { .. } => "approval_created",
            WorkflowEvent::ApprovalResolved { .. } => "approval_resolved",
            WorkflowEvent::RiskAssessed { .. } => "risk_assessed",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("event transport unavailable: {0}")]
    Transport(String),
}
