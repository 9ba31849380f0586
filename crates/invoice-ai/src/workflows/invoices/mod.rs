//! Invoice risk scoring and the human-approval workflow built on top of it.
//!
//! Raw records flow through the feature extractor into the [`RiskEngine`]; verdicts that need
//! review open an [`ApprovalRequest`] whose lifecycle is owned by [`ApprovalWorkflow`]. Audit
//! rollups read the same store and never write.

pub mod approvals;
pub mod audit;
pub mod domain;
pub mod features;
pub mod import;
pub mod memory;
pub mod repository;
pub mod risk;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use approvals::{ApprovalError, ApprovalWorkflow, Clock, NewApproval, SystemClock};
pub use audit::{ApprovalCounts, AuditError, AuditSummary, ReportWindow, RiskLevelCounts};
pub use domain::{
    ApprovalAction, ApprovalId, ApprovalRequest, ApprovalStatus, ExtractionMetadata,
    InvalidInvoice, Invoice, InvoiceId, RawAmount, RawInvoiceRecord, Resolution, RiskAssessment,
    RiskLevel, RiskVerdict, ScoreSource, SuggestedAction, TransitionError,
};
pub use features::{FeatureExtractor, FeatureGaps, FeatureVector};
pub use import::{read_invoice_file, read_invoice_records, InvoiceImportError};
pub use memory::{InMemoryEventLog, InMemoryStore};
pub use repository::{
    ApprovalRepository, EventError, EventPublisher, InvoiceRepository, RepositoryError,
    StoreSnapshot, WorkflowEvent, WorkflowStore,
};
pub use risk::{
    load_scorer, LogisticRiskModel, ModelLoadError, NoModel, RiskConfig, RiskConfigError,
    RiskEngine, RuleEvaluation, RuleHit, RuleKind, ScorerOutcome, StatisticalScorer,
};
pub use router::invoice_router;
pub use service::{
    ExtractionCorrection, InvoiceQuery, InvoiceRiskService, InvoiceServiceError, InvoiceView,
    RoutedAssessment,
};
