use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifier wrapper for ingested invoices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvoiceId(pub String);

impl fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for approval requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApprovalId(pub String);

impl fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Amount as delivered by the extraction collaborator: either a JSON number or free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawAmount {
    Number(f64),
    Text(String),
}

impl RawAmount {
    /// Parses the amount; blank text counts as missing rather than malformed.
    pub fn parse(&self) -> Result<Option<Decimal>, InvalidInvoice> {
        let parsed = match self {
            RawAmount::Number(value) => {
                if !value.is_finite() {
                    return Err(InvalidInvoice::MalformedAmount {
                        raw: value.to_string(),
                    });
                }
                Decimal::try_from(*value).map_err(|_| InvalidInvoice::MalformedAmount {
                    raw: value.to_string(),
                })?
            }
            RawAmount::Text(raw) => {
                let cleaned: String = raw
                    .trim()
                    .trim_start_matches(&['$', '€', '£', '¥'][..])
                    .chars()
                    .filter(|ch| !matches!(ch, ',' | '_' | ' '))
                    .collect();
                if cleaned.is_empty() {
                    return Ok(None);
                }
                Decimal::from_str(&cleaned)
                    .map_err(|_| InvalidInvoice::MalformedAmount { raw: raw.clone() })?
            }
        };

        if parsed.is_sign_negative() && !parsed.is_zero() {
            return Err(InvalidInvoice::NegativeAmount(parsed.to_string()));
        }

        Ok(Some(parsed.normalize()))
    }
}

/// Raw record supplied by the document/text extraction collaborator. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawInvoiceRecord {
    pub vendor: Option<String>,
    #[serde(alias = "amount")]
    pub total: Option<RawAmount>,
    pub currency: Option<String>,
    pub po_number: Option<String>,
    #[serde(alias = "invoice_text")]
    pub body: Option<String>,
    pub confidence: Option<f64>,
    pub date: Option<String>,
}

impl RawInvoiceRecord {
    pub fn vendor(&self) -> Option<&str> {
        non_blank(self.vendor.as_deref())
    }

    pub fn po_number(&self) -> Option<&str> {
        non_blank(self.po_number.as_deref())
    }

    pub fn body(&self) -> Option<&str> {
        non_blank(self.body.as_deref())
    }

    pub fn amount(&self) -> Result<Option<Decimal>, InvalidInvoice> {
        match &self.total {
            Some(raw) => raw.parse(),
            None => Ok(None),
        }
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Validation failure for a malformed required invoice field.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidInvoice {
    #[error("amount '{raw}' is not a valid number")]
    MalformedAmount { raw: String },
    #[error("amount {0} must not be negative")]
    NegativeAmount(String),
    #[error("extraction confidence {0} must be between 0 and 1")]
    ConfidenceOutOfRange(f64),
}

pub const DEFAULT_CURRENCY: &str = "USD";

/// Fields owned by the extraction collaborator; the only part of an invoice that may change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub body: Option<String>,
    pub confidence: Option<f64>,
}

impl ExtractionMetadata {
    pub fn new(body: Option<String>, confidence: Option<f64>) -> Result<Self, InvalidInvoice> {
        if let Some(value) = confidence {
            if !(0.0..=1.0).contains(&value) {
                return Err(InvalidInvoice::ConfidenceOutOfRange(value));
            }
        }

        let body = body.filter(|text| !text.trim().is_empty());
        Ok(Self { body, confidence })
    }
}

/// Stored invoice as accepted at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: InvoiceId,
    pub vendor: Option<String>,
    pub total: Option<Decimal>,
    pub currency: String,
    pub po_number: Option<String>,
    pub invoice_date: Option<String>,
    pub extraction: ExtractionMetadata,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn from_record(
        invoice_id: InvoiceId,
        record: &RawInvoiceRecord,
        created_at: DateTime<Utc>,
    ) -> Result<Self, InvalidInvoice> {
        let total = record.amount()?;
        let extraction = ExtractionMetadata::new(record.body.clone(), record.confidence)?;
        let currency = non_blank(record.currency.as_deref())
            .map(str::to_ascii_uppercase)
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        Ok(Self {
            invoice_id,
            vendor: record.vendor().map(str::to_string),
            total,
            currency,
            po_number: record.po_number().map(str::to_string),
            invoice_date: non_blank(record.date.as_deref()).map(str::to_string),
            extraction,
            created_at,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const fn label(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    pub const fn suggested_action(self) -> SuggestedAction {
        match self {
            RiskLevel::Low => SuggestedAction::AutoApprove,
            RiskLevel::Medium | RiskLevel::High => SuggestedAction::RouteForReview,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuggestedAction {
    AutoApprove,
    RouteForReview,
}

impl SuggestedAction {
    pub const fn label(self) -> &'static str {
        match self {
            SuggestedAction::AutoApprove => "auto-approve",
            SuggestedAction::RouteForReview => "route-for-review",
        }
    }

    pub const fn requires_review(self) -> bool {
        matches!(self, SuggestedAction::RouteForReview)
    }
}

/// Which input produced the reported score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Model,
    Rules,
}

/// Score, level, suggested action and reasons for one invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskVerdict {
    pub score: f64,
    pub level: RiskLevel,
    pub action: SuggestedAction,
    pub reasons: Vec<String>,
    pub score_source: ScoreSource,
}

/// Stored verdict for an invoice. One per invoice; recomputation replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub invoice_id: InvoiceId,
    #[serde(flatten)]
    pub verdict: RiskVerdict,
    pub assessed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject,
}

impl ApprovalAction {
    pub const fn target_status(self) -> ApprovalStatus {
        match self {
            ApprovalAction::Approve => ApprovalStatus::Approved,
            ApprovalAction::Reject => ApprovalStatus::Rejected,
        }
    }
}

/// Human-in-the-loop review request. Never deleted; resolved at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub approval_id: ApprovalId,
    pub invoice_id: InvoiceId,
    pub requester: String,
    pub approver: Option<String>,
    pub reason: String,
    pub status: ApprovalStatus,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Decision recorded by a reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub action: ApprovalAction,
    pub approver: String,
    pub comment: Option<String>,
}

impl ApprovalRequest {
    pub fn pending(
        approval_id: ApprovalId,
        invoice_id: InvoiceId,
        requester: String,
        approver: Option<String>,
        reason: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            approval_id,
            invoice_id,
            requester,
            approver,
            reason,
            status: ApprovalStatus::Pending,
            comment: None,
            created_at,
            resolved_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    /// The only transition out of `pending`. Terminal requests are never rewritten.
    pub fn resolve(
        &self,
        resolution: &Resolution,
        resolved_at: DateTime<Utc>,
    ) -> Result<ApprovalRequest, TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::AlreadyResolved {
                status: self.status,
            });
        }

        let mut next = self.clone();
        next.status = resolution.action.target_status();
        next.approver = Some(resolution.approver.clone());
        next.comment = resolution.comment.clone();
        next.resolved_at = Some(resolved_at);
        Ok(next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("approval already resolved as {}", .status.label())]
    AlreadyResolved { status: ApprovalStatus },
}
