use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{
    ApprovalRequest, ApprovalStatus, Invoice, InvoiceId, RiskAssessment, RiskLevel,
};

/// Optional creation-time window; `start` is inclusive and `end` exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl ReportWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at < end)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalCounts {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskLevelCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub unscored: usize,
}

/// Rollup computed from the store at call time. Never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub window: ReportWindow,
    pub invoice_count: usize,
    pub approvals: ApprovalCounts,
    /// Approved monetary totals keyed by currency; each invoice counts once.
    pub approved_totals: BTreeMap<String, Decimal>,
    pub approved_without_amount: usize,
    pub risk_levels: RiskLevelCounts,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuditError {
    #[error("approved total for {currency} exceeds the representable amount")]
    TotalOverflow { currency: String },
}

pub fn summarize(
    invoices: &[Invoice],
    assessments: &[RiskAssessment],
    approvals: &[ApprovalRequest],
    window: ReportWindow,
    generated_at: DateTime<Utc>,
) -> Result<AuditSummary, AuditError> {
    let levels: HashMap<&InvoiceId, RiskLevel> = assessments
        .iter()
        .map(|assessment| (&assessment.invoice_id, assessment.verdict.level))
        .collect();
    let by_id: HashMap<&InvoiceId, &Invoice> = invoices
        .iter()
        .map(|invoice| (&invoice.invoice_id, invoice))
        .collect();

    let mut invoice_count = 0;
    let mut risk_levels = RiskLevelCounts::default();
    for invoice in invoices.iter().filter(|invoice| window.contains(invoice.created_at)) {
        invoice_count += 1;
        match levels.get(&invoice.invoice_id) {
            Some(RiskLevel::Low) => risk_levels.low += 1,
            Some(RiskLevel::Medium) => risk_levels.medium += 1,
            Some(RiskLevel::High) => risk_levels.high += 1,
            None => risk_levels.unscored += 1,
        }
    }

    let mut counts = ApprovalCounts::default();
    let mut approved_invoices: Vec<&InvoiceId> = Vec::new();
    let mut seen = HashSet::new();
    for request in approvals
        .iter()
        .filter(|request| window.contains(request.created_at))
    {
        counts.total += 1;
        match request.status {
            ApprovalStatus::Pending => counts.pending += 1,
            ApprovalStatus::Approved => {
                counts.approved += 1;
                if seen.insert(&request.invoice_id) {
                    approved_invoices.push(&request.invoice_id);
                }
            }
            ApprovalStatus::Rejected => counts.rejected += 1,
        }
    }

    let mut approved_totals: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut approved_without_amount = 0;
    for invoice_id in approved_invoices {
        match by_id.get(invoice_id).and_then(|invoice| {
            invoice
                .total
                .map(|total| (invoice.currency.as_str(), total))
        }) {
            Some((currency, total)) => {
                let running = approved_totals.entry(currency.to_string()).or_default();
                *running = running
                    .checked_add(total)
                    .ok_or_else(|| AuditError::TotalOverflow {
                        currency: currency.to_string(),
                    })?;
            }
            None => approved_without_amount += 1,
        }
    }

    Ok(AuditSummary {
        window,
        invoice_count,
        approvals: counts,
        approved_totals,
        approved_without_amount,
        risk_levels,
        generated_at,
    })
}
