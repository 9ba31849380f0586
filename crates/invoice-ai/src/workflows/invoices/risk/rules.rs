use serde::{Deserialize, Serialize};

use super::super::features::FeatureVector;
use super::config::RiskConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    MissingAmount,
    MissingPurchaseOrder,
    SuspiciousVendor,
    RiskyKeywords,
    HighAmount,
}

/// One matched rule and the reason it contributes to the verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleHit {
    pub rule: RuleKind,
    pub reason: String,
    pub forces_high: bool,
}

/// Complete result of the ordered rule pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    pub hits: Vec<RuleHit>,
    pub low_risk_signal: bool,
}

impl RuleEvaluation {
    pub fn forcing(&self) -> usize {
        self.hits.iter().filter(|hit| hit.forces_high).count()
    }

    pub fn non_forcing(&self) -> usize {
        self.hits.len() - self.forcing()
    }

    pub fn forces_high(&self) -> bool {
        self.forcing() > 0
    }

    pub fn reasons(&self) -> Vec<String> {
        self.hits.iter().map(|hit| hit.reason.clone()).collect()
    }
}

/// Runs every check in a fixed order. Forcing rules never short-circuit later checks so the
/// reason list stays complete.
pub(crate) fn evaluate_rules(features: &FeatureVector, config: &RiskConfig) -> RuleEvaluation {
    let mut hits = Vec::new();

    if features.gaps.amount_missing {
        hits.push(RuleHit {
            rule: RuleKind::MissingAmount,
            reason: "Invoice amount missing; treated as 0".to_string(),
            forces_high: false,
        });
    }

    if !features.has_purchase_order && features.amount > config.po_required_amount {
        hits.push(RuleHit {
            rule: RuleKind::MissingPurchaseOrder,
            reason: format!(
                "Missing PO number for amount {} above {}",
                features.amount, config.po_required_amount
            ),
            forces_high: false,
        });
    }

    if let Some(token) = &features.vendor_token {
        hits.push(RuleHit {
            rule: RuleKind::SuspiciousVendor,
            reason: format!("Vendor flagged suspicious (matched '{token}')"),
            forces_high: true,
        });
    }

    if !features.risky_keywords.is_empty() {
        hits.push(RuleHit {
            rule: RuleKind::RiskyKeywords,
            reason: format!(
                "Risky keywords found: {}",
                features.risky_keywords.join(", ")
            ),
            forces_high: false,
        });
    }

    if features.amount > config.high_amount_threshold {
        hits.push(RuleHit {
            rule: RuleKind::HighAmount,
            reason: format!(
                "High amount transaction: {} exceeds {}",
                features.amount, config.high_amount_threshold
            ),
            forces_high: true,
        });
    }

    let low_risk_signal = !features.gaps.amount_missing
        && features.has_purchase_order
        && features.amount < config.low_amount_threshold;

    RuleEvaluation {
        hits,
        low_risk_signal,
    }
}
