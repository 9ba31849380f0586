use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Policy dials for feature extraction, rule evaluation and banding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Amounts above this require a purchase-order reference.
    pub po_required_amount: Decimal,
    /// Amounts below this with a PO present are a strong low-risk signal.
    pub low_amount_threshold: Decimal,
    /// Amounts above this force a high-risk verdict.
    pub high_amount_threshold: Decimal,
    /// Divisor used to normalize amounts for the statistical model.
    pub amount_scale: Decimal,
    pub medium_probability: f64,
    pub high_probability: f64,
    pub suspicious_vendor_tokens: Vec<String>,
    pub risky_keywords: Vec<String>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            po_required_amount: Decimal::from(1_000),
            low_amount_threshold: Decimal::from(10_000),
            high_amount_threshold: Decimal::from(50_000),
            amount_scale: Decimal::from(100_000),
            medium_probability: 0.3,
            high_probability: 0.7,
            suspicious_vendor_tokens: vec!["suspicious".to_string(), "unknown".to_string()],
            risky_keywords: [
                "overdue",
                "penalty",
                "urgent",
                "immediate",
                "final notice",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), RiskConfigError> {
        if self.low_amount_threshold.is_sign_negative()
            || self.po_required_amount.is_sign_negative()
        {
            return Err(RiskConfigError::NegativeThreshold);
        }

        if self.low_amount_threshold >= self.high_amount_threshold {
            return Err(RiskConfigError::AmountThresholdOrder {
                low: self.low_amount_threshold,
                high: self.high_amount_threshold,
            });
        }

        if self.amount_scale <= Decimal::ZERO {
            return Err(RiskConfigError::NonPositiveScale);
        }

        let cuts_valid = self.medium_probability.is_finite()
            && self.high_probability.is_finite()
            && self.medium_probability >= 0.0
            && self.medium_probability < self.high_probability
            && self.high_probability <= 1.0;
        if !cuts_valid {
            return Err(RiskConfigError::ProbabilityCutOrder {
                medium: self.medium_probability,
                high: self.high_probability,
            });
        }

        Ok(())
    }

    pub(crate) fn lowercase_tokens(&self) -> Vec<String> {
        self.suspicious_vendor_tokens
            .iter()
            .map(|token| token.trim().to_lowercase())
            .filter(|token| !token.is_empty())
            .collect()
    }

    pub(crate) fn lowercase_keywords(&self) -> Vec<String> {
        self.risky_keywords
            .iter()
            .map(|keyword| keyword.trim().to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RiskConfigError {
    #[error("amount thresholds must not be negative")]
    NegativeThreshold,
    #[error("low amount threshold {low} must be below high amount threshold {high}")]
    AmountThresholdOrder { low: Decimal, high: Decimal },
    #[error("amount scale must be positive")]
    NonPositiveScale,
    #[error("probability cut points must satisfy 0 <= medium ({medium}) < high ({high}) <= 1")]
    ProbabilityCutOrder { medium: f64, high: f64 },
}
