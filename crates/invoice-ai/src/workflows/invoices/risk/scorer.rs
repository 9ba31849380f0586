use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::super::features::FeatureVector;

/// Result of asking the learned model for a probability.
#[derive(Debug, Clone, PartialEq)]
pub enum ScorerOutcome {
    Probability(f64),
    Unavailable(String),
}

/// Learned risk capability. Implementations may be absent at runtime and say so explicitly.
pub trait StatisticalScorer: Send + Sync {
    fn score(&self, features: &FeatureVector) -> ScorerOutcome;
}

/// Placeholder used when no model is configured or the model failed to load.
#[derive(Debug, Clone, Default)]
pub struct NoModel {
    reason: Option<String>,
}

impl NoModel {
    pub fn because(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }
}

impl StatisticalScorer for NoModel {
    fn score(&self, _features: &FeatureVector) -> ScorerOutcome {
        ScorerOutcome::Unavailable(
            self.reason
                .clone()
                .unwrap_or_else(|| "risk model not loaded".to_string()),
        )
    }
}

/// Logistic regression over the normalized amount (standard-scaled), PO presence, vendor flag
/// and keyword density. Coefficients come from an exported JSON file; `amount_mean` and
/// `amount_std` are in normalized units, i.e. amounts already divided by `amount_scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRiskModel {
    pub intercept: f64,
    pub amount_weight: f64,
    pub amount_mean: f64,
    pub amount_std: f64,
    pub po_weight: f64,
    pub vendor_weight: f64,
    #[serde(default)]
    pub keyword_weight: f64,
}

impl LogisticRiskModel {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ModelLoadError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ModelLoadError> {
        let model: Self = serde_json::from_reader(reader)?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), ModelLoadError> {
        let coefficients = [
            self.intercept,
            self.amount_weight,
            self.amount_mean,
            self.amount_std,
            self.po_weight,
            self.vendor_weight,
            self.keyword_weight,
        ];
        if coefficients.iter().any(|value| !value.is_finite()) {
            return Err(ModelLoadError::Invalid(
                "coefficients must be finite".to_string(),
            ));
        }
        if self.amount_std <= 0.0 {
            return Err(ModelLoadError::Invalid(
                "amount_std must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn probability(&self, features: &FeatureVector) -> f64 {
        let scaled_amount = (features.normalized_amount - self.amount_mean) / self.amount_std;
        let logit = self.intercept
            + self.amount_weight * scaled_amount
            + self.po_weight * f64::from(u8::from(features.has_purchase_order))
            + self.vendor_weight * f64::from(u8::from(features.vendor_flagged))
            + self.keyword_weight * features.keyword_density;
        1.0 / (1.0 + (-logit).exp())
    }
}

impl StatisticalScorer for LogisticRiskModel {
    fn score(&self, features: &FeatureVector) -> ScorerOutcome {
        let probability = self.probability(features);
        if probability.is_finite() {
            ScorerOutcome::Probability(probability.clamp(0.0, 1.0))
        } else {
            ScorerOutcome::Unavailable("model produced a non-finite probability".to_string())
        }
    }
}

/// Loads the configured model, degrading to [`NoModel`] when absent or unreadable.
pub fn load_scorer(path: Option<&Path>) -> Arc<dyn StatisticalScorer> {
    let Some(path) = path else {
        info!("no risk model configured; scoring with rules only");
        return Arc::new(NoModel::default());
    };

    match LogisticRiskModel::from_path(path) {
        Ok(model) => {
            info!(path = %path.display(), "loaded risk model");
            Arc::new(model)
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "risk model unavailable; falling back to rules only");
            Arc::new(NoModel::because(err.to_string()))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("failed to read risk model: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid risk model file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid risk model: {0}")]
    Invalid(String),
}
