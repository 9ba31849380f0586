mod config;
mod policy;
mod rules;
mod scorer;

pub use config::{RiskConfig, RiskConfigError};
pub use rules::{RuleEvaluation, RuleHit, RuleKind};
pub use scorer::{
    load_scorer, LogisticRiskModel, ModelLoadError, NoModel, ScorerOutcome, StatisticalScorer,
};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::domain::{InvalidInvoice, Invoice, RawInvoiceRecord, RiskAssessment, RiskVerdict};
use super::features::{FeatureExtractor, FeatureVector};
use policy::decide_verdict;

/// Composes the rule pass with the optional statistical scorer. Holds no mutable state, so
/// one engine can serve any number of concurrent callers.
#[derive(Clone)]
pub struct RiskEngine {
    config: RiskConfig,
    extractor: FeatureExtractor,
    scorer: Arc<dyn StatisticalScorer>,
}

impl RiskEngine {
    pub fn new(
        config: RiskConfig,
        scorer: Arc<dyn StatisticalScorer>,
    ) -> Result<Self, RiskConfigError> {
        config.validate()?;
        let extractor = FeatureExtractor::new(&config);
        Ok(Self {
            config,
            extractor,
            scorer,
        })
    }

    pub fn rules_only(config: RiskConfig) -> Result<Self, RiskConfigError> {
        Self::new(config, Arc::new(NoModel::default()))
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn rules(&self, features: &FeatureVector) -> RuleEvaluation {
        rules::evaluate_rules(features, &self.config)
    }

    pub fn evaluate(&self, features: &FeatureVector) -> RiskVerdict {
        let evaluation = self.rules(features);
        let outcome = self.scorer.score(features);
        if let ScorerOutcome::Unavailable(reason) = &outcome {
            debug!(%reason, "statistical scorer unavailable; using rules-only banding");
        }
        decide_verdict(&evaluation, &outcome, &self.config)
    }

    /// Scores a record that has not been stored. Only a malformed amount is rejected.
    pub fn score_record(&self, record: &RawInvoiceRecord) -> Result<RiskVerdict, InvalidInvoice> {
        let features = self.extractor.extract(record)?;
        Ok(self.evaluate(&features))
    }

    pub fn assess(&self, invoice: &Invoice, assessed_at: DateTime<Utc>) -> RiskAssessment {
        let features = self.extractor.from_invoice(invoice);
        RiskAssessment {
            invoice_id: invoice.invoice_id.clone(),
            verdict: self.evaluate(&features),
            assessed_at,
        }
    }
}

impl std::fmt::Debug for RiskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
