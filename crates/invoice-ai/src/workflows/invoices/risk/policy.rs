use super::super::domain::{RiskLevel, RiskVerdict, ScoreSource};
use super::config::RiskConfig;
use super::rules::RuleEvaluation;
use super::scorer::ScorerOutcome;

/// Rule counts beyond these caps no longer move the proxy score within its band.
const NON_FORCING_CAP: usize = 3;
const HIGH_CAP: usize = 4;

/// Composes the rule pass and the scorer outcome into one verdict.
pub(crate) fn decide_verdict(
    rules: &RuleEvaluation,
    outcome: &ScorerOutcome,
    config: &RiskConfig,
) -> RiskVerdict {
    let mut reasons = rules.reasons();

    let level = if rules.forces_high() {
        RiskLevel::High
    } else if rules.low_risk_signal {
        RiskLevel::Low
    } else {
        match outcome {
            ScorerOutcome::Probability(probability) => {
                let level = band_probability(*probability, config);
                if level != RiskLevel::Low {
                    reasons.push(model_reason(*probability, level, config));
                }
                level
            }
            ScorerOutcome::Unavailable(_) if rules.non_forcing() > 0 => RiskLevel::Medium,
            ScorerOutcome::Unavailable(_) => RiskLevel::Low,
        }
    };

    let (score, score_source) = match outcome {
        ScorerOutcome::Probability(probability) => (round3(*probability), ScoreSource::Model),
        ScorerOutcome::Unavailable(_) => (proxy_score(level, rules, config), ScoreSource::Rules),
    };

    RiskVerdict {
        score,
        level,
        action: level.suggested_action(),
        reasons,
        score_source,
    }
}

pub(crate) fn band_probability(probability: f64, config: &RiskConfig) -> RiskLevel {
    if probability >= config.high_probability {
        RiskLevel::High
    } else if probability >= config.medium_probability {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn model_reason(probability: f64, level: RiskLevel, config: &RiskConfig) -> String {
    let cut = match level {
        RiskLevel::High => config.high_probability,
        _ => config.medium_probability,
    };
    format!(
        "Model risk probability {:.3} at or above {} cut-off {:.2}",
        probability,
        level.label(),
        cut
    )
}

/// Deterministic stand-in for the model probability. Each level owns a disjoint band so the
/// proxy is strictly ordered low < medium < high.
pub(crate) fn proxy_score(level: RiskLevel, rules: &RuleEvaluation, config: &RiskConfig) -> f64 {
    let medium = config.medium_probability;
    let high = config.high_probability;
    let non_forcing = rules.non_forcing().min(NON_FORCING_CAP) as f64;

    let score = match level {
        RiskLevel::Low => medium * non_forcing / 4.0,
        RiskLevel::Medium => medium + (high - medium) * non_forcing.max(1.0) / 4.0,
        RiskLevel::High => {
            let matched = rules.hits.len().clamp(1, HIGH_CAP) as f64;
            high + (1.0 - high) * matched / 4.0
        }
    };
    round3(score)
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
