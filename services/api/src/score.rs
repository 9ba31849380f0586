use crate::infra::build_engine;
use clap::Args;
use invoice_ai::config::AppConfig;
use invoice_ai::error::AppError;
use invoice_ai::workflows::invoices::{
    read_invoice_file, LogisticRiskModel, RawInvoiceRecord, RiskEngine, RiskVerdict, ScoreSource,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// Header-based invoice CSV export
    #[arg(long)]
    pub(crate) csv: PathBuf,
    /// Exported model coefficients; fails instead of falling back when unreadable
    #[arg(long)]
    pub(crate) model: Option<PathBuf>,
    /// Emit one JSON object per record instead of the text table
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ScoredLine {
    pub(crate) line: usize,
    pub(crate) vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) verdict: Option<RiskVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

/// Totals printed under the text table.
#[derive(Debug, PartialEq)]
pub(crate) struct BatchTotals {
    pub(crate) scored: usize,
    pub(crate) rejected: usize,
    pub(crate) routed: usize,
    /// `None` once the sum leaves the decimal range.
    pub(crate) routed_amount: Option<Decimal>,
}

pub(crate) fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let ScoreArgs { csv, model, json } = args;

    let config = AppConfig::load()?;
    let engine = match model {
        Some(path) => {
            let model = LogisticRiskModel::from_path(path)?;
            RiskEngine::new(config.risk.policy.clone(), Arc::new(model))?
        }
        None => build_engine(&config.risk)?,
    };

    let records = read_invoice_file(&csv)?;
    let lines = score_records(&engine, &records);

    if json {
        for line in &lines {
            match serde_json::to_string(line) {
                Ok(encoded) => println!("{encoded}"),
                Err(err) => eprintln!("line {}: failed to encode verdict: {err}", line.line),
            }
        }
        return Ok(());
    }

    println!("Scored {} ({} records)", csv.display(), records.len());
    for line in &lines {
        let vendor = line.vendor.as_deref().unwrap_or("<unknown vendor>");
        match (&line.verdict, &line.error) {
            (Some(verdict), _) => {
                println!(
                    "- line {}: {} | {} ({:.3}, {}) -> {}",
                    line.line,
                    vendor,
                    verdict.level.label(),
                    verdict.score,
                    source_label(verdict),
                    verdict.action.label()
                );
                for reason in &verdict.reasons {
                    println!("    * {reason}");
                }
            }
            (None, Some(error)) => {
                println!("- line {}: {} | rejected: {}", line.line, vendor, error)
            }
            (None, None) => {}
        }
    }

    let totals = batch_totals(&records, &lines);
    let routed_amount = match totals.routed_amount {
        Some(amount) => amount.to_string(),
        None => "total out of range".to_string(),
    };
    println!(
        "\n{} scored | {} rejected | {} routed for review ({} total)",
        totals.scored, totals.rejected, totals.routed, routed_amount
    );
    Ok(())
}

pub(crate) fn score_records(engine: &RiskEngine, records: &[RawInvoiceRecord]) -> Vec<ScoredLine> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let (verdict, error) = match engine.score_record(record) {
                Ok(verdict) => (Some(verdict), None),
                Err(err) => (None, Some(err.to_string())),
            };
            ScoredLine {
                // Header is line 1.
                line: index + 2,
                vendor: record.vendor().map(str::to_string),
                verdict,
                error,
            }
        })
        .collect()
}

pub(crate) fn batch_totals(records: &[RawInvoiceRecord], lines: &[ScoredLine]) -> BatchTotals {
    let mut totals = BatchTotals {
        scored: 0,
        rejected: 0,
        routed: 0,
        routed_amount: Some(Decimal::ZERO),
    };
    for (record, line) in records.iter().zip(lines) {
        let Some(verdict) = &line.verdict else {
            totals.rejected += 1;
            continue;
        };
        totals.scored += 1;
        if verdict.action.requires_review() {
            totals.routed += 1;
            if let Ok(Some(amount)) = record.amount() {
                totals.routed_amount = totals
                    .routed_amount
                    .and_then(|running| running.checked_add(amount));
            }
        }
    }
    totals
}

fn source_label(verdict: &RiskVerdict) -> &'static str {
    match verdict.score_source {
        ScoreSource::Model => "model",
        ScoreSource::Rules => "rules",
    }
}
