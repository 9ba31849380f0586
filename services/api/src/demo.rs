use crate::infra::{build_engine, parse_timestamp};
use chrono::{DateTime, Utc};
use clap::Args;
use invoice_ai::config::AppConfig;
use invoice_ai::error::AppError;
use invoice_ai::workflows::invoices::{
    ApprovalAction, AuditSummary, InMemoryEventLog, InMemoryStore, InvoiceRiskService,
    InvoiceServiceError, RawAmount, RawInvoiceRecord, ReportWindow, Resolution, RoutedAssessment,
};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Reviewer name recorded on demo decisions
    #[arg(long, default_value = "controller")]
    pub(crate) approver: String,
    /// Only count records created at or after this instant in the summary (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_timestamp)]
    pub(crate) since: Option<DateTime<Utc>>,
}

type DemoService = InvoiceRiskService<InMemoryStore, InMemoryEventLog>;

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { approver, since } = args;

    let config = AppConfig::load()?;
    let engine = build_engine(&config.risk)?;
    let events = Arc::new(InMemoryEventLog::default());
    let service = InvoiceRiskService::new(Arc::new(InMemoryStore::new()), events.clone(), engine);

    println!("Invoice risk workflow demo");
    let routed = route_samples(&service)?;

    println!("\nRisk assessments");
    for entry in &routed {
        let verdict = &entry.assessment.verdict;
        println!(
            "- {}: {} ({:.3}) -> {}",
            entry.assessment.invoice_id,
            verdict.level.label(),
            verdict.score,
            verdict.action.label()
        );
        for reason in &verdict.reasons {
            println!("    * {reason}");
        }
    }

    let pending: Vec<_> = routed
        .iter()
        .filter_map(|entry| entry.approval.as_ref())
        .collect();
    println!("\nReview queue: {} pending", pending.len());

    for (position, request) in pending.iter().enumerate() {
        let action = if position == 0 {
            ApprovalAction::Approve
        } else {
            ApprovalAction::Reject
        };
        let resolution = Resolution {
            action,
            approver: approver.clone(),
            comment: Some(format!("demo decision {}", position + 1)),
        };
        match service.approvals().resolve(&request.approval_id, resolution) {
            Ok(resolved) => println!(
                "- {} for {} -> {} by {}",
                resolved.approval_id,
                resolved.invoice_id,
                resolved.status.label(),
                resolved.approver.as_deref().unwrap_or("-")
            ),
            Err(err) => println!("- {}: {}", request.approval_id, err),
        }
    }

    let window = ReportWindow {
        start: since,
        end: None,
    };
    render_summary(&service.summary(window)?);

    println!("\n{} workflow events published", events.events().len());
    Ok(())
}

fn route_samples(service: &DemoService) -> Result<Vec<RoutedAssessment>, InvoiceServiceError> {
    sample_records()
        .into_iter()
        .map(|record| {
            let invoice = service.ingest(record)?;
            service.assess_and_route(&invoice.invoice_id, "ap-clerk")
        })
        .collect()
}

pub(crate) fn sample_records() -> Vec<RawInvoiceRecord> {
    vec![
        RawInvoiceRecord {
            vendor: Some("Acme Office Supply".to_string()),
            total: Some(RawAmount::Text("$4,250.00".to_string())),
            currency: Some("USD".to_string()),
            po_number: Some("PO-2041".to_string()),
            body: Some("Monthly toner and paper".to_string()),
            confidence: Some(0.97),
            date: Some("2024-03-01".to_string()),
        },
        RawInvoiceRecord {
            vendor: Some("Unknown Logistics LLC".to_string()),
            total: Some(RawAmount::Number(72_500.0)),
            currency: Some("USD".to_string()),
            po_number: None,
            body: Some("URGENT final notice: pay immediately".to_string()),
            confidence: Some(0.81),
            date: Some("2024-03-02".to_string()),
        },
        RawInvoiceRecord {
            vendor: Some("Northwind Traders".to_string()),
            total: Some(RawAmount::Number(18_000.0)),
            currency: Some("EUR".to_string()),
            po_number: None,
            body: Some("Quarterly maintenance".to_string()),
            confidence: Some(0.9),
            date: Some("2024-03-04".to_string()),
        },
    ]
}

fn render_summary(summary: &AuditSummary) {
    println!("\nAudit summary");
    println!("- invoices: {}", summary.invoice_count);
    println!(
        "- approvals: {} total | {} pending | {} approved | {} rejected",
        summary.approvals.total,
        summary.approvals.pending,
        summary.approvals.approved,
        summary.approvals.rejected
    );
    println!(
        "- risk levels: {} low | {} medium | {} high | {} unscored",
        summary.risk_levels.low,
        summary.risk_levels.medium,
        summary.risk_levels.high,
        summary.risk_levels.unscored
    );
    if summary.approved_totals.is_empty() {
        println!("- approved amount: none");
    }
    for (currency, total) in &summary.approved_totals {
        println!("- approved amount: {total} {currency}");
    }
    if summary.approved_without_amount > 0 {
        println!(
            "- approved without a known amount: {}",
            summary.approved_without_amount
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invoice_ai::workflows::invoices::{RiskConfig, RiskEngine, RiskLevel};

    #[test]
    fn samples_cover_each_routing_outcome() {
        let engine = RiskEngine::rules_only(RiskConfig::default()).expect("default policy");
        let service = InvoiceRiskService::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryEventLog::default()),
            engine,
        );

        let routed = route_samples(&service).expect("samples route");
        let levels: Vec<_> = routed
            .iter()
            .map(|entry| entry.assessment.verdict.level)
            .collect();
        assert_eq!(levels, vec![RiskLevel::Low, RiskLevel::High, RiskLevel::Medium]);
        assert!(routed[0].approval.is_none());
        assert!(routed[1].approval.is_some());
        assert!(routed[2].approval.is_some());
    }
}
