use chrono::Duration;
use rust_decimal_macros::dec;

use super::common::*;
use crate::workflows::invoices::audit::{summarize, AuditError, ReportWindow};
use crate::workflows::invoices::domain::{
    ApprovalId, ApprovalRequest, ApprovalStatus, ExtractionMetadata, Invoice, InvoiceId,
    RiskAssessment, RiskLevel, RiskVerdict, ScoreSource,
};

fn invoice(id: &str, total: Option<rust_decimal::Decimal>, currency: &str, day: i64) -> Invoice {
    Invoice {
        invoice_id: InvoiceId(id.to_string()),
        vendor: Some("Vendor".to_string()),
        total,
        currency: currency.to_string(),
        po_number: None,
        invoice_date: None,
        extraction: ExtractionMetadata::default(),
        created_at: base_time() + Duration::days(day),
    }
}

fn approval(id: &str, invoice_id: &str, status: ApprovalStatus, day: i64) -> ApprovalRequest {
    let mut request = ApprovalRequest::pending(
        ApprovalId(id.to_string()),
        InvoiceId(invoice_id.to_string()),
        "u".to_string(),
        None,
        "review".to_string(),
        base_time() + Duration::days(day),
    );
    request.status = status;
    request
}

fn assessment(invoice_id: &str, level: RiskLevel) -> RiskAssessment {
    RiskAssessment {
        invoice_id: InvoiceId(invoice_id.to_string()),
        verdict: RiskVerdict {
            score: 0.5,
            level,
            action: level.suggested_action(),
            reasons: Vec::new(),
            score_source: ScoreSource::Rules,
        },
        assessed_at: base_time(),
    }
}

#[test]
fn counts_match_store_contents_exactly() {
    let invoices: Vec<Invoice> = (0..5)
        .map(|n| invoice(&format!("inv-{n}"), Some(dec!(100)), "USD", 0))
        .collect();
    let approvals = vec![
        approval("apr-1", "inv-0", ApprovalStatus::Pending, 0),
        approval("apr-2", "inv-1", ApprovalStatus::Pending, 0),
        approval("apr-3", "inv-2", ApprovalStatus::Approved, 0),
        approval("apr-4", "inv-3", ApprovalStatus::Rejected, 0),
    ];

    let summary = summarize(
        &invoices,
        &[],
        &approvals,
        ReportWindow::default(),
        base_time(),
    )
    .expect("totals fit");

    assert_eq!(summary.invoice_count, 5);
    assert_eq!(summary.approvals.total, 4);
    assert_eq!(summary.approvals.pending, 2);
    assert_eq!(summary.approvals.approved, 1);
    assert_eq!(summary.approvals.rejected, 1);
    assert_eq!(summary.risk_levels.unscored, 5);
}

#[test]
fn approved_totals_group_by_currency_and_count_each_invoice_once() {
    let invoices = vec![
        invoice("inv-usd", Some(dec!(1250.50)), "USD", 0),
        invoice("inv-eur", Some(dec!(300)), "EUR", 0),
        invoice("inv-none", None, "USD", 0),
    ];
    let approvals = vec![
        approval("apr-1", "inv-usd", ApprovalStatus::Approved, 0),
        approval("apr-2", "inv-usd", ApprovalStatus::Approved, 1),
        approval("apr-3", "inv-eur", ApprovalStatus::Approved, 0),
        approval("apr-4", "inv-none", ApprovalStatus::Approved, 0),
        approval("apr-5", "inv-unknown", ApprovalStatus::Approved, 0),
    ];

    let summary = summarize(
        &invoices,
        &[],
        &approvals,
        ReportWindow::default(),
        base_time(),
    )
    .expect("totals fit");

    assert_eq!(summary.approvals.approved, 5);
    assert_eq!(summary.approved_totals.get("USD"), Some(&dec!(1250.50)));
    assert_eq!(summary.approved_totals.get("EUR"), Some(&dec!(300)));
    assert_eq!(summary.approved_without_amount, 2);
}

#[test]
fn risk_distribution_and_window_filter() {
    let invoices = vec![
        invoice("inv-1", Some(dec!(10)), "USD", 0),
        invoice("inv-2", Some(dec!(10)), "USD", 1),
        invoice("inv-3", Some(dec!(10)), "USD", 2),
    ];
    let assessments = vec![
        assessment("inv-1", RiskLevel::High),
        assessment("inv-2", RiskLevel::Medium),
    ];
    let approvals = vec![
        approval("apr-1", "inv-1", ApprovalStatus::Pending, 0),
        approval("apr-2", "inv-2", ApprovalStatus::Rejected, 1),
    ];
    let window = ReportWindow {
        start: Some(base_time() + Duration::days(1)),
        end: None,
    };

    let summary = summarize(&invoices, &assessments, &approvals, window, base_time())
        .expect("totals fit");

    assert_eq!(summary.invoice_count, 2);
    assert_eq!(summary.risk_levels.high, 0);
    assert_eq!(summary.risk_levels.medium, 1);
    assert_eq!(summary.risk_levels.unscored, 1);
    assert_eq!(summary.approvals.total, 1);
    assert_eq!(summary.approvals.rejected, 1);
    assert_eq!(summary.window, window);
}

#[test]
fn approved_total_past_decimal_range_is_an_error() {
    let invoices = vec![
        invoice("inv-1", Some(rust_decimal::Decimal::MAX), "USD", 0),
        invoice("inv-2", Some(dec!(1)), "USD", 0),
        invoice("inv-3", Some(dec!(5)), "EUR", 0),
    ];
    let approvals = vec![
        approval("apr-1", "inv-1", ApprovalStatus::Approved, 0),
        approval("apr-2", "inv-2", ApprovalStatus::Approved, 0),
        approval("apr-3", "inv-3", ApprovalStatus::Approved, 0),
    ];

    let outcome = summarize(
        &invoices,
        &[],
        &approvals,
        ReportWindow::default(),
        base_time(),
    );

    assert_eq!(
        outcome,
        Err(AuditError::TotalOverflow {
            currency: "USD".to_string()
        })
    );
}
