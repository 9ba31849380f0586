use std::sync::Arc;
use std::thread;

use invoice_ai::workflows::invoices::{
    ApprovalAction, ApprovalError, ApprovalStatus, InMemoryEventLog, InMemoryStore, InvoiceId,
    InvoiceRiskService, NewApproval, RawAmount, RawInvoiceRecord, ReportWindow, Resolution,
    RiskConfig, RiskEngine, RiskLevel, SuggestedAction, WorkflowEvent,
};
use rust_decimal::Decimal;

type Service = InvoiceRiskService<InMemoryStore, InMemoryEventLog>;

fn service() -> (Arc<Service>, Arc<InMemoryEventLog>) {
    let engine = RiskEngine::rules_only(RiskConfig::default()).expect("default policy");
    let events = Arc::new(InMemoryEventLog::default());
    let service = InvoiceRiskService::new(Arc::new(InMemoryStore::new()), events.clone(), engine);
    (Arc::new(service), events)
}

fn record(vendor: &str, total: f64, po_number: Option<&str>) -> RawInvoiceRecord {
    RawInvoiceRecord {
        vendor: Some(vendor.to_string()),
        total: Some(RawAmount::Number(total)),
        po_number: po_number.map(str::to_string),
        ..RawInvoiceRecord::default()
    }
}

fn approve(approver: &str) -> Resolution {
    Resolution {
        action: ApprovalAction::Approve,
        approver: approver.to_string(),
        comment: None,
    }
}

#[test]
fn flagged_invoice_is_routed_reviewed_and_reported() {
    let (service, events) = service();

    let clean = service
        .ingest(record("Acme", 5_000.0, Some("PO-123")))
        .expect("clean invoice ingested");
    let routed = service
        .assess_and_route(&clean.invoice_id, "ap-clerk")
        .expect("clean invoice assessed");
    assert_eq!(routed.assessment.verdict.level, RiskLevel::Low);
    assert_eq!(
        routed.assessment.verdict.action,
        SuggestedAction::AutoApprove
    );
    assert!(routed.approval.is_none());

    let flagged = service
        .ingest(record("suspicious vendor", 100_000.0, None))
        .expect("flagged invoice ingested");
    let routed = service
        .assess_and_route(&flagged.invoice_id, "ap-clerk")
        .expect("flagged invoice assessed");
    assert_eq!(routed.assessment.verdict.level, RiskLevel::High);
    let approval = routed.approval.expect("review opened");
    assert_eq!(approval.status, ApprovalStatus::Pending);
    assert!(approval.reason.contains("Vendor flagged suspicious"));

    let queue = service.approvals().list_pending().expect("queue readable");
    assert_eq!(queue.len(), 1);

    let resolved = service
        .approvals()
        .resolve(&approval.approval_id, approve("controller"))
        .expect("review resolves");
    assert_eq!(resolved.status, ApprovalStatus::Approved);
    assert_eq!(resolved.approver.as_deref(), Some("controller"));
    assert!(service
        .approvals()
        .list_pending()
        .expect("queue readable")
        .is_empty());

    let summary = service
        .summary(ReportWindow::default())
        .expect("summary computed");
    assert_eq!(summary.invoice_count, 2);
    assert_eq!(summary.approvals.approved, 1);
    assert_eq!(summary.risk_levels.low, 1);
    assert_eq!(summary.risk_levels.high, 1);
    assert_eq!(
        summary.approved_totals.get("USD").copied(),
        Some(100_000.into())
    );

    let published = events.events();
    let names: Vec<&str> = published.iter().map(WorkflowEvent::name).collect();
    assert!(names.contains(&"approval_created"));
    assert!(names.contains(&"approval_resolved"));
}

#[test]
fn concurrent_resolutions_admit_exactly_one_winner() {
    let (service, _) = service();
    let approval = service
        .approvals()
        .create(NewApproval {
            invoice_id: InvoiceId("inv123".to_string()),
            requester: "u".to_string(),
            approver: Some("m".to_string()),
            reason: "High value".to_string(),
        })
        .expect("request created");

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let service = Arc::clone(&service);
            let approval_id = approval.approval_id.clone();
            thread::spawn(move || {
                let action = if worker % 2 == 0 {
                    ApprovalAction::Approve
                } else {
                    ApprovalAction::Reject
                };
                service.approvals().resolve(
                    &approval_id,
                    Resolution {
                        action,
                        approver: format!("reviewer-{worker}"),
                        comment: None,
                    },
                )
            })
        })
        .collect();

    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("worker finished"))
        .collect();

    let winners: Vec<_> = outcomes
        .iter()
        .filter_map(|outcome| outcome.as_ref().ok())
        .collect();
    assert_eq!(winners.len(), 1);
    assert!(outcomes.iter().all(|outcome| match outcome {
        Ok(_) => true,
        Err(err) => matches!(err, ApprovalError::AlreadyResolved { .. }),
    }));

    let stored = service
        .approvals()
        .get(&approval.approval_id)
        .expect("request stored");
    assert_eq!(stored.status, winners[0].status);
    assert_eq!(stored.approver, winners[0].approver);
}

#[test]
fn concurrent_routing_opens_a_single_review() {
    let (service, _) = service();
    let invoice = service
        .ingest(record("Northwind Traders", 20_000.0, None))
        .expect("invoice ingested");

    let handles: Vec<_> = (0..6)
        .map(|worker| {
            let service = Arc::clone(&service);
            let invoice_id = invoice.invoice_id.clone();
            thread::spawn(move || {
                service.assess_and_route(&invoice_id, &format!("clerk-{worker}"))
            })
        })
        .collect();

    let approval_ids: Vec<_> = handles
        .into_iter()
        .map(|handle| {
            handle
                .join()
                .expect("worker finished")
                .expect("routing succeeds")
                .approval
                .expect("review required")
                .approval_id
        })
        .collect();

    assert!(approval_ids.windows(2).all(|pair| pair[0] == pair[1]));
    let pending = service.approvals().list_pending().expect("queue readable");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].invoice_id, invoice.invoice_id);
}

#[test]
fn concurrent_creates_for_one_invoice_admit_one_request() {
    let (service, _) = service();

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                service.approvals().create(NewApproval {
                    invoice_id: InvoiceId("inv-contended".to_string()),
                    requester: format!("clerk-{worker}"),
                    approver: None,
                    reason: "High value".to_string(),
                })
            })
        })
        .collect();

    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("worker finished"))
        .collect();

    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert!(outcomes.iter().all(|outcome| match outcome {
        Ok(_) => true,
        Err(err) => matches!(err, ApprovalError::DuplicatePending { .. }),
    }));
    let pending = service.approvals().list_pending().expect("queue readable");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].invoice_id.0, "inv-contended");
}

#[test]
fn summary_never_sees_an_approval_without_its_invoice() {
    let (service, _) = service();

    let writer = {
        let service = Arc::clone(&service);
        thread::spawn(move || {
            for _ in 0..200 {
                let invoice = service
                    .ingest(record("Globex", 100.0, Some("PO-7")))
                    .expect("ingested");
                let approval = service
                    .approvals()
                    .create(NewApproval {
                        invoice_id: invoice.invoice_id,
                        requester: "clerk".to_string(),
                        approver: None,
                        reason: "spot check".to_string(),
                    })
                    .expect("opened");
                service
                    .approvals()
                    .resolve(&approval.approval_id, approve("controller"))
                    .expect("approved");
            }
        })
    };

    while !writer.is_finished() {
        let summary = service
            .summary(ReportWindow::default())
            .expect("summary computed");
        assert_eq!(summary.approved_without_amount, 0);
        assert!(summary.approvals.total <= summary.invoice_count);
        let approved_total = summary
            .approved_totals
            .get("USD")
            .copied()
            .unwrap_or_default();
        assert_eq!(
            approved_total,
            Decimal::from(100 * summary.approvals.approved)
        );
    }
    writer.join().expect("writer finished");

    let summary = service
        .summary(ReportWindow::default())
        .expect("summary computed");
    assert_eq!(summary.invoice_count, 200);
    assert_eq!(summary.approvals.approved, 200);
}
