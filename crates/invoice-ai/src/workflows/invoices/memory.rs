use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::domain::{
    ApprovalId, ApprovalRequest, ApprovalStatus, ExtractionMetadata, Invoice, InvoiceId,
    RiskAssessment,
};
use super::repository::{
    ApprovalRepository, EventError, EventPublisher, InvoiceRepository, RepositoryError,
    StoreSnapshot, WorkflowEvent, WorkflowStore,
};

/// Reference store backing both repository traits. Each table sits behind its own mutex and
/// every check-and-write runs inside a single critical section.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    invoices: Mutex<InvoiceTable>,
    approvals: Mutex<ApprovalTable>,
}

#[derive(Debug, Default)]
struct InvoiceTable {
    rows: HashMap<InvoiceId, Invoice>,
    order: Vec<InvoiceId>,
    assessments: HashMap<InvoiceId, RiskAssessment>,
}

#[derive(Debug, Default)]
struct ApprovalTable {
    rows: HashMap<ApprovalId, ApprovalRequest>,
    order: Vec<ApprovalId>,
    pending_by_invoice: HashMap<InvoiceId, ApprovalId>,
}

impl InvoiceTable {
    fn ordered_invoices(&self) -> Vec<Invoice> {
        self.order
            .iter()
            .filter_map(|id| self.rows.get(id))
            .cloned()
            .collect()
    }

    fn ordered_assessments(&self) -> Vec<RiskAssessment> {
        self.order
            .iter()
            .filter_map(|id| self.assessments.get(id))
            .cloned()
            .collect()
    }
}

impl ApprovalTable {
    fn ordered<F>(&self, keep: F) -> Vec<ApprovalRequest>
    where
        F: Fn(&ApprovalRequest) -> bool,
    {
        let mut requests: Vec<ApprovalRequest> = self
            .order
            .iter()
            .filter_map(|id| self.rows.get(id))
            .filter(|request| keep(*request))
            .cloned()
            .collect();
        // Stable: insertion order breaks timestamp ties.
        requests.sort_by_key(|request| request.created_at);
        requests
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InvoiceRepository for InMemoryStore {
    fn insert(&self, invoice: Invoice) -> Result<Invoice, RepositoryError> {
        let mut table = lock(&self.invoices)?;
        if table.rows.contains_key(&invoice.invoice_id) {
            return Err(RepositoryError::Conflict);
        }
        table.order.push(invoice.invoice_id.clone());
        table.rows.insert(invoice.invoice_id.clone(), invoice.clone());
        Ok(invoice)
    }

    fn fetch(&self, id: &InvoiceId) -> Result<Option<Invoice>, RepositoryError> {
        let table = lock(&self.invoices)?;
        Ok(table.rows.get(id).cloned())
    }

    fn all(&self) -> Result<Vec<Invoice>, RepositoryError> {
        let table = lock(&self.invoices)?;
        Ok(table.ordered_invoices())
    }

    fn update_extraction(
        &self,
        id: &InvoiceId,
        extraction: ExtractionMetadata,
    ) -> Result<Invoice, RepositoryError> {
        let mut table = lock(&self.invoices)?;
        let invoice = table.rows.get_mut(id).ok_or(RepositoryError::NotFound)?;
        invoice.extraction = extraction;
        Ok(invoice.clone())
    }

    fn put_assessment(
        &self,
        assessment: RiskAssessment,
    ) -> Result<Option<RiskAssessment>, RepositoryError> {
        let mut table = lock(&self.invoices)?;
        if !table.rows.contains_key(&assessment.invoice_id) {
            return Err(RepositoryError::NotFound);
        }
        Ok(table
            .assessments
            .insert(assessment.invoice_id.clone(), assessment))
    }

    fn fetch_assessment(&self, id: &InvoiceId) -> Result<Option<RiskAssessment>, RepositoryError> {
        let table = lock(&self.invoices)?;
        Ok(table.assessments.get(id).cloned())
    }

    fn assessments(&self) -> Result<Vec<RiskAssessment>, RepositoryError> {
        let table = lock(&self.invoices)?;
        Ok(table.ordered_assessments())
    }
}

impl ApprovalRepository for InMemoryStore {
    fn insert_pending(&self, request: ApprovalRequest) -> Result<ApprovalRequest, RepositoryError> {
        let mut table = lock(&self.approvals)?;
        if table.pending_by_invoice.contains_key(&request.invoice_id) {
            return Err(RepositoryError::PendingExists);
        }
        if table.rows.contains_key(&request.approval_id) {
            return Err(RepositoryError::Conflict);
        }

        table
            .pending_by_invoice
            .insert(request.invoice_id.clone(), request.approval_id.clone());
        table.order.push(request.approval_id.clone());
        table
            .rows
            .insert(request.approval_id.clone(), request.clone());
        Ok(request)
    }

    fn fetch(&self, id: &ApprovalId) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let table = lock(&self.approvals)?;
        Ok(table.rows.get(id).cloned())
    }

    fn compare_and_set(
        &self,
        expected: ApprovalStatus,
        next: ApprovalRequest,
    ) -> Result<ApprovalRequest, RepositoryError> {
        let mut table = lock(&self.approvals)?;
        let current = table
            .rows
            .get_mut(&next.approval_id)
            .ok_or(RepositoryError::NotFound)?;
        if current.status != expected {
            return Err(RepositoryError::StaleStatus {
                current: current.status,
            });
        }

        *current = next.clone();
        if next.status != ApprovalStatus::Pending
            && table.pending_by_invoice.get(&next.invoice_id) == Some(&next.approval_id)
        {
            table.pending_by_invoice.remove(&next.invoice_id);
        }
        Ok(next)
    }

    fn pending_for_invoice(
        &self,
        invoice_id: &InvoiceId,
    ) -> Result<Option<ApprovalRequest>, RepositoryError> {
        let table = lock(&self.approvals)?;
        Ok(table
            .pending_by_invoice
            .get(invoice_id)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    fn pending(&self) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let table = lock(&self.approvals)?;
        Ok(table.ordered(ApprovalRequest::is_pending))
    }

    fn all(&self) -> Result<Vec<ApprovalRequest>, RepositoryError> {
        let table = lock(&self.approvals)?;
        Ok(table.ordered(|_| true))
    }
}

impl WorkflowStore for InMemoryStore {
    /// Holds both table locks, invoices first. Writers take one lock at a time.
    fn snapshot(&self) -> Result<StoreSnapshot, RepositoryError> {
        let invoices = lock(&self.invoices)?;
        let approvals = lock(&self.approvals)?;
        Ok(StoreSnapshot {
            invoices: invoices.ordered_invoices(),
            assessments: invoices.ordered_assessments(),
            approvals: approvals.ordered(|_| true),
        })
    }
}

/// Publisher that keeps every event in memory, for the demo walkthrough and tests.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl InMemoryEventLog {
    pub fn events(&self) -> Vec<WorkflowEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventPublisher for InMemoryEventLog {
    fn publish(&self, event: WorkflowEvent) -> Result<(), EventError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| EventError::Transport("event log lock poisoned".to_string()))?;
        events.push(event);
        Ok(())
    }
}
