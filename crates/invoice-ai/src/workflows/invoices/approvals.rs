//! Human-in-the-loop review state machine.
//!
//! `pending -> approved | rejected`, both terminal. The only way to build a resolved record is
//! [`ApprovalRequest::resolve`]; the store then applies it with a compare-and-set on
//! `pending`, so concurrent resolvers race on the store and exactly one of them wins.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{
    non_blank, ApprovalId, ApprovalRequest, ApprovalStatus, InvoiceId, Resolution,
    TransitionError,
};
use super::repository::{ApprovalRepository, EventPublisher, RepositoryError, WorkflowEvent};

/// Time source for creation and resolution stamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

static APPROVAL_SEQUENCE: AtomicU64 = AtomicU64::new(1);
const MAX_ID_ATTEMPTS: u32 = 8;

fn next_approval_id() -> ApprovalId {
    let id = APPROVAL_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApprovalId(format!("apr-{id:06}"))
}

/// Request to open a review for an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewApproval {
    pub invoice_id: InvoiceId,
    pub requester: String,
    #[serde(default)]
    pub approver: Option<String>,
    pub reason: String,
}

pub struct ApprovalWorkflow<R, E> {
    repository: Arc<R>,
    events: Arc<E>,
    clock: Arc<dyn Clock>,
}

impl<R, E> Clone for ApprovalWorkflow<R, E> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            events: Arc::clone(&self.events),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<R, E> fmt::Debug for ApprovalWorkflow<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalWorkflow").finish_non_exhaustive()
    }
}

impl<R, E> ApprovalWorkflow<R, E>
where
    R: ApprovalRepository + 'static,
    E: EventPublisher + 'static,
{
    pub fn new(repository: Arc<R>, events: Arc<E>) -> Self {
        Self::with_clock(repository, events, Arc::new(SystemClock))
    }

    pub fn with_clock(repository: Arc<R>, events: Arc<E>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            events,
            clock,
        }
    }

    /// Opens a pending review. A second pending request for the same invoice is rejected.
    pub fn create(&self, request: NewApproval) -> Result<ApprovalRequest, ApprovalError> {
        if non_blank(Some(request.invoice_id.0.as_str())).is_none() {
            return Err(ApprovalError::MissingField("invoice_id"));
        }
        let requester = non_blank(Some(request.requester.as_str()))
            .ok_or(ApprovalError::MissingField("requester"))?;

        let approver = non_blank(request.approver.as_deref()).map(str::to_string);
        let reason = request.reason.trim().to_string();
        let created_at = self.clock.now();

        let mut attempt = 1;
        let stored = loop {
            let pending = ApprovalRequest::pending(
                next_approval_id(),
                request.invoice_id.clone(),
                requester.to_string(),
                approver.clone(),
                reason.clone(),
                created_at,
            );

            match self.repository.insert_pending(pending) {
                Ok(stored) => break stored,
                Err(RepositoryError::PendingExists) => {
                    return Err(ApprovalError::DuplicatePending {
                        invoice_id: request.invoice_id,
                    })
                }
                // The store outlived the id sequence; skip ids it already holds.
                Err(RepositoryError::Conflict) if attempt < MAX_ID_ATTEMPTS => {
                    warn!(attempt, "approval id already taken; allocating another");
                    attempt += 1;
                }
                Err(other) => return Err(other.into()),
            }
        };

        info!(
            approval_id = %stored.approval_id,
            invoice_id = %stored.invoice_id,
            requester = %stored.requester,
            "approval request opened"
        );
        self.notify(WorkflowEvent::ApprovalCreated {
            approval_id: stored.approval_id.clone(),
            invoice_id: stored.invoice_id.clone(),
            requester: stored.requester.clone(),
            reason: stored.reason.clone(),
        });

        Ok(stored)
    }

    /// Applies the single authorized transition. First resolution wins; later attempts get
    /// [`ApprovalError::AlreadyResolved`] and leave the stored record untouched.
    pub fn resolve(
        &self,
        approval_id: &ApprovalId,
        resolution: Resolution,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let approver = non_blank(Some(resolution.approver.as_str()))
            .ok_or(ApprovalError::MissingField("approver"))?
            .to_string();
        let comment = non_blank(resolution.comment.as_deref()).map(str::to_string);
        let resolution = Resolution {
            action: resolution.action,
            approver,
            comment,
        };

        let current = self.get(approval_id)?;
        let next = current
            .resolve(&resolution, self.clock.now())
            .map_err(|TransitionError::AlreadyResolved { status }| {
                ApprovalError::AlreadyResolved {
                    approval_id: approval_id.clone(),
                    status,
                }
            })?;

        let stored = match self
            .repository
            .compare_and_set(ApprovalStatus::Pending, next)
        {
            Ok(stored) => stored,
            Err(RepositoryError::StaleStatus { current }) => {
                return Err(ApprovalError::AlreadyResolved {
                    approval_id: approval_id.clone(),
                    status: current,
                })
            }
            Err(RepositoryError::NotFound) => {
                return Err(ApprovalError::NotFound(approval_id.clone()))
            }
            Err(other) => return Err(other.into()),
        };

        info!(
            approval_id = %stored.approval_id,
            invoice_id = %stored.invoice_id,
            status = stored.status.label(),
            "approval request resolved"
        );
        self.notify(WorkflowEvent::ApprovalResolved {
            approval_id: stored.approval_id.clone(),
            invoice_id: stored.invoice_id.clone(),
            status: stored.status,
            approver: stored.approver.clone(),
        });

        Ok(stored)
    }

    pub fn get(&self, approval_id: &ApprovalId) -> Result<ApprovalRequest, ApprovalError> {
        self.repository
            .fetch(approval_id)?
            .ok_or_else(|| ApprovalError::NotFound(approval_id.clone()))
    }

    /// Reviewer queue, oldest first.
    pub fn list_pending(&self) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        Ok(self.repository.pending()?)
    }

    pub fn list(
        &self,
        status: Option<ApprovalStatus>,
    ) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        let requests = match status {
            Some(ApprovalStatus::Pending) => self.repository.pending()?,
            Some(wanted) => self
                .repository
                .all()?
                .into_iter()
                .filter(|request| request.status == wanted)
                .collect(),
            None => self.repository.all()?,
        };
        Ok(requests)
    }

    pub fn pending_for_invoice(
        &self,
        invoice_id: &InvoiceId,
    ) -> Result<Option<ApprovalRequest>, ApprovalError> {
        Ok(self.repository.pending_for_invoice(invoice_id)?)
    }

    fn notify(&self, event: WorkflowEvent) {
        let name = event.name();
        if let Err(err) = self.events.publish(event) {
            warn!(event = name, error = %err, "workflow event delivery failed");
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApprovalError {
    #[error("invoice {invoice_id} already has a pending approval")]
    DuplicatePending { invoice_id: InvoiceId },
    #[error("approval {0} not found")]
    NotFound(ApprovalId),
    #[error("approval {approval_id} already resolved as {}", .status.label())]
    AlreadyResolved {
        approval_id: ApprovalId,
        status: ApprovalStatus,
    },
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
