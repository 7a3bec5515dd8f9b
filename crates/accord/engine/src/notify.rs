//! Outbound notification seam.
//!
//! Delivery (email, in-app) is out of scope. The engine emits domain events
//! to a sink only after the owning write has committed; a failing sink is
//! logged and never rolls anything back.

use accord_types::{AmendmentId, ContractId, InvitationId, UserId};
use async_trait::async_trait;
use std::sync::Mutex;

/// Domain events emitted after a state change has committed.
#[derive(Clone, Debug, PartialEq)]
pub enum NotificationEvent {
    InvitationCreated {
        contract_id: ContractId,
        invitation_id: InvitationId,
        recipient_email: String,
    },
    InvitationAccepted {
        contract_id: ContractId,
        invitation_id: InvitationId,
        user_id: UserId,
    },
    CollaboratorAdded {
        contract_id: ContractId,
        user_id: UserId,
    },
    ContractActivated {
        contract_id: ContractId,
    },
    ContractRejected {
        contract_id: ContractId,
        rejected_by: UserId,
    },
    AmendmentRequested {
        contract_id: ContractId,
        amendment_id: AmendmentId,
        requested_by: UserId,
    },
    AmendmentApproved {
        contract_id: ContractId,
        amendment_id: AmendmentId,
    },
    AmendmentRejected {
        contract_id: ContractId,
        amendment_id: AmendmentId,
        rejected_by: UserId,
    },
}

/// Outbound notification dispatch, fire-and-forget.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: NotificationEvent) -> anyhow::Result<()>;
}

/// Sink that drops every event.
#[derive(Default)]
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn notify(&self, _event: NotificationEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Recording sink for tests.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<NotificationEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn notify(&self, event: NotificationEvent) -> anyhow::Result<()> {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
        Ok(())
    }
}

/// Dispatch an event, swallowing sink failures.
pub(crate) async fn dispatch(sink: &dyn NotificationSink, event: NotificationEvent) {
    if let Err(error) = sink.notify(event).await {
        tracing::warn!(error = %error, "notification dispatch failed");
    }
}
