//! Confirmation gate: the second, independent unanimity gate.
//!
//! Directly-created multi-party records (voice/photo/biometric) start as
//! drafts with collaborator rows already attached and never pass through
//! the invitation/approval flow. Each party instead stamps a final consent
//! confirmation; once every row carries one, the contract activates. The
//! stamp lives in `confirmed_at`, disjoint from the approval gate's
//! `status` field, and the activation edge (`Draft -> Active`) is disjoint
//! from the approval gate's edge, so a contract cannot activate through
//! the wrong gate.

use crate::access::AccessResolver;
use crate::notify::{dispatch, NotificationEvent, NotificationSink};
use crate::{EngineError, EngineResult};
use accord_storage::AccordStorage;
use accord_types::{ContractId, ContractStatus, UserId};
use chrono::Utc;
use std::sync::Arc;

/// Aggregate outcome of a confirmation call, so the caller can distinguish
/// "you confirmed, waiting on others" from "all confirmed, now active".
#[derive(Clone, Copy, Debug)]
pub struct ConfirmOutcome {
    pub all_confirmed: bool,
    pub contract_status: ContractStatus,
}

pub struct ConfirmationGate<S> {
    store: Arc<S>,
    access: AccessResolver<S>,
    notifier: Arc<dyn NotificationSink>,
}

impl<S: AccordStorage> ConfirmationGate<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            access: AccessResolver::new(store.clone()),
            store,
            notifier,
        }
    }

    /// Stamp the caller's final consent confirmation. Idempotent: calling
    /// twice simply re-stamps.
    pub async fn confirm(
        &self,
        contract_id: &ContractId,
        user_id: &UserId,
    ) -> EngineResult<ConfirmOutcome> {
        self.access.require_access(contract_id, user_id).await?;
        let now = Utc::now();
        if !self.store.stamp_confirmed(contract_id, user_id, now).await? {
            return Err(EngineError::InvalidState(
                "caller holds no collaborator slot on this contract".to_string(),
            ));
        }

        let collaborators = self.store.list_collaborators(contract_id).await?;
        let all_confirmed =
            !collaborators.is_empty() && collaborators.iter().all(|c| c.is_confirmed());
        if all_confirmed {
            let activated = self
                .store
                .transition_status(contract_id, ContractStatus::Draft, ContractStatus::Active, now)
                .await
                .map_err(EngineError::from_gone)?;
            if activated {
                dispatch(
                    self.notifier.as_ref(),
                    NotificationEvent::ContractActivated {
                        contract_id: contract_id.clone(),
                    },
                )
                .await;
                tracing::info!(contract_id = %contract_id, "Contract activated");
            }
        }

        let contract_status = self
            .store
            .get_contract(contract_id)
            .await?
            .map(|c| c.status)
            .ok_or(EngineError::NotFound)?;
        Ok(ConfirmOutcome {
            all_confirmed,
            contract_status,
        })
    }
}
