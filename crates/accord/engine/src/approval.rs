//! Approval gate: per-collaborator approve/reject with a unanimity check
//! that flips the contract to active.
//!
//! Approval requires unanimity; rejection is unilateral and immediate. The
//! caller's own slot is resolved with a compare-and-set, and the unanimity
//! aggregate is always computed from a read issued after that write, so of
//! N concurrent approvers the last writer observes the complete set. The
//! activation transition is itself single-winner.

use crate::access::AccessResolver;
use crate::notify::{dispatch, NotificationEvent, NotificationSink};
use crate::{EngineError, EngineResult};
use accord_storage::AccordStorage;
use accord_types::{ContractId, ContractStatus, UserId, Verdict};
use chrono::Utc;
use std::sync::Arc;

pub struct ApprovalGate<S> {
    store: Arc<S>,
    access: AccessResolver<S>,
    notifier: Arc<dyn NotificationSink>,
}

impl<S: AccordStorage> ApprovalGate<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            access: AccessResolver::new(store.clone()),
            store,
            notifier,
        }
    }

    /// Record the caller's approval. Returns `false` when their slot is no
    /// longer pending (already approved or rejected, or no slot at all); an
    /// approval can never be reversed or double-counted.
    pub async fn approve(&self, contract_id: &ContractId, user_id: &UserId) -> EngineResult<bool> {
        self.access.require_access(contract_id, user_id).await?;
        let now = Utc::now();
        if !self
            .store
            .resolve_consent(contract_id, user_id, Verdict::Approved, now, None)
            .await?
        {
            return Ok(false);
        }

        let collaborators = self.store.list_collaborators(contract_id).await?;
        let unanimous = !collaborators.is_empty() && collaborators.iter().all(|c| c.is_approved());
        if unanimous {
            let activated = self
                .store
                .transition_status(
                    contract_id,
                    ContractStatus::PendingApproval,
                    ContractStatus::Active,
                    now,
                )
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
        Ok(true)
    }

    /// Record the caller's rejection and immediately reject the contract,
    /// no unanimity required. Returns `false` under the same lost-race
    /// conditions as [`Self::approve`].
    pub async fn reject(
        &self,
        contract_id: &ContractId,
        user_id: &UserId,
        reason: Option<String>,
    ) -> EngineResult<bool> {
        self.access.require_access(contract_id, user_id).await?;
        let now = Utc::now();
        if !self
            .store
            .resolve_consent(contract_id, user_id, Verdict::Rejected, now, reason)
            .await?
        {
            return Ok(false);
        }

        // Either negotiation state rejects; a contract already resolved by a
        // concurrent caller is left alone.
        let mut rejected = false;
        for from in [ContractStatus::PendingApproval, ContractStatus::Draft] {
            if self
                .store
                .transition_status(contract_id, from, ContractStatus::Rejected, now)
                .await
                .map_err(EngineError::from_gone)?
            {
                rejected = true;
                break;
            }
        }
        if rejected {
            dispatch(
                self.notifier.as_ref(),
                NotificationEvent::ContractRejected {
                    contract_id: contract_id.clone(),
                    rejected_by: user_id.clone(),
                },
            )
            .await;
            tracing::info!(contract_id = %contract_id, by = %user_id, "Contract rejected");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NullSink;
    use accord_storage::memory::InMemoryAccordStorage;
    use accord_storage::{CollaboratorStore, ContractStore};
    use accord_types::{Act, Collaborator, ConsentMethod, Contract};

    async fn pending_contract(
        recipients: &[&str],
    ) -> (ApprovalGate<InMemoryAccordStorage>, Arc<InMemoryAccordStorage>, ContractId) {
        let store = Arc::new(InMemoryAccordStorage::new());
        let gate = ApprovalGate::new(store.clone(), Arc::new(NullSink));

        let mut contract = Contract::new(
            UserId::new("owner"),
            ConsentMethod::Signature,
            "date",
            vec![Act::Kissing],
            Utc::now(),
            60,
        );
        contract.status = ContractStatus::PendingApproval;
        contract.is_collaborative = true;
        let id = contract.id.clone();
        store.create_contract(contract).await.unwrap();

        store
            .insert_collaborator(Collaborator::initiator(
                id.clone(),
                UserId::new("owner"),
                Utc::now(),
            ))
            .await
            .unwrap();
        for user in recipients {
            store
                .insert_collaborator(Collaborator::recipient(
                    id.clone(),
                    UserId::new(*user),
                    Utc::now(),
                ))
                .await
                .unwrap();
        }
        (gate, store, id)
    }

    #[tokio::test]
    async fn unanimous_approval_activates() {
        let (gate, store, id) = pending_contract(&["alex", "sam"]).await;

        assert!(gate.approve(&id, &UserId::new("alex")).await.unwrap());
        let contract = store.get_contract(&id).await.unwrap().unwrap();
        assert_eq!(contract.status, ContractStatus::PendingApproval);

        assert!(gate.approve(&id, &UserId::new("sam")).await.unwrap());
        let contract = store.get_contract(&id).await.unwrap().unwrap();
        assert_eq!(contract.status, ContractStatus::Active);
    }

    #[tokio::test]
    async fn approval_cannot_be_repeated_or_reversed() {
        let (gate, store, id) = pending_contract(&["alex"]).await;

        assert!(gate.approve(&id, &UserId::new("alex")).await.unwrap());
        assert!(!gate.approve(&id, &UserId::new("alex")).await.unwrap());
        // No un-approve: a resolved slot also refuses rejection.
        assert!(!gate.reject(&id, &UserId::new("alex"), None).await.unwrap());

        let row = store
            .get_collaborator(&id, &UserId::new("alex"))
            .await
            .unwrap()
            .unwrap();
        assert!(row.is_approved());
    }

    #[tokio::test]
    async fn rejection_is_unilateral() {
        let (gate, store, id) = pending_contract(&["alex", "sam"]).await;

        assert!(gate.approve(&id, &UserId::new("alex")).await.unwrap());
        assert!(gate
            .reject(&id, &UserId::new("sam"), Some("changed my mind".to_string()))
            .await
            .unwrap());

        let contract = store.get_contract(&id).await.unwrap().unwrap();
        assert_eq!(contract.status, ContractStatus::Rejected);
        let row = store
            .get_collaborator(&id, &UserId::new("sam"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.rejection_reason.as_deref(), Some("changed my mind"));
    }

    #[tokio::test]
    async fn strangers_get_not_found() {
        let (gate, _store, id) = pending_contract(&["alex"]).await;
        assert!(matches!(
            gate.approve(&id, &UserId::new("stranger")).await,
            Err(EngineError::NotFound)
        ));
        assert!(matches!(
            gate.approve(&ContractId::new("no-such"), &UserId::new("alex")).await,
            Err(EngineError::NotFound)
        ));
    }

    #[tokio::test]
    async fn owner_without_pending_slot_cannot_double_count() {
        let (gate, _store, id) = pending_contract(&["alex"]).await;
        // The initiator's slot was created already approved.
        assert!(!gate.approve(&id, &UserId::new("owner")).await.unwrap());
    }
}
