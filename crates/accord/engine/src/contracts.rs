//! Contract lifecycle service: creation, pause/resume, deletion.

use crate::access::AccessResolver;
use crate::identity::IdentityDirectory;
use crate::notify::{dispatch, NotificationEvent, NotificationSink};
use crate::{EngineError, EngineResult};
use accord_storage::AccordStorage;
use accord_types::{
    Act, Collaborator, ConsentMethod, Contract, ContractId, ContractStatus, UserId,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Inputs for drafting a contract.
///
/// `participants` is the direct multi-party path: counterparties attached at
/// creation time (voice/photo/biometric records captured with everyone
/// present). Those contracts stay in draft until the confirmation gate
/// activates them.
#[derive(Clone, Debug)]
pub struct NewContract {
    pub owner_id: UserId,
    pub method: ConsentMethod,
    pub encounter_type: String,
    pub acts: Vec<Act>,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    /// Display names for the legacy parties cache
    pub parties: Vec<String>,
    pub participants: Vec<UserId>,
}

/// Owner-facing contract lifecycle operations.
pub struct ContractService<S> {
    store: Arc<S>,
    access: AccessResolver<S>,
    directory: Arc<dyn IdentityDirectory>,
    notifier: Arc<dyn NotificationSink>,
}

impl<S: AccordStorage> ContractService<S> {
    pub fn new(
        store: Arc<S>,
        directory: Arc<dyn IdentityDirectory>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            access: AccessResolver::new(store.clone()),
            store,
            directory,
            notifier,
        }
    }

    /// Draft a new contract, optionally with counterparties attached.
    pub async fn create_contract(&self, new: NewContract) -> EngineResult<Contract> {
        if new.duration_minutes <= 0 {
            return Err(EngineError::Validation {
                field: "duration_minutes",
                message: "must be positive".to_string(),
            });
        }

        let mut participants: Vec<UserId> = Vec::new();
        for user_id in new.participants {
            if user_id == new.owner_id {
                return Err(EngineError::SelfActionForbidden(
                    "the owner is already a party".to_string(),
                ));
            }
            if !participants.contains(&user_id) {
                participants.push(user_id);
            }
        }
        for user_id in &participants {
            let exists = self
                .directory
                .profile_exists(user_id)
                .await
                .map_err(|e| EngineError::Directory(e.to_string()))?;
            if !exists {
                return Err(EngineError::Validation {
                    field: "participants",
                    message: format!("unknown user {user_id}"),
                });
            }
        }

        let mut contract = Contract::new(
            new.owner_id,
            new.method,
            new.encounter_type,
            new.acts,
            new.start_time,
            new.duration_minutes,
        )
        .with_parties(new.parties);
        contract.is_collaborative = !participants.is_empty();

        self.store.create_contract(contract.clone()).await?;

        if !participants.is_empty() {
            let at = contract.created_at;
            self.store
                .insert_collaborator(Collaborator::initiator(
                    contract.id.clone(),
                    contract.owner_id.clone(),
                    at,
                ))
                .await?;
            for user_id in participants {
                self.store
                    .insert_collaborator(Collaborator::recipient(
                        contract.id.clone(),
                        user_id.clone(),
                        at,
                    ))
                    .await?;
                dispatch(
                    self.notifier.as_ref(),
                    NotificationEvent::CollaboratorAdded {
                        contract_id: contract.id.clone(),
                        user_id,
                    },
                )
                .await;
            }
        }

        tracing::info!(
            contract_id = %contract.id,
            owner = %contract.owner_id,
            collaborative = contract.is_collaborative,
            "Contract created"
        );
        Ok(contract)
    }

    /// Fetch a contract on the caller's behalf; `NotFound` hides both
    /// nonexistence and lack of access.
    pub async fn get_contract(
        &self,
        contract_id: &ContractId,
        caller: &UserId,
    ) -> EngineResult<Contract> {
        self.access.require_access(contract_id, caller).await
    }

    pub async fn list_owned(&self, owner_id: &UserId) -> EngineResult<Vec<Contract>> {
        Ok(self.store.list_contracts_for_owner(owner_id).await?)
    }

    /// Contracts the user holds a collaborator slot on, newest-first.
    pub async fn list_collaborating(&self, user_id: &UserId) -> EngineResult<Vec<Contract>> {
        let rows = self.store.list_collaborations_for_user(user_id).await?;
        let mut contracts = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(contract) = self.store.get_contract(&row.contract_id).await? {
                contracts.push(contract);
            }
        }
        Ok(contracts)
    }

    /// Suspend an active contract. Any party with access may pause; returns
    /// `false` when the contract is not currently active.
    pub async fn pause(&self, contract_id: &ContractId, caller: &UserId) -> EngineResult<bool> {
        self.access.require_access(contract_id, caller).await?;
        let moved = self
            .store
            .transition_status(
                contract_id,
                ContractStatus::Active,
                ContractStatus::Paused,
                Utc::now(),
            )
            .await
            .map_err(EngineError::from_gone)?;
        if moved {
            tracing::info!(contract_id = %contract_id, by = %caller, "Contract paused");
        }
        Ok(moved)
    }

    /// Resume a paused contract. Mirror of [`Self::pause`].
    pub async fn resume(&self, contract_id: &ContractId, caller: &UserId) -> EngineResult<bool> {
        self.access.require_access(contract_id, caller).await?;
        let moved = self
            .store
            .transition_status(
                contract_id,
                ContractStatus::Paused,
                ContractStatus::Active,
                Utc::now(),
            )
            .await
            .map_err(EngineError::from_gone)?;
        if moved {
            tracing::info!(contract_id = %contract_id, by = %caller, "Contract resumed");
        }
        Ok(moved)
    }

    /// Delete a contract. Owner-only, and only while it is a draft or has
    /// reached a terminal state; a contract entangled in unresolved
    /// collaboration cannot be unilaterally destroyed.
    pub async fn delete_contract(
        &self,
        contract_id: &ContractId,
        caller: &UserId,
    ) -> EngineResult<()> {
        let contract = self.access.require_access(contract_id, caller).await?;
        if &contract.owner_id != caller {
            return Err(EngineError::Unauthorized);
        }
        if contract.status != ContractStatus::Draft && !contract.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "a contract in {:?} cannot be deleted",
                contract.status
            )));
        }
        self.store
            .delete_contract(contract_id)
            .await
            .map_err(EngineError::from_gone)?;
        tracing::info!(contract_id = %contract_id, "Contract deleted");
        Ok(())
    }

    /// Stamp the caller's collaborator row as viewed.
    pub async fn mark_viewed(
        &self,
        contract_id: &ContractId,
        caller: &UserId,
    ) -> EngineResult<bool> {
        self.access.require_access(contract_id, caller).await?;
        Ok(self
            .store
            .touch_last_viewed(contract_id, caller, Utc::now())
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MemoryDirectory;
    use crate::notify::NullSink;
    use accord_storage::memory::InMemoryAccordStorage;
    use accord_storage::{CollaboratorStore, ContractStore, InvitationStore};
    use accord_types::{CollaboratorStatus, Invitation};
    use chrono::Duration;

    fn service() -> (ContractService<InMemoryAccordStorage>, Arc<InMemoryAccordStorage>) {
        let store = Arc::new(InMemoryAccordStorage::new());
        let directory = Arc::new(MemoryDirectory::with_users([
            UserId::new("owner"),
            UserId::new("alex"),
            UserId::new("sam"),
        ]));
        let service = ContractService::new(store.clone(), directory, Arc::new(NullSink));
        (service, store)
    }

    fn draft(owner: &str, participants: &[&str]) -> NewContract {
        NewContract {
            owner_id: UserId::new(owner),
            method: ConsentMethod::Voice,
            encounter_type: "date".to_string(),
            acts: vec![Act::Kissing],
            start_time: Utc::now(),
            duration_minutes: 90,
            parties: vec![],
            participants: participants.iter().map(|u| UserId::new(*u)).collect(),
        }
    }

    #[tokio::test]
    async fn create_with_participants_attaches_rows() {
        let (service, store) = service();
        let contract = service
            .create_contract(draft("owner", &["alex", "sam", "alex"]))
            .await
            .unwrap();
        assert!(contract.is_collaborative);
        assert_eq!(contract.status, ContractStatus::Draft);

        let rows = store.list_collaborators(&contract.id).await.unwrap();
        assert_eq!(rows.len(), 3);
        let owner_row = rows
            .iter()
            .find(|c| c.user_id == UserId::new("owner"))
            .unwrap();
        assert_eq!(owner_row.status, CollaboratorStatus::Approved);
        assert!(rows
            .iter()
            .filter(|c| c.user_id != UserId::new("owner"))
            .all(|c| c.status == CollaboratorStatus::Pending));
    }

    #[tokio::test]
    async fn create_validates_inputs() {
        let (service, _) = service();

        let mut bad = draft("owner", &[]);
        bad.duration_minutes = 0;
        assert!(matches!(
            service.create_contract(bad).await,
            Err(EngineError::Validation { field: "duration_minutes", .. })
        ));

        assert!(matches!(
            service.create_contract(draft("owner", &["owner"])).await,
            Err(EngineError::SelfActionForbidden(_))
        ));

        assert!(matches!(
            service.create_contract(draft("owner", &["ghost"])).await,
            Err(EngineError::Validation { field: "participants", .. })
        ));
    }

    #[tokio::test]
    async fn pause_resume_round_trip() {
        let (service, store) = service();
        let contract = service.create_contract(draft("owner", &[])).await.unwrap();
        store
            .transition_status(
                &contract.id,
                ContractStatus::Draft,
                ContractStatus::PendingApproval,
                Utc::now(),
            )
            .await
            .unwrap();
        store
            .transition_status(
                &contract.id,
                ContractStatus::PendingApproval,
                ContractStatus::Active,
                Utc::now(),
            )
            .await
            .unwrap();

        let owner = UserId::new("owner");
        assert!(service.pause(&contract.id, &owner).await.unwrap());
        // Pausing twice is a lost race, not an error.
        assert!(!service.pause(&contract.id, &owner).await.unwrap());
        assert!(service.resume(&contract.id, &owner).await.unwrap());
        assert!(!service.resume(&contract.id, &owner).await.unwrap());
    }

    #[tokio::test]
    async fn delete_is_owner_only_and_state_guarded() {
        let (service, store) = service();
        let contract = service
            .create_contract(draft("owner", &["alex"]))
            .await
            .unwrap();

        assert!(matches!(
            service
                .delete_contract(&contract.id, &UserId::new("alex"))
                .await,
            Err(EngineError::Unauthorized)
        ));
        assert!(matches!(
            service
                .delete_contract(&contract.id, &UserId::new("stranger"))
                .await,
            Err(EngineError::NotFound)
        ));

        // Draft deletion cascades dependents, invitations included.
        store
            .insert_invitation(Invitation::new(
                contract.id.clone(),
                UserId::new("owner"),
                "guest@example.com",
                "code-a",
                Utc::now(),
                Duration::days(7),
            ))
            .await
            .unwrap();
        service
            .delete_contract(&contract.id, &UserId::new("owner"))
            .await
            .unwrap();
        assert!(store.get_contract(&contract.id).await.unwrap().is_none());
        assert!(store
            .list_collaborators(&contract.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn delete_blocked_mid_collaboration() {
        let (service, store) = service();
        let contract = service
            .create_contract(draft("owner", &["alex"]))
            .await
            .unwrap();
        store
            .transition_status(
                &contract.id,
                ContractStatus::Draft,
                ContractStatus::PendingApproval,
                Utc::now(),
            )
            .await
            .unwrap();

        assert!(matches!(
            service
                .delete_contract(&contract.id, &UserId::new("owner"))
                .await,
            Err(EngineError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn listings_split_owned_and_collaborating() {
        let (service, _store) = service();
        let contract = service
            .create_contract(draft("owner", &["alex"]))
            .await
            .unwrap();

        let owned = service.list_owned(&UserId::new("owner")).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].id, contract.id);

        let collaborating = service
            .list_collaborating(&UserId::new("alex"))
            .await
            .unwrap();
        assert_eq!(collaborating.len(), 1);
        assert_eq!(collaborating[0].id, contract.id);
        assert!(service
            .list_collaborating(&UserId::new("sam"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn mark_viewed_stamps_collaborator_row() {
        let (service, store) = service();
        let contract = service
            .create_contract(draft("owner", &["alex"]))
            .await
            .unwrap();
        let alex = UserId::new("alex");
        assert!(service.mark_viewed(&contract.id, &alex).await.unwrap());
        let row = store
            .get_collaborator(&contract.id, &alex)
            .await
            .unwrap()
            .unwrap();
        assert!(row.last_viewed_at.is_some());
    }
}
