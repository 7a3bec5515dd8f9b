//! Access control: the single predicate gating every mutating operation.

use crate::{EngineError, EngineResult};
use accord_storage::{CollaboratorStore, ContractStore};
use accord_types::{Contract, ContractId, UserId};
use std::sync::Arc;

/// Answers "does this user have access to this contract": the owner or any
/// collaborator does, nobody else. Two point lookups, never a scan.
pub struct AccessResolver<S> {
    store: Arc<S>,
}

impl<S> AccessResolver<S>
where
    S: ContractStore + CollaboratorStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn has_access(
        &self,
        contract_id: &ContractId,
        user_id: &UserId,
    ) -> EngineResult<bool> {
        let Some(contract) = self.store.get_contract(contract_id).await? else {
            return Ok(false);
        };
        if &contract.owner_id == user_id {
            return Ok(true);
        }
        Ok(self
            .store
            .get_collaborator(contract_id, user_id)
            .await?
            .is_some())
    }

    /// Load the contract on the caller's behalf, collapsing "no such
    /// contract" and "no relationship to it" into the same `NotFound`.
    pub async fn require_access(
        &self,
        contract_id: &ContractId,
        user_id: &UserId,
    ) -> EngineResult<Contract> {
        let Some(contract) = self.store.get_contract(contract_id).await? else {
            return Err(EngineError::NotFound);
        };
        if &contract.owner_id == user_id {
            return Ok(contract);
        }
        if self
            .store
            .get_collaborator(contract_id, user_id)
            .await?
            .is_some()
        {
            return Ok(contract);
        }
        Err(EngineError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_storage::memory::InMemoryAccordStorage;
    use accord_types::{Act, Collaborator, ConsentMethod, Contract};
    use chrono::Utc;

    async fn make_store() -> (Arc<InMemoryAccordStorage>, ContractId) {
        let store = Arc::new(InMemoryAccordStorage::new());
        let contract = Contract::new(
            UserId::new("owner"),
            ConsentMethod::Signature,
            "date",
            vec![Act::Kissing],
            Utc::now(),
            60,
        );
        let id = contract.id.clone();
        store.create_contract(contract).await.unwrap();
        store
            .insert_collaborator(Collaborator::recipient(
                id.clone(),
                UserId::new("guest"),
                Utc::now(),
            ))
            .await
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn owner_and_collaborator_have_access() {
        let (store, id) = make_store().await;
        let access = AccessResolver::new(store);
        assert!(access.has_access(&id, &UserId::new("owner")).await.unwrap());
        assert!(access.has_access(&id, &UserId::new("guest")).await.unwrap());
        assert!(!access
            .has_access(&id, &UserId::new("stranger"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn stranger_and_missing_contract_are_indistinguishable() {
        let (store, id) = make_store().await;
        let access = AccessResolver::new(store);

        let stranger = access
            .require_access(&id, &UserId::new("stranger"))
            .await
            .unwrap_err();
        let missing = access
            .require_access(&ContractId::new("no-such"), &UserId::new("stranger"))
            .await
            .unwrap_err();
        assert!(matches!(stranger, EngineError::NotFound));
        assert!(matches!(missing, EngineError::NotFound));
    }
}
