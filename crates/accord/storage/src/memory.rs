//! In-memory reference implementation of the Accord storage traits.
//!
//! Deterministic and test-friendly. A single write guard over the whole
//! table set is the transaction boundary, so every mutating method is
//! atomic with respect to every other. Production deployments should use
//! the transactional PostgreSQL adapter.

use crate::traits::{AmendmentStore, CollaboratorStore, ContractStore, InvitationStore};
use crate::{StorageError, StorageResult};
use accord_types::{
    Amendment, AmendmentChanges, AmendmentId, AmendmentKind, AmendmentStatus, Collaborator,
    CollaboratorStatus, Contract, ContractId, ContractStatus, Invitation, InvitationId,
    InvitationStatus, PartyApproval, UserId, Verdict,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    contracts: HashMap<ContractId, Contract>,
    collaborators: HashMap<(ContractId, UserId), Collaborator>,
    invitations: HashMap<InvitationId, Invitation>,
    amendments: HashMap<AmendmentId, Amendment>,
}

/// In-memory Accord storage adapter.
#[derive(Default)]
pub struct InMemoryAccordStorage {
    inner: RwLock<Inner>,
}

impl InMemoryAccordStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| StorageError::Backend("storage lock poisoned".to_string()))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| StorageError::Backend("storage lock poisoned".to_string()))
    }
}

#[async_trait]
impl ContractStore for InMemoryAccordStorage {
    async fn create_contract(&self, contract: Contract) -> StorageResult<()> {
        let mut guard = self.write()?;
        if guard.contracts.contains_key(&contract.id) {
            return Err(StorageError::Conflict(format!(
                "contract {} already exists",
                contract.id
            )));
        }
        guard.contracts.insert(contract.id.clone(), contract);
        Ok(())
    }

    async fn get_contract(&self, id: &ContractId) -> StorageResult<Option<Contract>> {
        Ok(self.read()?.contracts.get(id).cloned())
    }

    async fn list_contracts_for_owner(&self, owner_id: &UserId) -> StorageResult<Vec<Contract>> {
        let guard = self.read()?;
        let mut values = guard
            .contracts
            .values()
            .filter(|c| &c.owner_id == owner_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(values)
    }

    async fn transition_status(
        &self,
        id: &ContractId,
        expected_from: ContractStatus,
        to: ContractStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut guard = self.write()?;
        let contract = guard
            .contracts
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("contract {} not found", id)))?;
        if contract.status != expected_from {
            return Ok(false);
        }
        contract.status = to;
        contract.updated_at = at;
        Ok(true)
    }

    async fn set_collaborative(&self, id: &ContractId, at: DateTime<Utc>) -> StorageResult<()> {
        let mut guard = self.write()?;
        let contract = guard
            .contracts
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("contract {} not found", id)))?;
        contract.is_collaborative = true;
        contract.updated_at = at;
        Ok(())
    }

    async fn apply_amendment_changes(
        &self,
        id: &ContractId,
        kind: AmendmentKind,
        changes: &AmendmentChanges,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut guard = self.write()?;
        let contract = guard
            .contracts
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("contract {} not found", id)))?;
        contract.apply_amendment(kind, changes, at);
        Ok(())
    }

    async fn delete_contract(&self, id: &ContractId) -> StorageResult<()> {
        let mut guard = self.write()?;
        if guard.contracts.remove(id).is_none() {
            return Err(StorageError::NotFound(format!("contract {} not found", id)));
        }
        guard.collaborators.retain(|(cid, _), _| cid != id);
        guard.invitations.retain(|_, inv| &inv.contract_id != id);
        guard.amendments.retain(|_, a| &a.contract_id != id);
        Ok(())
    }
}

#[async_trait]
impl CollaboratorStore for InMemoryAccordStorage {
    async fn insert_collaborator(&self, collaborator: Collaborator) -> StorageResult<()> {
        let mut guard = self.write()?;
        let key = (
            collaborator.contract_id.clone(),
            collaborator.user_id.clone(),
        );
        if guard.collaborators.contains_key(&key) {
            return Err(StorageError::Conflict(format!(
                "collaborator already exists for contract {} and user {}",
                collaborator.contract_id, collaborator.user_id
            )));
        }
        guard.collaborators.insert(key, collaborator);
        Ok(())
    }

    async fn get_collaborator(
        &self,
        contract_id: &ContractId,
        user_id: &UserId,
    ) -> StorageResult<Option<Collaborator>> {
        Ok(self
            .read()?
            .collaborators
            .get(&(contract_id.clone(), user_id.clone()))
            .cloned())
    }

    async fn list_collaborators(
        &self,
        contract_id: &ContractId,
    ) -> StorageResult<Vec<Collaborator>> {
        let guard = self.read()?;
        let mut values = guard
            .collaborators
            .values()
            .filter(|c| &c.contract_id == contract_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(values)
    }

    async fn list_collaborations_for_user(
        &self,
        user_id: &UserId,
    ) -> StorageResult<Vec<Collaborator>> {
        let guard = self.read()?;
        let mut values = guard
            .collaborators
            .values()
            .filter(|c| &c.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(values)
    }

    async fn resolve_consent(
        &self,
        contract_id: &ContractId,
        user_id: &UserId,
        verdict: Verdict,
        at: DateTime<Utc>,
        reason: Option<String>,
    ) -> StorageResult<bool> {
        let mut guard = self.write()?;
        let Some(row) = guard
            .collaborators
            .get_mut(&(contract_id.clone(), user_id.clone()))
        else {
            return Ok(false);
        };
        if row.status != CollaboratorStatus::Pending {
            return Ok(false);
        }
        match verdict {
            Verdict::Approved => {
                row.status = CollaboratorStatus::Approved;
                row.approved_at = Some(at);
            }
            Verdict::Rejected => {
                row.status = CollaboratorStatus::Rejected;
                row.rejected_at = Some(at);
                row.rejection_reason = reason;
            }
        }
        Ok(true)
    }

    async fn stamp_confirmed(
        &self,
        contract_id: &ContractId,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut guard = self.write()?;
        match guard
            .collaborators
            .get_mut(&(contract_id.clone(), user_id.clone()))
        {
            Some(row) => {
                row.confirmed_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn touch_last_viewed(
        &self,
        contract_id: &ContractId,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut guard = self.write()?;
        match guard
            .collaborators
            .get_mut(&(contract_id.clone(), user_id.clone()))
        {
            Some(row) => {
                row.last_viewed_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl InvitationStore for InMemoryAccordStorage {
    async fn insert_invitation(&self, invitation: Invitation) -> StorageResult<()> {
        let mut guard = self.write()?;
        let live_duplicate = guard.invitations.values().any(|i| {
            i.contract_id == invitation.contract_id
                && i.recipient_email == invitation.recipient_email
                && i.status.is_live()
        });
        if live_duplicate {
            return Err(StorageError::Conflict(format!(
                "live invitation already exists for contract {} and {}",
                invitation.contract_id, invitation.recipient_email
            )));
        }
        if guard.invitations.values().any(|i| i.code == invitation.code) {
            return Err(StorageError::Conflict(
                "invitation code collision".to_string(),
            ));
        }
        guard.invitations.insert(invitation.id.clone(), invitation);
        Ok(())
    }

    async fn get_invitation(&self, id: &InvitationId) -> StorageResult<Option<Invitation>> {
        Ok(self.read()?.invitations.get(id).cloned())
    }

    async fn find_invitation_by_code(&self, code: &str) -> StorageResult<Option<Invitation>> {
        Ok(self
            .read()?
            .invitations
            .values()
            .find(|i| i.code == code)
            .cloned())
    }

    async fn find_live_invitation(
        &self,
        contract_id: &ContractId,
        recipient_email: &str,
    ) -> StorageResult<Option<Invitation>> {
        Ok(self
            .read()?
            .invitations
            .values()
            .find(|i| {
                &i.contract_id == contract_id
                    && i.recipient_email == recipient_email
                    && i.status.is_live()
            })
            .cloned())
    }

    async fn list_invitations(&self, contract_id: &ContractId) -> StorageResult<Vec<Invitation>> {
        let guard = self.read()?;
        let mut values = guard
            .invitations
            .values()
            .filter(|i| &i.contract_id == contract_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(values)
    }

    async fn accept_invitation_if_pending(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Invitation>> {
        let mut guard = self.write()?;
        let Some(invitation) = guard.invitations.values_mut().find(|i| i.code == code) else {
            return Ok(None);
        };
        if invitation.status != InvitationStatus::Pending || invitation.is_expired(now) {
            return Ok(None);
        }
        invitation.status = InvitationStatus::Accepted;
        invitation.accepted_at = Some(now);
        Ok(Some(invitation.clone()))
    }

    async fn revoke_invitation_if_pending(
        &self,
        id: &InvitationId,
        _at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut guard = self.write()?;
        let Some(invitation) = guard.invitations.get_mut(id) else {
            return Ok(false);
        };
        if invitation.status != InvitationStatus::Pending {
            return Ok(false);
        }
        invitation.status = InvitationStatus::Revoked;
        Ok(true)
    }
}

#[async_trait]
impl AmendmentStore for InMemoryAccordStorage {
    async fn insert_amendment(&self, amendment: Amendment) -> StorageResult<()> {
        let mut guard = self.write()?;
        if guard.amendments.contains_key(&amendment.id) {
            return Err(StorageError::Conflict(format!(
                "amendment {} already exists",
                amendment.id
            )));
        }
        guard.amendments.insert(amendment.id.clone(), amendment);
        Ok(())
    }

    async fn get_amendment(&self, id: &AmendmentId) -> StorageResult<Option<Amendment>> {
        Ok(self.read()?.amendments.get(id).cloned())
    }

    async fn list_amendments(&self, contract_id: &ContractId) -> StorageResult<Vec<Amendment>> {
        let guard = self.read()?;
        let mut values = guard
            .amendments
            .values()
            .filter(|a| &a.contract_id == contract_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(values)
    }

    async fn count_approved_amendments(&self, contract_id: &ContractId) -> StorageResult<u32> {
        let guard = self.read()?;
        Ok(guard
            .amendments
            .values()
            .filter(|a| &a.contract_id == contract_id && a.status == AmendmentStatus::Approved)
            .count() as u32)
    }

    async fn record_party_approval(
        &self,
        id: &AmendmentId,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut guard = self.write()?;
        let Some(amendment) = guard.amendments.get_mut(id) else {
            return Ok(false);
        };
        if amendment.status != AmendmentStatus::Pending || amendment.has_approval_from(user_id) {
            return Ok(false);
        }
        amendment.approvals.push(PartyApproval {
            user_id: user_id.clone(),
            approved_at: at,
        });
        Ok(true)
    }

    async fn resolve_amendment(
        &self,
        id: &AmendmentId,
        verdict: Verdict,
        at: DateTime<Utc>,
        reason: Option<String>,
    ) -> StorageResult<bool> {
        let mut guard = self.write()?;
        let Some(amendment) = guard.amendments.get_mut(id) else {
            return Ok(false);
        };
        if amendment.status != AmendmentStatus::Pending {
            return Ok(false);
        }
        amendment.status = match verdict {
            Verdict::Approved => AmendmentStatus::Approved,
            Verdict::Rejected => AmendmentStatus::Rejected,
        };
        amendment.resolved_at = Some(at);
        if verdict == Verdict::Rejected {
            amendment.rejection_reason = reason;
        }
        Ok(true)
    }
}
