use crate::StorageResult;
use accord_types::{
    Amendment, AmendmentChanges, AmendmentId, AmendmentKind, Collaborator, Contract, ContractId,
    ContractStatus, Invitation, InvitationId, UserId, Verdict,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Storage interface for contract records.
#[async_trait]
pub trait ContractStore: Send + Sync {
    /// Insert a newly drafted contract.
    async fn create_contract(&self, contract: Contract) -> StorageResult<()>;

    /// Get one contract by id.
    async fn get_contract(&self, id: &ContractId) -> StorageResult<Option<Contract>>;

    /// List contracts owned by a user, newest-first.
    async fn list_contracts_for_owner(&self, owner_id: &UserId) -> StorageResult<Vec<Contract>>;

    /// Compare-and-set the contract status.
    ///
    /// Returns `Ok(false)` when the row exists but is no longer in
    /// `expected_from` (a concurrent caller won), `Err(NotFound)` when the
    /// row is absent.
    async fn transition_status(
        &self,
        id: &ContractId,
        expected_from: ContractStatus,
        to: ContractStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// Mark the contract collaborative. Idempotent.
    async fn set_collaborative(&self, id: &ContractId, at: DateTime<Utc>) -> StorageResult<()>;

    /// Apply an approved amendment's changes to the contract content fields.
    /// Never touches `status`.
    async fn apply_amendment_changes(
        &self,
        id: &ContractId,
        kind: AmendmentKind,
        changes: &AmendmentChanges,
        at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Delete a contract and cascade its collaborators, invitations, and
    /// amendments.
    async fn delete_contract(&self, id: &ContractId) -> StorageResult<()>;
}

/// Storage interface for collaborator rows.
#[async_trait]
pub trait CollaboratorStore: Send + Sync {
    /// Insert a collaborator row. `Conflict` when a row already exists for
    /// the (contract, user) pair.
    async fn insert_collaborator(&self, collaborator: Collaborator) -> StorageResult<()>;

    /// Point lookup by (contract, user).
    async fn get_collaborator(
        &self,
        contract_id: &ContractId,
        user_id: &UserId,
    ) -> StorageResult<Option<Collaborator>>;

    /// All collaborator rows for a contract, oldest-first.
    async fn list_collaborators(&self, contract_id: &ContractId)
        -> StorageResult<Vec<Collaborator>>;

    /// All collaborator rows held by one user across contracts, newest-first.
    async fn list_collaborations_for_user(
        &self,
        user_id: &UserId,
    ) -> StorageResult<Vec<Collaborator>>;

    /// Compare-and-set the caller's pending row to approved or rejected.
    ///
    /// Returns `Ok(false)` when the row is absent or already resolved. This
    /// is the no-double-count primitive: of N concurrent calls for the same
    /// slot exactly one returns `true`.
    async fn resolve_consent(
        &self,
        contract_id: &ContractId,
        user_id: &UserId,
        verdict: Verdict,
        at: DateTime<Utc>,
        reason: Option<String>,
    ) -> StorageResult<bool>;

    /// Stamp `confirmed_at` on the caller's row. Idempotent: a repeat call
    /// simply re-stamps. Returns `Ok(false)` only when the row is absent.
    async fn stamp_confirmed(
        &self,
        contract_id: &ContractId,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// Stamp `last_viewed_at` on the caller's row.
    async fn touch_last_viewed(
        &self,
        contract_id: &ContractId,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> StorageResult<bool>;
}

/// Storage interface for invitations.
#[async_trait]
pub trait InvitationStore: Send + Sync {
    /// Insert an invitation. `Conflict` when a live (pending or accepted)
    /// invitation already targets the same (contract, email) pair, or on a
    /// code collision.
    async fn insert_invitation(&self, invitation: Invitation) -> StorageResult<()>;

    /// Get one invitation by id.
    async fn get_invitation(&self, id: &InvitationId) -> StorageResult<Option<Invitation>>;

    /// Look up an invitation by its acceptance code.
    async fn find_invitation_by_code(&self, code: &str) -> StorageResult<Option<Invitation>>;

    /// Find the live invitation for a (contract, lowercased email) pair.
    async fn find_live_invitation(
        &self,
        contract_id: &ContractId,
        recipient_email: &str,
    ) -> StorageResult<Option<Invitation>>;

    /// All invitations for a contract, oldest-first.
    async fn list_invitations(&self, contract_id: &ContractId) -> StorageResult<Vec<Invitation>>;

    /// Compare-and-set acceptance: flips the invitation to accepted iff it
    /// is still pending and unexpired at `now`, returning the accepted
    /// snapshot. `Ok(None)` for unknown, resolved, revoked, or expired
    /// codes. This is the invitation-single-shot primitive.
    async fn accept_invitation_if_pending(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Invitation>>;

    /// Compare-and-set revocation of a still-pending invitation.
    async fn revoke_invitation_if_pending(
        &self,
        id: &InvitationId,
        at: DateTime<Utc>,
    ) -> StorageResult<bool>;
}

/// Storage interface for amendments.
#[async_trait]
pub trait AmendmentStore: Send + Sync {
    /// Insert a newly proposed amendment.
    async fn insert_amendment(&self, amendment: Amendment) -> StorageResult<()>;

    /// Get one amendment by id.
    async fn get_amendment(&self, id: &AmendmentId) -> StorageResult<Option<Amendment>>;

    /// All amendments for a contract, oldest-first.
    async fn list_amendments(&self, contract_id: &ContractId) -> StorageResult<Vec<Amendment>>;

    /// Number of amendments approved over the contract's lifetime.
    async fn count_approved_amendments(&self, contract_id: &ContractId) -> StorageResult<u32>;

    /// Record one party's approval. Returns `Ok(false)` when the amendment
    /// is no longer pending or the party already approved (double-submit).
    async fn record_party_approval(
        &self,
        id: &AmendmentId,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// Compare-and-set a pending amendment to approved or rejected.
    async fn resolve_amendment(
        &self,
        id: &AmendmentId,
        verdict: Verdict,
        at: DateTime<Utc>,
        reason: Option<String>,
    ) -> StorageResult<bool>;
}

/// Unified storage bundle used by the Accord engine.
pub trait AccordStorage:
    ContractStore + CollaboratorStore + InvitationStore + AmendmentStore + Send + Sync
{
}

impl<T> AccordStorage for T where
    T: ContractStore + CollaboratorStore + InvitationStore + AmendmentStore + Send + Sync
{
}
