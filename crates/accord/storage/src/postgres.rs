//! PostgreSQL adapter for Accord storage.
//!
//! The transactional source-of-truth backend. Every compare-and-set method
//! embeds its expected-prior-state predicate in the `UPDATE` statement that
//! performs the write; methods that must touch more than one row run inside
//! an explicit transaction with `FOR UPDATE` row locks. Uniqueness rules
//! (collaborator pair, live invitation per email, invitation code) live in
//! the schema so concurrent inserts are arbitrated by the database.

use crate::traits::{AmendmentStore, CollaboratorStore, ContractStore, InvitationStore};
use crate::{StorageError, StorageResult};
use accord_types::{
    Act, Amendment, AmendmentChanges, AmendmentId, AmendmentKind, AmendmentStatus, Collaborator,
    CollaboratorId, CollaboratorRole, CollaboratorStatus, ConsentMethod, Contract, ContractId,
    ContractStatus, Invitation, InvitationId, InvitationStatus, PartyApproval, UserId, Verdict,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

/// PostgreSQL-backed Accord storage adapter.
#[derive(Clone)]
pub struct PostgresAccordStorage {
    pool: PgPool,
}

impl PostgresAccordStorage {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS accord_contracts (
                contract_id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                status TEXT NOT NULL,
                is_collaborative BOOLEAN NOT NULL,
                method TEXT NOT NULL,
                encounter_type TEXT NOT NULL,
                parties JSONB NOT NULL,
                acts JSONB NOT NULL,
                start_time TIMESTAMPTZ NOT NULL,
                duration_minutes BIGINT NOT NULL,
                end_time TIMESTAMPTZ NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS accord_collaborators (
                collaborator_id TEXT PRIMARY KEY,
                contract_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                status TEXT NOT NULL,
                approved_at TIMESTAMPTZ,
                rejected_at TIMESTAMPTZ,
                rejection_reason TEXT,
                confirmed_at TIMESTAMPTZ,
                last_viewed_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                UNIQUE (contract_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS accord_invitations (
                invitation_id TEXT PRIMARY KEY,
                contract_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                recipient_email TEXT NOT NULL,
                code TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL,
                accepted_at TIMESTAMPTZ
            )
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS accord_invitations_live
                ON accord_invitations (contract_id, recipient_email)
                WHERE status IN ('pending', 'accepted')
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS accord_amendments (
                amendment_id TEXT PRIMARY KEY,
                contract_id TEXT NOT NULL,
                requested_by TEXT NOT NULL,
                kind TEXT NOT NULL,
                changes JSONB NOT NULL,
                reason TEXT NOT NULL,
                status TEXT NOT NULL,
                approvals JSONB NOT NULL,
                resolved_at TIMESTAMPTZ,
                rejection_reason TEXT,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ContractStore for PostgresAccordStorage {
    async fn create_contract(&self, contract: Contract) -> StorageResult<()> {
        let parties = serde_json::to_value(&contract.parties)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let acts = serde_json::to_value(&contract.acts)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO accord_contracts
                (contract_id, owner_id, status, is_collaborative, method, encounter_type,
                 parties, acts, start_time, duration_minutes, end_time, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(contract.id.0.clone())
        .bind(contract.owner_id.0.clone())
        .bind(contract_status_to_str(contract.status))
        .bind(contract.is_collaborative)
        .bind(consent_method_to_str(contract.method))
        .bind(contract.encounter_type.clone())
        .bind(parties)
        .bind(acts)
        .bind(contract.start_time)
        .bind(contract.duration_minutes)
        .bind(contract.end_time)
        .bind(contract.created_at)
        .bind(contract.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        Ok(())
    }

    async fn get_contract(&self, id: &ContractId) -> StorageResult<Option<Contract>> {
        let row = sqlx::query(
            r#"
            SELECT contract_id, owner_id, status, is_collaborative, method, encounter_type,
                   parties, acts, start_time, duration_minutes, end_time, created_at, updated_at
              FROM accord_contracts
             WHERE contract_id = $1
            "#,
        )
        .bind(id.0.clone())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(contract_row_to_record).transpose()
    }

    async fn list_contracts_for_owner(&self, owner_id: &UserId) -> StorageResult<Vec<Contract>> {
        let rows = sqlx::query(
            r#"
            SELECT contract_id, owner_id, status, is_collaborative, method, encounter_type,
                   parties, acts, start_time, duration_minutes, end_time, created_at, updated_at
              FROM accord_contracts
             WHERE owner_id = $1
             ORDER BY created_at DESC
            "#,
        )
        .bind(owner_id.0.clone())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(contract_row_to_record).collect()
    }

    async fn transition_status(
        &self,
        id: &ContractId,
        expected_from: ContractStatus,
        to: ContractStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE accord_contracts
               SET status = $1, updated_at = $2
             WHERE contract_id = $3
               AND status = $4
            "#,
        )
        .bind(contract_status_to_str(to))
        .bind(at)
        .bind(id.0.clone())
        .bind(contract_status_to_str(expected_from))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            let exists = self.get_contract(id).await?.is_some();
            if exists {
                return Ok(false);
            }
            return Err(StorageError::NotFound(format!("contract {} not found", id)));
        }
        Ok(true)
    }

    async fn set_collaborative(&self, id: &ContractId, at: DateTime<Utc>) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE accord_contracts
               SET is_collaborative = TRUE, updated_at = $1
             WHERE contract_id = $2
            "#,
        )
        .bind(at)
        .bind(id.0.clone())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("contract {} not found", id)));
        }
        Ok(())
    }

    async fn apply_amendment_changes(
        &self,
        id: &ContractId,
        kind: AmendmentKind,
        changes: &AmendmentChanges,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let row = sqlx::query(
            r#"
            SELECT contract_id, owner_id, status, is_collaborative, method, encounter_type,
                   parties, acts, start_time, duration_minutes, end_time, created_at, updated_at
              FROM accord_contracts
             WHERE contract_id = $1
               FOR UPDATE
            "#,
        )
        .bind(id.0.clone())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .ok_or_else(|| StorageError::NotFound(format!("contract {} not found", id)))?;

        let mut contract = contract_row_to_record(row)?;
        contract.apply_amendment(kind, changes, at);

        let acts = serde_json::to_value(&contract.acts)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        sqlx::query(
            r#"
            UPDATE accord_contracts
               SET acts = $1, duration_minutes = $2, end_time = $3, updated_at = $4
             WHERE contract_id = $5
            "#,
        )
        .bind(acts)
        .bind(contract.duration_minutes)
        .bind(contract.end_time)
        .bind(contract.updated_at)
        .bind(id.0.clone())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete_contract(&self, id: &ContractId) -> StorageResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        for stmt in [
            "DELETE FROM accord_collaborators WHERE contract_id = $1",
            "DELETE FROM accord_invitations WHERE contract_id = $1",
            "DELETE FROM accord_amendments WHERE contract_id = $1",
        ] {
            sqlx::query(stmt)
                .bind(id.0.clone())
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }

        let result = sqlx::query("DELETE FROM accord_contracts WHERE contract_id = $1")
            .bind(id.0.clone())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("contract {} not found", id)));
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl CollaboratorStore for PostgresAccordStorage {
    async fn insert_collaborator(&self, collaborator: Collaborator) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO accord_collaborators
                (collaborator_id, contract_id, user_id, role, status, approved_at, rejected_at,
                 rejection_reason, confirmed_at, last_viewed_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(collaborator.id.0.clone())
        .bind(collaborator.contract_id.0.clone())
        .bind(collaborator.user_id.0.clone())
        .bind(collaborator_role_to_str(collaborator.role))
        .bind(collaborator_status_to_str(collaborator.status))
        .bind(collaborator.approved_at)
        .bind(collaborator.rejected_at)
        .bind(collaborator.rejection_reason.clone())
        .bind(collaborator.confirmed_at)
        .bind(collaborator.last_viewed_at)
        .bind(collaborator.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        Ok(())
    }

    async fn get_collaborator(
        &self,
        contract_id: &ContractId,
        user_id: &UserId,
    ) -> StorageResult<Option<Collaborator>> {
        let row = sqlx::query(
            r#"
            SELECT collaborator_id, contract_id, user_id, role, status, approved_at, rejected_at,
                   rejection_reason, confirmed_at, last_viewed_at, created_at
              FROM accord_collaborators
             WHERE contract_id = $1 AND user_id = $2
            "#,
        )
        .bind(contract_id.0.clone())
        .bind(user_id.0.clone())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(collaborator_row_to_record).transpose()
    }

    async fn list_collaborators(
        &self,
        contract_id: &ContractId,
    ) -> StorageResult<Vec<Collaborator>> {
        let rows = sqlx::query(
            r#"
            SELECT collaborator_id, contract_id, user_id, role, status, approved_at, rejected_at,
                   rejection_reason, confirmed_at, last_viewed_at, created_at
              FROM accord_collaborators
             WHERE contract_id = $1
             ORDER BY created_at ASC
            "#,
        )
        .bind(contract_id.0.clone())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(collaborator_row_to_record).collect()
    }

    async fn list_collaborations_for_user(
        &self,
        user_id: &UserId,
    ) -> StorageResult<Vec<Collaborator>> {
        let rows = sqlx::query(
            r#"
            SELECT collaborator_id, contract_id, user_id, role, status, approved_at, rejected_at,
                   rejection_reason, confirmed_at, last_viewed_at, created_at
              FROM accord_collaborators
             WHERE user_id = $1
             ORDER BY created_at DESC
            "#,
        )
        .bind(user_id.0.clone())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(collaborator_row_to_record).collect()
    }

    async fn resolve_consent(
        &self,
        contract_id: &ContractId,
        user_id: &UserId,
        verdict: Verdict,
        at: DateTime<Utc>,
        reason: Option<String>,
    ) -> StorageResult<bool> {
        let status = match verdict {
            Verdict::Approved => "approved",
            Verdict::Rejected => "rejected",
        };
        let result = sqlx::query(
            r#"
            UPDATE accord_collaborators
               SET status = $1,
                   approved_at = CASE WHEN $1 = 'approved' THEN $2 ELSE approved_at END,
                   rejected_at = CASE WHEN $1 = 'rejected' THEN $2 ELSE rejected_at END,
                   rejection_reason = CASE WHEN $1 = 'rejected' THEN $3 ELSE rejection_reason END
             WHERE contract_id = $4
               AND user_id = $5
               AND status = 'pending'
            "#,
        )
        .bind(status)
        .bind(at)
        .bind(reason)
        .bind(contract_id.0.clone())
        .bind(user_id.0.clone())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn stamp_confirmed(
        &self,
        contract_id: &ContractId,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE accord_collaborators
               SET confirmed_at = $1
             WHERE contract_id = $2 AND user_id = $3
            "#,
        )
        .bind(at)
        .bind(contract_id.0.clone())
        .bind(user_id.0.clone())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_viewed(
        &self,
        contract_id: &ContractId,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE accord_collaborators
               SET last_viewed_at = $1
             WHERE contract_id = $2 AND user_id = $3
            "#,
        )
        .bind(at)
        .bind(contract_id.0.clone())
        .bind(user_id.0.clone())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl InvitationStore for PostgresAccordStorage {
    async fn insert_invitation(&self, invitation: Invitation) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO accord_invitations
                (invitation_id, contract_id, sender_id, recipient_email, code, status,
                 created_at, expires_at, accepted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(invitation.id.0.clone())
        .bind(invitation.contract_id.0.clone())
        .bind(invitation.sender_id.0.clone())
        .bind(invitation.recipient_email.clone())
        .bind(invitation.code.clone())
        .bind(invitation_status_to_str(invitation.status))
        .bind(invitation.created_at)
        .bind(invitation.expires_at)
        .bind(invitation.accepted_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        Ok(())
    }

    async fn get_invitation(&self, id: &InvitationId) -> StorageResult<Option<Invitation>> {
        let row = sqlx::query(
            r#"
            SELECT invitation_id, contract_id, sender_id, recipient_email, code, status,
                   created_at, expires_at, accepted_at
              FROM accord_invitations
             WHERE invitation_id = $1
            "#,
        )
        .bind(id.0.clone())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(invitation_row_to_record).transpose()
    }

    async fn find_invitation_by_code(&self, code: &str) -> StorageResult<Option<Invitation>> {
        let row = sqlx::query(
            r#"
            SELECT invitation_id, contract_id, sender_id, recipient_email, code, status,
                   created_at, expires_at, accepted_at
              FROM accord_invitations
             WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(invitation_row_to_record).transpose()
    }

    async fn find_live_invitation(
        &self,
        contract_id: &ContractId,
        recipient_email: &str,
    ) -> StorageResult<Option<Invitation>> {
        let row = sqlx::query(
            r#"
            SELECT invitation_id, contract_id, sender_id, recipient_email, code, status,
                   created_at, expires_at, accepted_at
              FROM accord_invitations
             WHERE contract_id = $1
               AND recipient_email = $2
               AND status IN ('pending', 'accepted')
            "#,
        )
        .bind(contract_id.0.clone())
        .bind(recipient_email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(invitation_row_to_record).transpose()
    }

    async fn list_invitations(&self, contract_id: &ContractId) -> StorageResult<Vec<Invitation>> {
        let rows = sqlx::query(
            r#"
            SELECT invitation_id, contract_id, sender_id, recipient_email, code, status,
                   created_at, expires_at, accepted_at
              FROM accord_invitations
             WHERE contract_id = $1
             ORDER BY created_at ASC
            "#,
        )
        .bind(contract_id.0.clone())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(invitation_row_to_record).collect()
    }

    async fn accept_invitation_if_pending(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Invitation>> {
        let row = sqlx::query(
            r#"
            UPDATE accord_invitations
               SET status = 'accepted', accepted_at = $2
             WHERE code = $1
               AND status = 'pending'
               AND expires_at > $2
            RETURNING invitation_id, contract_id, sender_id, recipient_email, code, status,
                      created_at, expires_at, accepted_at
            "#,
        )
        .bind(code)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(invitation_row_to_record).transpose()
    }

    async fn revoke_invitation_if_pending(
        &self,
        id: &InvitationId,
        _at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE accord_invitations
               SET status = 'revoked'
             WHERE invitation_id = $1
               AND status = 'pending'
            "#,
        )
        .bind(id.0.clone())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AmendmentStore for PostgresAccordStorage {
    async fn insert_amendment(&self, amendment: Amendment) -> StorageResult<()> {
        let changes = serde_json::to_value(&amendment.changes)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let approvals = serde_json::to_value(&amendment.approvals)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO accord_amendments
                (amendment_id, contract_id, requested_by, kind, changes, reason, status,
                 approvals, resolved_at, rejection_reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(amendment.id.0.clone())
        .bind(amendment.contract_id.0.clone())
        .bind(amendment.requested_by.0.clone())
        .bind(amendment_kind_to_str(amendment.kind))
        .bind(changes)
        .bind(amendment.reason.clone())
        .bind(amendment_status_to_str(amendment.status))
        .bind(approvals)
        .bind(amendment.resolved_at)
        .bind(amendment.rejection_reason.clone())
        .bind(amendment.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        Ok(())
    }

    async fn get_amendment(&self, id: &AmendmentId) -> StorageResult<Option<Amendment>> {
        let row = sqlx::query(
            r#"
            SELECT amendment_id, contract_id, requested_by, kind, changes, reason, status,
                   approvals, resolved_at, rejection_reason, created_at
              FROM accord_amendments
             WHERE amendment_id = $1
            "#,
        )
        .bind(id.0.clone())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(amendment_row_to_record).transpose()
    }

    async fn list_amendments(&self, contract_id: &ContractId) -> StorageResult<Vec<Amendment>> {
        let rows = sqlx::query(
            r#"
            SELECT amendment_id, contract_id, requested_by, kind, changes, reason, status,
                   approvals, resolved_at, rejection_reason, created_at
              FROM accord_amendments
             WHERE contract_id = $1
             ORDER BY created_at ASC
            "#,
        )
        .bind(contract_id.0.clone())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(amendment_row_to_record).collect()
    }

    async fn count_approved_amendments(&self, contract_id: &ContractId) -> StorageResult<u32> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS approved
              FROM accord_amendments
             WHERE contract_id = $1 AND status = 'approved'
            "#,
        )
        .bind(contract_id.0.clone())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let count: i64 = row
            .try_get("approved")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(count as u32)
    }

    async fn record_party_approval(
        &self,
        id: &AmendmentId,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let row = sqlx::query(
            r#"
            SELECT approvals
              FROM accord_amendments
             WHERE amendment_id = $1
               AND status = 'pending'
               FOR UPDATE
            "#,
        )
        .bind(id.0.clone())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let Some(row) = row else {
            return Ok(false);
        };

        let approvals_json: serde_json::Value = row
            .try_get("approvals")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let mut approvals: Vec<PartyApproval> = serde_json::from_value(approvals_json)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        if approvals.iter().any(|a| &a.user_id == user_id) {
            return Ok(false);
        }
        approvals.push(PartyApproval {
            user_id: user_id.clone(),
            approved_at: at,
        });
        let approvals = serde_json::to_value(&approvals)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        sqlx::query("UPDATE accord_amendments SET approvals = $1 WHERE amendment_id = $2")
            .bind(approvals)
            .bind(id.0.clone())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(true)
    }

    async fn resolve_amendment(
        &self,
        id: &AmendmentId,
        verdict: Verdict,
        at: DateTime<Utc>,
        reason: Option<String>,
    ) -> StorageResult<bool> {
        let status = match verdict {
            Verdict::Approved => "approved",
            Verdict::Rejected => "rejected",
        };
        let result = sqlx::query(
            r#"
            UPDATE accord_amendments
               SET status = $1,
                   resolved_at = $2,
                   rejection_reason = CASE WHEN $1 = 'rejected' THEN $3 ELSE rejection_reason END
             WHERE amendment_id = $4
               AND status = 'pending'
            "#,
        )
        .bind(status)
        .bind(at)
        .bind(reason)
        .bind(id.0.clone())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

fn contract_row_to_record(row: sqlx::postgres::PgRow) -> StorageResult<Contract> {
    let parties_json: serde_json::Value = row
        .try_get("parties")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let parties: Vec<String> = serde_json::from_value(parties_json)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let acts_json: serde_json::Value = row
        .try_get("acts")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let acts: Vec<Act> = serde_json::from_value(acts_json)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    let status: String = row
        .try_get("status")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let method: String = row
        .try_get("method")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(Contract {
        id: ContractId::new(
            row.try_get::<String, _>("contract_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        owner_id: UserId::new(
            row.try_get::<String, _>("owner_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        status: parse_contract_status(&status)?,
        is_collaborative: row
            .try_get("is_collaborative")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        method: parse_consent_method(&method)?,
        encounter_type: row
            .try_get("encounter_type")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        parties,
        acts,
        start_time: row
            .try_get("start_time")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        duration_minutes: row
            .try_get("duration_minutes")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        end_time: row
            .try_get("end_time")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn collaborator_row_to_record(row: sqlx::postgres::PgRow) -> StorageResult<Collaborator> {
    let role: String = row
        .try_get("role")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(Collaborator {
        id: CollaboratorId::new(
            row.try_get::<String, _>("collaborator_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        contract_id: ContractId::new(
            row.try_get::<String, _>("contract_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        user_id: UserId::new(
            row.try_get::<String, _>("user_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        role: parse_collaborator_role(&role)?,
        status: parse_collaborator_status(&status)?,
        approved_at: row
            .try_get("approved_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        rejected_at: row
            .try_get("rejected_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        rejection_reason: row
            .try_get("rejection_reason")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        confirmed_at: row
            .try_get("confirmed_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        last_viewed_at: row
            .try_get("last_viewed_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn invitation_row_to_record(row: sqlx::postgres::PgRow) -> StorageResult<Invitation> {
    let status: String = row
        .try_get("status")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(Invitation {
        id: InvitationId::new(
            row.try_get::<String, _>("invitation_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        contract_id: ContractId::new(
            row.try_get::<String, _>("contract_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        sender_id: UserId::new(
            row.try_get::<String, _>("sender_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        recipient_email: row
            .try_get("recipient_email")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        code: row
            .try_get("code")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        status: parse_invitation_status(&status)?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        expires_at: row
            .try_get("expires_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        accepted_at: row
            .try_get("accepted_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn amendment_row_to_record(row: sqlx::postgres::PgRow) -> StorageResult<Amendment> {
    let changes_json: serde_json::Value = row
        .try_get("changes")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let changes: AmendmentChanges = serde_json::from_value(changes_json)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let approvals_json: serde_json::Value = row
        .try_get("approvals")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let approvals: Vec<PartyApproval> = serde_json::from_value(approvals_json)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    let kind: String = row
        .try_get("kind")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(Amendment {
        id: AmendmentId::new(
            row.try_get::<String, _>("amendment_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        contract_id: ContractId::new(
            row.try_get::<String, _>("contract_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        requested_by: UserId::new(
            row.try_get::<String, _>("requested_by")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        kind: parse_amendment_kind(&kind)?,
        changes,
        reason: row
            .try_get("reason")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        status: parse_amendment_status(&status)?,
        approvals,
        resolved_at: row
            .try_get("resolved_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        rejection_reason: row
            .try_get("rejection_reason")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn contract_status_to_str(status: ContractStatus) -> &'static str {
    match status {
        ContractStatus::Draft => "draft",
        ContractStatus::PendingApproval => "pending_approval",
        ContractStatus::Active => "active",
        ContractStatus::Paused => "paused",
        ContractStatus::Rejected => "rejected",
        ContractStatus::Completed => "completed",
    }
}

fn parse_contract_status(raw: &str) -> StorageResult<ContractStatus> {
    match raw {
        "draft" => Ok(ContractStatus::Draft),
        "pending_approval" => Ok(ContractStatus::PendingApproval),
        "active" => Ok(ContractStatus::Active),
        "paused" => Ok(ContractStatus::Paused),
        "rejected" => Ok(ContractStatus::Rejected),
        "completed" => Ok(ContractStatus::Completed),
        _ => Err(StorageError::Serialization(format!(
            "unknown contract status `{raw}`"
        ))),
    }
}

fn consent_method_to_str(method: ConsentMethod) -> &'static str {
    match method {
        ConsentMethod::Signature => "signature",
        ConsentMethod::Voice => "voice",
        ConsentMethod::Photo => "photo",
        ConsentMethod::Biometric => "biometric",
    }
}

fn parse_consent_method(raw: &str) -> StorageResult<ConsentMethod> {
    match raw {
        "signature" => Ok(ConsentMethod::Signature),
        "voice" => Ok(ConsentMethod::Voice),
        "photo" => Ok(ConsentMethod::Photo),
        "biometric" => Ok(ConsentMethod::Biometric),
        _ => Err(StorageError::Serialization(format!(
            "unknown consent method `{raw}`"
        ))),
    }
}

fn collaborator_role_to_str(role: CollaboratorRole) -> &'static str {
    match role {
        CollaboratorRole::Initiator => "initiator",
        CollaboratorRole::Recipient => "recipient",
    }
}

fn parse_collaborator_role(raw: &str) -> StorageResult<CollaboratorRole> {
    match raw {
        "initiator" => Ok(CollaboratorRole::Initiator),
        "recipient" => Ok(CollaboratorRole::Recipient),
        _ => Err(StorageError::Serialization(format!(
            "unknown collaborator role `{raw}`"
        ))),
    }
}

fn collaborator_status_to_str(status: CollaboratorStatus) -> &'static str {
    match status {
        CollaboratorStatus::Pending => "pending",
        CollaboratorStatus::Approved => "approved",
        CollaboratorStatus::Rejected => "rejected",
    }
}

fn parse_collaborator_status(raw: &str) -> StorageResult<CollaboratorStatus> {
    match raw {
        "pending" => Ok(CollaboratorStatus::Pending),
        "approved" => Ok(CollaboratorStatus::Approved),
        "rejected" => Ok(CollaboratorStatus::Rejected),
        _ => Err(StorageError::Serialization(format!(
            "unknown collaborator status `{raw}`"
        ))),
    }
}

fn invitation_status_to_str(status: InvitationStatus) -> &'static str {
    match status {
        InvitationStatus::Pending => "pending",
        InvitationStatus::Accepted => "accepted",
        InvitationStatus::Revoked => "revoked",
    }
}

fn parse_invitation_status(raw: &str) -> StorageResult<InvitationStatus> {
    match raw {
        "pending" => Ok(InvitationStatus::Pending),
        "accepted" => Ok(InvitationStatus::Accepted),
        "revoked" => Ok(InvitationStatus::Revoked),
        _ => Err(StorageError::Serialization(format!(
            "unknown invitation status `{raw}`"
        ))),
    }
}

fn amendment_kind_to_str(kind: AmendmentKind) -> &'static str {
    match kind {
        AmendmentKind::AddActs => "add_acts",
        AmendmentKind::RemoveActs => "remove_acts",
        AmendmentKind::ExtendDuration => "extend_duration",
        AmendmentKind::ShortenDuration => "shorten_duration",
    }
}

fn parse_amendment_kind(raw: &str) -> StorageResult<AmendmentKind> {
    match raw {
        "add_acts" => Ok(AmendmentKind::AddActs),
        "remove_acts" => Ok(AmendmentKind::RemoveActs),
        "extend_duration" => Ok(AmendmentKind::ExtendDuration),
        "shorten_duration" => Ok(AmendmentKind::ShortenDuration),
        _ => Err(StorageError::Serialization(format!(
            "unknown amendment kind `{raw}`"
        ))),
    }
}

fn amendment_status_to_str(status: AmendmentStatus) -> &'static str {
    match status {
        AmendmentStatus::Pending => "pending",
        AmendmentStatus::Approved => "approved",
        AmendmentStatus::Rejected => "rejected",
    }
}

fn parse_amendment_status(raw: &str) -> StorageResult<AmendmentStatus> {
    match raw {
        "pending" => Ok(AmendmentStatus::Pending),
        "approved" => Ok(AmendmentStatus::Approved),
        "rejected" => Ok(AmendmentStatus::Rejected),
        _ => Err(StorageError::Serialization(format!(
            "unknown amendment status `{raw}`"
        ))),
    }
}

fn map_sqlx_conflict(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StorageError::Conflict(db_err.message().to_string());
        }
    }
    StorageError::Backend(err.to_string())
}
