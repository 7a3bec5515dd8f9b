//! Collaborators: one party's membership and consent state on one contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContractId, UserId};

/// Unique identifier for a collaborator row
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollaboratorId(pub String);

impl CollaboratorId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for CollaboratorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaboratorRole {
    /// The drafter; their row is created eagerly as already-approved
    Initiator,
    /// An invited counterparty
    Recipient,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CollaboratorStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl CollaboratorStatus {
    /// A resolved row can never be resolved again.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One party's relationship to one contract. Unique on (contract, user).
///
/// `status` and `confirmed_at` are independent signals: the approval gate
/// drives `status`, the confirmation gate drives `confirmed_at`. A
/// collaborator can be approved without being confirmed and vice versa.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Collaborator {
    pub id: CollaboratorId,
    pub contract_id: ContractId,
    pub user_id: UserId,
    pub role: CollaboratorRole,
    pub status: CollaboratorStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_viewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Collaborator {
    /// The drafter's row, created at share time with consent already given.
    pub fn initiator(contract_id: ContractId, user_id: UserId, at: DateTime<Utc>) -> Self {
        Self {
            id: CollaboratorId::generate(),
            contract_id,
            user_id,
            role: CollaboratorRole::Initiator,
            status: CollaboratorStatus::Approved,
            approved_at: Some(at),
            rejected_at: None,
            rejection_reason: None,
            confirmed_at: None,
            last_viewed_at: None,
            created_at: at,
        }
    }

    /// A counterparty's row, created pending their approval.
    pub fn recipient(contract_id: ContractId, user_id: UserId, at: DateTime<Utc>) -> Self {
        Self {
            id: CollaboratorId::generate(),
            contract_id,
            user_id,
            role: CollaboratorRole::Recipient,
            status: CollaboratorStatus::Pending,
            approved_at: None,
            rejected_at: None,
            rejection_reason: None,
            confirmed_at: None,
            last_viewed_at: None,
            created_at: at,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == CollaboratorStatus::Approved
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiator_is_pre_approved() {
        let row = Collaborator::initiator(
            ContractId::new("c-1"),
            UserId::new("owner"),
            Utc::now(),
        );
        assert_eq!(row.role, CollaboratorRole::Initiator);
        assert!(row.is_approved());
        assert!(row.approved_at.is_some());
        assert!(!row.is_confirmed());
    }

    #[test]
    fn test_recipient_starts_pending() {
        let row = Collaborator::recipient(
            ContractId::new("c-1"),
            UserId::new("guest"),
            Utc::now(),
        );
        assert_eq!(row.status, CollaboratorStatus::Pending);
        assert!(row.approved_at.is_none());
        assert!(!row.status.is_resolved());
    }

    #[test]
    fn test_resolved_statuses() {
        assert!(CollaboratorStatus::Approved.is_resolved());
        assert!(CollaboratorStatus::Rejected.is_resolved());
        assert!(!CollaboratorStatus::Pending.is_resolved());
    }
}
