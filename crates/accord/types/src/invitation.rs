//! Invitations: time-boxed offers for email-identified parties to join.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContractId, UserId};

/// Unique identifier for an invitation
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvitationId(pub String);

impl InvitationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for InvitationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    #[default]
    Pending,
    Accepted,
    /// Withdrawn by the sender; frees the (contract, email) slot
    Revoked,
}

impl InvitationStatus {
    /// Live invitations block a re-invite of the same email.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::Accepted)
    }
}

/// A time-boxed offer for a non-platform party to become a collaborator.
///
/// At most one live invitation may exist per (contract, recipient email);
/// revoking one frees the slot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub contract_id: ContractId,
    pub sender_id: UserId,
    /// Stored lowercased so comparisons are case-insensitive.
    pub recipient_email: String,
    /// Unguessable random token the recipient presents to accept
    pub code: String,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
}

impl Invitation {
    pub fn new(
        contract_id: ContractId,
        sender_id: UserId,
        recipient_email: impl Into<String>,
        code: impl Into<String>,
        at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: InvitationId::generate(),
            contract_id,
            sender_id,
            recipient_email: recipient_email.into().to_lowercase(),
            code: code.into(),
            status: InvitationStatus::Pending,
            created_at: at,
            expires_at: at + ttl,
            accepted_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
