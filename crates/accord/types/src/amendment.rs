//! Amendments: unanimously-gated changes to active or paused contracts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contract::Act;
use crate::{ContractId, UserId};

/// Unique identifier for an amendment
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AmendmentId(pub String);

impl AmendmentId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for AmendmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmendmentKind {
    AddActs,
    RemoveActs,
    ExtendDuration,
    ShortenDuration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AmendmentStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl AmendmentStatus {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Typed amendment payload. Its shape must match the amendment kind:
/// act kinds carry an act list, duration kinds carry a new end time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmendmentChanges {
    Acts(Vec<Act>),
    NewEndTime(DateTime<Utc>),
}

/// One collaborator's recorded approval of an amendment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartyApproval {
    pub user_id: UserId,
    pub approved_at: DateTime<Utc>,
}

/// A proposed post-activation change to a contract.
///
/// Resolving to approved applies `changes` to the contract's content fields;
/// resolving to rejected leaves the contract untouched. Either way the row
/// is immutable afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Amendment {
    pub id: AmendmentId,
    pub contract_id: ContractId,
    pub requested_by: UserId,
    pub kind: AmendmentKind,
    pub changes: AmendmentChanges,
    pub reason: String,
    pub status: AmendmentStatus,
    /// Per-party approval tracking. The requester is deemed to have
    /// consented by proposing and is never in this list.
    pub approvals: Vec<PartyApproval>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Amendment {
    pub fn new(
        contract_id: ContractId,
        requested_by: UserId,
        kind: AmendmentKind,
        changes: AmendmentChanges,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AmendmentId::generate(),
            contract_id,
            requested_by,
            kind,
            changes,
            reason: reason.into(),
            status: AmendmentStatus::Pending,
            approvals: Vec::new(),
            resolved_at: None,
            rejection_reason: None,
            created_at: at,
        }
    }

    pub fn has_approval_from(&self, user_id: &UserId) -> bool {
        self.approvals.iter().any(|a| &a.user_id == user_id)
    }
}
