//! Contracts: consent records under negotiation or in force.
//!
//! A contract is created as a draft by its owner and moves along a small,
//! closed transition graph. Activation always goes through one of the two
//! unanimity gates; rejection is unilateral and terminal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::amendment::{AmendmentChanges, AmendmentKind};
use crate::UserId;

/// Unique identifier for a contract
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractId(pub String);

impl ContractId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ContractId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the consent record was captured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentMethod {
    Signature,
    Voice,
    Photo,
    Biometric,
}

/// Lifecycle state of a contract
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    /// Drafted by the owner, not yet in force
    #[default]
    Draft,
    /// Shared with counterparties, waiting on unanimous approval
    PendingApproval,
    /// In force
    Active,
    /// Temporarily suspended by a party
    Paused,
    /// A counterparty rejected; terminal
    Rejected,
    /// Ran to completion; terminal
    Completed,
}

impl ContractStatus {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed)
    }

    /// Check whether `next` is a legal transition from this state.
    ///
    /// `Draft -> Active` is the confirmation-gate edge (directly-created
    /// multi-party records); `PendingApproval -> Active` is the approval-gate
    /// edge. Each gate drives only its own edge.
    pub fn can_transition_to(&self, next: ContractStatus) -> bool {
        use ContractStatus::*;
        matches!(
            (*self, next),
            (Draft, PendingApproval)
                | (Draft, Active)
                | (Draft, Rejected)
                | (PendingApproval, Active)
                | (PendingApproval, Rejected)
                | (Active, Paused)
                | (Active, Completed)
                | (Paused, Active)
                | (Paused, Completed)
        )
    }
}

/// Closed vocabulary of acts a contract can cover.
///
/// Amendment payloads are validated against this set; unknown act names are
/// rejected before anything is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Act {
    Kissing,
    Touching,
    Massage,
    Oral,
    Intercourse,
    Bondage,
    Photography,
    Recording,
}

impl Act {
    pub const ALL: [Act; 8] = [
        Act::Kissing,
        Act::Touching,
        Act::Massage,
        Act::Oral,
        Act::Intercourse,
        Act::Bondage,
        Act::Photography,
        Act::Recording,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Act::Kissing => "kissing",
            Act::Touching => "touching",
            Act::Massage => "massage",
            Act::Oral => "oral",
            Act::Intercourse => "intercourse",
            Act::Bondage => "bondage",
            Act::Photography => "photography",
            Act::Recording => "recording",
        }
    }

    /// Parse an act from its wire name.
    pub fn parse(raw: &str) -> Option<Act> {
        Act::ALL.iter().copied().find(|a| a.as_str() == raw)
    }
}

impl std::fmt::Display for Act {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A consent record under negotiation or in force.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub owner_id: UserId,
    pub status: ContractStatus,
    /// True once counterparties are attached (collaborator rows exist)
    pub is_collaborative: bool,
    pub method: ConsentMethod,
    pub encounter_type: String,
    /// Legacy display cache of party names, populated at creation time.
    /// Never authoritative: collaborator rows are the source of truth for
    /// collaborative contracts.
    pub parties: Vec<String>,
    pub acts: Vec<Act>,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    /// Create a new draft contract owned by `owner_id`.
    pub fn new(
        owner_id: UserId,
        method: ConsentMethod,
        encounter_type: impl Into<String>,
        acts: Vec<Act>,
        start_time: DateTime<Utc>,
        duration_minutes: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ContractId::generate(),
            owner_id,
            status: ContractStatus::Draft,
            is_collaborative: false,
            method,
            encounter_type: encounter_type.into(),
            parties: Vec::new(),
            acts,
            start_time,
            duration_minutes,
            end_time: start_time + Duration::minutes(duration_minutes),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_parties(mut self, parties: Vec<String>) -> Self {
        self.parties = parties;
        self
    }

    /// Apply an approved amendment's changes to the contract content fields.
    ///
    /// Never touches `status`. The payload shape is validated against the
    /// kind at proposal time, so a mismatched pair is a no-op here.
    pub fn apply_amendment(
        &mut self,
        kind: AmendmentKind,
        changes: &AmendmentChanges,
        at: DateTime<Utc>,
    ) {
        match (kind, changes) {
            (AmendmentKind::AddActs, AmendmentChanges::Acts(acts)) => {
                for act in acts {
                    if !self.acts.contains(act) {
                        self.acts.push(*act);
                    }
                }
            }
            (AmendmentKind::RemoveActs, AmendmentChanges::Acts(acts)) => {
                self.acts.retain(|a| !acts.contains(a));
            }
            (
                AmendmentKind::ExtendDuration | AmendmentKind::ShortenDuration,
                AmendmentChanges::NewEndTime(end),
            ) => {
                self.end_time = *end;
                self.duration_minutes = (*end - self.start_time).num_minutes();
            }
            _ => {}
        }
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_contract() -> Contract {
        Contract::new(
            UserId::new("owner-1"),
            ConsentMethod::Signature,
            "date",
            vec![Act::Kissing, Act::Massage],
            Utc::now(),
            120,
        )
    }

    #[test]
    fn test_new_contract_defaults() {
        let contract = make_contract();
        assert_eq!(contract.status, ContractStatus::Draft);
        assert!(!contract.is_collaborative);
        assert_eq!(
            contract.end_time,
            contract.start_time + Duration::minutes(120)
        );
    }

    #[test]
    fn test_transition_edges() {
        use ContractStatus::*;
        assert!(Draft.can_transition_to(PendingApproval));
        assert!(Draft.can_transition_to(Active));
        assert!(PendingApproval.can_transition_to(Active));
        assert!(PendingApproval.can_transition_to(Rejected));
        assert!(Active.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Active));
        assert!(Active.can_transition_to(Completed));

        assert!(!Draft.can_transition_to(Paused));
        assert!(!Active.can_transition_to(PendingApproval));
        assert!(!Active.can_transition_to(Draft));
        assert!(!Rejected.can_transition_to(Active));
        assert!(!Completed.can_transition_to(Active));
    }

    #[test]
    fn test_terminal_states() {
        assert!(ContractStatus::Rejected.is_terminal());
        assert!(ContractStatus::Completed.is_terminal());
        assert!(!ContractStatus::Draft.is_terminal());
        assert!(!ContractStatus::Active.is_terminal());
        assert!(!ContractStatus::Paused.is_terminal());
    }

    #[test]
    fn test_act_round_trip() {
        for act in Act::ALL {
            assert_eq!(Act::parse(act.as_str()), Some(act));
        }
        assert_eq!(Act::parse("juggling"), None);
    }

    #[test]
    fn test_apply_add_acts_deduplicates() {
        let mut contract = make_contract();
        contract.apply_amendment(
            AmendmentKind::AddActs,
            &AmendmentChanges::Acts(vec![Act::Kissing, Act::Oral]),
            Utc::now(),
        );
        assert_eq!(contract.acts, vec![Act::Kissing, Act::Massage, Act::Oral]);
    }

    #[test]
    fn test_apply_remove_acts() {
        let mut contract = make_contract();
        contract.apply_amendment(
            AmendmentKind::RemoveActs,
            &AmendmentChanges::Acts(vec![Act::Massage, Act::Bondage]),
            Utc::now(),
        );
        assert_eq!(contract.acts, vec![Act::Kissing]);
    }

    #[test]
    fn test_apply_new_end_time_recomputes_duration() {
        let mut contract = make_contract();
        let new_end = contract.start_time + Duration::minutes(180);
        contract.apply_amendment(
            AmendmentKind::ExtendDuration,
            &AmendmentChanges::NewEndTime(new_end),
            Utc::now(),
        );
        assert_eq!(contract.end_time, new_end);
        assert_eq!(contract.duration_minutes, 180);
        assert_eq!(contract.status, ContractStatus::Draft);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let raw = serde_json::to_string(&ContractStatus::PendingApproval).unwrap();
        assert_eq!(raw, "\"pending_approval\"");
    }
}
