//! Accord core types.
//!
//! Entities and state-machine vocabulary for the multi-party consent record
//! core: contracts, collaborators, invitations, and amendments. Pure data;
//! storage adapters and the managers that drive transitions live in
//! `accord-storage` and `accord-engine`.

#![deny(unsafe_code)]

mod amendment;
mod collaborator;
mod contract;
mod invitation;

pub use amendment::{
    Amendment, AmendmentChanges, AmendmentId, AmendmentKind, AmendmentStatus, PartyApproval,
};
pub use collaborator::{Collaborator, CollaboratorId, CollaboratorRole, CollaboratorStatus};
pub use contract::{Act, ConsentMethod, Contract, ContractId, ContractStatus};
pub use invitation::{Invitation, InvitationId, InvitationStatus};

use serde::{Deserialize, Serialize};

/// Identity of a platform user.
///
/// Minted by the (excluded) authentication layer; the core never generates
/// these, it only stores and compares them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome selector when resolving a pending row one way or the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Rejected,
}
