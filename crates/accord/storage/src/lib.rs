//! Accord storage abstractions.
//!
//! This crate defines the storage contract for the consent collaboration
//! core: contracts, collaborators, invitations, and amendments. Every
//! mutating method is a compare-and-set primitive: the expected prior state
//! is embedded in the same statement or critical section that performs the
//! write, so concurrent callers race safely and losers observe a plain
//! `false`/`None` instead of corrupting state.
//!
//! Design stance:
//! - PostgreSQL is the transactional source of truth (`postgres` feature).
//! - The in-memory adapter is the deterministic test reference; a single
//!   write guard over the whole table set is its transaction boundary.

#![deny(unsafe_code)]

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use traits::{
    AccordStorage, AmendmentStore, CollaboratorStore, ContractStore, InvitationStore,
};
