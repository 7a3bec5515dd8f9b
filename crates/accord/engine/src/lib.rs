//! Accord engine: the multi-party collaboration core for consent records.
//!
//! One party drafts a contract, invites a counterparty (in-platform or by
//! email), both must approve before it is in force, and either may later
//! propose bounded amendments that again require unanimous approval. This
//! crate drives those state transitions over the `accord-storage` traits;
//! HTTP wiring, authentication, and notification delivery live elsewhere
//! and plug in through the [`IdentityDirectory`] and [`NotificationSink`]
//! seams.
//!
//! Handlers are stateless and request-per-call: every mutating operation is
//! a compare-and-set against the store, unanimity aggregates are computed
//! from post-write reads, and no operation ever blocks waiting on another
//! party. Callers may retry freely; the already-resolved path returns
//! `false`/`None` instead of corrupting state.

#![deny(unsafe_code)]

mod access;
mod amendment;
mod approval;
mod collaboration;
mod config;
mod confirmation;
mod contracts;
mod error;
mod identity;
mod notify;

pub use access::AccessResolver;
pub use amendment::AmendmentManager;
pub use approval::ApprovalGate;
pub use collaboration::{CollaborationManager, ShareOutcome, ShareRecipient};
pub use config::EngineConfig;
pub use confirmation::{ConfirmOutcome, ConfirmationGate};
pub use contracts::{ContractService, NewContract};
pub use error::{EngineError, EngineResult};
pub use identity::{IdentityDirectory, MemoryDirectory};
pub use notify::{MemorySink, NotificationEvent, NotificationSink, NullSink};

use accord_storage::AccordStorage;
use std::sync::Arc;

/// The managers bundled over one storage handle, wired identically.
pub struct Accord<S> {
    pub contracts: ContractService<S>,
    pub collaboration: CollaborationManager<S>,
    pub approvals: ApprovalGate<S>,
    pub confirmations: ConfirmationGate<S>,
    pub amendments: AmendmentManager<S>,
    pub access: AccessResolver<S>,
}

impl<S: AccordStorage> Accord<S> {
    pub fn new(
        store: Arc<S>,
        directory: Arc<dyn IdentityDirectory>,
        notifier: Arc<dyn NotificationSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            contracts: ContractService::new(store.clone(), directory.clone(), notifier.clone()),
            collaboration: CollaborationManager::new(
                store.clone(),
                directory,
                notifier.clone(),
                config.clone(),
            ),
            approvals: ApprovalGate::new(store.clone(), notifier.clone()),
            confirmations: ConfirmationGate::new(store.clone(), notifier.clone()),
            amendments: AmendmentManager::new(store.clone(), notifier, config),
            access: AccessResolver::new(store),
        }
    }
}
