//! Amendment manager: unanimously-gated changes to contracts in force.
//!
//! A party proposes a bounded change (acts or duration); every other party
//! with contract access must approve before it is applied. Rejection is
//! unilateral. A contract accumulates at most a configured number of
//! approved amendments over its lifetime.

use crate::access::AccessResolver;
use crate::config::EngineConfig;
use crate::notify::{dispatch, NotificationEvent, NotificationSink};
use crate::{EngineError, EngineResult};
use accord_storage::AccordStorage;
use accord_types::{
    Amendment, AmendmentChanges, AmendmentId, AmendmentKind, ContractId, ContractStatus, UserId,
    Verdict,
};
use chrono::Utc;
use std::sync::Arc;

pub struct AmendmentManager<S> {
    store: Arc<S>,
    access: AccessResolver<S>,
    notifier: Arc<dyn NotificationSink>,
    config: EngineConfig,
}

impl<S: AccordStorage> AmendmentManager<S> {
    pub fn new(
        store: Arc<S>,
        notifier: Arc<dyn NotificationSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            access: AccessResolver::new(store.clone()),
            store,
            notifier,
            config,
        }
    }

    /// Propose a change to an active or paused contract.
    pub async fn propose(
        &self,
        contract_id: &ContractId,
        requested_by: &UserId,
        kind: AmendmentKind,
        changes: AmendmentChanges,
        reason: impl Into<String>,
    ) -> EngineResult<Amendment> {
        let contract = self.access.require_access(contract_id, requested_by).await?;
        if !matches!(
            contract.status,
            ContractStatus::Active | ContractStatus::Paused
        ) {
            return Err(EngineError::InvalidState(format!(
                "amendments require an active or paused contract, not {:?}",
                contract.status
            )));
        }
        if self.store.count_approved_amendments(contract_id).await?
            >= self.config.max_approved_amendments
        {
            return Err(EngineError::LimitExceeded);
        }
        validate_changes(kind, &changes)?;

        let amendment = Amendment::new(
            contract_id.clone(),
            requested_by.clone(),
            kind,
            changes,
            reason,
            Utc::now(),
        );
        self.store.insert_amendment(amendment.clone()).await?;

        dispatch(
            self.notifier.as_ref(),
            NotificationEvent::AmendmentRequested {
                contract_id: contract_id.clone(),
                amendment_id: amendment.id.clone(),
                requested_by: requested_by.clone(),
            },
        )
        .await;
        tracing::info!(
            contract_id = %contract_id,
            amendment_id = %amendment.id,
            kind = ?kind,
            "Amendment proposed"
        );
        Ok(amendment)
    }

    /// Record the caller's approval of an amendment; applies the change to
    /// the contract once every non-requester party has approved.
    ///
    /// The self-approval prohibition is an identity property of the row,
    /// not a concurrency hazard, so it is checked up front, before even
    /// the access check.
    pub async fn approve_amendment(
        &self,
        id: &AmendmentId,
        user_id: &UserId,
    ) -> EngineResult<bool> {
        let Some(amendment) = self.store.get_amendment(id).await? else {
            return Err(EngineError::NotFound);
        };
        if &amendment.requested_by == user_id {
            return Err(EngineError::SelfActionForbidden(
                "cannot approve your own amendment".to_string(),
            ));
        }
        self.access
            .require_access(&amendment.contract_id, user_id)
            .await?;

        let now = Utc::now();
        if !self.store.record_party_approval(id, user_id, now).await? {
            return Ok(false);
        }

        // Unanimity over every non-requester party, from a post-write read.
        let Some(current) = self.store.get_amendment(id).await? else {
            return Ok(true);
        };
        let collaborators = self.store.list_collaborators(&amendment.contract_id).await?;
        let unanimous = collaborators
            .iter()
            .filter(|c| c.user_id != current.requested_by)
            .all(|c| current.has_approval_from(&c.user_id));
        if unanimous {
            let resolved = self
                .store
                .resolve_amendment(id, Verdict::Approved, now, None)
                .await?;
            if resolved {
                self.store
                    .apply_amendment_changes(
                        &amendment.contract_id,
                        amendment.kind,
                        &amendment.changes,
                        now,
                    )
                    .await
                    .map_err(EngineError::from_gone)?;
                dispatch(
                    self.notifier.as_ref(),
                    NotificationEvent::AmendmentApproved {
                        contract_id: amendment.contract_id.clone(),
                        amendment_id: id.clone(),
                    },
                )
                .await;
                tracing::info!(
                    contract_id = %amendment.contract_id,
                    amendment_id = %id,
                    "Amendment approved and applied"
                );
            }
        }
        Ok(true)
    }

    /// Reject an amendment. Unilateral: a single non-requester rejection
    /// resolves it permanently and leaves the contract untouched.
    pub async fn reject_amendment(
        &self,
        id: &AmendmentId,
        user_id: &UserId,
        reason: Option<String>,
    ) -> EngineResult<bool> {
        let Some(amendment) = self.store.get_amendment(id).await? else {
            return Err(EngineError::NotFound);
        };
        if &amendment.requested_by == user_id {
            return Err(EngineError::SelfActionForbidden(
                "cannot reject your own amendment".to_string(),
            ));
        }
        self.access
            .require_access(&amendment.contract_id, user_id)
            .await?;

        let resolved = self
            .store
            .resolve_amendment(id, Verdict::Rejected, Utc::now(), reason)
            .await?;
        if resolved {
            dispatch(
                self.notifier.as_ref(),
                NotificationEvent::AmendmentRejected {
                    contract_id: amendment.contract_id.clone(),
                    amendment_id: id.clone(),
                    rejected_by: user_id.clone(),
                },
            )
            .await;
            tracing::info!(
                contract_id = %amendment.contract_id,
                amendment_id = %id,
                by = %user_id,
                "Amendment rejected"
            );
        }
        Ok(resolved)
    }
}

fn validate_changes(kind: AmendmentKind, changes: &AmendmentChanges) -> EngineResult<()> {
    match (kind, changes) {
        (AmendmentKind::AddActs | AmendmentKind::RemoveActs, AmendmentChanges::Acts(acts)) => {
            if acts.is_empty() {
                return Err(EngineError::Validation {
                    field: "changes.acts",
                    message: "act list must not be empty".to_string(),
                });
            }
            Ok(())
        }
        (
            AmendmentKind::ExtendDuration | AmendmentKind::ShortenDuration,
            AmendmentChanges::NewEndTime(end),
        ) => {
            if *end <= Utc::now() {
                return Err(EngineError::Validation {
                    field: "changes.new_end_time",
                    message: "must be strictly in the future".to_string(),
                });
            }
            Ok(())
        }
        (AmendmentKind::AddActs | AmendmentKind::RemoveActs, AmendmentChanges::NewEndTime(_)) => {
            Err(EngineError::Validation {
                field: "changes",
                message: "act amendments carry an act list".to_string(),
            })
        }
        (_, AmendmentChanges::Acts(_)) => Err(EngineError::Validation {
            field: "changes",
            message: "duration amendments carry a new end time".to_string(),
        }),
    }
}
