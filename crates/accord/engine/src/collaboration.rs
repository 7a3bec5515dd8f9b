//! Collaboration manager: turning a draft into a shared, multi-party
//! contract via in-platform shares or email invitations.

use crate::access::AccessResolver;
use crate::config::EngineConfig;
use crate::identity::IdentityDirectory;
use crate::notify::{dispatch, NotificationEvent, NotificationSink};
use crate::{EngineError, EngineResult};
use accord_storage::{AccordStorage, StorageError};
use accord_types::{
    Collaborator, CollaboratorId, Contract, ContractId, ContractStatus, Invitation, InvitationId,
    UserId,
};
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;

/// Recipient selector for [`CollaborationManager::share`]: an in-platform
/// user or an external email, never both.
#[derive(Clone, Debug)]
pub enum ShareRecipient {
    User(UserId),
    Email(String),
}

/// Result of sharing: an attached collaborator or an outstanding invitation.
#[derive(Clone, Debug)]
pub enum ShareOutcome {
    Collaborator(CollaboratorId),
    Invitation {
        invitation_id: InvitationId,
        code: String,
    },
}

/// Creates and accepts invitations, attaches collaborators, and enforces
/// the self-share and duplicate-invite prohibitions.
pub struct CollaborationManager<S> {
    store: Arc<S>,
    access: AccessResolver<S>,
    directory: Arc<dyn IdentityDirectory>,
    notifier: Arc<dyn NotificationSink>,
    config: EngineConfig,
}

impl<S: AccordStorage> CollaborationManager<S> {
    pub fn new(
        store: Arc<S>,
        directory: Arc<dyn IdentityDirectory>,
        notifier: Arc<dyn NotificationSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            access: AccessResolver::new(store.clone()),
            store,
            directory,
            notifier,
            config,
        }
    }

    /// Share a draft or pending contract with a counterparty.
    ///
    /// Owner-only. The in-platform path attaches a pending collaborator row
    /// immediately; the email path creates a time-boxed invitation. Either
    /// way the drafter's own approved row is ensured first, so later
    /// unanimity checks include them.
    pub async fn share(
        &self,
        contract_id: &ContractId,
        sender: &UserId,
        sender_email: &str,
        recipient: ShareRecipient,
    ) -> EngineResult<ShareOutcome> {
        let contract = self.access.require_access(contract_id, sender).await?;
        if &contract.owner_id != sender {
            return Err(EngineError::Unauthorized);
        }
        if !matches!(
            contract.status,
            ContractStatus::Draft | ContractStatus::PendingApproval
        ) {
            return Err(EngineError::InvalidState(format!(
                "a contract in {:?} cannot be shared",
                contract.status
            )));
        }

        match recipient {
            ShareRecipient::User(user_id) => self.share_with_user(&contract, user_id).await,
            ShareRecipient::Email(email) => {
                self.share_with_email(&contract, sender_email, email).await
            }
        }
    }

    async fn share_with_user(
        &self,
        contract: &Contract,
        user_id: UserId,
    ) -> EngineResult<ShareOutcome> {
        if user_id == contract.owner_id {
            return Err(EngineError::SelfActionForbidden(
                "cannot share a contract with yourself".to_string(),
            ));
        }
        let exists = self
            .directory
            .profile_exists(&user_id)
            .await
            .map_err(|e| EngineError::Directory(e.to_string()))?;
        if !exists {
            return Err(EngineError::Validation {
                field: "recipient_user_id",
                message: format!("unknown user {user_id}"),
            });
        }

        // A repeat share of the same pair is idempotent.
        if let Some(existing) = self.store.get_collaborator(&contract.id, &user_id).await? {
            return Ok(ShareOutcome::Collaborator(existing.id));
        }

        let now = Utc::now();
        self.ensure_initiator_row(contract, now).await?;

        let row = Collaborator::recipient(contract.id.clone(), user_id.clone(), now);
        let collaborator_id = row.id.clone();
        let collaborator_id = match self.store.insert_collaborator(row).await {
            Ok(()) => collaborator_id,
            Err(StorageError::Conflict(_)) => {
                // Lost a race against an identical share; adopt the winner.
                self.store
                    .get_collaborator(&contract.id, &user_id)
                    .await?
                    .map(|c| c.id)
                    .ok_or(EngineError::NotFound)?
            }
            Err(e) => return Err(e.into()),
        };

        self.store
            .set_collaborative(&contract.id, now)
            .await
            .map_err(EngineError::from_gone)?;
        // A bare draft moves to pending once a counterparty is attached;
        // already-pending contracts lose this race harmlessly.
        let _ = self
            .store
            .transition_status(
                &contract.id,
                ContractStatus::Draft,
                ContractStatus::PendingApproval,
                now,
            )
            .await
            .map_err(EngineError::from_gone)?;

        dispatch(
            self.notifier.as_ref(),
            NotificationEvent::CollaboratorAdded {
                contract_id: contract.id.clone(),
                user_id: user_id.clone(),
            },
        )
        .await;
        tracing::info!(
            contract_id = %contract.id,
            user = %user_id,
            "Contract shared with platform user"
        );
        Ok(ShareOutcome::Collaborator(collaborator_id))
    }

    async fn share_with_email(
        &self,
        contract: &Contract,
        sender_email: &str,
        email: String,
    ) -> EngineResult<ShareOutcome> {
        let email = email.to_lowercase();
        if email == sender_email.to_lowercase() {
            return Err(EngineError::SelfActionForbidden(
                "cannot invite your own email".to_string(),
            ));
        }
        if self
            .store
            .find_live_invitation(&contract.id, &email)
            .await?
            .is_some()
        {
            return Err(EngineError::InvalidState(format!(
                "an invitation for {email} already exists on this contract"
            )));
        }

        let now = Utc::now();
        self.ensure_initiator_row(contract, now).await?;
        self.store
            .set_collaborative(&contract.id, now)
            .await
            .map_err(EngineError::from_gone)?;

        let code = generate_invitation_code(self.config.invitation_code_length);
        let invitation = Invitation::new(
            contract.id.clone(),
            contract.owner_id.clone(),
            email.clone(),
            code.clone(),
            now,
            Duration::days(self.config.invitation_ttl_days),
        );
        let invitation_id = invitation.id.clone();
        match self.store.insert_invitation(invitation).await {
            Ok(()) => {}
            Err(StorageError::Conflict(_)) => {
                // Lost a race against an identical invite.
                return Err(EngineError::InvalidState(format!(
                    "an invitation for {email} already exists on this contract"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        dispatch(
            self.notifier.as_ref(),
            NotificationEvent::InvitationCreated {
                contract_id: contract.id.clone(),
                invitation_id: invitation_id.clone(),
                recipient_email: email,
            },
        )
        .await;
        tracing::info!(
            contract_id = %contract.id,
            invitation_id = %invitation_id,
            "Invitation created"
        );
        Ok(ShareOutcome::Invitation {
            invitation_id,
            code,
        })
    }

    /// Accept an invitation by code.
    ///
    /// Returns `None`, not an error, for unknown, already-accepted,
    /// revoked, or expired codes. Safe under concurrent acceptance of the
    /// same code: the flip to accepted is a single compare-and-set, so
    /// exactly one caller wins and retries converge on `None`.
    pub async fn accept_invitation(
        &self,
        code: &str,
        user_id: &UserId,
    ) -> EngineResult<Option<ContractId>> {
        let now = Utc::now();
        let Some(invitation) = self.store.accept_invitation_if_pending(code, now).await? else {
            return Ok(None);
        };

        let contract_id = invitation.contract_id.clone();
        match self
            .store
            .insert_collaborator(Collaborator::recipient(
                contract_id.clone(),
                user_id.clone(),
                now,
            ))
            .await
        {
            // Conflict means the user already holds a slot; reuse it.
            Ok(()) | Err(StorageError::Conflict(_)) => {}
            Err(e) => return Err(e.into()),
        }
        let _ = self
            .store
            .transition_status(
                &contract_id,
                ContractStatus::Draft,
                ContractStatus::PendingApproval,
                now,
            )
            .await
            .map_err(EngineError::from_gone)?;

        dispatch(
            self.notifier.as_ref(),
            NotificationEvent::InvitationAccepted {
                contract_id: contract_id.clone(),
                invitation_id: invitation.id.clone(),
                user_id: user_id.clone(),
            },
        )
        .await;
        tracing::info!(
            contract_id = %contract_id,
            invitation_id = %invitation.id,
            user = %user_id,
            "Invitation accepted"
        );
        Ok(Some(contract_id))
    }

    /// Withdraw a still-pending invitation, freeing the (contract, email)
    /// slot for a corrected re-invite. Owner-only; returns `false` once the
    /// invitation was accepted or already revoked.
    pub async fn revoke_invitation(
        &self,
        invitation_id: &InvitationId,
        caller: &UserId,
    ) -> EngineResult<bool> {
        let Some(invitation) = self.store.get_invitation(invitation_id).await? else {
            return Err(EngineError::NotFound);
        };
        let contract = self
            .access
            .require_access(&invitation.contract_id, caller)
            .await?;
        if &contract.owner_id != caller {
            return Err(EngineError::Unauthorized);
        }
        let revoked = self
            .store
            .revoke_invitation_if_pending(invitation_id, Utc::now())
            .await?;
        if revoked {
            tracing::info!(
                invitation_id = %invitation_id,
                contract_id = %invitation.contract_id,
                "Invitation revoked"
            );
        }
        Ok(revoked)
    }

    async fn ensure_initiator_row(
        &self,
        contract: &Contract,
        at: DateTime<Utc>,
    ) -> EngineResult<()> {
        match self
            .store
            .insert_collaborator(Collaborator::initiator(
                contract.id.clone(),
                contract.owner_id.clone(),
                at,
            ))
            .await
        {
            Ok(()) => Ok(()),
            Err(StorageError::Conflict(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn generate_invitation_code(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
