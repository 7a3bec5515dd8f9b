//! Identity lookup seam.
//!
//! Authentication itself is out of scope; the engine only needs to know
//! whether a user id resolves to a real profile before attaching it to a
//! contract. No anonymous collaborators.

use accord_types::UserId;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;

/// Identity lookup consumed when validating in-platform recipients.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn profile_exists(&self, user_id: &UserId) -> anyhow::Result<bool>;
}

/// In-memory directory for tests and local runs.
#[derive(Default)]
pub struct MemoryDirectory {
    users: RwLock<HashSet<UserId>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().collect()),
        }
    }

    pub fn register(&self, user_id: UserId) {
        if let Ok(mut guard) = self.users.write() {
            guard.insert(user_id);
        }
    }
}

#[async_trait]
impl IdentityDirectory for MemoryDirectory {
    async fn profile_exists(&self, user_id: &UserId) -> anyhow::Result<bool> {
        Ok(self
            .users
            .read()
            .map(|guard| guard.contains(user_id))
            .unwrap_or(false))
    }
}
