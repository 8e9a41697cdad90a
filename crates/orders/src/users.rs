//! User directory used to denormalize owner name and email onto orders

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::store::{DocumentStore, StoreResult};

/// Collection holding user profiles
pub const USERS: &str = "users";

/// Display fields for an order owner
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Read-only lookup of user profiles
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup(&self, user_id: &str) -> StoreResult<Option<UserProfile>>;
}

/// Profiles stored in the `users` collection of the document store
pub struct DocumentUserDirectory {
    store: Arc<dyn DocumentStore>,
}

impl DocumentUserDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl UserDirectory for DocumentUserDirectory {
    async fn lookup(&self, user_id: &str) -> StoreResult<Option<UserProfile>> {
        let Some(doc) = self.store.get(USERS, user_id).await? else {
            return Ok(None);
        };

        let field = |keys: &[&str]| {
            keys.iter().find_map(|key| {
                doc.get(*key)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
        };

        Ok(Some(UserProfile {
            name: field(&["displayName", "name", "fullName"]),
            email: field(&["email"]),
        }))
    }
}

/// Fixed profiles for tests and local runs
#[derive(Default)]
pub struct InMemoryUserDirectory {
    profiles: RwLock<HashMap<String, UserProfile>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: impl Into<String>, profile: UserProfile) {
        self.profiles.write().insert(user_id.into(), profile);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn lookup(&self, user_id: &str) -> StoreResult<Option<UserProfile>> {
        Ok(self.profiles.read().get(user_id).cloned())
    }
}
