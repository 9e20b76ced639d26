//! In-memory session state with write-through persistence.
//!
//! The session store is the single write path for authentication state. The
//! two storage keys (`token`, `user`) are always written together and cleared
//! together so a half-session can never be observed on disk.

use crate::storage::{Storage, TOKEN_KEY, USER_KEY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role assigned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

/// Server-owned user record; the client holds a cached copy.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

/// Partial update sent to `PATCH /users/{id}`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none()
    }
}

/// Current authentication state. Steady states hold either both fields
/// (authenticated) or neither (anonymous); token-without-user exists only
/// transiently during hydration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub user: Option<User>,
    pub token: Option<String>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.token.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.role == Role::Admin)
    }
}

pub struct SessionStore {
    session: Session,
    storage: Box<dyn Storage>,
    hydrated: bool,
}

impl SessionStore {
    pub fn new(storage: Box<dyn Storage>) -> Self {
        Self {
            session: Session::default(),
            storage,
            hydrated: false,
        }
    }

    /// Synchronous read, no side effects.
    pub fn get(&self) -> &Session {
        &self.session
    }

    /// True once the startup hydration pass has completed.
    pub fn hydrated(&self) -> bool {
        self.hydrated
    }

    pub fn mark_hydrated(&mut self) {
        self.hydrated = true;
    }

    /// Mark the session authenticated and write both keys through to storage.
    pub fn set(&mut self, user: User, token: String) {
        self.storage.set(TOKEN_KEY, &token);
        self.persist_user(&user);
        self.session = Session {
            user: Some(user),
            token: Some(token),
        };
    }

    /// Mark the session anonymous and clear both storage keys.
    pub fn clear(&mut self) {
        self.storage.remove(TOKEN_KEY);
        self.storage.remove(USER_KEY);
        self.session = Session::default();
    }

    /// Replace the cached user with a server-confirmed record and re-persist.
    pub fn update_user(&mut self, user: User) {
        self.persist_user(&user);
        self.session.user = Some(user);
    }

    /// Raw storage reads for the hydration pass.
    pub fn stored_token(&self) -> Option<String> {
        self.storage.get(TOKEN_KEY)
    }

    pub fn stored_user(&self) -> Option<String> {
        self.storage.get(USER_KEY)
    }

    fn persist_user(&mut self, user: &User) {
        match serde_json::to_string(user) {
            Ok(json) => self.storage.set(USER_KEY, &json),
            Err(e) => eprintln!("Warning: failed to serialize user: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    pub fn sample_user(id: &str) -> User {
        User {
            id: id.to_string(),
            name: "A".to_string(),
            email: "a@b.com".to_string(),
            role: Role::User,
            is_active: true,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_set_writes_through_to_storage() {
        let mut store = SessionStore::new(Box::new(MemoryStorage::new()));
        store.set(sample_user("u1"), "jwt1".to_string());

        assert_eq!(store.stored_token().as_deref(), Some("jwt1"));
        let stored: User = serde_json::from_str(&store.stored_user().unwrap()).unwrap();
        assert_eq!(Some(stored), store.get().user);
        assert!(store.get().is_authenticated());
    }

    #[test]
    fn test_clear_removes_both_keys() {
        let mut store = SessionStore::new(Box::new(MemoryStorage::new()));
        store.set(sample_user("u1"), "jwt1".to_string());
        store.clear();

        assert!(store.stored_token().is_none());
        assert!(store.stored_user().is_none());
        assert_eq!(*store.get(), Session::default());
    }

    #[test]
    fn test_clear_when_already_anonymous_is_idempotent() {
        let mut store = SessionStore::new(Box::new(MemoryStorage::new()));
        store.clear();
        store.clear();
        assert!(store.stored_token().is_none());
        assert!(store.stored_user().is_none());
    }

    #[test]
    fn test_update_user_re_persists() {
        let mut store = SessionStore::new(Box::new(MemoryStorage::new()));
        store.set(sample_user("u1"), "jwt1".to_string());

        let mut updated = sample_user("u1");
        updated.name = "B".to_string();
        store.update_user(updated.clone());

        let stored: User = serde_json::from_str(&store.stored_user().unwrap()).unwrap();
        assert_eq!(stored, updated);
        // Token untouched by a profile update.
        assert_eq!(store.stored_token().as_deref(), Some("jwt1"));
    }

    #[test]
    fn test_role_deserializes_lowercase() {
        let user: User =
            serde_json::from_str(r#"{"id":"1","name":"A","email":"a@b.com","role":"admin"}"#)
                .unwrap();
        assert_eq!(user.role, Role::Admin);
        assert!(user.is_active);
    }
}
