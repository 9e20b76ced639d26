//! Session lifecycle: hydration, login, logout, registration, profile
//! updates, and the password-reset sub-flow.
//!
//! Server confirmation is the source of truth for every transition. A failed
//! operation leaves both the in-memory session and durable storage untouched;
//! there are no partial writes.

use crate::api::{ApiError, UserApi};
use crate::session::{Session, SessionStore, User, UserPatch};

const MIN_PASSWORD_LEN: usize = 6;

/// Errors surfaced to the view layer. Validation errors are raised locally
/// before any request is sent; request errors carry the server's message when
/// one was available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    Validation(String),
    Request(String),
}

impl AuthError {
    fn request(err: ApiError) -> Self {
        Self::Request(err.message)
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Validation(m) | Self::Request(m) => m,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for AuthError {}

/// Local password preconditions, checked before any network call.
fn validate_password(password: &str, confirm: &str) -> Result<(), AuthError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        )));
    }
    if password != confirm {
        return Err(AuthError::Validation("Passwords do not match".to_string()));
    }
    Ok(())
}

/// How the startup hydration pass resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrateOutcome {
    /// No persisted session.
    Anonymous,
    /// Snapshot restored and refreshed from the server.
    Restored,
    /// Snapshot restored but the canonical fetch failed; serving stale data.
    Fallback,
    /// Persisted data was corrupt or half-written and has been cleared.
    Wiped,
}

impl HydrateOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Restored => "restored",
            Self::Fallback => "fallback",
            Self::Wiped => "wiped",
        }
    }
}

pub struct AuthCore {
    api: Box<dyn UserApi>,
    store: SessionStore,
}

impl AuthCore {
    pub fn new(api: Box<dyn UserApi>, store: SessionStore) -> Self {
        Self { api, store }
    }

    pub fn session(&self) -> &Session {
        self.store.get()
    }

    /// Reconstruct the session from durable storage and reconcile it with the
    /// server. Called once at process start.
    ///
    /// When the stored snapshot parses but the canonical fetch fails, the
    /// snapshot is kept: a stale profile beats logging the user out over a
    /// flaky network. Corrupt or half-written storage is wiped silently and
    /// the session comes up anonymous.
    pub fn hydrate(&mut self) -> HydrateOutcome {
        let outcome = match (self.store.stored_token(), self.store.stored_user()) {
            (Some(token), Some(raw)) => match serde_json::from_str::<User>(&raw) {
                Ok(snapshot) => {
                    self.api.set_token(Some(token.clone()));
                    match self.api.get_user(&snapshot.id) {
                        Ok(canonical) => {
                            self.store.set(canonical, token);
                            HydrateOutcome::Restored
                        }
                        Err(_) => {
                            self.store.set(snapshot, token);
                            HydrateOutcome::Fallback
                        }
                    }
                }
                Err(_) => {
                    self.store.clear();
                    self.api.set_token(None);
                    HydrateOutcome::Wiped
                }
            },
            // One key without the other is a broken half-session.
            (Some(_), None) | (None, Some(_)) => {
                self.store.clear();
                HydrateOutcome::Wiped
            }
            (None, None) => HydrateOutcome::Anonymous,
        };
        self.store.mark_hydrated();
        outcome
    }

    pub fn login(&mut self, email: &str, password: &str) -> Result<User, AuthError> {
        let (token, user) = self
            .api
            .login(email, password)
            .map_err(AuthError::request)?;
        self.api.set_token(Some(token.clone()));
        self.store.set(user.clone(), token);
        Ok(user)
    }

    /// Unconditional and idempotent; no server round-trip.
    pub fn logout(&mut self) {
        self.store.clear();
        self.api.set_token(None);
    }

    /// Registration does not create a session; the caller is expected to log
    /// in afterwards.
    pub fn register(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
        confirm: &str,
    ) -> Result<(), AuthError> {
        validate_password(password, confirm)?;
        self.api
            .register(name, email, password)
            .map_err(AuthError::request)
    }

    pub fn update_profile(&mut self, patch: &UserPatch) -> Result<User, AuthError> {
        let id = match &self.store.get().user {
            Some(user) => user.id.clone(),
            None => return Err(AuthError::Validation("Not signed in".to_string())),
        };
        if patch.is_empty() {
            return Err(AuthError::Validation("Nothing to update".to_string()));
        }
        let user = self
            .api
            .update_user(&id, patch)
            .map_err(AuthError::request)?;
        self.store.update_user(user.clone());
        Ok(user)
    }

    /// Fetch the canonical record for any user (admin view, or own profile).
    pub fn fetch_user(&self, id: &str) -> Result<User, AuthError> {
        self.api.get_user(id).map_err(AuthError::request)
    }

    /// Admin-only on the server side; the client just forwards the call.
    pub fn list_users(&self) -> Result<Vec<User>, AuthError> {
        self.api.list_users().map_err(AuthError::request)
    }

    /// Deleting your own account also ends the local session.
    pub fn delete_user(&mut self, id: &str) -> Result<(), AuthError> {
        self.api.delete_user(id).map_err(AuthError::request)?;
        let own = self
            .store
            .get()
            .user
            .as_ref()
            .is_some_and(|u| u.id == id);
        if own {
            self.logout();
        }
        Ok(())
    }

    /// The server answers uniformly whether or not the email exists; the
    /// client performs no existence check. Returns the development reset link
    /// when the deployment echoes one back.
    pub fn request_reset(&self, email: &str) -> Result<Option<String>, AuthError> {
        self.api
            .request_password_reset(email)
            .map_err(AuthError::request)
    }

    /// Read-only validity check; mutates nothing.
    pub fn verify_reset_token(&self, token: &str, email: &str) -> Result<bool, AuthError> {
        self.api
            .verify_reset_token(token, email)
            .map_err(AuthError::request)
    }

    /// Completing a reset does not sign the user in.
    pub fn confirm_reset(
        &self,
        email: &str,
        token: &str,
        new_password: &str,
        confirm: &str,
    ) -> Result<(), AuthError> {
        validate_password(new_password, confirm)?;
        self.api
            .reset_password(email, token, new_password, confirm)
            .map_err(AuthError::request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use crate::storage::{MemoryStorage, Storage, TOKEN_KEY, USER_KEY};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn sample_user(id: &str) -> User {
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

    /// Records every gateway call so tests can assert an operation never hit
    /// the network.
    #[derive(Default)]
    struct MockApi {
        calls: Rc<RefCell<Vec<String>>>,
        token: Rc<RefCell<Option<String>>>,
        login_ok: Option<(String, User)>,
        get_user_ok: Option<User>,
        update_ok: Option<User>,
        fail_message: Option<String>,
        update_fail: Option<String>,
    }

    impl MockApi {
        fn fail_all(&self) -> Result<(), ApiError> {
            match &self.fail_message {
                Some(msg) => Err(ApiError {
                    status: Some(400),
                    message: msg.clone(),
                }),
                None => Ok(()),
            }
        }
    }

    impl UserApi for MockApi {
        fn set_token(&mut self, token: Option<String>) {
            *self.token.borrow_mut() = token;
        }

        fn login(&self, _email: &str, _password: &str) -> Result<(String, User), ApiError> {
            self.calls.borrow_mut().push("login".to_string());
            self.fail_all()?;
            Ok(self.login_ok.clone().expect("login_ok not configured"))
        }

        fn register(&self, _name: &str, _email: &str, _password: &str) -> Result<(), ApiError> {
            self.calls.borrow_mut().push("register".to_string());
            self.fail_all()
        }

        fn get_user(&self, _id: &str) -> Result<User, ApiError> {
            self.calls.borrow_mut().push("get_user".to_string());
            self.fail_all()?;
            Ok(self.get_user_ok.clone().expect("get_user_ok not configured"))
        }

        fn update_user(&self, _id: &str, _patch: &UserPatch) -> Result<User, ApiError> {
            self.calls.borrow_mut().push("update_user".to_string());
            self.fail_all()?;
            if let Some(msg) = &self.update_fail {
                return Err(ApiError {
                    status: Some(400),
                    message: msg.clone(),
                });
            }
            Ok(self.update_ok.clone().expect("update_ok not configured"))
        }

        fn delete_user(&self, _id: &str) -> Result<(), ApiError> {
            self.calls.borrow_mut().push("delete_user".to_string());
            self.fail_all()
        }

        fn list_users(&self) -> Result<Vec<User>, ApiError> {
            self.calls.borrow_mut().push("list_users".to_string());
            self.fail_all()?;
            Ok(vec![sample_user("u1"), sample_user("u2")])
        }

        fn request_password_reset(&self, _email: &str) -> Result<Option<String>, ApiError> {
            self.calls.borrow_mut().push("request_reset".to_string());
            self.fail_all()?;
            Ok(None)
        }

        fn verify_reset_token(&self, token: &str, _email: &str) -> Result<bool, ApiError> {
            self.calls.borrow_mut().push("verify_token".to_string());
            self.fail_all()?;
            Ok(token == "valid")
        }

        fn reset_password(
            &self,
            _email: &str,
            _token: &str,
            _new_password: &str,
            _confirm_password: &str,
        ) -> Result<(), ApiError> {
            self.calls.borrow_mut().push("reset_password".to_string());
            self.fail_all()
        }
    }

    fn core_with(api: MockApi) -> (AuthCore, Rc<RefCell<Vec<String>>>, Rc<RefCell<Option<String>>>)
    {
        let calls = api.calls.clone();
        let token = api.token.clone();
        let store = SessionStore::new(Box::new(MemoryStorage::new()));
        (AuthCore::new(Box::new(api), store), calls, token)
    }

    fn seeded_store(token: &str, user_json: &str) -> SessionStore {
        let mut storage = MemoryStorage::new();
        storage.set(TOKEN_KEY, token);
        storage.set(USER_KEY, user_json);
        SessionStore::new(Box::new(storage))
    }

    #[test]
    fn test_login_success_populates_session_and_storage() {
        let (mut core, _, api_token) = core_with(MockApi {
            login_ok: Some(("jwt1".to_string(), sample_user("1"))),
            ..MockApi::default()
        });

        let user = core.login("a@b.com", "secret1").unwrap();
        assert_eq!(user.id, "1");
        assert!(core.session().is_authenticated());
        assert_eq!(core.session().token.as_deref(), Some("jwt1"));
        // Credential propagated to the gateway for subsequent calls.
        assert_eq!(api_token.borrow().as_deref(), Some("jwt1"));

        // Write-through: storage deserializes back to the in-memory session.
        assert_eq!(core.store.stored_token().as_deref(), Some("jwt1"));
        let stored: User = serde_json::from_str(&core.store.stored_user().unwrap()).unwrap();
        assert_eq!(Some(stored), core.session().user);
    }

    #[test]
    fn test_login_failure_stays_anonymous() {
        let (mut core, _, _) = core_with(MockApi {
            fail_message: Some("Invalid credentials".to_string()),
            ..MockApi::default()
        });

        let err = core.login("a@b.com", "wrong12").unwrap_err();
        assert_eq!(err, AuthError::Request("Invalid credentials".to_string()));
        assert!(!core.session().is_authenticated());
        assert!(core.store.stored_token().is_none());
        assert!(core.store.stored_user().is_none());
    }

    #[test]
    fn test_logout_is_idempotent() {
        let (mut core, _, api_token) = core_with(MockApi {
            login_ok: Some(("jwt1".to_string(), sample_user("1"))),
            ..MockApi::default()
        });

        core.login("a@b.com", "secret1").unwrap();
        core.logout();
        assert!(!core.session().is_authenticated());
        assert!(api_token.borrow().is_none());

        // Logging out while anonymous changes nothing and storage stays empty.
        core.logout();
        assert_eq!(*core.session(), Session::default());
        assert!(core.store.stored_token().is_none());
        assert!(core.store.stored_user().is_none());
    }

    #[test]
    fn test_register_short_password_never_calls_gateway() {
        let (mut core, calls, _) = core_with(MockApi::default());

        let err = core.register("A", "a@b.com", "abc", "abc").unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        assert!(err.message().contains("at least 6 characters"));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_register_mismatch_never_calls_gateway() {
        let (mut core, calls, _) = core_with(MockApi::default());

        let err = core
            .register("A", "a@b.com", "secret1", "secret2")
            .unwrap_err();
        assert_eq!(
            err,
            AuthError::Validation("Passwords do not match".to_string())
        );
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_register_success_creates_no_session() {
        let (mut core, calls, _) = core_with(MockApi::default());

        core.register("A", "a@b.com", "secret1", "secret1").unwrap();
        assert_eq!(*calls.borrow(), vec!["register".to_string()]);
        assert!(!core.session().is_authenticated());
        assert!(core.store.stored_token().is_none());
    }

    #[test]
    fn test_update_profile_replaces_cached_user() {
        let mut renamed = sample_user("1");
        renamed.name = "B".to_string();
        let (mut core, _, _) = core_with(MockApi {
            login_ok: Some(("jwt1".to_string(), sample_user("1"))),
            update_ok: Some(renamed.clone()),
            ..MockApi::default()
        });
        core.login("a@b.com", "secret1").unwrap();

        let patch = UserPatch {
            name: Some("B".to_string()),
            email: None,
        };
        let user = core.update_profile(&patch).unwrap();
        assert_eq!(user, renamed);
        assert_eq!(core.session().user, Some(renamed.clone()));
        let stored: User = serde_json::from_str(&core.store.stored_user().unwrap()).unwrap();
        assert_eq!(stored, renamed);
    }

    #[test]
    fn test_update_profile_failure_leaves_session_unchanged() {
        let (mut core, _, _) = core_with(MockApi {
            login_ok: Some(("jwt1".to_string(), sample_user("1"))),
            update_fail: Some("Email already in use".to_string()),
            ..MockApi::default()
        });
        core.login("a@b.com", "secret1").unwrap();
        let before = core.session().clone();
        let stored_before = core.store.stored_user();

        let patch = UserPatch {
            name: None,
            email: Some("taken@b.com".to_string()),
        };
        let err = core.update_profile(&patch).unwrap_err();
        assert_eq!(err, AuthError::Request("Email already in use".to_string()));
        assert_eq!(*core.session(), before);
        assert_eq!(core.store.stored_user(), stored_before);
    }

    #[test]
    fn test_update_profile_empty_patch_is_rejected_locally() {
        let (mut core, calls, _) = core_with(MockApi {
            login_ok: Some(("jwt1".to_string(), sample_user("1"))),
            ..MockApi::default()
        });
        core.login("a@b.com", "secret1").unwrap();
        calls.borrow_mut().clear();

        let err = core.update_profile(&UserPatch::default()).unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_update_profile_requires_session() {
        let (mut core, calls, _) = core_with(MockApi::default());
        let patch = UserPatch {
            name: Some("B".to_string()),
            email: None,
        };
        let err = core.update_profile(&patch).unwrap_err();
        assert_eq!(err, AuthError::Validation("Not signed in".to_string()));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_hydrate_empty_storage_is_anonymous() {
        let (mut core, calls, _) = core_with(MockApi::default());
        assert_eq!(core.hydrate(), HydrateOutcome::Anonymous);
        assert!(!core.session().is_authenticated());
        assert!(calls.borrow().is_empty());
        assert!(core.store.hydrated());
    }

    #[test]
    fn test_hydrate_refreshes_snapshot_from_server() {
        let mut canonical = sample_user("u1");
        canonical.name = "A (updated)".to_string();
        let api = MockApi {
            get_user_ok: Some(canonical.clone()),
            ..MockApi::default()
        };
        let calls = api.calls.clone();
        let store = seeded_store(
            "t1",
            &serde_json::to_string(&sample_user("u1")).unwrap(),
        );
        let mut core = AuthCore::new(Box::new(api), store);

        assert_eq!(core.hydrate(), HydrateOutcome::Restored);
        assert_eq!(*calls.borrow(), vec!["get_user".to_string()]);
        assert_eq!(core.session().user, Some(canonical));
        assert_eq!(core.session().token.as_deref(), Some("t1"));
    }

    #[test]
    fn test_hydrate_keeps_snapshot_when_fetch_fails() {
        // Intentional availability-over-freshness trade-off: a failed refresh
        // retains the stored snapshot rather than dropping to anonymous.
        let api = MockApi {
            fail_message: Some("service unavailable".to_string()),
            ..MockApi::default()
        };
        let snapshot = sample_user("u1");
        let store = seeded_store("t1", &serde_json::to_string(&snapshot).unwrap());
        let mut core = AuthCore::new(Box::new(api), store);

        assert_eq!(core.hydrate(), HydrateOutcome::Fallback);
        assert_eq!(core.session().user, Some(snapshot));
        assert_eq!(core.session().token.as_deref(), Some("t1"));
        assert!(core.session().is_authenticated());
    }

    #[test]
    fn test_hydrate_corrupt_user_wipes_storage() {
        let (api, calls) = {
            let api = MockApi::default();
            let calls = api.calls.clone();
            (api, calls)
        };
        let store = seeded_store("t1", "not json");
        let mut core = AuthCore::new(Box::new(api), store);

        assert_eq!(core.hydrate(), HydrateOutcome::Wiped);
        assert!(!core.session().is_authenticated());
        assert!(core.store.stored_token().is_none());
        assert!(core.store.stored_user().is_none());
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_hydrate_half_session_is_cleared() {
        let mut storage = MemoryStorage::new();
        storage.set(TOKEN_KEY, "t1");
        let store = SessionStore::new(Box::new(storage));
        let mut core = AuthCore::new(Box::new(MockApi::default()), store);

        assert_eq!(core.hydrate(), HydrateOutcome::Wiped);
        assert!(!core.session().is_authenticated());
        assert!(core.store.stored_token().is_none());
    }

    #[test]
    fn test_confirm_reset_mismatch_sends_no_request() {
        let (core, calls, _) = core_with(MockApi::default());
        let err = core
            .confirm_reset("a@b.com", "t1", "secret1", "secret2")
            .unwrap_err();
        assert_eq!(
            err,
            AuthError::Validation("Passwords do not match".to_string())
        );
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_confirm_reset_creates_no_session() {
        let (core, calls, _) = core_with(MockApi::default());
        core.confirm_reset("a@b.com", "t1", "secret1", "secret1")
            .unwrap();
        assert_eq!(*calls.borrow(), vec!["reset_password".to_string()]);
        assert!(!core.session().is_authenticated());
    }

    #[test]
    fn test_verify_reset_token_is_read_only() {
        let (core, _, _) = core_with(MockApi::default());
        assert!(core.verify_reset_token("valid", "a@b.com").unwrap());
        assert!(!core.verify_reset_token("expired", "a@b.com").unwrap());
        assert!(!core.session().is_authenticated());
    }

    #[test]
    fn test_delete_own_account_ends_session() {
        let (mut core, _, api_token) = core_with(MockApi {
            login_ok: Some(("jwt1".to_string(), sample_user("1"))),
            ..MockApi::default()
        });
        core.login("a@b.com", "secret1").unwrap();

        core.delete_user("1").unwrap();
        assert!(!core.session().is_authenticated());
        assert!(api_token.borrow().is_none());
        assert!(core.store.stored_token().is_none());
    }

    #[test]
    fn test_delete_other_account_keeps_session() {
        let (mut core, _, _) = core_with(MockApi {
            login_ok: Some(("jwt1".to_string(), sample_user("1"))),
            ..MockApi::default()
        });
        core.login("a@b.com", "secret1").unwrap();

        core.delete_user("2").unwrap();
        assert!(core.session().is_authenticated());
    }

    #[test]
    fn test_list_users_surfaces_server_error() {
        let (core, _, _) = core_with(MockApi {
            fail_message: Some("Admin access required".to_string()),
            ..MockApi::default()
        });
        let err = core.list_users().unwrap_err();
        assert_eq!(err, AuthError::Request("Admin access required".to_string()));
    }
}
