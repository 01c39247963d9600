//! Authentication lifecycle and the current user identity.
//!
//! State machine: `Uninitialized → Checking → {Authenticated | Anonymous}`,
//! then `Anonymous ⇄ Authenticated` via login/signup/logout. The manager is
//! an explicitly constructed service object passed to consumers by
//! reference, never a process-wide singleton.
//!
//! Credential rejection is a recoverable, non-fatal condition: a failed
//! token validation clears the persisted session and lands in `Anonymous`
//! without surfacing an error. Local input validation always runs before
//! any network call, so bad input costs nothing.
//!
//! Persistence failures inside the session manager are logged and never
//! surfaced: a disk hiccup must not lock a user out of an otherwise valid
//! in-memory session.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::api::client::ApiClient;
use crate::api::error::ApiError;
use crate::store::LocalStore;
use crate::types::{AuthToken, ProfileUpdate, User};

/// Storage key for the persisted session record.
const SESSION_KEY: &str = "session";

/// Current session record version. Unknown versions read as absent.
const SESSION_RECORD_VERSION: u32 = 1;

/// Durable `{token, user}` pair, written atomically on every change.
#[derive(Serialize, Deserialize, Debug)]
struct SessionRecord {
    version: u32,
    token: AuthToken,
    user: User,
}

/// Where the session currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Before `load_persisted()` has run.
    Uninitialized,
    /// A restored token is being validated against the identity endpoint.
    Checking,
    /// No valid session.
    Anonymous,
    /// A validated session for this user.
    Authenticated(User),
}

struct Session {
    state: SessionState,
    token: Option<AuthToken>,
}

struct SessionInner {
    api: ApiClient,
    store: LocalStore,
    session: Mutex<Session>,
    /// Gate: at most one mutating operation (login/signup/update_profile)
    /// in flight at a time.
    mutating: AtomicBool,
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the mutation gate when the operation finishes, error paths
/// included.
struct MutationGuard {
    inner: Arc<SessionInner>,
}

impl Drop for MutationGuard {
    fn drop(&mut self) {
        self.inner.mutating.store(false, Ordering::SeqCst);
    }
}

/// Owner of the authentication lifecycle and the current user identity.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(api: ApiClient, store: LocalStore) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                api,
                store,
                session: Mutex::new(Session {
                    state: SessionState::Uninitialized,
                    token: None,
                }),
                mutating: AtomicBool::new(false),
            }),
        }
    }

    // ── Observation ────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.inner.lock().state.clone()
    }

    pub fn current_user(&self) -> Option<User> {
        match &self.inner.lock().state {
            SessionState::Authenticated(user) => Some(user.clone()),
            _ => None,
        }
    }

    pub fn token(&self) -> Option<AuthToken> {
        self.inner.lock().token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.inner.lock().state, SessionState::Authenticated(_))
    }

    /// Whether a mutating session operation is in flight. UI actions that
    /// would start another one should be gated on this.
    pub fn is_loading(&self) -> bool {
        self.inner.mutating.load(Ordering::SeqCst)
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Restore a previously stored session, if any, and validate it.
    /// Absence of a stored record transitions directly to `Anonymous`
    /// without any network call.
    pub async fn load_persisted(&self) {
        let record = self
            .inner
            .store
            .get::<SessionRecord>(SESSION_KEY)
            .filter(|r| {
                if r.version == SESSION_RECORD_VERSION {
                    true
                } else {
                    warn!("ignoring session record with unknown version {}", r.version);
                    false
                }
            });

        match record {
            None => {
                self.inner.lock().state = SessionState::Anonymous;
            }
            Some(record) => self.validate(record.token).await,
        }
    }

    /// Validate a token against the identity endpoint. Success refreshes
    /// the persisted user; any failure (an expired or rejected token
    /// included) clears the persisted session and lands in `Anonymous`.
    /// Never surfaces an error: this is a recoverable condition.
    pub async fn validate(&self, token: AuthToken) {
        {
            let mut session = self.inner.lock();
            session.state = SessionState::Checking;
            session.token = Some(token.clone());
        }

        match self.inner.api.me(&token).await {
            Ok(user) => {
                self.apply_authenticated(user, token);
            }
            Err(e) => {
                debug!("token validation failed ({e}); continuing anonymously");
                self.clear_session();
            }
        }
    }

    /// Log in with credentials. Local validation runs first and fails
    /// synchronously with [`ApiError::Validation`] at zero network cost.
    /// On remote failure the state remains `Anonymous`.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        validate_login(email, password)?;
        let _guard = self.begin_mutation()?;

        let auth = self.inner.api.login(email, password).await?;
        self.apply_authenticated(auth.user.clone(), auth.token);
        Ok(auth.user)
    }

    /// Create an account and log in. Same pattern as [`login`](Self::login)
    /// with the additional signup checks.
    pub async fn signup(&self, name: &str, email: &str, password: &str) -> Result<User, ApiError> {
        validate_signup(name, email, password)?;
        let _guard = self.begin_mutation()?;

        let auth = self.inner.api.signup(name, email, password).await?;
        self.apply_authenticated(auth.user.clone(), auth.token);
        Ok(auth.user)
    }

    /// Clear the session locally and notify the server best-effort. Local
    /// cleanup is synchronous and unconditional; the remote logout call is
    /// fire-and-forget and its failure never blocks it.
    pub fn logout(&self) {
        let token = {
            let mut session = self.inner.lock();
            session.state = SessionState::Anonymous;
            session.token.take()
        };
        if let Err(e) = self.inner.store.remove(SESSION_KEY) {
            warn!("failed to clear persisted session: {e}");
        }

        if let Some(token) = token {
            let api = self.inner.api.clone();
            tokio::spawn(async move {
                if let Err(e) = api.logout(&token).await {
                    debug!("remote logout failed (ignored): {e}");
                }
            });
        }
    }

    /// Apply a partial profile update. Requires an authenticated session
    /// and waits for server confirmation before mutating anything, not
    /// optimistically. A 401 clears the session before the error is returned.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        let token = self.token().ok_or(ApiError::AuthExpired)?;
        let _guard = self.begin_mutation()?;

        match self.inner.api.update_profile(&token, update).await {
            Ok(user) => {
                self.apply_authenticated(user.clone(), token);
                Ok(user)
            }
            Err(ApiError::AuthExpired) => {
                self.clear_session();
                Err(ApiError::AuthExpired)
            }
            Err(e) => Err(e),
        }
    }

    // ── Internals ──────────────────────────────────────────────────

    fn begin_mutation(&self) -> Result<MutationGuard, ApiError> {
        if self.inner.mutating.swap(true, Ordering::SeqCst) {
            return Err(ApiError::Busy);
        }
        Ok(MutationGuard {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Persist `{token, user}` atomically, then transition to
    /// `Authenticated`.
    fn apply_authenticated(&self, user: User, token: AuthToken) {
        let record = SessionRecord {
            version: SESSION_RECORD_VERSION,
            token: token.clone(),
            user: user.clone(),
        };
        if let Err(e) = self.inner.store.put(SESSION_KEY, &record) {
            warn!("failed to persist session (continuing in memory): {e}");
        }
        let mut session = self.inner.lock();
        session.state = SessionState::Authenticated(user);
        session.token = Some(token);
    }

    fn clear_session(&self) {
        if let Err(e) = self.inner.store.remove(SESSION_KEY) {
            warn!("failed to clear persisted session: {e}");
        }
        let mut session = self.inner.lock();
        session.state = SessionState::Anonymous;
        session.token = None;
    }

    #[cfg(test)]
    fn set_authenticated_for_test(&self, user: User, token: AuthToken) {
        self.apply_authenticated(user, token);
    }
}

// ── Input validation ───────────────────────────────────────────────

/// Minimum accepted password length.
const MIN_PASSWORD_LEN: usize = 6;

fn validate_login(email: &str, password: &str) -> Result<(), ApiError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(ApiError::Validation(
            "email and password are required".into(),
        ));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_signup(name: &str, email: &str, password: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
        return Err(ApiError::Validation(
            "name, email and password are required".into(),
        ));
    }
    if !email.contains('@') {
        return Err(ApiError::Validation("email address is invalid".into()));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────
