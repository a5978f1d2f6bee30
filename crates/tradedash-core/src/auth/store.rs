//! Process-wide authentication state.
//!
//! The `SessionStore` mirrors the auth provider's session. It is written by
//! two sources: the imperative operations (`sign_in`, `sign_out`, ...) and a
//! background listener applying the provider's change notifications. Every
//! update carries the provider's sequence number and updates older than the
//! one already applied are dropped, so a late result can never overwrite a
//! newer session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::TokenSource;

use super::provider::{AuthError, AuthProvider, AuthStateChange, SignUpResponse};
use super::session::{Session, SessionSnapshot, User};

/// Lifecycle of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePhase {
    Uninitialized,
    Loading,
    Ready,
}

/// Snapshot of the authentication state.
/// The user is derived from the session, so one is present iff the other is.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthState {
    pub session: Option<Session>,
    pub loading: bool,
    pub phase: StorePhase,
    /// Sequence number of the last applied provider update
    pub sequence: u64,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            session: None,
            loading: true,
            phase: StorePhase::Uninitialized,
            sequence: 0,
        }
    }
}

impl AuthState {
    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }
}

struct Shared {
    state: watch::Sender<AuthState>,
}

impl Shared {
    /// Apply a provider snapshot unless a newer one is already in place.
    /// Returns whether the snapshot was applied.
    fn apply(&self, snapshot: SessionSnapshot) -> bool {
        self.state.send_if_modified(|state| {
            if snapshot.sequence < state.sequence {
                debug!(
                    stale = snapshot.sequence,
                    current = state.sequence,
                    "Ignoring stale session update"
                );
                return false;
            }
            let changed = state.sequence != snapshot.sequence || state.session != snapshot.session;
            state.sequence = snapshot.sequence;
            state.session = snapshot.session;
            changed
        })
    }
}

pub struct SessionStore {
    provider: Arc<dyn AuthProvider>,
    shared: Arc<Shared>,
    initialized: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            provider,
            shared: Arc::new(Shared { state }),
            initialized: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    pub fn state(&self) -> AuthState {
        self.shared.state.borrow().clone()
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.shared.state.subscribe()
    }

    pub fn session(&self) -> Option<Session> {
        self.shared.state.borrow().session.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.shared.state.borrow().user().cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.state.borrow().loading
    }

    /// Register a new account. Local state is left alone; an auto-confirmed
    /// account reaches the store through the provider's change notification.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResponse, AuthError> {
        self.provider.sign_up(email, password).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let snapshot = self.provider.sign_in_with_password(email, password).await?;
        let session = snapshot
            .session
            .clone()
            .ok_or_else(|| AuthError::InvalidResponse("Sign-in returned no session".to_string()))?;
        self.shared.apply(snapshot);
        Ok(session)
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let snapshot = self.provider.sign_out().await?;
        self.shared.apply(snapshot);
        Ok(())
    }

    /// Load the current session and start following provider notifications.
    ///
    /// Runs once per store; later calls return immediately without registering
    /// another listener. The listener is started even when the initial lookup
    /// fails so the store recovers on the next notification.
    pub async fn initialize(&self) -> Result<(), AuthError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("Session store already initialized");
            return Ok(());
        }

        self.shared.state.send_modify(|state| {
            state.loading = true;
            state.phase = StorePhase::Loading;
        });

        // Subscribe before the lookup so no change in between is lost
        let events = self.provider.subscribe();
        let result = self.provider.get_session().await;
        match result {
            Ok(ref snapshot) => {
                self.shared.apply(snapshot.clone());
            }
            Err(ref e) => warn!(error = %e, "Failed to load current session"),
        }

        self.shared.state.send_modify(|state| {
            state.loading = false;
            state.phase = StorePhase::Ready;
        });

        let handle = tokio::spawn(listen(Arc::clone(&self.shared), events));
        if let Ok(mut listener) = self.listener.lock() {
            *listener = Some(handle);
        }

        if let Some(user) = self.user() {
            info!(user = %user.id, "Session store ready");
        } else {
            info!("Session store ready, signed out");
        }
        result.map(|_| ())
    }
}

async fn listen(shared: Arc<Shared>, mut events: broadcast::Receiver<AuthStateChange>) {
    loop {
        match events.recv().await {
            Ok(change) => {
                debug!(event = ?change.event, sequence = change.sequence, "Auth state change");
                shared.apply(change.snapshot());
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // Later notifications carry the full session, nothing to replay
                warn!(skipped, "Auth state listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Auth provider closed its notification channel");
                break;
            }
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(handle) = listener.take() {
                handle.abort();
            }
        }
    }
}

#[async_trait]
impl TokenSource for SessionStore {
    /// Ask the provider (which may refresh the session), then hand out the
    /// newest token the store knows.
    async fn access_token(&self) -> Option<String> {
        match self.provider.get_session().await {
            Ok(snapshot) => {
                self.shared.apply(snapshot);
            }
            Err(e) => warn!(error = %e, "Session lookup failed, using cached session"),
        }
        self.session()
            .map(|s| s.access_token)
            .filter(|t| !t.is_empty())
    }
}
