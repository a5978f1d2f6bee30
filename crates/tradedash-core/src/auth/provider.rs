use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use super::session::{Session, SessionSnapshot, User};

#[derive(Error, Debug)]
pub enum AuthError {
    /// Error reported by the provider, message passed through untouched
    #[error("{message}")]
    Provider { status: u16, message: String },

    #[error("Auth service unreachable: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid auth response: {0}")]
    InvalidResponse(String),

    #[error("Session storage error: {0}")]
    Storage(String),
}

impl AuthError {
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Kind of session change announced by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChangeEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// Notification emitted whenever the provider's session changes
#[derive(Debug, Clone, PartialEq)]
pub struct AuthStateChange {
    pub event: AuthChangeEvent,
    pub session: Option<Session>,
    pub sequence: u64,
}

impl AuthStateChange {
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.session.clone(),
            sequence: self.sequence,
        }
    }
}

/// Result of a sign-up. Providers that require email confirmation return a
/// user without a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SignUpResponse {
    pub user: Option<User>,
    pub session: Option<Session>,
}

/// An external authentication provider.
///
/// Every mutation of the provider's session is stamped with a sequence number
/// that increases monotonically. Results of the imperative operations and the
/// change notifications for the same mutation carry the same number, so
/// consumers can discard whichever arrives late.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Current session, refreshed first if it is about to expire
    async fn get_session(&self) -> Result<SessionSnapshot, AuthError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResponse, AuthError>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<SessionSnapshot, AuthError>;

    async fn sign_out(&self) -> Result<SessionSnapshot, AuthError>;

    /// Receive every session change from now on
    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange>;
}
