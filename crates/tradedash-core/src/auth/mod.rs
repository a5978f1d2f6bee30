//! Authentication module for managing user sessions.
//!
//! This module provides:
//! - `Session`, `User`: credentials issued by the auth provider
//! - `AuthProvider`: the external provider seam, with `GoTrueProvider` as the
//!   concrete implementation
//! - `SessionStore`: process-wide state kept in sync with provider notifications
//! - `SessionFile`, `CredentialStore`: encrypted session persistence with the
//!   key held in the OS keychain

pub mod credentials;
pub mod gotrue;
pub mod provider;
pub mod session;
pub mod storage;
pub mod store;

pub use credentials::CredentialStore;
pub use gotrue::GoTrueProvider;
pub use provider::{AuthChangeEvent, AuthError, AuthProvider, AuthStateChange, SignUpResponse};
pub use session::{Session, SessionSnapshot, User};
pub use storage::{SessionCipher, SessionFile};
pub use store::{AuthState, SessionStore, StorePhase};
