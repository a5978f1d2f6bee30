//! Auth provider backed by a GoTrue-compatible REST service.
//!
//! The provider owns the current session: it persists it (when a
//! `SessionFile` is attached), refreshes it shortly before expiry, and
//! broadcasts every change to subscribers.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use super::provider::{AuthChangeEvent, AuthError, AuthProvider, AuthStateChange, SignUpResponse};
use super::session::{Session, SessionSnapshot, User};
use super::storage::SessionFile;

/// HTTP request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Capacity of the change notification channel.
/// Session changes are rare; slow subscribers only ever need the latest one.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Header carrying the project's public API key
const API_KEY_HEADER: &str = "apikey";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    user: User,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .or_else(|| {
                self.expires_in
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
            });
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            token_type: self.token_type.unwrap_or_else(|| "bearer".to_string()),
            expires_at,
            user: self.user,
        }
    }
}

/// Sign-up answers either with a session (auto-confirmed accounts), a bare
/// user (confirmation pending), or a `{user, session}` pair.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpBody {
    Session(TokenResponse),
    User(User),
    Wrapped {
        #[serde(default)]
        user: Option<User>,
        #[serde(default)]
        session: Option<TokenResponse>,
    },
}

struct ProviderState {
    session: Option<Session>,
    sequence: u64,
}

pub struct GoTrueProvider {
    client: Client,
    auth_url: String,
    anon_key: String,
    state: Mutex<ProviderState>,
    events: broadcast::Sender<AuthStateChange>,
    storage: Option<SessionFile>,
}

impl GoTrueProvider {
    /// `auth_url` is the GoTrue root, e.g. `https://<project>.supabase.co/auth/v1`
    pub fn new(auth_url: &str, anon_key: &str) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            client,
            auth_url: auth_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            state: Mutex::new(ProviderState {
                session: None,
                sequence: 0,
            }),
            events,
            storage: None,
        })
    }

    /// Persist sessions through `storage`
    pub fn with_storage(mut self, storage: SessionFile) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Load a previously persisted session, if any. Does not notify subscribers.
    pub async fn restore(&self) -> Result<Option<Session>, AuthError> {
        let Some(ref storage) = self.storage else {
            return Ok(None);
        };
        let session = storage
            .load()
            .map_err(|e| AuthError::Storage(format!("{:#}", e)))?;

        let mut state = self.state.lock().await;
        if let Some(ref s) = session {
            debug!(user = %s.user.id, "Restored persisted session");
            state.session = Some(s.clone());
            state.sequence += 1;
        }
        Ok(session)
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(API_KEY_HEADER, &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    /// Pull the provider's message out of an error body
    fn error_message(body: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        ["msg", "error_description", "message", "error"]
            .iter()
            .find_map(|key| value.get(key)?.as_str().map(str::to_string))
    }

    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, AuthError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = Self::error_message(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Authentication request failed")
                .to_string()
        });
        Err(AuthError::Provider {
            status: status.as_u16(),
            message,
        })
    }

    async fn token_request(&self, grant_type: &str, body: serde_json::Value) -> Result<Session, AuthError> {
        let url = format!("{}/token?grant_type={}", self.auth_url, grant_type);
        let response = self
            .request(self.client.post(&url))
            .json(&body)
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        Ok(token.into_session())
    }

    /// Install a new session (or none), persist it and notify subscribers.
    /// Must be called with the state lock held so sequence and event order agree.
    fn commit(&self, state: &mut ProviderState, event: AuthChangeEvent, session: Option<Session>) -> SessionSnapshot {
        state.sequence += 1;
        state.session = session;

        if let Some(ref storage) = self.storage {
            let result = match state.session {
                Some(ref s) => storage.save(s),
                None => storage.clear(),
            };
            if let Err(e) = result {
                warn!(error = %format!("{:#}", e), "Failed to persist session");
            }
        }

        let change = AuthStateChange {
            event,
            session: state.session.clone(),
            sequence: state.sequence,
        };
        if self.events.send(change).is_err() {
            debug!(?event, "No subscribers for auth state change");
        }

        SessionSnapshot {
            session: state.session.clone(),
            sequence: state.sequence,
        }
    }

    fn snapshot(state: &ProviderState) -> SessionSnapshot {
        SessionSnapshot {
            session: state.session.clone(),
            sequence: state.sequence,
        }
    }
}

#[async_trait]
impl AuthProvider for GoTrueProvider {
    async fn get_session(&self) -> Result<SessionSnapshot, AuthError> {
        // Held across the refresh so concurrent callers don't refresh twice
        let mut state = self.state.lock().await;

        let Some(session) = state.session.clone() else {
            return Ok(Self::snapshot(&state));
        };
        if !session.needs_refresh() {
            return Ok(Self::snapshot(&state));
        }

        let Some(refresh_token) = session.refresh_token.clone().filter(|t| !t.is_empty()) else {
            if session.is_expired() {
                info!(user = %session.user.id, "Session expired");
                return Ok(self.commit(&mut state, AuthChangeEvent::SignedOut, None));
            }
            return Ok(Self::snapshot(&state));
        };

        debug!(user = %session.user.id, "Refreshing session");
        match self
            .token_request("refresh_token", serde_json::json!({ "refresh_token": refresh_token }))
            .await
        {
            Ok(refreshed) => Ok(self.commit(&mut state, AuthChangeEvent::TokenRefreshed, Some(refreshed))),
            Err(AuthError::Provider { status, message }) if (400..500).contains(&status) => {
                warn!(status, message = %message, "Refresh token rejected, signing out");
                Ok(self.commit(&mut state, AuthChangeEvent::SignedOut, None))
            }
            Err(e) if session.is_expired() => Err(e),
            Err(e) => {
                warn!(error = %e, "Session refresh failed, keeping current token");
                Ok(Self::snapshot(&state))
            }
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResponse, AuthError> {
        let url = format!("{}/signup", self.auth_url);
        let response = self
            .request(self.client.post(&url))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        let body: SignUpBody = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        let (user, session) = match body {
            SignUpBody::Session(token) => {
                let session = token.into_session();
                (Some(session.user.clone()), Some(session))
            }
            SignUpBody::User(user) => (Some(user), None),
            SignUpBody::Wrapped { user, session } => (user, session.map(TokenResponse::into_session)),
        };

        // Auto-confirmed accounts are signed in immediately
        if let Some(ref s) = session {
            info!(user = %s.user.id, "Signed up and signed in");
            let mut state = self.state.lock().await;
            self.commit(&mut state, AuthChangeEvent::SignedIn, Some(s.clone()));
        } else {
            info!("Signed up, confirmation pending");
        }

        Ok(SignUpResponse { user, session })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<SessionSnapshot, AuthError> {
        let session = self
            .token_request("password", serde_json::json!({ "email": email, "password": password }))
            .await?;
        info!(user = %session.user.id, "Signed in");

        let mut state = self.state.lock().await;
        Ok(self.commit(&mut state, AuthChangeEvent::SignedIn, Some(session)))
    }

    async fn sign_out(&self) -> Result<SessionSnapshot, AuthError> {
        let mut state = self.state.lock().await;

        if let Some(ref session) = state.session {
            let url = format!("{}/logout", self.auth_url);
            let response = self
                .client
                .post(&url)
                .header(API_KEY_HEADER, &self.anon_key)
                .bearer_auth(&session.access_token)
                .send()
                .await?;

            // A token the server no longer knows is as good as signed out
            match Self::check_response(response).await {
                Ok(_) => {}
                Err(AuthError::Provider { status: 401 | 403 | 404, .. }) => {
                    debug!("Server already discarded the session");
                }
                Err(e) => return Err(e),
            }
        }

        info!("Signed out");
        Ok(self.commit(&mut state, AuthChangeEvent::SignedOut, None))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange> {
        self.events.subscribe()
    }
}
