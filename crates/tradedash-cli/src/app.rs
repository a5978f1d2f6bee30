//! Wiring of configuration, auth provider, session store and API client.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{debug, warn};

use tradedash_core::api::ApiClient;
use tradedash_core::auth::{CredentialStore, GoTrueProvider, SessionCipher, SessionFile, SessionStore};
use tradedash_core::config::{Config, ENV_AUTH_ANON_KEY, ENV_AUTH_URL};

pub struct App {
    pub config: Config,
    pub api: ApiClient,
    store: Option<Arc<SessionStore>>,
}

/// Restore the saved session and initialize the store around it. A failed
/// lookup leaves the store signed out; public commands still run.
async fn start_session_store(provider: GoTrueProvider) -> Arc<SessionStore> {
    if let Err(e) = provider.restore().await {
        warn!(error = %e, "Ignoring unreadable saved session");
    }

    let store = Arc::new(SessionStore::new(Arc::new(provider)));
    if let Err(e) = store.initialize().await {
        warn!(error = %e, "Initial session lookup failed");
    }
    store
}

impl App {
    /// Build the app from the saved configuration. Without an auth service
    /// configured only the public endpoints are usable.
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        let api = ApiClient::new(&config.api_url())?;
        debug!(api_url = %api.base_url(), "Backend configured");

        let store = match (config.auth_url(), config.auth_anon_key()) {
            (Some(auth_url), Some(anon_key)) => {
                let provider = GoTrueProvider::new(&auth_url, &anon_key)?;
                let provider = match Self::session_file(&config) {
                    Some(file) => provider.with_storage(file),
                    None => provider,
                };
                Some(start_session_store(provider).await)
            }
            _ => None,
        };

        let api = match store {
            Some(ref store) => api.with_token_source(store.clone()),
            None => api,
        };

        Ok(Self { config, api, store })
    }

    /// Where the session is persisted. Encryption needs the OS keychain; if it
    /// is unavailable the session only lives for this process.
    fn session_file(config: &Config) -> Option<SessionFile> {
        let dir = match config.data_dir() {
            Ok(dir) => dir,
            Err(e) => {
                warn!(error = %e, "No data directory, session will not be saved");
                return None;
            }
        };

        if !config.encrypt_session {
            return Some(SessionFile::new(&dir));
        }
        match CredentialStore::session_key() {
            Ok(key) => Some(SessionFile::encrypted(&dir, SessionCipher::new(key))),
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Keychain unavailable, session will not be saved");
                None
            }
        }
    }

    pub fn store(&self) -> Result<&Arc<SessionStore>> {
        self.store.as_ref().ok_or_else(|| {
            anyhow!(
                "Auth service not configured. Set {} and {} (or auth_url and auth_anon_key in the config file)",
                ENV_AUTH_URL,
                ENV_AUTH_ANON_KEY
            )
        })
    }

    pub fn remember_email(&mut self, email: &str) {
        if self.config.last_email.as_deref() == Some(email) {
            return;
        }
        self.config.last_email = Some(email.to_string());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }
}
