//! Controller for the settings form.
//!
//! Holds the locally edited copy of the settings record plus the transient
//! status flags a front end renders: `loading` while the record is fetched,
//! `saving` while a submit is in flight, a short-lived `success` flag after a
//! save, and an error message.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::{Acknowledgement, ApiEnvelope};

use super::record::{SettingsField, SettingsRecord};

/// Shown when the settings cannot be loaded, whatever the cause
pub const LOAD_ERROR_MESSAGE: &str = "Failed to load settings";

/// How long the success flag stays up after a save
pub const SUCCESS_BANNER_DURATION: Duration = Duration::from_millis(3000);

/// Backend operations the form needs
#[async_trait]
pub trait SettingsApi: Send + Sync {
    async fn fetch_settings(&self) -> Result<ApiEnvelope<SettingsRecord>, ApiError>;

    async fn save_settings(&self, record: &SettingsRecord) -> Result<Acknowledgement, ApiError>;
}

#[async_trait]
impl SettingsApi for ApiClient {
    async fn fetch_settings(&self) -> Result<ApiEnvelope<SettingsRecord>, ApiError> {
        self.user_settings().await
    }

    async fn save_settings(&self, record: &SettingsRecord) -> Result<Acknowledgement, ApiError> {
        self.update_user_settings(record).await
    }
}

#[derive(Error, Debug)]
pub enum FormError {
    #[error("A save is already in progress")]
    SaveInProgress,

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormStatus {
    pub loading: bool,
    pub saving: bool,
    pub success: bool,
    pub error: Option<String>,
}

impl Default for FormStatus {
    fn default() -> Self {
        Self {
            loading: true,
            saving: false,
            success: false,
            error: None,
        }
    }
}

#[derive(Default)]
struct FormState {
    record: SettingsRecord,
    status: FormStatus,
}

pub struct SettingsForm<A: SettingsApi> {
    api: A,
    state: Arc<Mutex<FormState>>,
    success_timer: Mutex<Option<JoinHandle<()>>>,
    success_duration: Duration,
}

impl<A: SettingsApi> SettingsForm<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            state: Arc::new(Mutex::new(FormState::default())),
            success_timer: Mutex::new(None),
            success_duration: SUCCESS_BANNER_DURATION,
        }
    }

    pub fn with_success_duration(mut self, duration: Duration) -> Self {
        self.success_duration = duration;
        self
    }

    fn lock(&self) -> MutexGuard<'_, FormState> {
        // Form state stays usable even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self) -> FormStatus {
        self.lock().status.clone()
    }

    pub fn record(&self) -> SettingsRecord {
        self.lock().record.clone()
    }

    pub fn set_field(&self, field: SettingsField, value: impl Into<String>) {
        self.lock().record.set(field, value);
    }

    /// Fetch the stored settings into the form.
    /// The local record is replaced only by a successful envelope with data.
    pub async fn load(&self) -> Result<(), FormError> {
        {
            let mut state = self.lock();
            state.status.loading = true;
            state.status.error = None;
        }

        let result = self.api.fetch_settings().await;

        let mut state = self.lock();
        state.status.loading = false;
        match result {
            Ok(envelope) => {
                if let Some(record) = envelope.into_data() {
                    state.record = record;
                } else {
                    debug!("Settings response carried no data, keeping local values");
                }
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to load settings");
                state.status.error = Some(LOAD_ERROR_MESSAGE.to_string());
                Err(e.into())
            }
        }
    }

    /// Send the whole record to the backend.
    /// Rejected while another submit is still in flight.
    pub async fn submit(&self) -> Result<(), FormError> {
        let record = {
            let mut state = self.lock();
            if state.status.saving {
                return Err(FormError::SaveInProgress);
            }
            state.status.error = None;
            state.status.success = false;
            state.status.saving = true;
            state.record.clone()
        };
        self.cancel_success_timer();

        let result = self.api.save_settings(&record).await;

        let mut state = self.lock();
        state.status.saving = false;
        match result {
            Ok(ack) => {
                if !ack.success {
                    warn!(message = ?ack.message, "Backend acknowledged settings without success");
                }
                state.status.success = true;
                drop(state);
                self.schedule_success_reset();
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to update settings");
                state.status.error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    fn schedule_success_reset(&self) {
        let state = Arc::clone(&self.state);
        let delay = self.success_duration;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.status.success = false;
        });

        if let Ok(mut timer) = self.success_timer.lock() {
            if let Some(previous) = timer.replace(handle) {
                previous.abort();
            }
        }
    }

    fn cancel_success_timer(&self) {
        if let Ok(mut timer) = self.success_timer.lock() {
            if let Some(handle) = timer.take() {
                handle.abort();
            }
        }
    }
}

impl<A: SettingsApi> Drop for SettingsForm<A> {
    fn drop(&mut self) {
        self.cancel_success_timer();
    }
}
