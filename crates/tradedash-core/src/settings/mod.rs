//! User settings: the three API keys the backend uses for live analysis.
//!
//! - `SettingsRecord`, `SettingsField`: the record and its fields
//! - `SettingsForm`: load/edit/save controller with transient status flags

pub mod form;
pub mod record;

pub use form::{FormError, FormStatus, SettingsApi, SettingsForm, LOAD_ERROR_MESSAGE, SUCCESS_BANNER_DURATION};
pub use record::{SettingsField, SettingsRecord};
