//! Core library for tradedash.
//!
//! Provides the building blocks for a client of the trading dashboard backend:
//!
//! - [`api`]: REST client for market data and user settings
//! - [`auth`]: auth provider integration and the process-wide session store
//! - [`settings`]: the API-key settings record and its form controller
//! - [`models`]: backend payload types
//! - [`config`]: endpoint configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod settings;

pub use api::{ApiClient, ApiError, TokenSource};
pub use auth::{AuthProvider, GoTrueProvider, SessionStore};
pub use config::Config;
pub use settings::{SettingsForm, SettingsRecord};
