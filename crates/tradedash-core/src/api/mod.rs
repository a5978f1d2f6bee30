//! REST API client module for the dashboard backend.
//!
//! This module provides the `ApiClient` for fetching market data and
//! reading or updating the user's settings.
//!
//! Authenticated endpoints use bearer tokens obtained from a `TokenSource`,
//! normally the session store.

pub mod client;
pub mod error;
pub mod token;

pub use client::{ApiClient, DEFAULT_TOP_COINS_LIMIT};
pub use error::ApiError;
pub use token::{StaticToken, TokenSource};
