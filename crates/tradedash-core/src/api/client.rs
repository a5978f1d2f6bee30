//! API client for communicating with the dashboard backend.
//!
//! This module provides the `ApiClient` struct for making single-shot
//! requests against the market and user-settings endpoints.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Method, Url};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::models::{Acknowledgement, ApiEnvelope, CoinSummary, HealthStatus, SymbolAnalysis};
use crate::settings::SettingsRecord;

use super::{ApiError, TokenSource};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// Symbol analysis runs indicator and model pipelines server side, so allow some slack.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Number of entries requested from the top-coins listing by default
pub const DEFAULT_TOP_COINS_LIMIT: u32 = 100;

/// API client for the dashboard backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    tokens: Option<Arc<dyn TokenSource>>,
}

impl ApiClient {
    /// Create a new API client for the given backend base URL
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ApiError::InvalidResponse(format!("Invalid base URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidResponse(format!(
                "Base URL {} cannot carry a path",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::from_transport)?;

        Ok(Self {
            client,
            base_url,
            tokens: None,
        })
    }

    /// Create a new ApiClient that authenticates through `tokens`, sharing the connection pool.
    pub fn with_token_source(&self, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            tokens: Some(tokens),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an endpoint URL from path segments, encoding each segment
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Headers for an authenticated request. The bearer header is only present
    /// when the token source yields a non-empty token.
    async fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        let token = match self.tokens {
            Some(ref tokens) => tokens.access_token().await,
            None => None,
        };
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidResponse("Access token is not a valid header value".into()))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning a typed error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn send<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        url: Url,
        authenticated: bool,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        debug!(method = %method, url = %url, authenticated, "Sending API request");

        let mut request = self.client.request(method, url.clone());
        if authenticated {
            request = request.headers(self.auth_headers().await?);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(ApiError::from_transport)?;
        let response = Self::check_response(response).await?;

        let text = response.text().await.map_err(ApiError::from_transport)?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }

    async fn get<T: DeserializeOwned>(&self, url: Url, authenticated: bool) -> Result<T, ApiError> {
        self.send::<T, ()>(Method::GET, url, authenticated, None).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, url: Url, body: &B) -> Result<T, ApiError> {
        self.send(Method::POST, url, true, Some(body)).await
    }

    // ===== Market =====

    /// Fetch the top market entries, bounded by `limit`
    pub async fn top_coins(&self, limit: u32) -> Result<ApiEnvelope<Vec<CoinSummary>>, ApiError> {
        let mut url = self.endpoint(&["api", "market", "top-coins"]);
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        self.get(url, false).await
    }

    /// Run the backend analysis for a symbol. Signed-in users get analyses
    /// computed with their own keys.
    pub async fn analyze_symbol(&self, symbol: &str) -> Result<ApiEnvelope<SymbolAnalysis>, ApiError> {
        let url = self.endpoint(&["api", "market", "analyze", symbol]);
        self.get(url, true).await
    }

    // ===== User settings =====

    pub async fn user_settings(&self) -> Result<ApiEnvelope<SettingsRecord>, ApiError> {
        let url = self.endpoint(&["api", "user", "settings"]);
        self.get(url, true).await
    }

    /// Replace the stored settings with `record`. All three fields are sent.
    pub async fn update_user_settings(&self, record: &SettingsRecord) -> Result<Acknowledgement, ApiError> {
        let url = self.endpoint(&["api", "user", "settings"]);
        self.post(url, record).await
    }

    // ===== Service =====

    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        let url = self.endpoint(&["health"]);
        self.get(url, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StaticToken;

    #[test]
    fn test_endpoint_joins_segments() {
        let client = ApiClient::new("http://localhost:8000").expect("client");
        assert_eq!(
            client.endpoint(&["api", "user", "settings"]).as_str(),
            "http://localhost:8000/api/user/settings"
        );

        let client = ApiClient::new("https://example.com/backend/").expect("client");
        assert_eq!(
            client.endpoint(&["api", "market", "analyze", "BTC/USDT"]).as_str(),
            "https://example.com/backend/api/market/analyze/BTC%2FUSDT"
        );
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(ApiClient::new("not a url").is_err());
        assert!(ApiClient::new("mailto:someone@example.com").is_err());
    }

    #[tokio::test]
    async fn test_auth_headers_omit_missing_or_blank_token() {
        let client = ApiClient::new("http://localhost:8000").expect("client");
        assert!(client.auth_headers().await.expect("headers").is_empty());

        let blank = client.with_token_source(Arc::new(StaticToken::new("  ")));
        assert!(blank.auth_headers().await.expect("headers").is_empty());

        let none = client.with_token_source(Arc::new(StaticToken::default()));
        assert!(none.auth_headers().await.expect("headers").is_empty());
    }

    #[tokio::test]
    async fn test_auth_headers_with_token() {
        let client = ApiClient::new("http://localhost:8000")
            .expect("client")
            .with_token_source(Arc::new(StaticToken::new("abc")));
        let headers = client.auth_headers().await.expect("headers");
        assert_eq!(
            headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()),
            Some("Bearer abc")
        );
    }
}
