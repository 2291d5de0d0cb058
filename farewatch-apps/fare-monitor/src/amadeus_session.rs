//!  Farewatch Fare Monitor
//!
//!  Copyright (C) 2026  Mamy Ratsimbazafy
//!
//!  This program is free software: you can redistribute it and/or modify
//!  it under the terms of the GNU Affero General Public License as published by
//!  the Free Software Foundation, either version 3 of the License, or
//!  (at your option) any later version.
//!
//!  This program is distributed in the hope that it will be useful,
//!  but WITHOUT ANY WARRANTY; without even the implied warranty of
//!  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//!  GNU Affero General Public License for more details.
//!
//!  You should have received a copy of the GNU Affero General Public License
//!  along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! # Amadeus Session
//!
//! OAuth2 client-credentials exchange and an expiry-checked accessor for the
//! resulting bearer token.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use farewatch_token_cache::{CachedToken, TokenCache};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::AmadeusCredentials;
use crate::error::{AuthenticationError, body_preview};

/// A cached token is reused only while it has more than this left.
pub const EXPIRY_SAFETY_MARGIN_SECS: i64 = 60;

/// Longest token lifetime accepted from the endpoint (one day).
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;

pub const TOKEN_PATH: &str = "/v1/security/oauth2/token";

/// Short-lived bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_SAFETY_MARGIN_SECS) > now
    }

    fn from_grant(grant: TokenGrant, issued_at: DateTime<Utc>) -> Self {
        Self {
            token: grant.access_token,
            expires_at: issued_at
                + Duration::seconds(grant.expires_in.clamp(0, MAX_TOKEN_LIFETIME_SECS)),
        }
    }
}

/// Token as handed out by the authentication endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

/// The authentication exchange, behind a seam so the session logic can be
/// exercised without a network.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn request_token(&self) -> Result<TokenGrant, AuthenticationError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    #[serde(default)]
    state: Option<String>,
}

/// Interpret the token endpoint's reply.
pub fn parse_token_response(status: u16, body: &str) -> Result<TokenGrant, AuthenticationError> {
    if !(200..300).contains(&status) {
        return Err(AuthenticationError::Status {
            status,
            body: body_preview(body),
        });
    }

    let response: TokenResponse = serde_json::from_str(body)
        .map_err(|e| AuthenticationError::MalformedPayload(format!("invalid JSON: {}", e)))?;

    if let Some(state) = response.state.as_deref() {
        if !state.eq_ignore_ascii_case("approved") {
            tracing::warn!("Token endpoint reported state '{}'", state);
        }
    }

    let access_token = response
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthenticationError::MalformedPayload("missing access_token".into()))?;
    let expires_in = response
        .expires_in
        .ok_or_else(|| AuthenticationError::MalformedPayload("missing expires_in".into()))?;
    if expires_in <= 0 {
        return Err(AuthenticationError::MalformedPayload(format!(
            "non-positive expires_in: {}",
            expires_in
        )));
    }
    if expires_in > MAX_TOKEN_LIFETIME_SECS {
        return Err(AuthenticationError::MalformedPayload(format!(
            "expires_in {} exceeds {} seconds",
            expires_in, MAX_TOKEN_LIFETIME_SECS
        )));
    }

    Ok(TokenGrant {
        access_token,
        expires_in,
    })
}

/// Client-credentials grant against the Amadeus security API.
pub struct AmadeusTokenEndpoint {
    client: Arc<wreq::Client>,
    token_url: String,
    credentials: AmadeusCredentials,
}

impl AmadeusTokenEndpoint {
    pub fn new(client: Arc<wreq::Client>, base_url: &str, credentials: AmadeusCredentials) -> Self {
        Self {
            client,
            token_url: format!("{}{}", base_url.trim_end_matches('/'), TOKEN_PATH),
            credentials,
        }
    }

    fn form_body(&self) -> String {
        format!(
            "grant_type=client_credentials&client_id={}&client_secret={}",
            urlencoding::encode(&self.credentials.client_id),
            urlencoding::encode(&self.credentials.client_secret)
        )
    }
}

#[async_trait]
impl TokenEndpoint for AmadeusTokenEndpoint {
    async fn request_token(&self) -> Result<TokenGrant, AuthenticationError> {
        let start = std::time::Instant::now();
        tracing::debug!("[request_token] POST {}", self.token_url);

        let response = self
            .client
            .post(&self.token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(self.form_body())
            .send()
            .await
            .map_err(|e| AuthenticationError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AuthenticationError::Transport(format!("reading body: {}", e)))?;
        tracing::debug!(
            "[request_token] HTTP {} after {:?}",
            status,
            start.elapsed()
        );

        parse_token_response(status, &body)
    }
}

/// Holds at most one credential and refreshes it when it nears expiry.
///
/// With an external [`TokenCache`] the cache is read before deciding to
/// authenticate and written after every refresh. Cache failures are logged
/// and otherwise ignored.
pub struct SessionManager {
    endpoint: Arc<dyn TokenEndpoint>,
    cache: Option<Arc<dyn TokenCache>>,
    current: Mutex<Option<Credential>>,
}

impl SessionManager {
    pub fn new(endpoint: Arc<dyn TokenEndpoint>) -> Self {
        Self {
            endpoint,
            cache: None,
            current: Mutex::new(None),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn TokenCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Return a credential valid for at least the safety margin, performing
    /// the authentication exchange only when nothing fresh is held.
    pub async fn get_valid_credential(&self) -> Result<Credential, AuthenticationError> {
        let mut current = self.current.lock().await;
        let now = Utc::now();

        if let Some(credential) = current.as_ref().filter(|c| c.is_valid_at(now)) {
            tracing::debug!("Reusing access token valid until {}", credential.expires_at);
            return Ok(credential.clone());
        }

        if let Some(credential) = self.load_cached(now) {
            tracing::info!(
                "Reusing cached access token valid until {}",
                credential.expires_at
            );
            *current = Some(credential.clone());
            return Ok(credential);
        }

        tracing::info!("Requesting new access token");
        let grant = self.endpoint.request_token().await?;
        let credential = Credential::from_grant(grant, Utc::now());
        tracing::info!("Access token valid until {}", credential.expires_at);

        self.store_cached(&credential);
        *current = Some(credential.clone());
        Ok(credential)
    }

    /// Forget the held credential, e.g. after the provider rejected it.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.clear() {
                tracing::warn!("Failed to clear token cache: {}", e);
            }
        }
    }

    fn load_cached(&self, now: DateTime<Utc>) -> Option<Credential> {
        let cache = self.cache.as_ref()?;
        match cache.load() {
            Ok(Some(token))
                if token.is_fresh_at(now, Duration::seconds(EXPIRY_SAFETY_MARGIN_SECS)) =>
            {
                Some(Credential::new(token.access_token, token.expires_at))
            }
            Ok(Some(_)) => {
                tracing::debug!("Cached access token is stale");
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Ignoring unreadable token cache: {}", e);
                None
            }
        }
    }

    fn store_cached(&self, credential: &Credential) {
        if let Some(cache) = &self.cache {
            let token = CachedToken::new(credential.token.clone(), credential.expires_at);
            if let Err(e) = cache.store(&token) {
                tracing::warn!("Failed to persist access token: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farewatch_token_cache::MemoryTokenCache;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEndpoint {
        calls: AtomicUsize,
        expires_in: i64,
    }

    impl CountingEndpoint {
        fn new(expires_in: i64) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                expires_in,
            })
        }
    }

    #[async_trait]
    impl TokenEndpoint for CountingEndpoint {
        async fn request_token(&self) -> Result<TokenGrant, AuthenticationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TokenGrant {
                access_token: format!("token-{}", n),
                expires_in: self.expires_in,
            })
        }
    }

    #[test]
    fn test_parse_token_response_ok() {
        let body = r#"{"type":"amadeusOAuth2Token","access_token":"xyz","expires_in":1799,"state":"approved"}"#;
        let grant = parse_token_response(200, body).unwrap();
        assert_eq!(grant.access_token, "xyz");
        assert_eq!(grant.expires_in, 1799);
    }

    #[test]
    fn test_parse_token_response_errors() {
        assert!(matches!(
            parse_token_response(401, r#"{"error":"invalid_client"}"#),
            Err(AuthenticationError::Status { status: 401, .. })
        ));
        assert!(matches!(
            parse_token_response(200, r#"{"expires_in":1799}"#),
            Err(AuthenticationError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_token_response(200, r#"{"access_token":"x"}"#),
            Err(AuthenticationError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_token_response(200, "<html>"),
            Err(AuthenticationError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_token_response(200, r#"{"access_token":"x","expires_in":0}"#),
            Err(AuthenticationError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_token_response(200, r#"{"access_token":"x","expires_in":86401}"#),
            Err(AuthenticationError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_token_response(
                200,
                r#"{"access_token":"t","expires_in":9000000000000000000}"#
            ),
            Err(AuthenticationError::MalformedPayload(_))
        ));
        assert!(parse_token_response(200, r#"{"access_token":"x","expires_in":86400}"#).is_ok());
    }

    #[tokio::test]
    async fn test_oversized_lifetime_is_clamped() {
        let session = SessionManager::new(CountingEndpoint::new(i64::MAX));
        let credential = session.get_valid_credential().await.unwrap();
        let ceiling = Utc::now() + Duration::seconds(MAX_TOKEN_LIFETIME_SECS);
        assert!(credential.expires_at() <= ceiling);
    }

    #[tokio::test]
    async fn test_credential_reused_within_validity() {
        let endpoint = CountingEndpoint::new(1799);
        let session = SessionManager::new(endpoint.clone());

        let first = session.get_valid_credential().await.unwrap();
        let second = session.get_valid_credential().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_credential_inside_margin_is_refreshed() {
        // Lifetime shorter than the safety margin: never reusable.
        let endpoint = CountingEndpoint::new(EXPIRY_SAFETY_MARGIN_SECS - 1);
        let session = SessionManager::new(endpoint.clone());

        session.get_valid_credential().await.unwrap();
        session.get_valid_credential().await.unwrap();
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_exchange() {
        let endpoint = CountingEndpoint::new(1799);
        let session = SessionManager::new(endpoint.clone());

        let first = session.get_valid_credential().await.unwrap();
        session.invalidate().await;
        let second = session.get_valid_credential().await.unwrap();

        assert_ne!(first.token(), second.token());
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_external_cache_read_before_use() {
        let endpoint = CountingEndpoint::new(1799);
        let cache = Arc::new(MemoryTokenCache::with_token(CachedToken::new(
            "from-previous-run",
            Utc::now() + Duration::minutes(20),
        )));
        let session = SessionManager::new(endpoint.clone()).with_cache(cache);

        let credential = session.get_valid_credential().await.unwrap();
        assert_eq!(credential.token(), "from-previous-run");
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_external_cache_written_after_refresh() {
        let endpoint = CountingEndpoint::new(1799);
        let cache = Arc::new(MemoryTokenCache::with_token(CachedToken::new(
            "stale",
            Utc::now() + Duration::seconds(10),
        )));
        let session = SessionManager::new(endpoint.clone()).with_cache(cache.clone());

        let credential = session.get_valid_credential().await.unwrap();
        assert_eq!(credential.token(), "token-0");
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);

        let stored = cache.load().unwrap().expect("refreshed token persisted");
        assert_eq!(stored.access_token, "token-0");
        assert_eq!(stored.expires_at, credential.expires_at());
    }
}
