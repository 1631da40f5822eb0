//! OAuth2 client-credentials token manager
//!
//! [`TokenManager`] owns the one piece of shared mutable state in a
//! process: the cached bearer token. Callers ask for a header value with
//! [`TokenManager::get_token`]; the manager answers from cache while the
//! token is valid, and otherwise runs a single refresh that every
//! concurrent caller awaits.
//!
//! ## Components
//!
//! - [`TokenSettings`] - Token endpoint, credential tuple, refresh buffer
//! - [`OAuthToken`] - A token with its absolute expiry
//! - [`TokenManager`] - Cache, single-flight refresh, best-effort persistence
//!
//! The clock and the persisted-state store are injected so expiry and
//! reload can be exercised deterministically.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use reqwest::header::ACCEPT;
use reqwest::Client;
use salesync_core::config::{Config, ConfigError, Credentials};
use salesync_core::ports::{keys, Clock, IStateStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::UpstreamError;

/// Lifetime assumed when the token response carries no usable `expires_in`
const DEFAULT_EXPIRES_IN_SECS: i64 = 300;

/// Subtracted from `expires_in` against clock skew
const EXPIRY_SAFETY_MARGIN_SECS: i64 = 5;

const GENERIC_TOKEN_ERROR: &str = "token endpoint returned an error";

// ============================================================================
// TokenSettings
// ============================================================================

/// Everything needed to request a token
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub token_url: String,
    /// API base URL; part of the cache key
    pub base_url: String,
    pub credentials: Credentials,
    /// A token is considered stale this long before it expires
    pub refresh_buffer: Duration,
    /// Timeout of the token request itself
    pub request_timeout: StdDuration,
}

impl TokenSettings {
    /// Builds settings from configuration, failing if credentials are missing
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let credentials = config.upstream.credentials()?;
        Ok(Self {
            token_url: config.upstream.token_url.clone(),
            base_url: config.upstream.base_url.clone(),
            credentials,
            refresh_buffer: Duration::seconds(config.http.token_refresh_buffer_secs as i64),
            request_timeout: StdDuration::from_millis(config.http.call_timeout_ms),
        })
    }

    /// Key identifying the full credential tuple
    ///
    /// Rotating any of base URL, client id, secret or scope yields a new
    /// key, so a cached token minted for old credentials is never reused.
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.base_url.as_str(),
            self.credentials.client_id.as_str(),
            self.credentials.client_secret.as_str(),
            self.credentials.scope.as_deref().unwrap_or(""),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

// ============================================================================
// OAuthToken
// ============================================================================

/// A bearer token with its absolute expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    /// Normalized scheme (`Bearer` for any case variant)
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

impl OAuthToken {
    /// The `Authorization` header value
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    /// True while `now + buffer` is still before the expiry
    pub fn is_valid_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        now + buffer < self.expires_at
    }
}

/// Raw token endpoint response
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<Value>,
}

/// Record written to the state store after each refresh
#[derive(Debug, Serialize, Deserialize)]
struct PersistedToken {
    access_token: String,
    token_type: String,
    /// Epoch milliseconds
    expires_at: i64,
    cache_key: String,
}

fn normalize_scheme(token_type: Option<&str>) -> String {
    match token_type.map(str::trim) {
        None | Some("") => "Bearer".to_string(),
        Some(t) if t.eq_ignore_ascii_case("bearer") => "Bearer".to_string(),
        Some(t) => t.to_string(),
    }
}

fn parse_expires_in(value: Option<&Value>) -> i64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.unwrap_or(DEFAULT_EXPIRES_IN_SECS)
}

fn build_token(response: TokenResponse, now: DateTime<Utc>) -> Result<OAuthToken, UpstreamError> {
    let access_token = response
        .access_token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| UpstreamError::InvalidTokenResponse("missing access_token".into()))?;

    let expires_in = parse_expires_in(response.expires_in.as_ref());
    let lifetime = (expires_in - EXPIRY_SAFETY_MARGIN_SECS).max(1);

    Ok(OAuthToken {
        access_token,
        token_type: normalize_scheme(response.token_type.as_deref()),
        expires_at: now + Duration::seconds(lifetime),
    })
}

/// Extracts a readable message from a token endpoint error body
///
/// Tries `error_description`, `error`, `message`, then the first string in
/// `errors[]`, in that order.
pub fn extract_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return GENERIC_TOKEN_ERROR.to_string();
    };
    let non_empty = |v: &Value| {
        v.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    ["error_description", "error", "message"]
        .iter()
        .find_map(|key| value.get(key).and_then(non_empty))
        .or_else(|| {
            value
                .get("errors")
                .and_then(Value::as_array)
                .and_then(|errors| errors.iter().find_map(non_empty))
        })
        .unwrap_or_else(|| GENERIC_TOKEN_ERROR.to_string())
}

// ============================================================================
// TokenManager
// ============================================================================

type TokenResult = Result<OAuthToken, UpstreamError>;
type SharedRefresh = Shared<BoxFuture<'static, TokenResult>>;

struct CachedToken {
    token: OAuthToken,
    cache_key: String,
}

struct InFlight {
    id: u64,
    cache_key: String,
    future: SharedRefresh,
}

#[derive(Default)]
struct TokenState {
    cached: Option<CachedToken>,
    in_flight: Option<InFlight>,
    next_id: u64,
    store_checked: bool,
}

struct Inner {
    http: Client,
    settings: TokenSettings,
    cache_key: String,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn IStateStore>>,
    state: Mutex<TokenState>,
}

/// Shared, cloneable handle to the process-wide token cache
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    /// Creates a manager; with a `store`, tokens are reloaded from and
    /// persisted to it
    pub fn new(
        http: Client,
        settings: TokenSettings,
        clock: Arc<dyn Clock>,
        store: Option<Arc<dyn IStateStore>>,
    ) -> Self {
        let cache_key = settings.cache_key();
        Self {
            inner: Arc::new(Inner {
                http,
                settings,
                cache_key,
                clock,
                store,
                state: Mutex::new(TokenState::default()),
            }),
        }
    }

    /// Returns an `Authorization` header value
    ///
    /// With `force_refresh` the cache is bypassed. If a refresh is already
    /// running for the same credentials, the caller joins it instead of
    /// starting another.
    pub async fn get_token(&self, force_refresh: bool) -> Result<String, UpstreamError> {
        self.token(force_refresh)
            .await
            .map(|token| token.authorization())
    }

    /// Like [`get_token`](Self::get_token) but returns the whole token
    pub async fn token(&self, force_refresh: bool) -> TokenResult {
        let refresh = {
            let mut state = self.inner.state.lock().await;

            if !state.store_checked {
                state.store_checked = true;
                if state.cached.is_none() {
                    state.cached = self.inner.load_persisted().await;
                }
            }

            if !force_refresh {
                if let Some(cached) = &state.cached {
                    if cached.cache_key == self.inner.cache_key
                        && cached
                            .token
                            .is_valid_at(self.inner.clock.now(), self.inner.settings.refresh_buffer)
                    {
                        return Ok(cached.token.clone());
                    }
                }
            }

            match &state.in_flight {
                Some(in_flight) if in_flight.cache_key == self.inner.cache_key => {
                    debug!("Joining in-flight token refresh");
                    in_flight.future.clone()
                }
                _ => {
                    let id = state.next_id;
                    state.next_id += 1;
                    let future = Arc::clone(&self.inner).refresh(id).boxed().shared();
                    state.in_flight = Some(InFlight {
                        id,
                        cache_key: self.inner.cache_key.clone(),
                        future: future.clone(),
                    });
                    future
                }
            }
        };

        refresh.await
    }

    /// Drops the cached token and any in-flight refresh
    pub async fn invalidate(&self) {
        let mut state = self.inner.state.lock().await;
        state.cached = None;
        state.in_flight = None;
        info!("Token cache invalidated");
    }

    /// Expiry of the cached token, if any
    pub async fn cached_expiry(&self) -> Option<DateTime<Utc>> {
        let state = self.inner.state.lock().await;
        state.cached.as_ref().map(|c| c.token.expires_at)
    }
}

impl Inner {
    async fn refresh(self: Arc<Self>, id: u64) -> TokenResult {
        let result = self.request_token().await;

        {
            let mut state = self.state.lock().await;
            // An invalidate() during the request discards its result.
            if state.in_flight.as_ref().is_some_and(|f| f.id == id) {
                state.in_flight = None;
                if let Ok(token) = &result {
                    state.cached = Some(CachedToken {
                        token: token.clone(),
                        cache_key: self.cache_key.clone(),
                    });
                }
            }
        }

        if let Ok(token) = &result {
            info!(expires_at = %token.expires_at, "Obtained access token");
            self.persist(token).await;
        }
        result
    }

    async fn request_token(&self) -> TokenResult {
        let creds = &self.settings.credentials;
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "client_credentials"),
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
        ];
        if let Some(scope) = &creds.scope {
            form.push(("scope", scope.as_str()));
        }

        debug!(token_url = %self.settings.token_url, "Requesting client-credentials token");
        let response = self
            .http
            .post(&self.settings.token_url)
            .header(ACCEPT, "application/json")
            .timeout(self.settings.request_timeout)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = extract_error_message(&body);
            warn!(status = status.as_u16(), %message, "Token request rejected");
            return Err(UpstreamError::TokenRejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| UpstreamError::InvalidTokenResponse(e.to_string()))?;
        build_token(parsed, self.clock.now())
    }

    async fn load_persisted(&self) -> Option<CachedToken> {
        let store = self.store.as_ref()?;
        let value = match store.get(keys::OAUTH_TOKEN).await {
            Ok(value) => value?,
            Err(e) => {
                warn!(error = %e, "Failed to load persisted token");
                return None;
            }
        };

        let record: PersistedToken = match serde_json::from_value(value) {
            Ok(record) => record,
            Err(e) => {
                debug!(error = %e, "Ignoring malformed persisted token");
                return None;
            }
        };
        if record.cache_key != self.cache_key {
            debug!("Persisted token was issued for other credentials");
            return None;
        }

        let expires_at = Utc.timestamp_millis_opt(record.expires_at).single()?;
        debug!(%expires_at, "Reloaded persisted token");
        Some(CachedToken {
            token: OAuthToken {
                access_token: record.access_token,
                token_type: record.token_type,
                expires_at,
            },
            cache_key: record.cache_key,
        })
    }

    async fn persist(&self, token: &OAuthToken) {
        let Some(store) = &self.store else {
            return;
        };
        let record = PersistedToken {
            access_token: token.access_token.clone(),
            token_type: token.token_type.clone(),
            expires_at: token.expires_at.timestamp_millis(),
            cache_key: self.cache_key.clone(),
        };
        let value = match serde_json::to_value(&record) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Failed to encode token for persistence");
                return;
            }
        };
        if let Err(e) = store.set(keys::OAUTH_TOKEN, &value).await {
            warn!(error = %e, "Failed to persist token");
        }
    }
}
