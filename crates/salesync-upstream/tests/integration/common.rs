//! Shared test helpers for upstream integration tests
//!
//! Mounts the token endpoint on a wiremock server and builds token
//! managers and clients pointing at it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use salesync_core::config::Credentials;
use salesync_core::ports::{Clock, IStateStore, ManualClock};
use salesync_upstream::auth::{TokenManager, TokenSettings};
use salesync_upstream::client::{RetryPolicy, UpstreamClient};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN_PATH: &str = "/oauth/token";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(start_time()))
}

pub fn settings(server: &MockServer, secret: &str) -> TokenSettings {
    TokenSettings {
        token_url: format!("{}{}", server.uri(), TOKEN_PATH),
        base_url: server.uri(),
        credentials: Credentials {
            client_id: "client-1".into(),
            client_secret: secret.into(),
            scope: Some("sales.read".into()),
        },
        refresh_buffer: Duration::seconds(60),
        request_timeout: StdDuration::from_secs(2),
    }
}

pub fn token_manager(
    server: &MockServer,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn IStateStore>>,
) -> TokenManager {
    TokenManager::new(reqwest::Client::new(), settings(server, "secret-1"), clock, store)
}

/// Short timeouts and backoff so retry tests stay fast
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        call_timeout: StdDuration::from_secs(2),
        max_retries: 3,
        backoff_step: StdDuration::from_millis(10),
        backoff_cap: StdDuration::from_millis(20),
    }
}

pub fn client(server: &MockServer) -> UpstreamClient {
    let tokens = token_manager(server, manual_clock(), None);
    UpstreamClient::new(reqwest::Client::new(), server.uri(), tokens).with_policy(fast_policy())
}

pub fn token_body(access_token: &str, expires_in: i64) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires_in": expires_in
    })
}

/// Mounts a token endpoint that always answers with `access_token`
pub async fn mount_token(server: &MockServer, access_token: &str) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(access_token, 3600)))
        .mount(server)
        .await;
}

/// In-memory state store
#[derive(Default)]
pub struct MemoryStateStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStateStore {
    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.values.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl IStateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &Value) -> anyhow::Result<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.clone());
        Ok(())
    }
}
