//! Key/value state store port (driven/secondary port)

use async_trait::async_trait;
use serde_json::Value;

/// Well-known keys of the persisted singleton records
pub mod keys {
    pub const SYNC_CURSOR: &str = "sync_cursor";
    pub const OAUTH_TOKEN: &str = "oauth_token";
    pub const RESOURCE_SUPPORT: &str = "resource_support";
}

#[async_trait]
pub trait IStateStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>>;

    async fn set(&self, key: &str, value: &Value) -> anyhow::Result<()>;
}
