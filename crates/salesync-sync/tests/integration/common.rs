//! Shared fakes and fixtures

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::time::Instant;

use salesync_core::domain::{EntityKind, RowData, Table};
use salesync_core::ports::{
    IPlatformApi, IRowStore, IStateStore, ListPage, ListQuery, ManualClock, PageFetch,
};
use salesync_store::{DatabasePool, SqliteRowStore};
use salesync_sync::{BatchedWriter, SyncEngine, SyncSettings, WebhookProcessor, WriterSettings};

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn row(value: Value) -> RowData {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

// ============================================================================
// Row store
// ============================================================================

/// A store operation as observed by [`RecordingRowStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    UpsertStarted(Table),
    UpsertFinished(Table),
    Insert(Table),
    Select(Table),
}

/// SQLite row store that records the order of calls
pub struct RecordingRowStore {
    inner: SqliteRowStore,
    calls: Mutex<Vec<StoreCall>>,
    upsert_delay: Mutex<Duration>,
    fail_versions: AtomicBool,
}

impl RecordingRowStore {
    pub async fn in_memory() -> Arc<Self> {
        let pool = DatabasePool::in_memory().await.unwrap();
        Arc::new(Self {
            inner: SqliteRowStore::new(pool.pool().clone()),
            calls: Mutex::new(Vec::new()),
            upsert_delay: Mutex::new(Duration::ZERO),
            fail_versions: AtomicBool::new(false),
        })
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn upsert_batches(&self, table: Table) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == StoreCall::UpsertStarted(table))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn set_upsert_delay(&self, delay: Duration) {
        *self.upsert_delay.lock().unwrap() = delay;
    }

    /// Makes every insert into `entity_versions` fail
    pub fn fail_versions(&self) {
        self.fail_versions.store(true, Ordering::SeqCst);
    }

    pub async fn count(&self, table: Table) -> i64 {
        self.inner.count(table).await.unwrap()
    }

    pub async fn get(&self, table: Table, column: &str, value: &str) -> Vec<RowData> {
        self.inner
            .select_by(table, column, &[value.to_string()])
            .await
            .unwrap()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl IRowStore for RecordingRowStore {
    async fn upsert(
        &self,
        table: Table,
        rows: &[RowData],
        conflict_key: &str,
    ) -> anyhow::Result<u64> {
        self.record(StoreCall::UpsertStarted(table));
        let delay = *self.upsert_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let result = self.inner.upsert(table, rows, conflict_key).await;
        self.record(StoreCall::UpsertFinished(table));
        result
    }

    async fn insert(&self, table: Table, rows: &[RowData]) -> anyhow::Result<u64> {
        self.record(StoreCall::Insert(table));
        if table == Table::EntityVersions && self.fail_versions.load(Ordering::SeqCst) {
            anyhow::bail!("disk I/O error");
        }
        self.inner.insert(table, rows).await
    }

    async fn select_by(
        &self,
        table: Table,
        column: &str,
        values: &[String],
    ) -> anyhow::Result<Vec<RowData>> {
        self.record(StoreCall::Select(table));
        self.inner.select_by(table, column, values).await
    }

    async fn max_version(
        &self,
        entity: EntityKind,
        entity_id: &str,
    ) -> anyhow::Result<Option<i64>> {
        self.inner.max_version(entity, entity_id).await
    }
}

// ============================================================================
// State store
// ============================================================================

#[derive(Default)]
pub struct MemoryStateStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStateStore {
    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn put(&self, key: &str, value: Value) {
        self.values.lock().unwrap().insert(key.to_string(), value);
    }
}

#[async_trait]
impl IStateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.snapshot(key))
    }

    async fn set(&self, key: &str, value: &Value) -> anyhow::Result<()> {
        self.put(key, value.clone());
        Ok(())
    }
}

// ============================================================================
// Upstream
// ============================================================================

/// A scripted reply for one page request
pub enum Reply {
    Fetch(PageFetch),
    Fail(&'static str),
}

/// Upstream that answers from per-path queues
///
/// A path with nothing queued answers with an empty, final page.
#[derive(Default)]
pub struct ScriptedApi {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(String, ListQuery)>>,
}

impl ScriptedApi {
    pub fn push(&self, path: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn push_page(&self, path: &str, items: Vec<Value>, has_more: bool) {
        self.push(
            path,
            Reply::Fetch(PageFetch::Page(ListPage {
                items,
                has_more,
                next_page: None,
            })),
        );
    }

    pub fn calls(&self) -> Vec<(String, ListQuery)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<ListQuery> {
        self.calls()
            .into_iter()
            .filter(|(p, _)| p == path)
            .map(|(_, q)| q)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl IPlatformApi for ScriptedApi {
    async fn list_page(
        &self,
        path: &str,
        query: &ListQuery,
        _deadline: Instant,
    ) -> anyhow::Result<PageFetch> {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_string(), query.clone()));
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(VecDeque::pop_front);
        match reply {
            Some(Reply::Fetch(fetch)) => Ok(fetch),
            Some(Reply::Fail(message)) => anyhow::bail!(message),
            None => Ok(PageFetch::Page(ListPage::default())),
        }
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub rows: Arc<RecordingRowStore>,
    pub state: Arc<MemoryStateStore>,
    pub api: Arc<ScriptedApi>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn new() -> Self {
        Self {
            rows: RecordingRowStore::in_memory().await,
            state: Arc::new(MemoryStateStore::default()),
            api: Arc::new(ScriptedApi::default()),
            clock: Arc::new(ManualClock::new(start_time())),
        }
    }

    pub fn writer(&self) -> BatchedWriter {
        self.writer_with(WriterSettings::default())
    }

    pub fn writer_with(&self, settings: WriterSettings) -> BatchedWriter {
        BatchedWriter::new(self.rows.clone(), settings)
    }

    pub fn engine(&self) -> SyncEngine {
        SyncEngine::new(
            self.api.clone(),
            self.state.clone(),
            self.writer(),
            self.clock.clone(),
            SyncSettings::default(),
        )
    }

    pub fn processor(&self) -> WebhookProcessor {
        WebhookProcessor::new(self.writer(), self.clock.clone())
    }
}
