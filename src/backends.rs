//! Trait boundaries for this core's out-of-scope collaborators: the
//! schema-translation library, the Redis-like key/value driver, and the
//! message-queue transport. Production wiring of these traits (the real
//! translation library client, the real Redis driver, the real MQ
//! transport) is outside this core's scope; only an in-memory mock of each
//! lives here, for tests.

use std::{
    collections::HashMap,
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::{
    mpsc,
    RwLock,
};

use crate::{
    error::ZmqError,
    path::TablePath,
    value::Path,
};

/// A structured value as reported by the translation library; intentionally
/// opaque here, since schema validation is delegated to that library, and
/// modeled as a JSON tree so [`crate::transl::diff`] has something concrete
/// to difference.
pub type StructuredValue = serde_json::Value;

/// Whatever the translation library reports about one path's subscription
/// capabilities.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathCapability {
    pub on_change_supported: bool,
    pub min_sample_interval: std::time::Duration,
}

/// One event delivered by [`TranslationLibrary::subscribe`].
#[derive(Clone, Debug)]
pub enum TranslEvent {
    Update {
        path: Path,
        value: StructuredValue,
    },
    Delete {
        path: Path,
    },
    Sync,
}

/// Black-box schema-translation library.
#[async_trait]
pub trait TranslationLibrary: Send + Sync {
    async fn get(&self, path: &Path) -> Result<StructuredValue, String>;
    async fn set(&self, delete: &[Path], replace: &[Path], update: &[Path]) -> Result<(), String>;
    async fn capability(&self, path: &Path) -> PathCapability;
    /// Subscribes to on-change updates for `paths`, returning a channel fed
    /// by a background task until `unsubscribe` is awaited or the channel
    /// is dropped.
    async fn subscribe(&self, paths: Vec<Path>) -> mpsc::Receiver<TranslEvent>;
}

/// Black-box Redis-like driver.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn hget(&self, table_path: &TablePath) -> Result<Option<String>, String>;
    async fn hgetall(&self, table_path: &TablePath) -> Result<HashMap<String, String>, String>;
    async fn hset(&self, table_path: &TablePath, field: &str, value: &str) -> Result<(), String>;
    async fn hdel(&self, table_path: &TablePath, field: &str) -> Result<(), String>;
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, String>;
    /// Pattern-subscribes to key-space notifications, returning a stream of
    /// raw changed-key strings.
    async fn psubscribe(&self, pattern: &str) -> Result<mpsc::Receiver<String>, String>;
}

/// An external event-bus subscriber handle.
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn receive(&self, timeout: std::time::Duration) -> Option<(serde_json::Value, i64)>;
    async fn close(&self);
}

/// An opaque ZMQ producer handle. `send`/`del`
/// surface only the "connection break" family of failures the retry
/// helper is allowed to recover from.
#[async_trait]
pub trait ZmqProducerHandle: Send + Sync {
    async fn send(&self, table_path: &TablePath, field: &str, value: &str) -> Result<(), ZmqError>;
    async fn del(&self, table_path: &TablePath, field: &str) -> Result<(), ZmqError>;
}

/// An in-memory [`ZmqProducerHandle`] whose `send` fails with
/// [`ZmqError::ConnectionBreak`] for its first `fail_first_n` calls, then
/// delegates to a [`MockKvStore`].
pub struct FlakyZmqProducerHandle {
    kv: Arc<MockKvStore>,
    remaining_failures: std::sync::atomic::AtomicUsize,
}

impl FlakyZmqProducerHandle {
    #[must_use]
    pub fn new(kv: Arc<MockKvStore>, fail_first_n: usize) -> Self {
        Self {
            kv,
            remaining_failures: std::sync::atomic::AtomicUsize::new(fail_first_n),
        }
    }
}

#[async_trait]
impl ZmqProducerHandle for FlakyZmqProducerHandle {
    async fn send(&self, table_path: &TablePath, field: &str, value: &str) -> Result<(), ZmqError> {
        if self
            .remaining_failures
            .fetch_update(
                std::sync::atomic::Ordering::SeqCst,
                std::sync::atomic::Ordering::SeqCst,
                |n| (n > 0).then_some(n - 1),
            )
            .is_ok()
        {
            return Err(ZmqError::ConnectionBreak("reset by peer".to_string()));
        }
        self.kv
            .hset(table_path, field, value)
            .await
            .map_err(ZmqError::Producer)
    }

    async fn del(&self, table_path: &TablePath, field: &str) -> Result<(), ZmqError> {
        self.kv
            .hdel(table_path, field)
            .await
            .map_err(ZmqError::Producer)
    }
}

/// In-memory `KvStore` used by tests: a `namespace -> db -> table|key ->
/// field -> value` map plus a registry of pattern subscribers notified on
/// every mutating call.
#[derive(Clone, Default)]
pub struct MockKvStore {
    inner: Arc<RwLock<MockKvStoreInner>>,
}

#[derive(Default)]
struct MockKvStoreInner {
    rows: HashMap<String, HashMap<String, String>>,
    subscribers: Vec<(String, mpsc::Sender<String>)>,
}

impl MockKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, table_path: &TablePath, field: &str, value: &str) {
        let mut guard = self.inner.write().await;
        guard
            .rows
            .entry(table_path.redis_key())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }

    async fn notify(&self, key: &str) {
        let guard = self.inner.read().await;
        for (pattern, tx) in &guard.subscribers {
            if key_matches_pattern(key, pattern) {
                let _ = tx.send(key.to_string()).await;
            }
        }
    }
}

fn key_matches_pattern(key: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

#[async_trait]
impl KvStore for MockKvStore {
    async fn hget(&self, table_path: &TablePath) -> Result<Option<String>, String> {
        let Some(field) = &table_path.field else {
            return Err("hget requires a field".to_string());
        };
        let guard = self.inner.read().await;
        Ok(guard
            .rows
            .get(&table_path.redis_key())
            .and_then(|row| row.get(field))
            .cloned())
    }

    async fn hgetall(&self, table_path: &TablePath) -> Result<HashMap<String, String>, String> {
        let guard = self.inner.read().await;
        Ok(guard
            .rows
            .get(&table_path.redis_key())
            .cloned()
            .unwrap_or_default())
    }

    async fn hset(&self, table_path: &TablePath, field: &str, value: &str) -> Result<(), String> {
        {
            let mut guard = self.inner.write().await;
            guard
                .rows
                .entry(table_path.redis_key())
                .or_default()
                .insert(field.to_string(), value.to_string());
        }
        self.notify(&table_path.redis_key()).await;
        Ok(())
    }

    async fn hdel(&self, table_path: &TablePath, field: &str) -> Result<(), String> {
        {
            let mut guard = self.inner.write().await;
            if let Some(row) = guard.rows.get_mut(&table_path.redis_key()) {
                row.remove(field);
            }
        }
        self.notify(&table_path.redis_key()).await;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, String> {
        let guard = self.inner.read().await;
        Ok(guard
            .rows
            .keys()
            .filter(|k| key_matches_pattern(k, pattern))
            .cloned()
            .collect())
    }

    async fn psubscribe(&self, pattern: &str) -> Result<mpsc::Receiver<String>, String> {
        let (tx, rx) = mpsc::channel(128);
        let mut guard = self.inner.write().await;
        guard.subscribers.push((pattern.to_string(), tx));
        Ok(rx)
    }
}
