//! Per-table producer handles, cached for the client's lifetime, selected
//! between a plain [`KvStore`] write and a ZMQ-backed one.

use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    backends::{
        KvStore,
        ZmqProducerHandle,
    },
    error::ZmqError,
    path::TablePath,
};

use super::zmq_retry::retry_once;

#[async_trait]
trait Producer: Send + Sync {
    async fn send(&self, table_path: &TablePath, field: &str, value: &str) -> Result<(), ZmqError>;
    async fn del(&self, table_path: &TablePath, field: &str) -> Result<(), ZmqError>;
}

struct PlainProducer {
    kv: Arc<dyn KvStore>,
}

#[async_trait]
impl Producer for PlainProducer {
    async fn send(&self, table_path: &TablePath, field: &str, value: &str) -> Result<(), ZmqError> {
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

struct ZmqProducer {
    handle: Arc<dyn ZmqProducerHandle>,
}

#[async_trait]
impl Producer for ZmqProducer {
    async fn send(&self, table_path: &TablePath, field: &str, value: &str) -> Result<(), ZmqError> {
        self.handle.send(table_path, field, value).await
    }

    async fn del(&self, table_path: &TablePath, field: &str) -> Result<(), ZmqError> {
        self.handle.del(table_path, field).await
    }
}

/// Builds a fresh ZMQ producer handle for `table`, used whenever a cached
/// producer for a ZMQ-backed table needs to be recycled.
pub type ZmqFactory = Arc<dyn Fn(&str) -> Arc<dyn ZmqProducerHandle> + Send + Sync>;

/// One producer handle per table, cached for the lifetime of the client.
pub struct ProducerCache {
    kv: Arc<dyn KvStore>,
    zmq_tables: HashSet<String>,
    zmq_factory: ZmqFactory,
    cache: RwLock<HashMap<String, Arc<dyn Producer>>>,
}

impl ProducerCache {
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, zmq_tables: HashSet<String>, zmq_factory: ZmqFactory) -> Self {
        Self {
            kv,
            zmq_tables,
            zmq_factory,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn build_producer(&self, table: &str) -> Arc<dyn Producer> {
        if self.zmq_tables.contains(table) {
            Arc::new(ZmqProducer {
                handle: (self.zmq_factory)(table),
            })
        } else {
            Arc::new(PlainProducer {
                kv: self.kv.clone(),
            })
        }
    }

    async fn producer_for(&self, table: &str) -> Arc<dyn Producer> {
        if let Some(existing) = self.cache.read().await.get(table) {
            return existing.clone();
        }
        let mut guard = self.cache.write().await;
        if let Some(existing) = guard.get(table) {
            return existing.clone();
        }
        let producer = self.build_producer(table);
        guard.insert(table.to_string(), producer.clone());
        producer
    }

    /// Tears down and drops the cached producer for `table`.
    async fn recycle(&self, table: &str) {
        self.cache.write().await.remove(table);
    }

    /// Writes one field, recycling and retrying once on a connection
    /// break. More than one retry is failure.
    pub async fn write_field(
        &self,
        table_path: &TablePath,
        field: &str,
        value: &str,
    ) -> Result<(), ZmqError> {
        retry_once(|| async {
            let producer = self.producer_for(&table_path.table).await;
            let result = producer.send(table_path, field, value).await;
            if matches!(&result, Err(e) if e.is_connection_break()) {
                self.recycle(&table_path.table).await;
            }
            result
        })
        .await
    }

    /// Deletes one field, with the same recycle-and-retry behavior as
    /// [`ProducerCache::write_field`].
    pub async fn delete_field(&self, table_path: &TablePath, field: &str) -> Result<(), ZmqError> {
        retry_once(|| async {
            let producer = self.producer_for(&table_path.table).await;
            let result = producer.del(table_path, field).await;
            if matches!(&result, Err(e) if e.is_connection_break()) {
                self.recycle(&table_path.table).await;
            }
            result
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{
        AtomicUsize,
        Ordering,
    };

    use super::*;
    use crate::backends::{
        FlakyZmqProducerHandle,
        MockKvStore,
    };

    #[tokio::test]
    async fn plain_table_writes_straight_through_kv() {
        let kv = Arc::new(MockKvStore::new());
        let cache = ProducerCache::new(kv.clone(), HashSet::new(), Arc::new(|_| unreachable!()));
        let table_path = TablePath::new("CONFIG_DB", "VLAN", "Vlan100");
        cache.write_field(&table_path, "mtu", "9100").await.unwrap();
        assert_eq!(
            kv.hget(&table_path.clone().with_field("mtu")).await.unwrap(),
            Some("9100".to_string())
        );
    }

    // First call breaks, retry succeeds, no third call.
    #[tokio::test]
    async fn zmq_table_recycles_and_retries_once_on_connection_break() {
        let kv = Arc::new(MockKvStore::new());
        let build_count = Arc::new(AtomicUsize::new(0));
        let zmq_tables: HashSet<String> = ["VNET".to_string()].into_iter().collect();
        let kv_for_factory = kv.clone();
        let build_count_for_factory = build_count.clone();
        let cache = ProducerCache::new(
            kv.clone(),
            zmq_tables,
            Arc::new(move |_table| {
                build_count_for_factory.fetch_add(1, Ordering::SeqCst);
                Arc::new(FlakyZmqProducerHandle::new(kv_for_factory.clone(), 1))
            }),
        );
        let table_path = TablePath::new("APPL_DB", "VNET", "vnet1");
        cache
            .write_field(&table_path, "status", "up")
            .await
            .expect("retry should recover from the first connection break");
        assert_eq!(build_count.load(Ordering::SeqCst), 2, "producer was recycled once");
    }

    #[tokio::test]
    async fn producer_is_reused_across_writes_to_the_same_table() {
        let kv = Arc::new(MockKvStore::new());
        let build_count = Arc::new(AtomicUsize::new(0));
        let zmq_tables: HashSet<String> = ["VNET".to_string()].into_iter().collect();
        let kv_for_factory = kv.clone();
        let build_count_for_factory = build_count.clone();
        let cache = ProducerCache::new(
            kv.clone(),
            zmq_tables,
            Arc::new(move |_table| {
                build_count_for_factory.fetch_add(1, Ordering::SeqCst);
                Arc::new(FlakyZmqProducerHandle::new(kv_for_factory.clone(), 0))
            }),
        );
        let table_path = TablePath::new("APPL_DB", "VNET", "vnet1");
        cache.write_field(&table_path, "a", "1").await.unwrap();
        cache.write_field(&table_path, "b", "2").await.unwrap();
        assert_eq!(build_count.load(Ordering::SeqCst), 1);
    }
}
