//! The single-database variant of the DbClient family: reads
//! and writes one Redis-like database instance, no config-write bulk
//! patch support.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{
    get,
    once_run,
    poll_run,
    run_guarded,
    stream_run,
    DbCore,
    SendStats,
};
use crate::{
    client::{
        Client,
        ModelData,
        SubscriptionList,
    },
    error::SetError,
    queue::QueueSender,
    sync_util::WaitGroup,
    value::{
        Path,
        TypedValue,
        Update,
        Value,
    },
};

pub struct SingleDbClient {
    core: Arc<DbCore>,
    model: ModelData,
    stats: SendStats,
}

impl SingleDbClient {
    #[must_use]
    pub fn new(core: Arc<DbCore>, model: ModelData) -> Self {
        Self {
            core,
            model,
            stats: SendStats::default(),
        }
    }

    #[must_use]
    pub fn failed_send_count(&self) -> u64 {
        self.stats.failed_count()
    }
}

#[async_trait]
impl Client for SingleDbClient {
    async fn get(&self, wg: WaitGroup) -> Vec<Value> {
        get(self.core.clone(), wg, &[]).await
    }

    async fn set(&self, delete: &[Path], _replace: &[Path], update: &[Update]) -> Result<(), SetError> {
        for item in update {
            let path = item
                .path
                .as_ref()
                .ok_or_else(|| SetError::Validation("update missing a path".to_string()))?;
            let value = item
                .value
                .as_ref()
                .ok_or_else(|| SetError::Validation("update missing a value".to_string()))?;
            let table_paths = self.core.resolver.resolve(path)?;
            for table_path in &table_paths {
                let field = table_path.field.clone().unwrap_or_default();
                self.core
                    .producers
                    .write_field(table_path, &field, &typed_value_as_str(value))
                    .await?;
            }
        }
        for path in delete {
            let table_paths = self.core.resolver.resolve(path)?;
            for table_path in &table_paths {
                let field = table_path.field.clone().unwrap_or_default();
                self.core.producers.delete_field(table_path, &field).await?;
            }
        }
        Ok(())
    }

    async fn stream_run(
        &self,
        queue: QueueSender,
        stop: CancellationToken,
        wg: WaitGroup,
        sub_list: SubscriptionList,
    ) {
        let core = self.core.clone();
        let task_queue = queue.clone();
        run_guarded("db.single.stream_run", &queue, async move {
            stream_run(core, task_queue, stop, wg, sub_list).await;
        })
        .await;
    }

    async fn poll_run(
        &self,
        queue: QueueSender,
        poll: mpsc::Receiver<()>,
        wg: WaitGroup,
        sub_list: SubscriptionList,
    ) {
        poll_run(self.core.clone(), queue, poll, wg, sub_list).await;
    }

    async fn once_run(&self, queue: QueueSender, wg: WaitGroup, sub_list: SubscriptionList) {
        once_run(self.core.clone(), queue, wg, sub_list).await;
    }

    fn capabilities(&self) -> Vec<ModelData> {
        vec![self.model.clone()]
    }

    async fn close(&self) {}

    fn sent_one(&self, _latency: Duration) {}

    fn failed_send(&self) {
        self.stats.record_failure();
    }
}

fn typed_value_as_str(value: &TypedValue) -> String {
    match value {
        TypedValue::StringVal(s) => s.clone(),
        TypedValue::IntVal(i) => i.to_string(),
        TypedValue::UintVal(u) => u.to_string(),
        TypedValue::BoolVal(b) => b.to_string(),
        TypedValue::BytesVal(b) => hex::encode(b),
        TypedValue::FloatVal(f) => f.to_string(),
        TypedValue::JsonVal(j) => j.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{
        backends::MockKvStore,
        client::SubscriptionMode,
        db::ProducerCache,
        path::TablePath,
        queue::bounded_queue,
        value::{
            Path as ValuePath,
            PathElem,
        },
        virtual_path::{
            ResolverContext,
            VirtualPathResolver,
        },
    };

    fn client_with_port(port: &str, oid: &str) -> SingleDbClient {
        let mut ctx = ResolverContext {
            delimiter: "|".to_string(),
            ..Default::default()
        };
        ctx.port_to_oid.insert(port.to_string(), oid.to_string());
        let kv = Arc::new(MockKvStore::new());
        let core = Arc::new(DbCore {
            kv: kv.clone(),
            resolver: Arc::new(VirtualPathResolver::new(ctx)),
            producers: ProducerCache::new(kv, HashSet::new(), Arc::new(|_| unreachable!())),
            min_sample_interval: Duration::from_millis(10),
        });
        SingleDbClient::new(
            core,
            ModelData {
                name: "sonic-db".to_string(),
                organization: "example".to_string(),
                version: "1.0".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn set_writes_through_resolved_table_path() {
        let client = client_with_port("Ethernet0", "oid:1");
        let path = ValuePath::new([
            PathElem::simple("COUNTERS_DB"),
            PathElem::simple("COUNTERS"),
            PathElem::simple("Ethernet0"),
            PathElem::simple("admin_status"),
        ]);
        let update = Update::new(path, TypedValue::StringVal("up".to_string()));
        client.set(&[], &[], std::slice::from_ref(&update)).await.unwrap();
    }

    #[tokio::test]
    async fn once_run_through_client_trait_emits_sync_response() {
        let client = client_with_port("Ethernet0", "oid:1");
        let (tx, mut rx) = bounded_queue(1 << 20);
        let wg = WaitGroup::new();
        let path = ValuePath::new([
            PathElem::simple("COUNTERS_DB"),
            PathElem::simple("COUNTERS"),
            PathElem::simple("Ethernet0"),
        ]);
        let sub_list = SubscriptionList {
            subscriptions: vec![crate::client::Subscription::new(
                path,
                SubscriptionMode::TargetDefined,
            )],
            updates_only: false,
            encoding: crate::client::Encoding::Json,
        };
        client.once_run(tx, wg.clone(), sub_list).await;
        wg.wait().await;
        assert!(matches!(rx.dequeue().await, Some(Value::SyncResponse)));
    }

    #[test]
    fn failed_send_increments_counter() {
        let client = client_with_port("Ethernet0", "oid:1");
        client.failed_send();
        client.failed_send();
        assert_eq!(client.failed_send_count(), 2);
    }

}
