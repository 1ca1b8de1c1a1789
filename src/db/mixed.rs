//! The mixed (multi-database, config-writing) variant of the DbClient
//! family: same read/stream logic as
//! [`super::single::SingleDbClient`], but `Set` also accepts bulk
//! configuration patches, routed either through the translation library
//! or, when every bypass condition holds, applied directly.

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
    backends::TranslationLibrary,
    bypass::should_bypass,
    client::{
        Client,
        ModelData,
        SubscriptionList,
    },
    error::SetError,
    path::TablePath,
    queue::QueueSender,
    sync_util::WaitGroup,
    value::{
        Path,
        TypedValue,
        Update,
        Value,
    },
};

/// `CONFIG_DB|DEVICE_METADATA|localhost.hwsku`.
async fn device_sku(core: &DbCore) -> String {
    core.kv
        .hget(&TablePath::new("CONFIG_DB", "DEVICE_METADATA", "localhost").with_field("hwsku"))
        .await
        .ok()
        .flatten()
        .unwrap_or_default()
}

/// Parses a bulk-patch path as `/TABLE/KEY[/FIELD]`. These are literal patch paths, not wildcarded
/// subscription paths, so they bypass the virtual-path trie entirely.
fn parse_patch_path(path: &Path) -> Result<TablePath, SetError> {
    let table = path
        .elem
        .first()
        .map(|e| e.name.as_str())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| SetError::Validation("patch path missing a table element".to_string()))?;
    let key = path
        .elem
        .get(1)
        .map(|e| e.name.as_str())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| SetError::Validation("patch path missing a key element".to_string()))?;
    let mut table_path = TablePath::new("CONFIG_DB", table, key);
    if let Some(field_elem) = path.elem.get(2) {
        table_path = table_path.with_field(field_elem.name.clone());
    }
    Ok(table_path)
}

pub struct MixedDbClient {
    core: Arc<DbCore>,
    model: ModelData,
    stats: SendStats,
    translation: Arc<dyn TranslationLibrary>,
    /// Carries the RPC's "bypass-validation" metadata flag; clients are constructed per RPC, so this is fixed for the client's lifetime.
    bypass_requested: bool,
}

impl MixedDbClient {
    #[must_use]
    pub fn new(
        core: Arc<DbCore>,
        model: ModelData,
        translation: Arc<dyn TranslationLibrary>,
        bypass_requested: bool,
    ) -> Self {
        Self {
            core,
            model,
            stats: SendStats::default(),
            translation,
            bypass_requested,
        }
    }

    #[must_use]
    pub fn failed_send_count(&self) -> u64 {
        self.stats.failed_count()
    }

    async fn apply_directly(&self, delete: &[TablePath], update: &[(TablePath, String)]) -> Result<(), SetError> {
        for (table_path, value) in update {
            let field = table_path.field.clone().unwrap_or_default();
            self.core.producers.write_field(table_path, &field, value).await?;
        }
        for table_path in delete {
            let field = table_path.field.clone().unwrap_or_default();
            self.core.producers.delete_field(table_path, &field).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Client for MixedDbClient {
    async fn get(&self, wg: WaitGroup) -> Vec<Value> {
        get(self.core.clone(), wg, &[]).await
    }

    async fn set(&self, delete: &[Path], _replace: &[Path], update: &[Update]) -> Result<(), SetError> {
        let update_paths: Vec<Path> = update
            .iter()
            .map(|u| {
                u.path
                    .clone()
                    .ok_or_else(|| SetError::Validation("update missing a path".to_string()))
            })
            .collect::<Result<_, _>>()?;

        let update_tables: Vec<TablePath> = update_paths.iter().map(parse_patch_path).collect::<Result<_, _>>()?;
        let delete_tables: Vec<TablePath> = delete.iter().map(parse_patch_path).collect::<Result<_, _>>()?;
        let sku = device_sku(&self.core).await;
        let touched_tables = update_tables.iter().chain(delete_tables.iter()).map(|tp| tp.table.as_str());

        if should_bypass(&sku, self.bypass_requested, touched_tables) {
            let mut update_values = Vec::with_capacity(update.len());
            for (table_path, item) in update_tables.into_iter().zip(update) {
                let value = item
                    .value
                    .as_ref()
                    .ok_or_else(|| SetError::Validation("update missing a value".to_string()))?;
                update_values.push((table_path, typed_value_as_str(value)));
            }
            self.apply_directly(&delete_tables, &update_values).await
        } else {
            self.translation
                .set(delete, &[], &update_paths)
                .await
                .map_err(SetError::BulkPatch)
        }
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
        run_guarded("db.mixed.stream_run", &queue, async move {
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
