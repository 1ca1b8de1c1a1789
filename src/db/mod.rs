//! The DbClient family: a single-database client and a mixed
//! (multi-database, config-writing) client sharing the same streaming
//! logic over this module's free functions. [`single::SingleDbClient`] and
//! [`mixed::MixedDbClient`] are thin `Client` wrappers around it.

pub mod mixed;
pub mod producer;
pub mod single;
mod zmq_retry;

use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    backends::KvStore,
    clock::now_ns,
    client::{
        Subscription,
        SubscriptionList,
        SubscriptionMode,
    },
    dispatcher::{
        for_each_bounded,
        spawn_guarded,
    },
    path::TablePath,
    queue::QueueSender,
    sync_util::WaitGroup,
    value::{
        Notification,
        Path,
        PathElem,
        TypedValue,
        Update,
        Value,
    },
    virtual_path::VirtualPathResolver,
};

pub use producer::ProducerCache;

/// Shared state and logic between [`single::SingleDbClient`] and
/// [`mixed::MixedDbClient`].
pub struct DbCore {
    pub kv: Arc<dyn KvStore>,
    pub resolver: Arc<VirtualPathResolver>,
    pub producers: ProducerCache,
    pub min_sample_interval: Duration,
}

impl DbCore {
    fn effective_interval(&self, requested: Duration) -> Duration {
        if requested.is_zero() {
            self.min_sample_interval
        } else {
            requested
        }
    }

    fn validate(&self, sub: &Subscription) -> Result<(), String> {
        if let SubscriptionMode::Unsupported(code) = sub.mode {
            return Err(format!("unsupported subscription mode: {code}"));
        }
        if !sub.sample_interval.is_zero() && sub.sample_interval < self.min_sample_interval {
            return Err(format!(
                "sample interval {:?} below minimum {:?}",
                sub.sample_interval, self.min_sample_interval
            ));
        }
        if let Some(heartbeat) = sub.heartbeat_interval {
            if !heartbeat.is_zero() && heartbeat < self.min_sample_interval {
                return Err(format!(
                    "heartbeat interval {heartbeat:?} below minimum {:?}",
                    self.min_sample_interval
                ));
            }
        }
        Ok(())
    }

    /// Reads every resolved TablePath for `path` into one flattened
    /// `field_key -> value` map. A path whose resolution or read fails is
    /// a soft error: it's skipped, not fatal.
    async fn read_current(&self, path: &Path) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        let Ok(table_paths) = self.resolver.resolve(path) else {
            return fields;
        };
        for table_path in &table_paths {
            match read_table_path(self.kv.as_ref(), table_path).await {
                Ok(pairs) => {
                    for (field, value) in pairs {
                        fields.insert(format!("{}:{field}", table_path.redis_key()), value);
                    }
                }
                Err(_) => continue,
            }
        }
        fields
    }
}

async fn read_table_path(
    kv: &dyn KvStore,
    table_path: &TablePath,
) -> Result<Vec<(String, String)>, String> {
    if let Some(field) = &table_path.field {
        let value = kv.hget(table_path).await?;
        Ok(value.into_iter().map(|v| (field.clone(), v)).collect())
    } else {
        Ok(kv.hgetall(table_path).await?.into_iter().collect())
    }
}

fn notification_from_fields(prefix: Path, fields: impl IntoIterator<Item = (String, String)>) -> Notification {
    let mut notification = Notification::new(prefix, now_ns());
    for (field, value) in fields {
        notification.update.push(Update::new(
            Path::new([PathElem::simple(field)]),
            TypedValue::StringVal(value),
        ));
    }
    notification
}

/// Fields present in `before` but absent or changed in `after`: the diff
/// against the last-sent value used by `SuppressRedundant`.
fn diff_fields(
    before: &HashMap<String, String>,
    after: &HashMap<String, String>,
) -> Vec<(String, String)> {
    after
        .iter()
        .filter(|(k, v)| before.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// STREAM/SAMPLE: ticks at `sub`'s effective interval, enqueuing
/// a (possibly diffed) Notification each time.
async fn run_sample_loop(core: Arc<DbCore>, queue: QueueSender, stop: CancellationToken, sub: Subscription) {
    let interval_duration = core.effective_interval(sub.sample_interval);
    let mut ticker = tokio::time::interval(interval_duration);
    let mut last: Option<HashMap<String, String>> = None;
    loop {
        tokio::select! {
            () = stop.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let current = core.read_current(&sub.path).await;
        let fields: Vec<(String, String)> = if sub.suppress_redundant {
            match &last {
                Some(prev) => diff_fields(prev, &current),
                None => current.clone().into_iter().collect(),
            }
        } else {
            current.clone().into_iter().collect()
        };
        last = Some(current);
        if fields.is_empty() {
            continue;
        }
        let notification = notification_from_fields(sub.path.clone(), fields);
        if queue.enqueue(Value::Notification(notification)).is_err() {
            queue.force_enqueue(Value::fatal("Subscribe output queue exhausted"));
            return;
        }
    }
}

/// STREAM/ON_CHANGE: pattern-subscribes to the resolved table
/// keys, re-reading and re-emitting on every notification, plus an
/// optional heartbeat ticker doing periodic full reads.
async fn run_on_change_loop(
    core: Arc<DbCore>,
    queue: QueueSender,
    stop: CancellationToken,
    sub: Subscription,
) {
    let Ok(table_paths) = core.resolver.resolve(&sub.path) else {
        queue.force_enqueue(Value::fatal(format!(
            "cannot subscribe ON_CHANGE: no translator for {:?}",
            sub.path.display_elems()
        )));
        return;
    };
    let Some(first) = table_paths.first() else {
        return;
    };
    let pattern = format!("{}*", first.redis_key());
    let mut changes = match core.kv.psubscribe(&pattern).await {
        Ok(rx) => rx,
        Err(e) => {
            queue.force_enqueue(Value::fatal(format!("ON_CHANGE subscribe failed: {e}")));
            return;
        }
    };

    let heartbeat_interval = sub
        .heartbeat_interval
        .map(|h| core.effective_interval(h));
    let mut heartbeat = heartbeat_interval.map(tokio::time::interval);

    loop {
        tokio::select! {
            () = stop.cancelled() => return,
            changed = changes.recv() => {
                if changed.is_none() {
                    return;
                }
                emit_full_read(&core, &queue, &sub).await;
            }
            _ = conditional_tick(&mut heartbeat) => {
                emit_full_read(&core, &queue, &sub).await;
            }
        }
    }
}

async fn conditional_tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn emit_full_read(core: &DbCore, queue: &QueueSender, sub: &Subscription) {
    let current = core.read_current(&sub.path).await;
    if current.is_empty() {
        return;
    }
    let notification = notification_from_fields(sub.path.clone(), current);
    if queue.enqueue(Value::Notification(notification)).is_err() {
        queue.force_enqueue(Value::fatal("Subscribe output queue exhausted"));
    }
}

/// Validates every subscription up front; on the first violation, enqueues
/// a fatal marker describing it and returns `false` without starting any
/// work.
fn validate_all(core: &DbCore, queue: &QueueSender, sub_list: &SubscriptionList) -> bool {
    for sub in &sub_list.subscriptions {
        if let Err(message) = core.validate(sub) {
            queue.force_enqueue(Value::fatal(message));
            return false;
        }
    }
    true
}

pub async fn stream_run(
    core: Arc<DbCore>,
    queue: QueueSender,
    stop: CancellationToken,
    wg: WaitGroup,
    sub_list: SubscriptionList,
) {
    let _worker = wg.worker();
    if !validate_all(&core, &queue, &sub_list) {
        return;
    }

    let mut handles = Vec::new();
    for sub in sub_list.subscriptions {
        let core = core.clone();
        let queue = queue.clone();
        let stop = stop.clone();
        let worker = wg.worker();
        handles.push(tokio::spawn(async move {
            let _worker = worker;
            match sub.mode {
                SubscriptionMode::OnChange => run_on_change_loop(core, queue, stop, sub).await,
                _ => run_sample_loop(core, queue, stop, sub).await,
            }
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }
}

/// POLL: blocks on `poll`; on each signal, re-reads every
/// path's TablePaths and emits a Notification per path followed by a
/// sync-response. Closing `poll` terminates the run cleanly.
pub async fn poll_run(
    core: Arc<DbCore>,
    queue: QueueSender,
    mut poll: mpsc::Receiver<()>,
    wg: WaitGroup,
    sub_list: SubscriptionList,
) {
    let _worker = wg.worker();
    if !validate_all(&core, &queue, &sub_list) {
        return;
    }
    while poll.recv().await.is_some() {
        if !emit_one_pass(&core, &queue, &sub_list.subscriptions).await {
            return;
        }
        queue.force_enqueue(Value::SyncResponse);
    }
}

/// ONCE: a single pass matching POLL's iteration, followed by
/// sync-response, then terminates.
pub async fn once_run(core: Arc<DbCore>, queue: QueueSender, wg: WaitGroup, sub_list: SubscriptionList) {
    let _worker = wg.worker();
    if !validate_all(&core, &queue, &sub_list) {
        return;
    }
    if emit_one_pass(&core, &queue, &sub_list.subscriptions).await {
        queue.force_enqueue(Value::SyncResponse);
    }
}

/// Reads every subscribed path once and enqueues one Notification per
/// path; returns `false` (after forcing a fatal marker) if the output
/// queue overflows.
async fn emit_one_pass(core: &Arc<DbCore>, queue: &QueueSender, subs: &[Subscription]) -> bool {
    let overflowed = std::sync::atomic::AtomicBool::new(false);
    let overflowed_ref = &overflowed;
    let core_ref = core;
    let queue_ref = queue;
    for_each_bounded(subs.to_vec(), |sub| {
        let core = core_ref.clone();
        let queue = queue_ref.clone();
        async move {
            if overflowed_ref.load(std::sync::atomic::Ordering::SeqCst) {
                return;
            }
            let current = core.read_current(&sub.path).await;
            if current.is_empty() {
                return;
            }
            let notification = notification_from_fields(sub.path.clone(), current);
            if queue.enqueue(Value::Notification(notification)).is_err() {
                overflowed_ref.store(true, std::sync::atomic::Ordering::SeqCst);
            }
        }
    })
    .await;
    if overflowed.load(std::sync::atomic::Ordering::SeqCst) {
        queue.force_enqueue(Value::fatal("Subscribe output queue exhausted"));
        return false;
    }
    true
}

pub async fn get(core: Arc<DbCore>, wg: WaitGroup, paths: &[Path]) -> Vec<Value> {
    let _worker = wg.worker();
    let mut values = Vec::new();
    for path in paths {
        let current = core.read_current(path).await;
        if current.is_empty() {
            continue;
        }
        values.push(Value::Notification(notification_from_fields(path.clone(), current)));
    }
    values
}

/// A guarded wrapper used by `Client::stream_run`/`poll_run`/`once_run`
/// implementations to install the panic-recovery handler, without
/// duplicating it in every client variant.
pub async fn run_guarded<F>(task_name: &str, queue: &QueueSender, fut: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    spawn_guarded(task_name, queue, fut).await;
}

/// A counter of failed sends, backing `Client::sent_one`/`failed_send`
/// bookkeeping shared by both client variants. Plain atomics, since
/// `Client::sent_one`/`failed_send` are synchronous methods.
#[derive(Default)]
pub struct SendStats {
    failed: std::sync::atomic::AtomicU64,
}

impl SendStats {
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    #[must_use]
    pub fn failed_count(&self) -> u64 {
        self.failed.load(std::sync::atomic::Ordering::Relaxed)
    }
}
