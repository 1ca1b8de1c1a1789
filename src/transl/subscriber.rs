//! The translation-library-backed Client family member: a
//! schema-validated subscriber that leans on the out-of-scope
//! [`TranslationLibrary`] for both polled reads and push-based change
//! events, rather than on a Redis-like store directly.

use std::{
    collections::HashMap,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{
    diff,
    SampleCache,
};
use crate::{
    backends::{
        PathCapability,
        TranslEvent,
        TranslationLibrary,
    },
    clock::now_ns,
    client::{
        Client,
        ModelData,
        Subscription,
        SubscriptionList,
        SubscriptionMode,
    },
    db::SendStats,
    dispatcher::for_each_bounded,
    error::SetError,
    queue::QueueSender,
    sync_util::WaitGroup,
    value::{
        Notification,
        Path,
        Update,
        Value,
    },
};

pub struct TranslSubscriber {
    library: Arc<dyn TranslationLibrary>,
    model: ModelData,
    stats: SendStats,
}

impl TranslSubscriber {
    #[must_use]
    pub fn new(library: Arc<dyn TranslationLibrary>, model: ModelData) -> Self {
        Self {
            library,
            model,
            stats: SendStats::default(),
        }
    }

    #[must_use]
    pub fn failed_send_count(&self) -> u64 {
        self.stats.failed_count()
    }
}

fn effective_interval(requested: Duration, min: Duration) -> Duration {
    if requested.is_zero() {
        min
    } else {
        requested
    }
}

/// Checks one subscription against the capability the translation library
/// reports for its path.
fn validate(sub: &Subscription, cap: &PathCapability) -> Result<(), String> {
    if sub.mode == SubscriptionMode::OnChange && !cap.on_change_supported {
        return Err(format!(
            "ON_CHANGE not supported for {:?}",
            sub.path.display_elems()
        ));
    }
    if !sub.sample_interval.is_zero() && sub.sample_interval < cap.min_sample_interval {
        return Err(format!(
            "sample interval {:?} below minimum {:?} for {:?}",
            sub.sample_interval,
            cap.min_sample_interval,
            sub.path.display_elems()
        ));
    }
    if let Some(heartbeat) = sub.heartbeat_interval {
        if !heartbeat.is_zero() && heartbeat < cap.min_sample_interval {
            return Err(format!(
                "heartbeat interval {heartbeat:?} below minimum {:?} for {:?}",
                cap.min_sample_interval,
                sub.path.display_elems()
            ));
        }
    }
    Ok(())
}

/// Fetches the capability of every subscribed path and validates up front,
/// enqueuing one fatal marker and returning `None` on the first violation.
async fn capabilities_or_fail(
    library: &Arc<dyn TranslationLibrary>,
    queue: &QueueSender,
    sub_list: &SubscriptionList,
) -> Option<HashMap<String, PathCapability>> {
    let mut capabilities = HashMap::new();
    for sub in &sub_list.subscriptions {
        let cap = library.capability(&sub.path).await;
        if let Err(message) = validate(sub, &cap) {
            queue.force_enqueue(Value::fatal(message));
            return None;
        }
        capabilities.insert(sub.path.display_elems(), cap);
    }
    Some(capabilities)
}

fn notification_of(path: Path, updates: Vec<Update>, deletes: Vec<Path>) -> Option<Notification> {
    if updates.is_empty() && deletes.is_empty() {
        return None;
    }
    let mut n = Notification::new(path, now_ns());
    n.update = updates;
    n.delete = deletes;
    Some(n)
}

/// Worker-pool fetch of every sample-mode path's current value, seeding
/// `cache` so the first tick's diff has a baseline.
async fn seed_sample_cache(library: &Arc<dyn TranslationLibrary>, cache: &Arc<SampleCache>, subs: &[Subscription]) {
    let library = library.clone();
    let cache = cache.clone();
    for_each_bounded(subs.to_vec(), move |sub| {
        let library = library.clone();
        let cache = cache.clone();
        async move {
            if let Ok(value) = library.get(&sub.path).await {
                cache.set(&sub.path, value).await;
            }
        }
    })
    .await;
}

/// Background on-change worker: holds the translation library's `Subscribe`
/// channel open, converts each event into a diffed Notification, and
/// forwards the library's first `Sync` event as the run's single
/// sync-response.
async fn run_on_change(
    library: Arc<dyn TranslationLibrary>,
    queue: QueueSender,
    stop: CancellationToken,
    cache: Arc<SampleCache>,
    paths: Vec<Path>,
) {
    let mut events = library.subscribe(paths).await;
    let mut synced = false;
    loop {
        tokio::select! {
            () = stop.cancelled() => return,
            event = events.recv() => {
                match event {
                    None => return,
                    Some(TranslEvent::Sync) => {
                        if !synced {
                            queue.force_enqueue(Value::SyncResponse);
                            synced = true;
                        }
                    }
                    Some(TranslEvent::Update { path, value }) => {
                        let before = cache.get(&path).await;
                        let (updates, deletes) = diff::diff(before.as_ref(), &value);
                        cache.set(&path, value).await;
                        let Some(notification) = notification_of(path, updates, deletes) else {
                            continue;
                        };
                        if queue.enqueue(Value::Notification(notification)).is_err() {
                            queue.force_enqueue(Value::fatal("Subscribe output queue exhausted"));
                            return;
                        }
                    }
                    Some(TranslEvent::Delete { path }) => {
                        cache.remove(&path).await;
                        let mut notification = Notification::new(path.clone(), now_ns());
                        notification.delete.push(path);
                        if queue.enqueue(Value::Notification(notification)).is_err() {
                            queue.force_enqueue(Value::fatal("Subscribe output queue exhausted"));
                            return;
                        }
                    }
                }
            }
        }
    }
    // `events` drops here, which is this client's only teardown signal to
    // the translation library per `TranslationLibrary::subscribe`'s
    // contract ("until unsubscribe is awaited or the channel is dropped").
}

/// Re-samples one path on a tick: diffs against `cache` unless
/// `suppress_redundant` is false or this tick also lands on the path's
/// heartbeat, in which case every leaf is emitted regardless of change.
async fn sample_one(
    library: &Arc<dyn TranslationLibrary>,
    queue: &QueueSender,
    cache: &SampleCache,
    sub: &Subscription,
    last_heartbeat: &Mutex<Option<tokio::time::Instant>>,
) {
    let Ok(current) = library.get(&sub.path).await else {
        return;
    };
    let now = tokio::time::Instant::now();
    let is_heartbeat_tick = match sub.heartbeat_interval {
        Some(heartbeat) if !heartbeat.is_zero() => {
            let mut guard = last_heartbeat.lock().unwrap();
            let due = guard.map_or(true, |last| now.duration_since(last) >= heartbeat);
            if due {
                *guard = Some(now);
            }
            due
        }
        _ => false,
    };

    let (updates, deletes) = if is_heartbeat_tick || !sub.suppress_redundant {
        (diff::record_all(&current), Vec::new())
    } else {
        let before = cache.get(&sub.path).await;
        diff::diff(before.as_ref(), &current)
    };
    cache.set(&sub.path, current).await;

    let Some(notification) = notification_of(sub.path.clone(), updates, deletes) else {
        return;
    };
    if queue.enqueue(Value::Notification(notification)).is_err() {
        queue.force_enqueue(Value::fatal("Subscribe output queue exhausted"));
    }
}

/// One ticker shared by every subscription at the same effective sample
/// interval.
async fn run_sample_group(
    library: Arc<dyn TranslationLibrary>,
    queue: QueueSender,
    stop: CancellationToken,
    cache: Arc<SampleCache>,
    interval: Duration,
    subs: Vec<Subscription>,
) {
    let mut ticker = tokio::time::interval(interval);
    let last_heartbeat: Arc<Vec<Mutex<Option<tokio::time::Instant>>>> =
        Arc::new(subs.iter().map(|_| Mutex::new(None)).collect());
    loop {
        tokio::select! {
            () = stop.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let items: Vec<(usize, Subscription)> = subs.iter().cloned().enumerate().collect();
        let library = library.clone();
        let queue = queue.clone();
        let cache = cache.clone();
        let last_heartbeat = last_heartbeat.clone();
        for_each_bounded(items, move |(idx, sub)| {
            let library = library.clone();
            let queue = queue.clone();
            let cache = cache.clone();
            let last_heartbeat = last_heartbeat.clone();
            async move {
                sample_one(&library, &queue, &cache, &sub, &last_heartbeat[idx]).await;
            }
        })
        .await;
    }
}

async fn emit_one_pass(library: &Arc<dyn TranslationLibrary>, queue: &QueueSender, subs: &[Subscription]) -> bool {
    let overflowed = AtomicBool::new(false);
    let overflowed_ref = &overflowed;
    let library_ref = library;
    let queue_ref = queue;
    for_each_bounded(subs.to_vec(), |sub| {
        let library = library_ref.clone();
        let queue = queue_ref.clone();
        async move {
            if overflowed_ref.load(Ordering::SeqCst) {
                return;
            }
            let Ok(current) = library.get(&sub.path).await else {
                return;
            };
            let updates = diff::record_all(&current);
            let Some(notification) = notification_of(sub.path.clone(), updates, Vec::new()) else {
                return;
            };
            if queue.enqueue(Value::Notification(notification)).is_err() {
                overflowed_ref.store(true, Ordering::SeqCst);
            }
        }
    })
    .await;
    if overflowed.load(Ordering::SeqCst) {
        queue.force_enqueue(Value::fatal("Subscribe output queue exhausted"));
        return false;
    }
    true
}

#[async_trait]
impl Client for TranslSubscriber {
    async fn get(&self, wg: WaitGroup) -> Vec<Value> {
        let _worker = wg.worker();
        Vec::new()
    }

    async fn set(&self, delete: &[Path], replace: &[Path], update: &[Update]) -> Result<(), SetError> {
        let update_paths: Vec<Path> = update
            .iter()
            .map(|u| {
                u.path
                    .clone()
                    .ok_or_else(|| SetError::Validation("update missing a path".to_string()))
            })
            .collect::<Result<_, _>>()?;
        self.library
            .set(delete, replace, &update_paths)
            .await
            .map_err(SetError::BulkPatch)
    }

    async fn stream_run(
        &self,
        queue: QueueSender,
        stop: CancellationToken,
        wg: WaitGroup,
        sub_list: SubscriptionList,
    ) {
        let _worker = wg.worker();
        let Some(capabilities) = capabilities_or_fail(&self.library, &queue, &sub_list).await else {
            return;
        };

        let (on_change_subs, sample_subs): (Vec<Subscription>, Vec<Subscription>) = sub_list
            .subscriptions
            .into_iter()
            .partition(|s| s.mode == SubscriptionMode::OnChange);

        let cache = Arc::new(SampleCache::new());
        seed_sample_cache(&self.library, &cache, &sample_subs).await;

        let mut handles = Vec::new();

        if on_change_subs.is_empty() {
            queue.force_enqueue(Value::SyncResponse);
        } else {
            let worker = wg.worker();
            let library = self.library.clone();
            let queue = queue.clone();
            let stop = stop.clone();
            let cache = cache.clone();
            let paths: Vec<Path> = on_change_subs.iter().map(|s| s.path.clone()).collect();
            handles.push(tokio::spawn(async move {
                let _worker = worker;
                run_on_change(library, queue, stop, cache, paths).await;
            }));
        }

        let mut groups: HashMap<Duration, Vec<Subscription>> = HashMap::new();
        for sub in sample_subs {
            let min = capabilities
                .get(&sub.path.display_elems())
                .map_or(Duration::from_secs(1), |c| c.min_sample_interval);
            let interval = effective_interval(sub.sample_interval, min);
            groups.entry(interval).or_default().push(sub);
        }
        for (interval, subs) in groups {
            let worker = wg.worker();
            let library = self.library.clone();
            let queue = queue.clone();
            let stop = stop.clone();
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let _worker = worker;
                run_sample_group(library, queue, stop, cache, interval, subs).await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn poll_run(
        &self,
        queue: QueueSender,
        mut poll: tokio::sync::mpsc::Receiver<()>,
        wg: WaitGroup,
        sub_list: SubscriptionList,
    ) {
        let _worker = wg.worker();
        if capabilities_or_fail(&self.library, &queue, &sub_list).await.is_none() {
            return;
        }
        while poll.recv().await.is_some() {
            if !emit_one_pass(&self.library, &queue, &sub_list.subscriptions).await {
                return;
            }
            queue.force_enqueue(Value::SyncResponse);
        }
    }

    async fn once_run(&self, queue: QueueSender, wg: WaitGroup, sub_list: SubscriptionList) {
        let _worker = wg.worker();
        if capabilities_or_fail(&self.library, &queue, &sub_list).await.is_none() {
            return;
        }
        if emit_one_pass(&self.library, &queue, &sub_list.subscriptions).await {
            queue.force_enqueue(Value::SyncResponse);
        }
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

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;

    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        client::Encoding,
        queue::bounded_queue,
        value::PathElem,
    };

    struct StubLibrary {
        values: tokio::sync::Mutex<HashMap<String, serde_json::Value>>,
        on_change_supported: bool,
        min_sample_interval: Duration,
        subscribe_events: tokio::sync::Mutex<Option<Vec<TranslEvent>>>,
        get_calls: AtomicU64,
    }

    impl StubLibrary {
        fn new(on_change_supported: bool) -> Self {
            Self {
                values: tokio::sync::Mutex::new(HashMap::new()),
                on_change_supported,
                min_sample_interval: Duration::from_millis(5),
                subscribe_events: tokio::sync::Mutex::new(Some(Vec::new())),
                get_calls: AtomicU64::new(0),
            }
        }

        async fn seed(&self, path: &Path, value: serde_json::Value) {
            self.values.lock().await.insert(path.display_elems(), value);
        }
    }

    #[async_trait]
    impl TranslationLibrary for StubLibrary {
        async fn get(&self, path: &Path) -> Result<serde_json::Value, String> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .values
                .lock()
                .await
                .get(&path.display_elems())
                .cloned()
                .unwrap_or(serde_json::Value::Null))
        }

        async fn set(&self, _delete: &[Path], _replace: &[Path], _update: &[Path]) -> Result<(), String> {
            Ok(())
        }

        async fn capability(&self, _path: &Path) -> PathCapability {
            PathCapability {
                on_change_supported: self.on_change_supported,
                min_sample_interval: self.min_sample_interval,
            }
        }

        async fn subscribe(&self, _paths: Vec<Path>) -> mpsc::Receiver<TranslEvent> {
            let (tx, rx) = mpsc::channel(128);
            let events = self.subscribe_events.lock().await.take().unwrap_or_default();
            tokio::spawn(async move {
                for event in events {
                    let _ = tx.send(event).await;
                }
            });
            rx
        }
    }

    fn sub_list(subs: Vec<Subscription>) -> SubscriptionList {
        SubscriptionList {
            subscriptions: subs,
            updates_only: false,
            encoding: Encoding::Json,
        }
    }

    fn model() -> ModelData {
        ModelData {
            name: "translib".to_string(),
            organization: "example".to_string(),
            version: "1.0".to_string(),
        }
    }

    #[tokio::test]
    async fn on_change_rejected_when_library_does_not_support_it() {
        let library = Arc::new(StubLibrary::new(false));
        let client = TranslSubscriber::new(library, model());
        let (tx, mut rx) = bounded_queue(1 << 20);
        let wg = WaitGroup::new();
        let path = Path::new([PathElem::simple("a")]);
        let sub = Subscription::new(path, SubscriptionMode::OnChange);
        client
            .stream_run(tx, CancellationToken::new(), wg.clone(), sub_list(vec![sub]))
            .await;
        wg.wait().await;
        match rx.dequeue().await.unwrap() {
            Value::Fatal(msg) => assert!(msg.contains("ON_CHANGE not supported")),
            other => panic!("expected Fatal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sample_only_run_emits_sync_response_after_seeding() {
        let library = Arc::new(StubLibrary::new(true));
        library
            .seed(&Path::new([PathElem::simple("a")]), json!({"x": 1}))
            .await;
        let client = TranslSubscriber::new(library, model());
        let (tx, mut rx) = bounded_queue(1 << 20);
        let stop = CancellationToken::new();
        let wg = WaitGroup::new();
        let mut sub = Subscription::new(Path::new([PathElem::simple("a")]), SubscriptionMode::Sample);
        sub.sample_interval = Duration::from_millis(5);
        let stop_clone = stop.clone();
        let handle = tokio::spawn(client.stream_run(tx, stop.clone(), wg.clone(), sub_list(vec![sub])));
        assert!(matches!(rx.dequeue().await, Some(Value::SyncResponse)));
        stop_clone.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }

    #[tokio::test]
    async fn sample_tick_emits_a_diffed_notification() {
        let library = Arc::new(StubLibrary::new(true));
        let path = Path::new([PathElem::simple("a")]);
        library.seed(&path, json!({"x": 1})).await;
        let client = TranslSubscriber::new(library, model());
        let (tx, mut rx) = bounded_queue(1 << 20);
        let stop = CancellationToken::new();
        let wg = WaitGroup::new();
        let mut sub = Subscription::new(path, SubscriptionMode::Sample);
        sub.sample_interval = Duration::from_millis(5);
        let stop_clone = stop.clone();
        let handle = tokio::spawn(client.stream_run(tx, stop.clone(), wg.clone(), sub_list(vec![sub])));
        assert!(matches!(rx.dequeue().await, Some(Value::SyncResponse)));
        assert!(matches!(rx.dequeue().await, Some(Value::Notification(_))));
        stop_clone.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }

    #[tokio::test]
    async fn once_run_emits_one_notification_then_sync_response() {
        let library = Arc::new(StubLibrary::new(true));
        let path = Path::new([PathElem::simple("a")]);
        library.seed(&path, json!({"x": 1})).await;
        let client = TranslSubscriber::new(library, model());
        let (tx, mut rx) = bounded_queue(1 << 20);
        let wg = WaitGroup::new();
        let sub = Subscription::new(path, SubscriptionMode::TargetDefined);
        client.once_run(tx, wg.clone(), sub_list(vec![sub])).await;
        wg.wait().await;
        assert!(matches!(rx.dequeue().await, Some(Value::Notification(_))));
        assert!(matches!(rx.dequeue().await, Some(Value::SyncResponse)));
    }

    #[tokio::test]
    async fn failed_send_increments_counter() {
        let library = Arc::new(StubLibrary::new(true));
        let client = TranslSubscriber::new(library, model());
        client.failed_send();
        client.failed_send();
        assert_eq!(client.failed_send_count(), 2);
    }

    #[tokio::test]
    async fn set_delegates_straight_to_the_translation_library() {
        let library = Arc::new(StubLibrary::new(true));
        let client = TranslSubscriber::new(library, model());
        let path = Path::new([PathElem::simple("a")]);
        let update = Update::new(path, crate::value::TypedValue::StringVal("v".to_string()));
        client.set(&[], &[], std::slice::from_ref(&update)).await.unwrap();
    }
}
