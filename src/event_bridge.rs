//! Bridges an external event-bus subscriber into the output queue: a
//! 2s-timeout receive loop, a 2s heartbeat, and a 1s stats task publishing
//! drop/latency counters to a well-known config table.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{
            AtomicU64,
            Ordering,
        },
        Arc,
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    backends::{
        EventTransport,
        KvStore,
    },
    clock::now_ns,
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
        Notification,
        Path,
        PathElem,
        TypedValue,
        Update,
        Value,
    },
};

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(2);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);
const STATS_INTERVAL: Duration = Duration::from_secs(1);
/// Rolling-mean window over the last N `SentOne` latencies.
const LATENCY_WINDOW: usize = 10;

fn counters_table_path(field: &str) -> TablePath {
    TablePath::new("STATE_DB", "EVENTS_COUNTERS", field).with_field("value")
}

pub struct EventBridge {
    transport: Arc<dyn EventTransport>,
    kv: Arc<dyn KvStore>,
    model: ModelData,
    missed_internal: AtomicU64,
    missed_by_slow_receiver: AtomicU64,
    latencies: Mutex<VecDeque<Duration>>,
}

impl EventBridge {
    #[must_use]
    pub fn new(transport: Arc<dyn EventTransport>, kv: Arc<dyn KvStore>, model: ModelData) -> Self {
        Self {
            transport,
            kv,
            model,
            missed_internal: AtomicU64::new(0),
            missed_by_slow_receiver: AtomicU64::new(0),
            latencies: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW)),
        }
    }

    fn heartbeat_notification() -> Notification {
        let mut n = Notification::new(
            Path::new([PathElem::simple("sonic-events")]).with_origin_target("sonic-events", "EVENTS"),
            now_ns(),
        );
        n.update.push(Update::new(
            Path::new([PathElem::simple("heart")]),
            TypedValue::JsonVal("\"beat\"".to_string()),
        ));
        n
    }

    fn event_notification(payload: serde_json::Value, timestamp_ns: i64) -> Notification {
        let mut n = Notification::new(
            Path::new([PathElem::simple("sonic-events")]).with_origin_target("sonic-events", "EVENTS"),
            timestamp_ns,
        );
        n.update.push(Update::new(
            Path::new([PathElem::simple("event")]),
            TypedValue::from_json(&payload),
        ));
        n
    }

    fn emit(&self, queue: &QueueSender, notification: Notification) {
        if queue.enqueue(Value::Notification(notification)).is_err() {
            self.missed_by_slow_receiver.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn mean_latency_ms(&self) -> f64 {
        let latencies = self.latencies.lock().unwrap();
        if latencies.is_empty() {
            return 0.0;
        }
        let total_ms: f64 = latencies.iter().map(Duration::as_secs_f64).map(|s| s * 1000.0).sum();
        total_ms / latencies.len() as f64
    }

    async fn write_stats(&self) {
        let missed_internal = self.missed_internal.load(Ordering::Relaxed);
        let missed_by_slow_receiver = self.missed_by_slow_receiver.load(Ordering::Relaxed);
        let latency_ms = self.mean_latency_ms();
        let _ = self
            .kv
            .hset(&counters_table_path("missed_internal"), "value", &missed_internal.to_string())
            .await;
        let _ = self
            .kv
            .hset(
                &counters_table_path("missed_by_slow_receiver"),
                "value",
                &missed_by_slow_receiver.to_string(),
            )
            .await;
        let _ = self
            .kv
            .hset(&counters_table_path("latency_in_ms"), "value", &latency_ms.to_string())
            .await;
    }

    #[must_use]
    pub fn missed_internal_count(&self) -> u64 {
        self.missed_internal.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn missed_by_slow_receiver_count(&self) -> u64 {
        self.missed_by_slow_receiver.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Client for EventBridge {
    async fn get(&self, wg: WaitGroup) -> Vec<Value> {
        let _worker = wg.worker();
        Vec::new()
    }

    async fn set(&self, _delete: &[Path], _replace: &[Path], _update: &[Update]) -> Result<(), SetError> {
        Err(SetError::Validation("the event bridge does not accept Set".to_string()))
    }

    async fn stream_run(
        &self,
        queue: QueueSender,
        stop: CancellationToken,
        wg: WaitGroup,
        _sub_list: SubscriptionList,
    ) {
        let _worker = wg.worker();
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        let mut stats_ticker = tokio::time::interval(STATS_INTERVAL);
        loop {
            tokio::select! {
                () = stop.cancelled() => break,
                received = self.transport.receive(RECEIVE_TIMEOUT) => {
                    if let Some((payload, timestamp_ns)) = received {
                        self.emit(&queue, Self::event_notification(payload, timestamp_ns));
                    }
                }
                _ = heartbeat.tick() => {
                    self.emit(&queue, Self::heartbeat_notification());
                }
                _ = stats_ticker.tick() => {
                    self.write_stats().await;
                }
            }
        }
        self.transport.close().await;
    }

    async fn poll_run(
        &self,
        queue: QueueSender,
        _poll: tokio::sync::mpsc::Receiver<()>,
        wg: WaitGroup,
        _sub_list: SubscriptionList,
    ) {
        let _worker = wg.worker();
        queue.force_enqueue(Value::fatal("the event bridge supports STREAM mode only"));
    }

    async fn once_run(&self, queue: QueueSender, wg: WaitGroup, _sub_list: SubscriptionList) {
        let _worker = wg.worker();
        queue.force_enqueue(Value::fatal("the event bridge supports STREAM mode only"));
    }

    fn capabilities(&self) -> Vec<ModelData> {
        vec![self.model.clone()]
    }

    async fn close(&self) {
        self.transport.close().await;
    }

    fn sent_one(&self, latency: Duration) {
        let mut latencies = self.latencies.lock().unwrap();
        if latencies.len() == LATENCY_WINDOW {
            latencies.pop_front();
        }
        latencies.push_back(latency);
    }

    fn failed_send(&self) {
        self.missed_by_slow_receiver.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::{
        backends::MockKvStore,
        client::Encoding,
    };

    struct ScriptedTransport {
        events: StdMutex<VecDeque<(serde_json::Value, i64)>>,
        closed: std::sync::atomic::AtomicBool,
    }

    impl ScriptedTransport {
        fn new(events: Vec<(serde_json::Value, i64)>) -> Self {
            Self {
                events: StdMutex::new(events.into_iter().collect()),
                closed: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl EventTransport for ScriptedTransport {
        async fn receive(&self, timeout: Duration) -> Option<(serde_json::Value, i64)> {
            if let Some(event) = self.events.lock().unwrap().pop_front() {
                return Some(event);
            }
            tokio::time::sleep(timeout).await;
            None
        }

        async fn close(&self) {
            self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    fn empty_sub_list() -> SubscriptionList {
        SubscriptionList {
            subscriptions: Vec::new(),
            updates_only: false,
            encoding: Encoding::Json,
        }
    }

    #[tokio::test]
    async fn scripted_event_is_forwarded_as_a_notification() {
        let transport = Arc::new(ScriptedTransport::new(vec![(serde_json::json!({"a": 1}), 42)]));
        let kv = Arc::new(MockKvStore::new());
        let bridge = EventBridge::new(
            transport,
            kv,
            ModelData {
                name: "sonic-events".to_string(),
                organization: "example".to_string(),
                version: "1.0".to_string(),
            },
        );
        let (tx, mut rx) = crate::queue::bounded_queue(1 << 20);
        let stop = CancellationToken::new();
        let wg = WaitGroup::new();
        let stop_clone = stop.clone();
        let run_handle = tokio::spawn(async move {
            bridge.stream_run(tx, stop.clone(), wg.clone(), empty_sub_list()).await;
            wg.wait().await;
        });
        let value = rx.dequeue().await.unwrap();
        assert!(matches!(value, Value::Notification(_)));
        stop_clone.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(1), run_handle).await;
    }

    #[tokio::test]
    async fn failed_send_increments_slow_receiver_counter() {
        let transport = Arc::new(ScriptedTransport::new(Vec::new()));
        let kv = Arc::new(MockKvStore::new());
        let bridge = EventBridge::new(
            transport,
            kv,
            ModelData {
                name: "sonic-events".to_string(),
                organization: "example".to_string(),
                version: "1.0".to_string(),
            },
        );
        bridge.failed_send();
        bridge.failed_send();
        assert_eq!(bridge.missed_by_slow_receiver_count(), 2);
    }

    #[tokio::test]
    async fn sent_one_keeps_only_the_last_ten_latencies() {
        let transport = Arc::new(ScriptedTransport::new(Vec::new()));
        let kv = Arc::new(MockKvStore::new());
        let bridge = EventBridge::new(
            transport,
            kv,
            ModelData {
                name: "sonic-events".to_string(),
                organization: "example".to_string(),
                version: "1.0".to_string(),
            },
        );
        for _ in 0..20 {
            bridge.sent_one(Duration::from_millis(100));
        }
        assert_eq!(bridge.latencies.lock().unwrap().len(), LATENCY_WINDOW);
        assert!((bridge.mean_latency_ms() - 100.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn poll_run_is_unsupported() {
        let transport = Arc::new(ScriptedTransport::new(Vec::new()));
        let kv = Arc::new(MockKvStore::new());
        let bridge = EventBridge::new(
            transport,
            kv,
            ModelData {
                name: "sonic-events".to_string(),
                organization: "example".to_string(),
                version: "1.0".to_string(),
            },
        );
        let (tx, mut rx) = crate::queue::bounded_queue(1 << 20);
        let (_poll_tx, poll_rx) = tokio::sync::mpsc::channel(1);
        let wg = WaitGroup::new();
        bridge.poll_run(tx, poll_rx, wg.clone(), empty_sub_list()).await;
        wg.wait().await;
        match rx.dequeue().await.unwrap() {
            Value::Fatal(msg) => assert!(msg.contains("STREAM mode only")),
            other => panic!("expected Fatal, got {other:?}"),
        }
    }
}
