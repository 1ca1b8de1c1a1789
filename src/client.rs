//! The `Client` contract every concrete client family implements, and the
//! subscription-shaped types ([`SubscriptionList`], [`Subscription`],
//! [`SubscriptionMode`], [`Encoding`], [`ModelData`]) those methods take.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    error::SetError,
    queue::QueueSender,
    sync_util::WaitGroup,
    value::{
        Path,
        Update,
        Value,
    },
};

/// `Mode (TARGET_DEFINED | SAMPLE | ON_CHANGE)`, plus an explicit
/// unsupported-mode carrier so validation has something concrete to
/// report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionMode {
    TargetDefined,
    Sample,
    OnChange,
    /// A mode value outside the known set.
    Unsupported(i32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Json,
    JsonIetf,
    Protobuf,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Subscription {
    pub path: Path,
    pub mode: SubscriptionMode,
    /// `0` means "use the path's minimum supported interval".
    pub sample_interval: Duration,
    pub heartbeat_interval: Option<Duration>,
    pub suppress_redundant: bool,
}

impl Subscription {
    #[must_use]
    pub fn new(path: Path, mode: SubscriptionMode) -> Self {
        Self {
            path,
            mode,
            sample_interval: Duration::ZERO,
            heartbeat_interval: None,
            suppress_redundant: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubscriptionList {
    pub subscriptions: Vec<Subscription>,
    pub updates_only: bool,
    pub encoding: Encoding,
}

/// A schema/model identifier returned by `Capabilities` (gNMI `ModelData`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelData {
    pub name: String,
    pub organization: String,
    pub version: String,
}

/// The uniform entry point the request-handling layer dispatches to by
/// `origin`/`target`. Every `*_run` method
/// must signal `wg` exactly once, even on panic, and never block past
/// `stop`/`once` cancellation.
#[async_trait]
pub trait Client: Send + Sync {
    async fn get(&self, wg: WaitGroup) -> Vec<Value>;

    async fn set(&self, delete: &[Path], replace: &[Path], update: &[Update]) -> Result<(), SetError>;

    async fn stream_run(
        &self,
        queue: QueueSender,
        stop: CancellationToken,
        wg: WaitGroup,
        sub_list: SubscriptionList,
    );

    async fn poll_run(
        &self,
        queue: QueueSender,
        poll: tokio::sync::mpsc::Receiver<()>,
        wg: WaitGroup,
        sub_list: SubscriptionList,
    );

    async fn once_run(&self, queue: QueueSender, wg: WaitGroup, sub_list: SubscriptionList);

    fn capabilities(&self) -> Vec<ModelData>;

    async fn close(&self);

    /// Records a successful send's latency, feeding the rolling-mean
    /// accounting some clients keep.
    fn sent_one(&self, latency: Duration);

    fn failed_send(&self);
}
