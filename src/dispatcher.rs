//! Glue shared by every `*_run` implementation: path→origin/target
//! resolution, a bounded-fan-out worker pool, and the panic recovery
//! wrapper every background task installs.

use std::{
    any::Any,
    future::Future,
    sync::{
        Mutex,
        Once,
        OnceLock,
    },
};

use futures::stream::{
    self,
    StreamExt,
};

use crate::{
    error::PathParseError,
    path::require_uniform_origin_target,
    queue::QueueSender,
    value::{
        Path,
        Value,
    },
};

/// The small fan-out bound: do not let a wide subscription spawn O(paths)
/// tasks.
pub const MAX_WORKERS: usize = 2;

/// Resolves the single origin/target every path in `paths` must agree on.
pub fn resolve_origin_target<'a>(
    paths: impl IntoIterator<Item = &'a Path>,
) -> Result<(Option<String>, Option<String>), PathParseError> {
    require_uniform_origin_target(paths)
}

/// Runs `f` over `items` with at most [`MAX_WORKERS`] concurrently
/// in-flight.
pub async fn for_each_bounded<T, F, Fut>(items: Vec<T>, f: F)
where
    T: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = ()>,
{
    stream::iter(items)
        .for_each_concurrent(Some(MAX_WORKERS), f)
        .await;
}

/// Spawns `fut` as its own task and converts a panic inside it into a Fatal
/// marker on `queue` carrying both the formatted panic text and a captured
/// stack trace, instead of letting it silently vanish. Any wait-group
/// bookkeeping for `fut` must be done from inside `fut` itself.
pub async fn spawn_guarded<F>(task_name: &str, queue: &QueueSender, fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    install_panic_backtrace_hook();
    match tokio::spawn(fut).await {
        Ok(()) => {}
        Err(join_err) if join_err.is_panic() => {
            let message = panic_message(join_err.into_panic());
            let backtrace = take_last_panic_backtrace();
            let _ = queue.force_enqueue(Value::fatal(format!(
                "{task_name} panicked: {message}\n{backtrace}"
            )));
        }
        Err(_join_err) => {
            // Task was cancelled/aborted, not panicked; nothing to report.
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

static LAST_PANIC_BACKTRACE: OnceLock<Mutex<Option<String>>> = OnceLock::new();
static INSTALL_HOOK: Once = Once::new();

/// Wraps the process panic hook once to stash a captured backtrace where
/// [`spawn_guarded`] can pick it back up after `JoinHandle` reports the
/// panic. Best-effort under concurrent panics: the most recent one wins.
fn install_panic_backtrace_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let backtrace = std::backtrace::Backtrace::force_capture();
            let slot = LAST_PANIC_BACKTRACE.get_or_init(|| Mutex::new(None));
            *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(backtrace.to_string());
            previous(info);
        }));
    });
}

fn take_last_panic_backtrace() -> String {
    LAST_PANIC_BACKTRACE
        .get()
        .and_then(|slot| slot.lock().unwrap_or_else(|e| e.into_inner()).take())
        .unwrap_or_else(|| "no backtrace captured".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
    };

    use super::*;
    use crate::queue::bounded_queue;

    #[tokio::test]
    async fn for_each_bounded_visits_every_item() {
        let seen = Arc::new(AtomicUsize::new(0));
        for_each_bounded(vec![1, 2, 3, 4, 5], |_| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn spawned_panic_becomes_fatal_marker() {
        let (tx, mut rx) = bounded_queue(1 << 20);
        spawn_guarded("worker", &tx, async {
            panic!("test panic");
        })
        .await;
        let value = rx.dequeue().await.unwrap();
        match value {
            Value::Fatal(msg) => assert!(msg.contains("test panic"), "got {msg:?}"),
            other => panic!("expected Fatal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fatal_marker_carries_a_captured_backtrace() {
        let (tx, mut rx) = bounded_queue(1 << 20);
        spawn_guarded("worker", &tx, async {
            panic!("test panic");
        })
        .await;
        let value = rx.dequeue().await.unwrap();
        match value {
            Value::Fatal(msg) => {
                let (_, backtrace) = msg.split_once('\n').expect("message has a backtrace section");
                assert!(!backtrace.trim().is_empty(), "expected a non-empty backtrace");
            }
            other => panic!("expected Fatal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_panicking_task_enqueues_nothing() {
        let (tx, _rx) = bounded_queue(1 << 20);
        spawn_guarded("worker", &tx, async {}).await;
        assert_eq!(tx.bytes_in_flight(), 0);
    }
}
