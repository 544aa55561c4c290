//! Debounce ("duration") and timeout timers for the condition engine.
//!
//! Mirrors the request-queue dispatcher pattern used by the source timer service: starts are
//! submitted through a single background task that owns the timer index and hands each live
//! timer its own sleeping task, cancellable via a [`CancellationToken`]. Cancel and reset bypass
//! the queue and take the index's lock directly -- they don't need to preserve ordering relative
//! to other starts, only relative to the specific entry they touch.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::instance_id::InstanceId;

enum TimerRequest {
    Start {
        id: InstanceId,
        delay: Duration,
        callback: TimerCallback,
    },
}

pub type TimerCallback = Arc<dyn Fn(InstanceId) + Send + Sync>;

#[derive(Clone)]
struct TimerEntry {
    cancel: CancellationToken,
    delay: Duration,
    callback: TimerCallback,
}

type TimerIndex = Arc<Mutex<HashMap<InstanceId, TimerEntry>>>;

fn spawn_timer(index: TimerIndex, id: InstanceId, delay: Duration, callback: TimerCallback) -> CancellationToken {
    let token = CancellationToken::new();
    let child_index = index.clone();
    let child_token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                child_index.lock().remove(&id);
                debug!(timer_id = %id, "timer elapsed");
                callback(id);
            }
            _ = child_token.cancelled() => {
                debug!(timer_id = %id, "timer cancelled before elapsing");
            }
        }
    });
    token
}

/// Schedules and cancels named one-shot timers that invoke a callback after a delay.
///
/// Starting a timer for an id that already has one cancels the previous timer first.
pub struct TimerService {
    index: TimerIndex,
    tx: mpsc::UnboundedSender<TimerRequest>,
    dispatcher: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl TimerService {
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<TimerRequest>();
        let index: TimerIndex = Arc::new(Mutex::new(HashMap::new()));
        let dispatch_index = index.clone();

        let dispatcher = tokio::spawn(async move {
            while let Some(TimerRequest::Start { id, delay, callback }) = rx.recv().await {
                if let Some(existing) = dispatch_index.lock().remove(&id) {
                    existing.cancel.cancel();
                }
                let token = spawn_timer(dispatch_index.clone(), id, delay, callback.clone());
                dispatch_index
                    .lock()
                    .insert(id, TimerEntry { cancel: token, delay, callback });
            }
        });

        Self {
            index,
            tx,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Start (or restart) a timer that invokes `callback(id)` after `delay`.
    pub fn start(&self, id: InstanceId, delay: Duration, callback: TimerCallback) {
        let _ = self.tx.send(TimerRequest::Start { id, delay, callback });
    }

    /// Cancel a timer if one is pending for `id`. Returns `true` if a pending timer was found and
    /// cancelled, `false` if none was pending.
    pub fn cancel(&self, id: InstanceId) -> bool {
        match self.index.lock().remove(&id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Restart the timer for `id` from now, reusing the delay and callback it was originally
    /// started with. Returns `false` if no timer is currently pending for `id`.
    pub fn reset(&self, id: InstanceId) -> bool {
        let Some((delay, callback)) = ({
            let mut index = self.index.lock();
            index.remove(&id).map(|entry| {
                entry.cancel.cancel();
                (entry.delay, entry.callback)
            })
        }) else {
            return false;
        };

        let token = spawn_timer(self.index.clone(), id, delay, callback.clone());
        self.index
            .lock()
            .insert(id, TimerEntry { cancel: token, delay, callback });
        true
    }

    pub fn is_pending(&self, id: InstanceId) -> bool {
        self.index.lock().contains_key(&id)
    }

    /// Cancel every in-flight timer and stop accepting new ones. Any `start` requests still
    /// sitting in the dispatcher's queue are discarded along with it.
    pub fn stop(&self) {
        if let Some(handle) = self.dispatcher.lock().take() {
            handle.abort();
        }
        for (_, entry) in self.index.lock().drain() {
            entry.cancel.cancel();
        }
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_timer_fires_after_delay() {
        let service = TimerService::new();
        let id = InstanceId::next();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        service.start(
            id,
            Duration::from_millis(20),
            Arc::new(move |_| fired_clone.store(true, Ordering::SeqCst)),
        );
        assert!(service.is_pending(id));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert!(!service.is_pending(id));
    }

    #[tokio::test]
    async fn test_cancel_prevents_callback_and_reports_whether_one_was_pending() {
        let service = TimerService::new();
        let id = InstanceId::next();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        service.start(
            id,
            Duration::from_millis(40),
            Arc::new(move |_| fired_clone.store(true, Ordering::SeqCst)),
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(service.cancel(id));
        assert!(!service.cancel(id), "cancelling an already-cancelled timer reports false");
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_reset_restarts_delay_using_original_callback() {
        let service = TimerService::new();
        let id = InstanceId::next();
        let fire_count = Arc::new(AtomicU32::new(0));
        let counter = fire_count.clone();
        service.start(
            id,
            Duration::from_millis(30),
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(service.reset(id));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            fire_count.load(Ordering::SeqCst),
            0,
            "reset should have restarted the 30ms delay from the reset point"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fire_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reset_on_unknown_timer_reports_false() {
        let service = TimerService::new();
        assert!(!service.reset(InstanceId::next()));
    }

    #[tokio::test]
    async fn test_stop_cancels_in_flight_timers() {
        let service = TimerService::new();
        let id = InstanceId::next();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        service.start(
            id,
            Duration::from_millis(30),
            Arc::new(move |_| fired_clone.store(true, Ordering::SeqCst)),
        );
        service.stop();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }
}
