//! Asynchronous audit recording.
//!
//! Request handlers push validation attempts into a bounded in-memory
//! queue and return immediately; a background writer drains the queue
//! in batches to the audit store. When the queue is full the oldest
//! attempt is dropped and counted, so audit pressure can slow the
//! store down but never a request.

use crate::store::AuditStore;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use warden_core::ValidationAttempt;

/// Attempts drained per store round trip.
const BATCH_SIZE: usize = 64;

/// Backstop flush cadence when traffic is too low to fill a batch.
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditStats {
    pub enqueued: u64,
    pub written: u64,
    pub dropped: u64,
    pub write_failures: u64,
}

pub struct AuditRecorder {
    queue: Mutex<VecDeque<ValidationAttempt>>,
    capacity: usize,
    notify: Notify,
    enqueued: AtomicU64,
    written: AtomicU64,
    dropped: AtomicU64,
    write_failures: AtomicU64,
}

impl AuditRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            notify: Notify::new(),
            enqueued: AtomicU64::new(0),
            written: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
        }
    }

    /// Enqueue an attempt without blocking. Oldest-first eviction when
    /// the queue is full.
    pub fn record(&self, attempt: ValidationAttempt) {
        let mut queue = match self.queue.lock() {
            Ok(queue) => queue,
            Err(poisoned) => poisoned.into_inner(),
        };
        if queue.len() >= self.capacity {
            queue.pop_front();
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped.is_power_of_two() {
                warn!(dropped, "audit queue full, dropping oldest attempts");
            }
        }
        queue.push_back(attempt);
        drop(queue);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
    }

    pub fn stats(&self) -> AuditStats {
        AuditStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }

    fn take_batch(&self) -> Vec<ValidationAttempt> {
        let mut queue = match self.queue.lock() {
            Ok(queue) => queue,
            Err(poisoned) => poisoned.into_inner(),
        };
        let take = queue.len().min(BATCH_SIZE);
        queue.drain(..take).collect()
    }

    fn pending(&self) -> usize {
        match self.queue.lock() {
            Ok(queue) => queue.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    async fn flush(&self, store: &dyn AuditStore) {
        loop {
            let batch = self.take_batch();
            if batch.is_empty() {
                return;
            }
            let len = batch.len() as u64;
            match store.record_attempts(&batch).await {
                Ok(()) => {
                    self.written.fetch_add(len, Ordering::Relaxed);
                }
                Err(err) => {
                    // The batch is lost; an audit outage must not back
                    // up into request handling.
                    self.write_failures.fetch_add(len, Ordering::Relaxed);
                    error!(%err, batch = len, "audit batch write failed");
                }
            }
        }
    }
}

/// Background writer. Drains on wakeups and on a periodic backstop,
/// then performs one final flush when shutdown is signalled.
pub async fn audit_writer_task(
    recorder: Arc<AuditRecorder>,
    store: Arc<dyn AuditStore>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(FLUSH_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = recorder.notify.notified() => {
                if recorder.pending() >= BATCH_SIZE {
                    recorder.flush(store.as_ref()).await;
                }
            }
            _ = interval.tick() => {
                recorder.flush(store.as_ref()).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    recorder.flush(store.as_ref()).await;
    let stats = recorder.stats();
    if stats.dropped > 0 || stats.write_failures > 0 {
        warn!(?stats, "audit writer stopped with losses");
    } else {
        info!(written = stats.written, "audit writer stopped");
    }
    debug!("audit writer task exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use warden_core::{GatewayError, GatewayResult, RequestId};

    struct CollectingStore {
        attempts: Mutex<Vec<ValidationAttempt>>,
        fail: bool,
    }

    #[async_trait]
    impl AuditStore for CollectingStore {
        async fn record_attempts(&self, attempts: &[ValidationAttempt]) -> GatewayResult<()> {
            if self.fail {
                return Err(GatewayError::AuditWrite {
                    reason: "store offline".to_string(),
                });
            }
            self.attempts
                .lock()
                .expect("lock")
                .extend_from_slice(attempts);
            Ok(())
        }
    }

    fn attempt(endpoint: &str) -> ValidationAttempt {
        ValidationAttempt::unresolved(
            RequestId::now_v7(),
            "0".repeat(64),
            endpoint,
            "CREDENTIAL_RESOLUTION_FAILED",
        )
    }

    #[tokio::test]
    async fn test_shutdown_flushes_queue() {
        let recorder = Arc::new(AuditRecorder::new(100));
        let store = Arc::new(CollectingStore {
            attempts: Mutex::new(Vec::new()),
            fail: false,
        });
        let (tx, rx) = watch::channel(false);
        let worker = tokio::spawn(audit_writer_task(recorder.clone(), store.clone(), rx));

        for i in 0..5 {
            recorder.record(attempt(&format!("/api/assets/{i}")));
        }
        tx.send(true).expect("signal");
        worker.await.expect("join");

        assert_eq!(store.attempts.lock().expect("lock").len(), 5);
        assert_eq!(recorder.stats().written, 5);
    }

    #[tokio::test]
    async fn test_full_queue_drops_oldest() {
        let recorder = AuditRecorder::new(3);
        for i in 0..5 {
            recorder.record(attempt(&format!("/e{i}")));
        }
        assert_eq!(recorder.stats().dropped, 2);

        let batch = recorder.take_batch();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].endpoint, "/e2");
    }

    #[tokio::test]
    async fn test_write_failure_is_counted_not_fatal() {
        let recorder = Arc::new(AuditRecorder::new(100));
        let store = Arc::new(CollectingStore {
            attempts: Mutex::new(Vec::new()),
            fail: true,
        });
        recorder.record(attempt("/api/users/u1"));
        recorder.flush(store.as_ref()).await;

        let stats = recorder.stats();
        assert_eq!(stats.write_failures, 1);
        assert_eq!(stats.written, 0);
        assert_eq!(recorder.pending(), 0);
    }

    #[tokio::test]
    async fn test_batch_threshold_triggers_drain() {
        let recorder = Arc::new(AuditRecorder::new(1000));
        let store = Arc::new(CollectingStore {
            attempts: Mutex::new(Vec::new()),
            fail: false,
        });
        for _ in 0..BATCH_SIZE + 10 {
            recorder.record(attempt("/api/orders/o1"));
        }
        recorder.flush(store.as_ref()).await;
        assert_eq!(
            store.attempts.lock().expect("lock").len(),
            BATCH_SIZE + 10
        );
    }
}
