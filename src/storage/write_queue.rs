//! Write serialization queue.
//!
//! A single worker task drains a FIFO channel and runs one action at a time,
//! in the order the actions were submitted. Every job carries a oneshot
//! sender through which its own outcome goes back to the submitter.
//!
//! Submission is split in two phases: [`WriteQueue::reserve`] waits for
//! capacity (or fails on a closed queue) and [`WriteSlot::submit`] hands the
//! action over synchronously. Callers reserve before they mutate shared state,
//! so a mutation can never be left without its queued write.

use crate::core::{Result, StoreError};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, info_span, warn};

type Action = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

struct QueuedWrite {
    seq: u64,
    action: Action,
    done: oneshot::Sender<Result<()>>,
}

#[derive(Clone)]
enum QueueSender {
    Bounded(mpsc::Sender<QueuedWrite>),
    Unbounded(mpsc::UnboundedSender<QueuedWrite>),
}

enum QueueReceiver {
    Bounded(mpsc::Receiver<QueuedWrite>),
    Unbounded(mpsc::UnboundedReceiver<QueuedWrite>),
}

impl QueueReceiver {
    async fn recv(&mut self) -> Option<QueuedWrite> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }
}

#[derive(Default)]
struct QueueCounters {
    next_seq: AtomicU64,
    pending: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    last_error: Mutex<Option<String>>,
    last_success_at: Mutex<Option<DateTime<Utc>>>,
}

impl QueueCounters {
    fn record(&self, outcome: &Result<()>) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
        match outcome {
            Ok(()) => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                *self
                    .last_success_at
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                *self
                    .last_error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(err.to_string());
            }
        }
    }
}

/// Point-in-time view of queue activity.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueStats {
    /// Submitted writes that have not finished yet.
    pub pending: usize,
    /// Writes that finished successfully.
    pub completed: u64,
    /// Writes that finished with an error.
    pub failed: u64,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// When the most recent successful write finished.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Configured bound, `None` when unbounded.
    pub capacity: Option<usize>,
}

pub struct WriteQueue {
    name: String,
    capacity: Option<usize>,
    sender: Mutex<Option<QueueSender>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    counters: Arc<QueueCounters>,
}

impl WriteQueue {
    /// Starts the worker task. `capacity` of `None` or `Some(0)` means
    /// unbounded; otherwise `reserve` waits while the queue is full.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(name: impl Into<String>, capacity: Option<usize>) -> Self {
        let name = name.into();
        let capacity = capacity.filter(|c| *c > 0);
        let (sender, receiver) = match capacity {
            Some(bound) => {
                let (tx, rx) = mpsc::channel(bound);
                (QueueSender::Bounded(tx), QueueReceiver::Bounded(rx))
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (QueueSender::Unbounded(tx), QueueReceiver::Unbounded(rx))
            }
        };

        let counters = Arc::new(QueueCounters::default());
        let worker = tokio::spawn(run_worker(name.clone(), receiver, counters.clone()));

        Self {
            name,
            capacity,
            sender: Mutex::new(Some(sender)),
            worker: tokio::sync::Mutex::new(Some(worker)),
            counters,
        }
    }

    /// Reserves a place in the queue. Fails with `Closed` once `close` has
    /// been called or the worker is gone.
    pub async fn reserve(&self) -> Result<WriteSlot> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(StoreError::Closed)?;

        let slot = match sender {
            QueueSender::Bounded(tx) => {
                SlotSender::Bounded(tx.reserve_owned().await.map_err(|_| StoreError::Closed)?)
            }
            QueueSender::Unbounded(tx) => {
                if tx.is_closed() {
                    return Err(StoreError::Closed);
                }
                SlotSender::Unbounded(tx)
            }
        };

        Ok(WriteSlot {
            sender: slot,
            counters: self.counters.clone(),
        })
    }

    /// Appends `action` to the queue. The returned handle resolves with the
    /// action's own outcome once it has run.
    pub async fn enqueue<F, Fut>(&self, action: F) -> Result<PendingWrite>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Ok(self.reserve().await?.submit(action))
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Stops accepting new writes, lets every queued write finish and joins
    /// the worker. Calling it again is a no-op.
    pub async fn close(&self) -> Result<()> {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            worker.await.map_err(|e| {
                StoreError::persistence(format!("write queue '{}' worker: {}", self.name, e))
            })?;
        }
        Ok(())
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.counters.pending.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            last_error: self
                .counters
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            last_success_at: *self
                .counters
                .last_success_at
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            capacity: self.capacity,
        }
    }
}

enum SlotSender {
    Bounded(mpsc::OwnedPermit<QueuedWrite>),
    Unbounded(mpsc::UnboundedSender<QueuedWrite>),
}

/// Reserved capacity in a [`WriteQueue`].
#[must_use = "a reserved slot does nothing until an action is submitted"]
pub struct WriteSlot {
    sender: SlotSender,
    counters: Arc<QueueCounters>,
}

impl WriteSlot {
    /// Hands `action` to the queue. Never blocks and never fails; if the
    /// worker has died, the returned handle resolves with an error.
    pub fn submit<F, Fut>(self, action: F) -> PendingWrite
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (done, receiver) = oneshot::channel();
        let job = QueuedWrite {
            seq: self.counters.next_seq.fetch_add(1, Ordering::SeqCst),
            action: Box::new(move || action().boxed()),
            done,
        };

        self.counters.pending.fetch_add(1, Ordering::SeqCst);
        match self.sender {
            SlotSender::Bounded(permit) => {
                permit.send(job);
            }
            SlotSender::Unbounded(tx) => {
                if tx.send(job).is_err() {
                    self.counters.pending.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }

        PendingWrite { receiver }
    }
}

/// Completion handle of one queued write.
#[must_use = "dropping a PendingWrite does not cancel the write, but its outcome is lost"]
pub struct PendingWrite {
    receiver: oneshot::Receiver<Result<()>>,
}

impl PendingWrite {
    pub async fn wait(self) -> Result<()> {
        self.receiver.await.map_err(|_| {
            StoreError::persistence("write queue stopped before the write completed")
        })?
    }
}

async fn run_worker(name: String, mut receiver: QueueReceiver, counters: Arc<QueueCounters>) {
    while let Some(job) = receiver.recv().await {
        let QueuedWrite { seq, action, done } = job;
        let span = info_span!("queued_write", queue = %name, seq);

        let outcome = match AssertUnwindSafe(async move { action().await })
            .catch_unwind()
            .instrument(span)
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(queue = %name, seq, "queued write panicked");
                Err(StoreError::persistence(format!(
                    "queued write #{} in '{}' panicked",
                    seq, name
                )))
            }
        };

        if let Err(err) = &outcome {
            warn!(queue = %name, seq, error = %err, "queued write failed");
        }
        counters.record(&outcome);
        let _ = done.send(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn runs_actions_in_submission_order_one_at_a_time() {
        let queue = WriteQueue::spawn("order", None);
        let log = Arc::new(Mutex::new(Vec::new()));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..16u64 {
            let log = log.clone();
            let in_flight = in_flight.clone();
            let max_in_flight = max_in_flight.clone();
            let handle = queue
                .enqueue(move || async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(16 - i)).await;
                    log.lock().unwrap().push(i);
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .unwrap();
            handles.push(handle);
        }

        for handle in handles {
            assert_ok!(handle.wait().await);
        }

        assert_eq!(*log.lock().unwrap(), (0..16).collect::<Vec<_>>());
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn later_handle_waits_for_earlier_actions() {
        let queue = WriteQueue::spawn("gate", None);
        let (release, gate) = oneshot::channel::<()>();

        let first = queue
            .enqueue(move || async move {
                let _ = gate.await;
                Ok(())
            })
            .await
            .unwrap();
        let second = queue.enqueue(|| async { Ok(()) }).await.unwrap();

        let mut second_wait = Box::pin(second.wait());
        assert!(
            timeout(Duration::from_millis(50), &mut second_wait)
                .await
                .is_err()
        );

        release.send(()).unwrap();
        assert_ok!(first.wait().await);
        assert_ok!(second_wait.await);
    }

    #[tokio::test]
    async fn failure_is_reported_only_to_its_own_caller() {
        let queue = WriteQueue::spawn("errors", None);

        let failing = queue
            .enqueue(|| async { Err(StoreError::persistence("disk full")) })
            .await
            .unwrap();
        let succeeding = queue.enqueue(|| async { Ok(()) }).await.unwrap();

        let err = failing.wait().await.unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert_ok!(succeeding.wait().await);

        let stats = queue.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 0);
        assert!(stats.last_error.unwrap().contains("disk full"));
        assert!(stats.last_success_at.is_some());
    }

    #[tokio::test]
    async fn panicking_action_does_not_stop_the_worker() {
        let queue = WriteQueue::spawn("panics", None);

        let panicking = queue
            .enqueue(|| async {
                let explode = true;
                if explode {
                    panic!("boom");
                }
                Ok(())
            })
            .await
            .unwrap();
        let err = panicking.wait().await.unwrap_err();
        assert!(err.is_persistence());

        let next = queue.enqueue(|| async { Ok(()) }).await.unwrap();
        assert_ok!(next.wait().await);
    }

    #[tokio::test]
    async fn close_drains_pending_writes_then_rejects_new_ones() {
        let queue = WriteQueue::spawn("close", None);
        let ran = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let ran = ran.clone();
            handles.push(
                queue
                    .enqueue(move || async move {
                        sleep(Duration::from_millis(5)).await;
                        ran.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
                    .unwrap(),
            );
        }

        queue.close().await.unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 4);
        for handle in handles {
            assert_ok!(handle.wait().await);
        }

        assert!(queue.is_closed());
        assert!(matches!(queue.reserve().await, Err(StoreError::Closed)));
        assert_ok!(queue.close().await);
    }

    #[tokio::test]
    async fn bounded_queue_applies_backpressure() {
        let queue = WriteQueue::spawn("bounded", Some(1));
        let (release, gate) = oneshot::channel::<()>();

        let first = queue
            .enqueue(move || async move {
                let _ = gate.await;
                Ok(())
            })
            .await
            .unwrap();
        let second = queue.enqueue(|| async { Ok(()) }).await.unwrap();

        assert!(
            timeout(Duration::from_millis(50), queue.reserve())
                .await
                .is_err()
        );

        release.send(()).unwrap();
        assert_ok!(first.wait().await);
        assert_ok!(second.wait().await);

        let slot = queue.reserve().await.unwrap();
        assert_ok!(slot.submit(|| async { Ok(()) }).wait().await);
        assert_eq!(queue.stats().capacity, Some(1));
    }
}
