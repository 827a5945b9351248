//! Bounded-parallelism FIFO admission queue.
//!
//! The queue is a pure dispatcher: it does not know what tasks do. Tasks are
//! admitted strictly in enqueue order and at most `max_concurrent` run at any
//! instant; whenever one completes, success or failure, the next waiting
//! task (if any) takes its slot. Admitted tasks are not cancellable; callers
//! may abandon the returned receiver.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Error)]
pub enum QueueError {
    /// The waiting list hit its cap; transient, the client should retry.
    #[error("queue is full")]
    Saturated,
    #[error("queue is shutting down")]
    ShuttingDown,
    #[error("{0}")]
    Task(#[from] anyhow::Error),
}

/// Snapshot of the queue counters, exposed on the health endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub in_flight: usize,
    pub waiting: usize,
    pub max_concurrent: usize,
    pub total_processed: u64,
    pub total_failed: u64,
}

enum Admission {
    Run,
    Abort,
}

/// A queued task delivers its own result through the oneshot it captured;
/// the queue only learns whether it succeeded, for the counters.
type QueuedTask = Box<dyn FnOnce(Admission) -> BoxFuture<'static, bool> + Send>;

struct Inner {
    in_flight: usize,
    waiting: VecDeque<QueuedTask>,
    total_processed: u64,
    total_failed: u64,
    shutting_down: bool,
}

pub struct AdmissionQueue {
    max_concurrent: usize,
    max_waiting: usize,
    inner: Arc<Mutex<Inner>>,
}

impl AdmissionQueue {
    pub fn new(max_concurrent: usize, max_waiting: usize) -> AdmissionQueue {
        AdmissionQueue {
            max_concurrent: max_concurrent.max(1),
            max_waiting,
            inner: Arc::new(Mutex::new(Inner {
                in_flight: 0,
                waiting: VecDeque::new(),
                total_processed: 0,
                total_failed: 0,
                shutting_down: false,
            })),
        }
    }

    /// Admit a task, or park it FIFO behind the running ones. The receiver
    /// completes with the task's outcome once it has run.
    pub fn enqueue<T, F, Fut>(
        &self,
        task: F,
    ) -> Result<oneshot::Receiver<Result<T, QueueError>>, QueueError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let queued: QueuedTask = Box::new(move |admission| {
            Box::pin(async move {
                match admission {
                    Admission::Run => {
                        let outcome = task().await;
                        let succeeded = outcome.is_ok();
                        let _ = sender.send(outcome.map_err(QueueError::Task));
                        succeeded
                    }
                    Admission::Abort => {
                        let _ = sender.send(Err(QueueError::ShuttingDown));
                        false
                    }
                }
            })
        });

        let mut inner = self.inner.lock().unwrap();
        if inner.shutting_down {
            return Err(QueueError::ShuttingDown);
        }
        if inner.in_flight < self.max_concurrent {
            // Completion handlers drain the waiting list before releasing a
            // slot, so a free slot implies nothing is waiting.
            inner.in_flight += 1;
            drop(inner);
            self.spawn_worker(queued);
        } else {
            if inner.waiting.len() >= self.max_waiting {
                return Err(QueueError::Saturated);
            }
            inner.waiting.push_back(queued);
        }
        Ok(receiver)
    }

    /// One slot's worth of work: run the admitted task, then keep pulling
    /// from the waiting list until it is empty.
    fn spawn_worker(&self, first: QueuedTask) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut current = Some(first);
            while let Some(task) = current.take() {
                let succeeded = task(Admission::Run).await;
                let mut state = inner.lock().unwrap();
                state.total_processed += 1;
                if !succeeded {
                    state.total_failed += 1;
                }
                match state.waiting.pop_front() {
                    Some(next) => current = Some(next),
                    None => state.in_flight -= 1,
                }
            }
        });
    }

    pub fn status(&self) -> QueueStatus {
        let inner = self.inner.lock().unwrap();
        QueueStatus {
            in_flight: inner.in_flight,
            waiting: inner.waiting.len(),
            max_concurrent: self.max_concurrent,
            total_processed: inner.total_processed,
            total_failed: inner.total_failed,
        }
    }

    /// Refuse new admissions and fail every task still waiting. Tasks that
    /// already started are left to finish.
    pub fn shutdown(&self) {
        let drained: Vec<QueuedTask> = {
            let mut inner = self.inner.lock().unwrap();
            inner.shutting_down = true;
            inner.waiting.drain(..).collect()
        };
        for task in drained {
            tokio::spawn(task(Admission::Abort));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_max_concurrent() {
        let queue = AdmissionQueue::new(2, 100);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut receivers = Vec::new();
        for _ in 0..8 {
            let running = running.clone();
            let peak = peak.clone();
            let receiver = queue
                .enqueue(move || async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(30)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
            receivers.push(receiver);
        }

        for receiver in receivers {
            receiver.await.unwrap().unwrap();
        }
        // Counters are updated just after each result is delivered.
        sleep(Duration::from_millis(50)).await;

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        let status = queue.status();
        assert_eq!(status.in_flight, 0);
        assert_eq!(status.waiting, 0);
        assert_eq!(status.total_processed, 8);
        assert_eq!(status.total_failed, 0);
    }

    #[tokio::test]
    async fn tasks_start_in_enqueue_order() {
        let queue = AdmissionQueue::new(1, 100);
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut receivers = Vec::new();
        for index in 0..5 {
            let order = order.clone();
            let receiver = queue
                .enqueue(move || async move {
                    order.lock().unwrap().push(index);
                    sleep(Duration::from_millis(5)).await;
                    Ok(index)
                })
                .unwrap();
            receivers.push(receiver);
        }

        for (index, receiver) in receivers.into_iter().enumerate() {
            assert_eq!(receiver.await.unwrap().unwrap(), index);
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn failures_complete_the_future_and_count() {
        let queue = AdmissionQueue::new(1, 100);

        let ok = queue.enqueue(|| async { Ok(1) }).unwrap();
        let failing = queue
            .enqueue(|| async { Err::<i32, _>(anyhow::anyhow!("boom")) })
            .unwrap();

        assert_eq!(ok.await.unwrap().unwrap(), 1);
        match failing.await.unwrap() {
            Err(QueueError::Task(err)) => assert_eq!(err.to_string(), "boom"),
            other => panic!("expected task error, got {other:?}"),
        }

        sleep(Duration::from_millis(50)).await;
        let status = queue.status();
        assert_eq!(status.total_processed, 2);
        assert_eq!(status.total_failed, 1);
    }

    #[tokio::test]
    async fn saturation_rejects_synchronously() {
        let queue = AdmissionQueue::new(1, 1);

        let _running = queue
            .enqueue(|| async {
                sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .unwrap();
        // Let the first task occupy the slot before filling the waiting list.
        sleep(Duration::from_millis(20)).await;

        let _waiting = queue.enqueue(|| async { Ok(()) }).unwrap();
        let rejected = queue.enqueue(|| async { Ok(()) });
        assert!(matches!(rejected, Err(QueueError::Saturated)));
    }

    #[tokio::test]
    async fn shutdown_fails_waiting_tasks() {
        let queue = AdmissionQueue::new(1, 100);

        let _running = queue
            .enqueue(|| async {
                sleep(Duration::from_millis(100)).await;
                Ok(())
            })
            .unwrap();
        sleep(Duration::from_millis(20)).await;

        let waiting = queue.enqueue(|| async { Ok(()) }).unwrap();
        queue.shutdown();

        assert!(matches!(
            waiting.await.unwrap(),
            Err(QueueError::ShuttingDown)
        ));
        assert!(matches!(
            queue.enqueue(|| async { Ok(()) }),
            Err(QueueError::ShuttingDown)
        ));
    }
}
