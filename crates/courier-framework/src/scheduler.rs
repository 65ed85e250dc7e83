//! Per-actor concurrency scheduler.
//!
//! Tasks for the same actor run strictly one after another, in submission
//! order. Tasks for different actors run in parallel, bounded by a global
//! worker limit. Each actor with pending work has a lane (a FIFO queue) and
//! exactly one drainer task working through it; the lane is removed when it
//! empties, so idle actors cost nothing.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, TryAcquireError, oneshot};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use courier_core::ActorId;

use crate::error::{DispatchError, SchedulerError};

/// What `submit` does when the queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backpressure {
    /// Wait for a free slot.
    #[default]
    Block,
    /// Fail immediately with [`SchedulerError::QueueFull`].
    Reject,
}

/// Scheduler limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of tasks running at once, across all actors.
    pub workers: usize,
    /// Maximum number of submitted tasks that have not started yet.
    pub queue_capacity: usize,
    pub backpressure: Backpressure,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 16,
            queue_capacity: 1024,
            backpressure: Backpressure::Block,
        }
    }
}

type Job = BoxFuture<'static, ()>;

struct Inner {
    lanes: Mutex<HashMap<ActorId, VecDeque<Job>>>,
    workers: Semaphore,
    queue_slots: Arc<Semaphore>,
    config: SchedulerConfig,
    tracker: TaskTracker,
    closed: AtomicBool,
}

/// Runs tasks serially per actor and in parallel across actors.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let workers = config.workers.max(1);
        let queue_capacity = config.queue_capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                lanes: Mutex::new(HashMap::new()),
                workers: Semaphore::new(workers),
                queue_slots: Arc::new(Semaphore::new(queue_capacity)),
                config: SchedulerConfig {
                    workers,
                    queue_capacity,
                    ..config
                },
                tracker: TaskTracker::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Queues `task` behind every earlier task of the same actor.
    ///
    /// The returned handle resolves to the task's output. Dropping it does not
    /// cancel the task.
    pub async fn submit<F, T>(
        &self,
        actor_id: ActorId,
        task: F,
    ) -> Result<TaskHandle<T>, SchedulerError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::ShuttingDown);
        }

        let slot = match self.inner.config.backpressure {
            Backpressure::Block => self
                .inner
                .queue_slots
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| SchedulerError::ShuttingDown)?,
            Backpressure::Reject => match self.inner.queue_slots.clone().try_acquire_owned() {
                Ok(slot) => slot,
                Err(TryAcquireError::NoPermits) => {
                    let capacity = self.inner.config.queue_capacity;
                    warn!(actor_id, capacity, "Scheduler queue full, rejecting task");
                    return Err(SchedulerError::QueueFull { capacity });
                }
                Err(TryAcquireError::Closed) => return Err(SchedulerError::ShuttingDown),
            },
        };

        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            // A started task no longer counts against the queue.
            drop(slot);
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(output) => {
                    let _ = tx.send(output);
                }
                Err(payload) => {
                    let err = DispatchError::from_panic(payload);
                    error!(actor_id, "Scheduled task {err}");
                }
            }
        });

        let start_drainer = match self.inner.lanes.lock().entry(actor_id) {
            Entry::Occupied(mut lane) => {
                lane.get_mut().push_back(job);
                false
            }
            Entry::Vacant(lane) => {
                lane.insert(VecDeque::from([job]));
                true
            }
        };

        if start_drainer {
            self.inner.tracker.spawn(self.inner.clone().drain(actor_id));
        }

        Ok(TaskHandle { actor_id, rx })
    }

    /// Number of submitted tasks that have not started.
    pub fn pending(&self) -> usize {
        self.inner.config.queue_capacity - self.inner.queue_slots.available_permits()
    }

    /// Number of actors with queued or running work.
    pub fn active_actors(&self) -> usize {
        self.inner.lanes.lock().len()
    }

    /// Stops accepting tasks and waits for everything already queued.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(pending = self.pending(), "Scheduler shutting down");
        self.inner.queue_slots.close();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }
}

impl Inner {
    async fn drain(self: Arc<Self>, actor_id: ActorId) {
        loop {
            let job = {
                let mut lanes = self.lanes.lock();
                let Some(lane) = lanes.get_mut(&actor_id) else {
                    return;
                };
                match lane.pop_front() {
                    Some(job) => job,
                    None => {
                        lanes.remove(&actor_id);
                        return;
                    }
                }
            };

            let Ok(_worker) = self.workers.acquire().await else {
                self.lanes.lock().remove(&actor_id);
                return;
            };
            job.await;
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .field("active_actors", &self.active_actors())
            .finish()
    }
}

/// Resolves to the output of a submitted task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    actor_id: ActorId,
    rx: oneshot::Receiver<T>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, SchedulerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let actor_id = self.actor_id;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| SchedulerError::TaskFailed { actor_id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;
    use tokio_test::{assert_pending, assert_ready, task};

    fn recorder() -> Arc<Mutex<Vec<&'static str>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_actor_runs_in_submission_order() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let log = recorder();

        let mut handles = Vec::new();
        for (name, delay) in [("e1", 30), ("e2", 10), ("e3", 20)] {
            let log = log.clone();
            let handle = scheduler
                .submit(7, async move {
                    log.lock().push(name);
                    sleep(Duration::from_millis(delay)).await;
                    log.lock().push(name);
                })
                .await
                .unwrap();
            handles.push(handle);
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Each task finishes before the next one starts.
        assert_eq!(*log.lock(), vec!["e1", "e1", "e2", "e2", "e3", "e3"]);
        assert_eq!(scheduler.active_actors(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_actors_run_in_parallel() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let log = recorder();

        let slow = {
            let log = log.clone();
            scheduler
                .submit(1, async move {
                    sleep(Duration::from_millis(100)).await;
                    log.lock().push("slow");
                })
                .await
                .unwrap()
        };
        let fast = {
            let log = log.clone();
            scheduler
                .submit(2, async move {
                    sleep(Duration::from_millis(10)).await;
                    log.lock().push("fast");
                })
                .await
                .unwrap()
        };

        let start = tokio::time::Instant::now();
        let (a, b) = tokio::join!(slow, fast);
        a.unwrap();
        b.unwrap();

        assert_eq!(*log.lock(), vec!["fast", "slow"]);
        assert!(start.elapsed() < Duration::from_millis(110));
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_limit_serializes_actors() {
        let scheduler = Scheduler::new(SchedulerConfig {
            workers: 1,
            ..Default::default()
        });

        let start = tokio::time::Instant::now();
        let a = scheduler
            .submit(1, sleep(Duration::from_millis(50)))
            .await
            .unwrap();
        let b = scheduler
            .submit(2, sleep(Duration::from_millis(50)))
            .await
            .unwrap();
        a.await.unwrap();
        b.await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_reject_when_queue_full() {
        let scheduler = Scheduler::new(SchedulerConfig {
            workers: 1,
            queue_capacity: 1,
            backpressure: Backpressure::Reject,
        });

        // Nothing has started yet, so the first task still holds the slot.
        let first = scheduler.submit(1, async { 1 }).await.unwrap();
        let err = scheduler.submit(2, async { 2 }).await.unwrap_err();
        assert_eq!(err, SchedulerError::QueueFull { capacity: 1 });

        assert_eq!(first.await.unwrap(), 1);
        assert_eq!(scheduler.submit(2, async { 2 }).await.unwrap().await, Ok(2));
    }

    #[tokio::test]
    async fn test_block_waits_for_queue_slot() {
        let scheduler = Scheduler::new(SchedulerConfig {
            workers: 1,
            queue_capacity: 1,
            backpressure: Backpressure::Block,
        });

        let first = scheduler.submit(1, async { 1 }).await.unwrap();
        let mut second = task::spawn(scheduler.submit(2, async { 2 }));
        assert_pending!(second.poll());

        // The slot frees up as soon as the first task starts.
        assert_eq!(first.await, Ok(1));
        let handle = assert_ready!(second.poll()).unwrap();
        assert_eq!(handle.await, Ok(2));
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_stall_lane() {
        let scheduler = Scheduler::new(SchedulerConfig::default());

        let failed = scheduler
            .submit(3, async {
                panic!("boom");
            })
            .await
            .unwrap();
        let next = scheduler.submit(3, async { "still running" }).await.unwrap();

        assert_eq!(failed.await, Err(SchedulerError::TaskFailed { actor_id: 3 }));
        assert_eq!(next.await, Ok("still running"));
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_rejects() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let log = recorder();

        let handle = {
            let log = log.clone();
            scheduler
                .submit(1, async move {
                    tokio::task::yield_now().await;
                    log.lock().push("done");
                })
                .await
                .unwrap()
        };

        scheduler.shutdown().await;
        assert_eq!(*log.lock(), vec!["done"]);
        assert!(handle.await.is_ok());

        let err = scheduler.submit(1, async {}).await.unwrap_err();
        assert_eq!(err, SchedulerError::ShuttingDown);
    }
}
