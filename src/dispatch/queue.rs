//! Worker-pool task queue with a periodic beat

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::schedule::ScheduleEntry;
use super::DispatchError;
use crate::config::DispatchConfig;

struct WorkItem {
    name: String,
    future: BoxFuture<'static, ()>,
    enqueued_at: Instant,
}

/// Durable-in-process asynchronous task queue
///
/// Work items are pulled by a fixed pool of workers; long-running items
/// occupy one worker each, so the pool size bounds queue-level concurrency
/// independently of the orchestrator's branch semaphore.
pub struct DispatchQueue {
    sender: RwLock<Option<mpsc::Sender<WorkItem>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    tickers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
    worker_count: usize,
}

impl DispatchQueue {
    /// Create the queue and start its worker pool
    pub fn new(config: &DispatchConfig) -> Self {
        let (sender, receiver) = mpsc::channel::<WorkItem>(config.queue_depth);
        let receiver = Arc::new(AsyncMutex::new(receiver));
        let (shutdown, _) = watch::channel(false);

        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            let receiver = receiver.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let item = {
                        let mut guard = receiver.lock().await;
                        guard.recv().await
                    };
                    let Some(item) = item else {
                        break;
                    };
                    debug!(
                        worker_id = worker_id,
                        task = %item.name,
                        queue_wait_ms = item.enqueued_at.elapsed().as_millis() as u64,
                        "Dispatch worker picked up task"
                    );
                    item.future.await;
                }
            }));
        }

        Self {
            sender: RwLock::new(Some(sender)),
            workers: Mutex::new(workers),
            tickers: Mutex::new(Vec::new()),
            shutdown,
            worker_count: config.worker_count,
        }
    }

    /// Enqueue one named work item
    pub async fn enqueue<F>(&self, name: impl Into<String>, future: F) -> Result<(), DispatchError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let sender = self
            .sender
            .read()
            .clone()
            .ok_or(DispatchError::QueueClosed)?;
        sender
            .send(WorkItem {
                name: name.into(),
                future: Box::pin(future),
                enqueued_at: Instant::now(),
            })
            .await
            .map_err(|_| DispatchError::QueueClosed)
    }

    /// Start a ticker per schedule entry; each tick enqueues a fresh task
    pub fn register_schedule(&self, entries: Vec<ScheduleEntry>) {
        let mut tickers = self.tickers.lock();
        for entry in entries {
            let sender = self.sender.read().clone();
            let Some(sender) = sender else {
                warn!(task = %entry.name, "Schedule registered after queue shutdown");
                return;
            };
            let mut shutdown = self.shutdown.subscribe();
            tickers.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(entry.interval);
                // First tick fires immediately; skip it so the cadence
                // starts one interval after registration.
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let item = WorkItem {
                                name: entry.name.clone(),
                                future: (entry.task)(),
                                enqueued_at: Instant::now(),
                            };
                            if sender.send(item).await.is_err() {
                                break;
                            }
                        }
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
            }));
        }
    }

    /// Number of workers in the pool
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Stop tickers, drain in-flight work, and join the worker pool
    pub async fn shutdown(&self) {
        self.shutdown.send(true).ok();
        // Dropping the sender lets workers drain the channel and exit
        self.sender.write().take();

        let tickers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tickers.lock());
        for ticker in tickers {
            ticker.await.ok();
        }
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            worker.await.ok();
        }
    }
}
