//! # Bounded Task Queue
//!
//! Buffers [`ProcessTask`]s between the producer and consumers. Capacity is
//! bounded, so a fast producer waits instead of growing memory. The queue
//! tracks unfinished tasks: `put` counts a task in, `task_done` counts it
//! out, and `join` resolves once everything put has been acknowledged.
//! Requeueing a task keeps it counted.

use std::collections::HashSet;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify, mpsc};
use tracing::{debug, warn};

use crate::crawling::tasks::ProcessTask;
use crate::domain::product::ProductId;

/// Default bound on buffered tasks
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

/// Queue configuration parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of buffered tasks
    pub max_capacity: usize,

    /// Enable queue metrics collection
    pub enable_metrics: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_capacity: DEFAULT_QUEUE_CAPACITY,
            enable_metrics: true,
        }
    }
}

pub struct TaskQueue {
    sender: mpsc::Sender<ProcessTask>,
    receiver: Mutex<mpsc::Receiver<ProcessTask>>,
    /// Products put and not yet acknowledged
    outstanding: StdMutex<HashSet<ProductId>>,
    unfinished: AtomicUsize,
    all_done: Notify,
    metrics: StdMutex<QueueMetrics>,
    config: QueueConfig,
}

impl TaskQueue {
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        let capacity = config.max_capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);

        Self {
            sender,
            receiver: Mutex::new(receiver),
            outstanding: StdMutex::new(HashSet::new()),
            unfinished: AtomicUsize::new(0),
            all_done: Notify::new(),
            metrics: StdMutex::new(QueueMetrics::new()),
            config: QueueConfig {
                max_capacity: capacity,
                ..config
            },
        }
    }

    #[must_use]
    pub fn with_capacity(max_capacity: usize) -> Self {
        Self::new(QueueConfig {
            max_capacity,
            ..QueueConfig::default()
        })
    }

    /// Enqueues a task, waiting while the queue is full.
    ///
    /// Returns `Ok(false)` without enqueueing when the product already has an
    /// unfinished task. Cancel-safe: a dropped call leaves no trace.
    pub async fn put(&self, task: ProcessTask) -> Result<bool, QueueError> {
        let permit = self.sender.reserve().await.map_err(|_| QueueError::Closed)?;

        if !self.mark_outstanding(task.product_id()) {
            debug!(product_id = %task.product_id(), "skipping product already in flight");
            return Ok(false);
        }
        self.unfinished.fetch_add(1, Ordering::SeqCst);
        permit.send(task);

        self.record(QueueMetrics::record_enqueue);
        Ok(true)
    }

    /// Waits for the next task
    pub async fn get(&self) -> Result<ProcessTask, QueueError> {
        let task = {
            let mut receiver = self.receiver.lock().await;
            receiver.recv().await.ok_or(QueueError::Closed)?
        };
        self.record(QueueMetrics::record_dequeue);
        Ok(task)
    }

    /// Takes a task if one is immediately available
    pub fn try_get(&self) -> Option<ProcessTask> {
        let mut receiver = self.receiver.try_lock().ok()?;
        let task = receiver.try_recv().ok()?;
        drop(receiver);
        self.record(QueueMetrics::record_dequeue);
        Some(task)
    }

    /// Puts a rescheduled task back without touching the unfinished count.
    ///
    /// Never blocks the caller. When the buffer is full the send is handed to
    /// a background task so a consumer cannot deadlock on its own queue.
    pub fn requeue(&self, task: ProcessTask) -> Result<(), QueueError> {
        match self.sender.try_send(task) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(task)) => {
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    if sender.send(task).await.is_err() {
                        warn!("queue closed before requeued task could be delivered");
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => return Err(QueueError::Closed),
        }
        self.record(QueueMetrics::record_requeue);
        Ok(())
    }

    /// Acknowledges a task that reached a terminal state
    pub fn task_done(&self, product: ProductId) -> Result<(), QueueError> {
        let previous = self
            .unfinished
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map_err(|_| QueueError::TaskDoneUnderflow)?;

        self.outstanding
            .lock()
            .map_err(|_| QueueError::Operation("outstanding set poisoned".to_string()))?
            .remove(&product);
        self.record(QueueMetrics::record_done);

        if previous == 1 {
            self.all_done.notify_waiters();
        }
        Ok(())
    }

    /// Resolves once every task put has been acknowledged
    pub async fn join(&self) {
        loop {
            let notified = self.all_done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.unfinished.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Tasks put and not yet acknowledged
    #[must_use]
    pub fn unfinished(&self) -> usize {
        self.unfinished.load(Ordering::SeqCst)
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.config.max_capacity
    }

    /// Tasks currently buffered
    #[must_use]
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn metrics(&self) -> QueueMetrics {
        self.metrics
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    fn mark_outstanding(&self, product: ProductId) -> bool {
        self.outstanding
            .lock()
            .map(|mut set| set.insert(product))
            .unwrap_or(false)
    }

    fn record(&self, update: impl FnOnce(&mut QueueMetrics, usize)) {
        if !self.config.enable_metrics {
            return;
        }
        let size = self.len();
        if let Ok(mut metrics) = self.metrics.lock() {
            update(&mut metrics, size);
        }
    }
}

/// Queue metrics for monitoring and telemetry
#[derive(Debug, Clone)]
pub struct QueueMetrics {
    pub total_enqueued: u64,
    pub total_dequeued: u64,
    pub total_requeued: u64,
    pub total_completed: u64,
    /// Buffered tasks at the last operation
    pub current_size: usize,
    pub max_size_reached: usize,
    pub last_operation_time: Option<Instant>,
    pub created_at: Instant,
}

impl QueueMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            total_enqueued: 0,
            total_dequeued: 0,
            total_requeued: 0,
            total_completed: 0,
            current_size: 0,
            max_size_reached: 0,
            last_operation_time: None,
            created_at: Instant::now(),
        }
    }

    fn observe(&mut self, size: usize) {
        self.current_size = size;
        self.max_size_reached = self.max_size_reached.max(size);
        self.last_operation_time = Some(Instant::now());
    }

    pub fn record_enqueue(&mut self, size: usize) {
        self.total_enqueued += 1;
        self.observe(size);
    }

    pub fn record_dequeue(&mut self, size: usize) {
        self.total_dequeued += 1;
        self.observe(size);
    }

    pub fn record_requeue(&mut self, size: usize) {
        self.total_requeued += 1;
        self.observe(size);
    }

    pub fn record_done(&mut self, size: usize) {
        self.total_completed += 1;
        self.observe(size);
    }

    /// Operations per second since creation
    #[must_use]
    pub fn throughput(&self) -> f64 {
        let elapsed = self.created_at.elapsed();
        if elapsed.as_secs() > 0 {
            (self.total_enqueued + self.total_dequeued) as f64 / elapsed.as_secs() as f64
        } else {
            0.0
        }
    }
}

impl Default for QueueMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Queue is closed")]
    Closed,

    #[error("task_done called more times than tasks were put")]
    TaskDoneUnderflow,

    #[error("Queue operation failed: {0}")]
    Operation(String),
}
