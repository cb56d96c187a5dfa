//! # Price Sync Engine
//!
//! Producer/consumer pipeline that refreshes catalog prices from one vendor:
//! - `queues`: bounded task queue with unfinished-task tracking
//! - `stats`: sliding-window success/error statistics
//! - `rate_controller`: adaptive request rate driven by the stats
//! - `retry`: per-item outcome to next-state mapping
//! - `producer` / `updater`: run orchestration

pub mod producer;
pub mod queues;
pub mod rate_controller;
pub mod retry;
pub mod stats;
pub mod tasks;
pub mod updater;

pub use producer::{Producer, ProducerError, ProducerReport};
pub use queues::{QueueConfig, QueueError, QueueMetrics, TaskQueue};
pub use rate_controller::{AdjustmentKind, RateAdjustment, RateController, RateControllerConfig};
pub use retry::{Decision, RetryPolicy};
pub use stats::{StatBuffer, WindowStats};
pub use tasks::{ProcessTask, TaskId, Transition};
pub use updater::{RunCounters, RunSummary, Updater, UpdaterConfig, UpdaterDeps, UpdaterError, UpdaterState};
