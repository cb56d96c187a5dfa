//! # Price Sync Task Definitions
//!
//! A [`ProcessTask`] is one unit of work: a product to price plus how many
//! times it has already been rescheduled. Tasks are moved, never shared.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::product::{ProductId, ProductRecord};

/// Unique identifier for a queued task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A product scheduled for a price fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessTask {
    pub task_id: TaskId,
    pub product: ProductRecord,
    /// Reschedules so far; starts at 0
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl ProcessTask {
    #[must_use]
    pub fn new(product: ProductRecord) -> Self {
        Self {
            task_id: TaskId::new(),
            product,
            attempt: 0,
            enqueued_at: Utc::now(),
        }
    }

    #[must_use]
    pub const fn product_id(&self) -> ProductId {
        self.product.id
    }

    /// Same task with the attempt counter bumped by one
    #[must_use]
    pub fn rescheduled(mut self) -> Self {
        self.attempt += 1;
        self.enqueued_at = Utc::now();
        self
    }
}

/// Where a task ended up after one fetch outcome was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transition {
    /// Price written; status taken from the vendor label
    Updated,
    /// Vendor confirmed the item is gone
    Unavailable,
    /// Retryable failure, back on the queue
    Requeued,
    /// Retry budget spent
    Exhausted,
}

impl Transition {
    /// Terminal transitions acknowledge the task on the queue
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Requeued)
    }

    /// Whether the outcome counts as a success sample for rate control
    #[must_use]
    pub const fn is_success_sample(self) -> bool {
        matches!(self, Self::Updated | Self::Unavailable)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Updated => "updated",
            Self::Unavailable => "unavailable",
            Self::Requeued => "requeued",
            Self::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reschedule_increments_attempt_by_one() {
        let task = ProcessTask::new(ProductRecord::new(ProductId(9), "benco", "B-9"));
        let id = task.task_id;
        let task = task.rescheduled().rescheduled();
        assert_eq!(task.attempt, 2);
        assert_eq!(task.task_id, id);
        assert_eq!(task.product_id(), ProductId(9));
    }

    #[test]
    fn only_requeue_keeps_task_outstanding() {
        assert!(Transition::Updated.is_terminal());
        assert!(Transition::Unavailable.is_terminal());
        assert!(Transition::Exhausted.is_terminal());
        assert!(!Transition::Requeued.is_terminal());
    }

    #[test]
    fn empty_result_counts_as_success_sample() {
        assert!(Transition::Unavailable.is_success_sample());
        assert!(!Transition::Exhausted.is_success_sample());
        assert!(!Transition::Requeued.is_success_sample());
    }
}
