//! # Retry State Machine
//!
//! Maps a per-item fetch outcome and the task's attempt counter to a
//! [`Decision`]. Pure: no I/O, no clock.
//!
//! | outcome        | decision                                      |
//! |----------------|-----------------------------------------------|
//! | price          | update price, status from vendor label        |
//! | `EmptyResult`  | mark unavailable                              |
//! | `RateLimited`  | requeue, or exhaust past `max_retries`        |
//! | `Unclassified` | requeue, or exhaust past `max_retries`        |

use serde::{Deserialize, Serialize};

use crate::crawling::tasks::Transition;
use crate::domain::product::{PriceInfo, ProductStatus};
use crate::vendor::client::FetchError;

/// Default retry budget per task
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// What to do with a task after one fetch
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Update { price: PriceInfo, status: ProductStatus },
    MarkUnavailable,
    /// Requeue with the bumped attempt counter
    Requeue { attempt: u32, reason: FetchError },
    /// Give up; `attempt` is the bumped counter that crossed the budget
    Exhaust { attempt: u32, reason: FetchError },
}

impl Decision {
    #[must_use]
    pub const fn transition(&self) -> Transition {
        match self {
            Self::Update { .. } => Transition::Updated,
            Self::MarkUnavailable => Transition::Unavailable,
            Self::Requeue { .. } => Transition::Requeued,
            Self::Exhaust { .. } => Transition::Exhausted,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Decides the next state for a task currently at `attempt`
    #[must_use]
    pub fn decide(&self, outcome: Result<PriceInfo, FetchError>, attempt: u32) -> Decision {
        match outcome {
            Ok(price) => {
                let status = price.status();
                Decision::Update { price, status }
            }
            Err(FetchError::EmptyResult) => Decision::MarkUnavailable,
            Err(reason) => {
                let attempt = attempt.saturating_add(1);
                if attempt > self.max_retries {
                    Decision::Exhaust { attempt, reason }
                } else {
                    Decision::Requeue { attempt, reason }
                }
            }
        }
    }
}
