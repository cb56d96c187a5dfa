//! # Sliding-Window Stat Buffer
//!
//! Records one sample per processed result and reports throughput and error
//! rate over a fixed time window. Samples age out once they are `window` old.
//! Every method has an `_at` variant taking an explicit instant so the buffer
//! can be driven deterministically.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Default sliding window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(20);

/// One recorded result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessResult {
    pub timestamp: Instant,
    pub success: bool,
}

/// Snapshot of the window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowStats {
    /// Results per second, `None` while the window spans no time
    pub rate: Option<f64>,
    /// Failed fraction, `None` while the window is empty
    pub error_rate: Option<f64>,
    /// Samples currently in the window
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct StatBuffer {
    window: Duration,
    items: VecDeque<ProcessResult>,
    total: usize,
    errors: usize,
    lifetime_total: u64,
    lifetime_errors: u64,
}

impl StatBuffer {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            items: VecDeque::new(),
            total: 0,
            errors: 0,
            lifetime_total: 0,
            lifetime_errors: 0,
        }
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    pub fn add_item(&mut self, success: bool) {
        self.add_item_at(success, Instant::now());
    }

    pub fn add_item_at(&mut self, success: bool, now: Instant) {
        self.evict(now);
        self.items.push_back(ProcessResult {
            timestamp: now,
            success,
        });
        self.total += 1;
        self.lifetime_total += 1;
        if !success {
            self.errors += 1;
            self.lifetime_errors += 1;
        }
    }

    pub fn stats(&mut self) -> WindowStats {
        self.stats_at(Instant::now())
    }

    pub fn stats_at(&mut self, now: Instant) -> WindowStats {
        self.evict(now);

        let error_rate = (self.total > 0).then(|| self.errors as f64 / self.total as f64);
        let rate = self.items.front().and_then(|oldest| {
            let elapsed = now.saturating_duration_since(oldest.timestamp).as_secs_f64();
            (elapsed > 0.0).then(|| self.total as f64 / elapsed)
        });

        WindowStats {
            rate,
            error_rate,
            total: self.total,
        }
    }

    /// Samples recorded since creation, including evicted ones
    #[must_use]
    pub const fn lifetime_counts(&self) -> (u64, u64) {
        (self.lifetime_total, self.lifetime_errors)
    }

    fn evict(&mut self, now: Instant) {
        while let Some(front) = self.items.front() {
            if now.saturating_duration_since(front.timestamp) < self.window {
                break;
            }
            if !front.success {
                self.errors -= 1;
            }
            self.total -= 1;
            self.items.pop_front();
        }
    }
}

impl Default for StatBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
