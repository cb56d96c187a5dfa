//! # Adaptive Rate Controller
//!
//! Adjusts the per-vendor request rate from Stat Buffer snapshots. Any error
//! in the window slows the rate down and extends the error streak; a clean
//! window speeds it up by a step that shrinks with the streak, so recovery
//! after repeated throttling is cautious. The streak never resets.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::crawling::stats::WindowStats;

/// Tuning knobs for rate adaptation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateControllerConfig {
    /// Window must hold more than this many samples before a recheck
    pub min_samples: usize,
    /// Minimum time between rechecks
    pub recheck_interval: Duration,
    /// Divisor applied to the rate on a window with errors
    pub decrease_factor: f64,
    /// Base increase step on a clean window, divided by `streak + 1`
    pub increase_step: f64,
    /// Floor the rate never drops below
    pub min_rate: f64,
    /// Optional ceiling
    pub max_rate: Option<f64>,
}

impl Default for RateControllerConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            recheck_interval: Duration::from_secs(20),
            decrease_factor: 1.05,
            increase_step: 0.05,
            min_rate: 0.05,
            max_rate: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RateControllerError {
    #[error("initial rate must be positive and finite, got {0}")]
    InvalidRate(f64),

    #[error("invalid rate controller configuration: {0}")]
    InvalidConfig(String),
}

impl RateControllerConfig {
    pub fn validate(&self) -> Result<(), RateControllerError> {
        if !(self.decrease_factor > 1.0 && self.decrease_factor.is_finite()) {
            return Err(RateControllerError::InvalidConfig(format!(
                "decrease_factor must be greater than 1, got {}",
                self.decrease_factor
            )));
        }
        if !(self.increase_step > 0.0 && self.increase_step.is_finite()) {
            return Err(RateControllerError::InvalidConfig(format!(
                "increase_step must be positive, got {}",
                self.increase_step
            )));
        }
        if !(self.min_rate > 0.0 && self.min_rate.is_finite()) {
            return Err(RateControllerError::InvalidConfig(format!(
                "min_rate must be positive, got {}",
                self.min_rate
            )));
        }
        if let Some(max) = self.max_rate {
            if max < self.min_rate {
                return Err(RateControllerError::InvalidConfig(format!(
                    "max_rate {max} is below min_rate {}",
                    self.min_rate
                )));
            }
        }
        Ok(())
    }
}

/// Direction of an applied adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AdjustmentKind {
    SlowedDown,
    SpedUp,
}

/// Record of one applied rate change
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateAdjustment {
    pub kind: AdjustmentKind,
    pub previous_rate: f64,
    pub new_rate: f64,
    pub error_streak: u32,
}

#[derive(Debug, Clone)]
pub struct RateController {
    target_rate: f64,
    error_streak: u32,
    last_check: Instant,
    config: RateControllerConfig,
}

impl RateController {
    pub fn new(initial_rate: f64, config: RateControllerConfig) -> Result<Self, RateControllerError> {
        Self::new_at(initial_rate, config, Instant::now())
    }

    /// Creates a controller whose first recheck window starts at `now`
    pub fn new_at(
        initial_rate: f64,
        config: RateControllerConfig,
        now: Instant,
    ) -> Result<Self, RateControllerError> {
        if !(initial_rate > 0.0 && initial_rate.is_finite()) {
            return Err(RateControllerError::InvalidRate(initial_rate));
        }
        config.validate()?;
        Ok(Self {
            target_rate: initial_rate.max(config.min_rate),
            error_streak: 0,
            last_check: now,
            config,
        })
    }

    #[must_use]
    pub const fn target_rate(&self) -> f64 {
        self.target_rate
    }

    #[must_use]
    pub const fn error_streak(&self) -> u32 {
        self.error_streak
    }

    /// Mean delay between requests at the current rate
    #[must_use]
    pub fn pacing_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_rate)
    }

    /// Pacing delay scaled by a uniform jitter in `[0.5, 1.5)`
    #[must_use]
    pub fn jittered_interval(&self) -> Duration {
        let jitter = 0.5 + fastrand::f64();
        Duration::from_secs_f64(jitter / self.target_rate)
    }

    pub fn maybe_adjust(&mut self, stats: &WindowStats) -> Option<RateAdjustment> {
        self.maybe_adjust_at(stats, Instant::now())
    }

    /// Applies at most one adjustment.
    ///
    /// Nothing happens unless the window holds more than `min_samples` results
    /// and `recheck_interval` has passed since the last adjustment.
    pub fn maybe_adjust_at(&mut self, stats: &WindowStats, now: Instant) -> Option<RateAdjustment> {
        if stats.total <= self.config.min_samples {
            return None;
        }
        if now.saturating_duration_since(self.last_check) < self.config.recheck_interval {
            return None;
        }
        let error_rate = stats.error_rate?;

        let previous_rate = self.target_rate;
        let kind = if error_rate > 0.0 {
            self.error_streak = self.error_streak.saturating_add(1);
            self.target_rate = (self.target_rate / self.config.decrease_factor).max(self.config.min_rate);
            warn!(
                previous_rate,
                new_rate = self.target_rate,
                error_rate,
                error_streak = self.error_streak,
                "🐢 Slowing down vendor request rate"
            );
            AdjustmentKind::SlowedDown
        } else {
            let step = self.config.increase_step / f64::from(self.error_streak + 1);
            let mut rate = self.target_rate * (1.0 + step);
            if let Some(max) = self.config.max_rate {
                rate = rate.min(max);
            }
            self.target_rate = rate;
            info!(
                previous_rate,
                new_rate = self.target_rate,
                error_streak = self.error_streak,
                "🚀 Speeding up vendor request rate"
            );
            AdjustmentKind::SpedUp
        };
        self.last_check = now;

        Some(RateAdjustment {
            kind,
            previous_rate,
            new_rate: self.target_rate,
            error_streak: self.error_streak,
        })
    }
}
