//! # Candidate Producer
//!
//! Selects stale products for one vendor/office and feeds them into the
//! bounded queue. Backpressure comes from the queue itself: `put` waits while
//! the buffer is full.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::crawling::queues::{QueueError, TaskQueue};
use crate::crawling::tasks::ProcessTask;
use crate::domain::product::OfficeId;
use crate::domain::repositories::{CatalogError, ProductSelector};

#[derive(Debug, Clone, Error)]
pub enum ProducerError {
    #[error("candidate selection failed: {0}")]
    Selection(#[from] CatalogError),

    #[error("queue rejected task: {0}")]
    Queue(#[from] QueueError),
}

/// What the producer put on the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProducerReport {
    pub selected: usize,
    pub enqueued: usize,
    pub skipped_duplicates: usize,
    pub cancelled: bool,
}

pub struct Producer {
    selector: Arc<dyn ProductSelector>,
    queue: Arc<TaskQueue>,
    vendor: String,
    office: Option<OfficeId>,
    bulk_size: usize,
}

impl Producer {
    #[must_use]
    pub fn new(
        selector: Arc<dyn ProductSelector>,
        queue: Arc<TaskQueue>,
        vendor: impl Into<String>,
        office: Option<OfficeId>,
        bulk_size: usize,
    ) -> Self {
        Self {
            selector,
            queue,
            vendor: vendor.into(),
            office,
            bulk_size,
        }
    }

    /// Enqueues every selected candidate, stopping early on cancellation
    pub async fn run(self, cancel: CancellationToken) -> Result<ProducerReport, ProducerError> {
        let candidates = self
            .selector
            .candidate_products(&self.vendor, self.office, self.bulk_size)
            .await?;

        let mut report = ProducerReport {
            selected: candidates.len(),
            ..ProducerReport::default()
        };
        info!(
            vendor = %self.vendor,
            office = ?self.office,
            candidates = report.selected,
            "📦 Selected stale products for price sync"
        );

        for product in candidates {
            let task = ProcessTask::new(product);
            let accepted = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                accepted = self.queue.put(task) => accepted?,
            };
            if accepted {
                report.enqueued += 1;
            } else {
                report.skipped_duplicates += 1;
            }
        }

        debug!(
            vendor = %self.vendor,
            enqueued = report.enqueued,
            skipped = report.skipped_duplicates,
            cancelled = report.cancelled,
            "producer finished"
        );
        Ok(report)
    }
}
