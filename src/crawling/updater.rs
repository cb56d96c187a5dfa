//! # Updater
//!
//! Runs one price sync for a single vendor and office:
//!
//! 1. log in when the vendor policy requires it
//! 2. spawn the producer, which fills the bounded queue with stale products
//! 3. spawn consumers, which pace themselves by the adaptive rate, batch
//!    tasks, call the vendor client and apply the retry state machine
//! 4. wait for the producer, then for every queued task to be acknowledged
//! 5. cancel the workers and return a [`RunSummary`]
//!
//! An updater is single-use. Authentication failures, missing credentials and
//! vendor transport failures abort the run; per-item failures never do.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::crawling::producer::{Producer, ProducerError};
use crate::crawling::queues::{DEFAULT_QUEUE_CAPACITY, QueueConfig, QueueError, TaskQueue};
use crate::crawling::rate_controller::{RateController, RateControllerConfig};
use crate::crawling::retry::{DEFAULT_MAX_RETRIES, Decision, RetryPolicy};
use crate::crawling::stats::{DEFAULT_WINDOW, StatBuffer};
use crate::crawling::tasks::{ProcessTask, Transition};
use crate::domain::credentials::CredentialError;
use crate::domain::product::{OfficeId, PriceInfo, ProductId, ProductStatus};
use crate::domain::repositories::{CatalogStore, CredentialProvider, ProductSelector};
use crate::domain::vendor_policy::VendorPolicy;
use crate::vendor::client::{FetchError, VendorClient, VendorError};
use crate::vendor::registry::{ClientContext, ClientRegistry, RegistryError};

/// Idle polls tolerated while topping up a partial batch
pub const DEFAULT_MAX_IDLE_CYCLES: u32 = 3;

/// Candidates selected per run
pub const DEFAULT_BULK_SIZE: usize = 500;

/// Engine-level knobs for one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdaterConfig {
    pub queue_capacity: usize,
    pub max_retries: u32,
    pub max_idle_cycles: u32,
    /// Concurrent consumers sharing the queue and rate controller
    pub consumers: usize,
    pub bulk_size: usize,
    pub stat_window: Duration,
    pub rate: RateControllerConfig,
    /// Aborts the run when exceeded
    pub run_timeout: Option<Duration>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_retries: DEFAULT_MAX_RETRIES,
            max_idle_cycles: DEFAULT_MAX_IDLE_CYCLES,
            consumers: 1,
            bulk_size: DEFAULT_BULK_SIZE,
            stat_window: DEFAULT_WINDOW,
            rate: RateControllerConfig::default(),
            run_timeout: None,
        }
    }
}

impl UpdaterConfig {
    pub fn validate(&self) -> Result<(), UpdaterError> {
        if self.queue_capacity == 0 {
            return Err(UpdaterError::InvalidConfig("queue_capacity must be at least 1".into()));
        }
        if self.consumers == 0 {
            return Err(UpdaterError::InvalidConfig("consumers must be at least 1".into()));
        }
        if self.bulk_size == 0 {
            return Err(UpdaterError::InvalidConfig("bulk_size must be at least 1".into()));
        }
        if self.stat_window.is_zero() {
            return Err(UpdaterError::InvalidConfig("stat_window must be positive".into()));
        }
        self.rate
            .validate()
            .map_err(|e| UpdaterError::InvalidConfig(e.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum UpdaterError {
    #[error("updater has already been started")]
    AlreadyStarted,

    #[error("no credentials for vendor {vendor} (office: {office:?})")]
    MissingCredentials {
        vendor: String,
        office: Option<OfficeId>,
    },

    #[error("credential backend failed: {0}")]
    CredentialBackend(String),

    #[error("vendor authentication failed: {0}")]
    VendorAuthenticationFailed(String),

    #[error("vendor call failed: {0}")]
    Vendor(VendorError),

    #[error(transparent)]
    Producer(#[from] ProducerError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("invalid updater configuration: {0}")]
    InvalidConfig(String),

    #[error("sync run exceeded its time limit of {0:?}")]
    Timeout(Duration),

    #[error("sync run was cancelled")]
    Cancelled,

    #[error("worker task failed: {0}")]
    Worker(String),
}

impl From<CredentialError> for UpdaterError {
    fn from(error: CredentialError) -> Self {
        match error {
            CredentialError::MissingCredentials { vendor, office } => {
                Self::MissingCredentials { vendor, office }
            }
            CredentialError::Backend(message) => Self::CredentialBackend(message),
        }
    }
}

fn vendor_failure(error: VendorError, vendor: &str, office: Option<OfficeId>) -> UpdaterError {
    match error {
        VendorError::AuthenticationFailed(message) => UpdaterError::VendorAuthenticationFailed(message),
        VendorError::MissingCredentials => UpdaterError::MissingCredentials {
            vendor: vendor.to_string(),
            office,
        },
        other @ VendorError::Transport(_) => UpdaterError::Vendor(other),
    }
}

/// Lifecycle of an [`Updater`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum UpdaterState {
    Idle = 0,
    Running = 1,
    /// Producer finished; waiting for outstanding tasks
    Draining = 2,
    Completed = 3,
    Failed = 4,
}

impl UpdaterState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Draining,
            3 => Self::Completed,
            _ => Self::Failed,
        }
    }
}

/// Per-transition tallies for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub updated: usize,
    pub unavailable: usize,
    pub exhausted: usize,
    pub requeued: usize,
    /// Terminal outcomes whose catalog write failed
    pub write_failures: usize,
    pub batches: usize,
    /// Items the vendor client left out of a batch answer
    pub missing_results: usize,
    /// Results for products that were not in the batch
    pub unexpected_results: usize,
    pub rate_adjustments: usize,
}

/// Outcome of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub vendor: String,
    pub office: Option<OfficeId>,
    pub selected: usize,
    pub enqueued: usize,
    pub skipped_duplicates: usize,
    #[serde(flatten)]
    pub counters: RunCounters,
    pub final_target_rate: f64,
    pub error_streak: u32,
    /// Attempt counter of each product when it was last handled
    pub final_attempts: BTreeMap<ProductId, u32>,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Products that reached a terminal state
    #[must_use]
    pub const fn processed(&self) -> usize {
        self.counters.updated + self.counters.unavailable + self.counters.exhausted
    }
}

/// State shared by consumers: the stat window, the rate and the tallies
struct Accounting {
    stats: StatBuffer,
    controller: RateController,
    counters: RunCounters,
    final_attempts: BTreeMap<ProductId, u32>,
}

impl Accounting {
    fn new(stats: StatBuffer, controller: RateController) -> Self {
        Self {
            stats,
            controller,
            counters: RunCounters::default(),
            final_attempts: BTreeMap::new(),
        }
    }

    fn record(&mut self, product: ProductId, transition: Transition, attempt: u32, write_failed: bool) {
        match transition {
            Transition::Updated => self.counters.updated += 1,
            Transition::Unavailable => self.counters.unavailable += 1,
            Transition::Requeued => self.counters.requeued += 1,
            Transition::Exhausted => self.counters.exhausted += 1,
        }
        if write_failed {
            self.counters.write_failures += 1;
        }
        self.final_attempts.insert(product, attempt);

        self.stats.add_item(transition.is_success_sample());
        let snapshot = self.stats.stats();
        if self.controller.maybe_adjust(&snapshot).is_some() {
            self.counters.rate_adjustments += 1;
        }
    }
}

/// Catalog-side collaborators of an updater
#[derive(Clone)]
pub struct UpdaterDeps {
    pub selector: Arc<dyn ProductSelector>,
    pub catalog: Arc<dyn CatalogStore>,
    pub credentials: Arc<dyn CredentialProvider>,
}

pub struct Updater {
    policy: VendorPolicy,
    office: Option<OfficeId>,
    client: Arc<dyn VendorClient>,
    deps: UpdaterDeps,
    config: UpdaterConfig,
    queue: Arc<TaskQueue>,
    cancel: CancellationToken,
    state: AtomicU8,
}

impl Updater {
    pub fn new(
        policy: VendorPolicy,
        office: Option<OfficeId>,
        client: Arc<dyn VendorClient>,
        deps: UpdaterDeps,
        config: UpdaterConfig,
    ) -> Result<Self, UpdaterError> {
        policy.validate().map_err(UpdaterError::InvalidConfig)?;
        config.validate()?;

        let queue = Arc::new(TaskQueue::new(QueueConfig {
            max_capacity: config.queue_capacity,
            ..QueueConfig::default()
        }));

        Ok(Self {
            policy,
            office,
            client,
            deps,
            config,
            queue,
            cancel: CancellationToken::new(),
            state: AtomicU8::new(UpdaterState::Idle as u8),
        })
    }

    /// Builds the vendor client through the registry with a fresh run cache
    pub fn from_registry(
        registry: &ClientRegistry,
        policy: VendorPolicy,
        office: Option<OfficeId>,
        deps: UpdaterDeps,
        config: UpdaterConfig,
    ) -> Result<Self, UpdaterError> {
        let context = ClientContext::new(policy.clone(), office);
        let client = registry.create(&context)?;
        Self::new(policy, office, client, deps, config)
    }

    #[must_use]
    pub fn state(&self) -> UpdaterState {
        UpdaterState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Token that aborts the run when cancelled
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub const fn policy(&self) -> &VendorPolicy {
        &self.policy
    }

    /// Runs the sync to completion. May only be called once.
    pub async fn fetch(&self) -> Result<RunSummary, UpdaterError> {
        self.state
            .compare_exchange(
                UpdaterState::Idle as u8,
                UpdaterState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|_| UpdaterError::AlreadyStarted)?;

        let started = Instant::now();
        let outcome = self.run(started).await;
        self.cancel.cancel();

        match &outcome {
            Ok(summary) => {
                self.set_state(UpdaterState::Completed);
                info!(
                    vendor = %summary.vendor,
                    office = ?summary.office,
                    updated = summary.counters.updated,
                    unavailable = summary.counters.unavailable,
                    exhausted = summary.counters.exhausted,
                    write_failures = summary.counters.write_failures,
                    final_rate = summary.final_target_rate,
                    elapsed_ms = summary.elapsed.as_millis(),
                    "✅ Price sync completed"
                );
            }
            Err(e) => {
                self.set_state(UpdaterState::Failed);
                error!(vendor = %self.policy.slug, office = ?self.office, error = %e, "❌ Price sync failed");
            }
        }
        outcome
    }

    fn set_state(&self, state: UpdaterState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    async fn authenticate(&self) -> Result<(), UpdaterError> {
        if !self.policy.needs_login {
            debug!(vendor = %self.policy.slug, "vendor does not require login");
            return Ok(());
        }
        let credentials = self
            .deps
            .credentials
            .get_credentials(&self.policy.slug, self.office)
            .await?;
        self.client
            .login(&credentials)
            .await
            .map_err(|e| vendor_failure(e, &self.policy.slug, self.office))?;
        info!(vendor = %self.policy.slug, office = ?self.office, "🔐 Logged in to vendor");
        Ok(())
    }

    /// Resolves with the limit once `run_timeout` has passed; never without one
    async fn watchdog(&self, started: Instant) -> Duration {
        match self.config.run_timeout {
            Some(limit) => {
                tokio::time::sleep_until(started + limit).await;
                limit
            }
            None => std::future::pending().await,
        }
    }

    async fn run(&self, started: Instant) -> Result<RunSummary, UpdaterError> {
        let watchdog = self.watchdog(started);
        tokio::pin!(watchdog);

        tokio::select! {
            biased;
            limit = &mut watchdog => return Err(UpdaterError::Timeout(limit)),
            authenticated = self.authenticate() => authenticated?,
        }

        let controller = RateController::new(self.policy.target_request_rate, self.config.rate.clone())
            .map_err(|e| UpdaterError::InvalidConfig(e.to_string()))?;
        let accounting = Arc::new(Mutex::new(Accounting::new(
            StatBuffer::new(self.config.stat_window),
            controller,
        )));
        let batch_size = self
            .client
            .capabilities()
            .effective_batch_size(self.policy.batch_size);

        info!(
            vendor = %self.policy.slug,
            office = ?self.office,
            batch_size,
            consumers = self.config.consumers,
            rate = self.policy.target_request_rate,
            "🚀 Starting price sync"
        );

        let producer = Producer::new(
            Arc::clone(&self.deps.selector),
            Arc::clone(&self.queue),
            self.policy.slug.clone(),
            self.office,
            self.config.bulk_size,
        );
        let producer_task = tokio::spawn(producer.run(self.cancel.child_token()));

        let mut consumers = JoinSet::new();
        for worker_id in 0..self.config.consumers {
            let consumer = Consumer {
                worker_id,
                vendor: self.policy.slug.clone(),
                policy: self.policy.clone(),
                batch_size,
                max_idle_cycles: self.config.max_idle_cycles,
                retry: RetryPolicy::new(self.config.max_retries),
                client: Arc::clone(&self.client),
                catalog: Arc::clone(&self.deps.catalog),
                queue: Arc::clone(&self.queue),
                accounting: Arc::clone(&accounting),
                office: self.office,
            };
            consumers.spawn(consumer.run(self.cancel.child_token()));
        }

        let drain = async {
            let report = producer_task
                .await
                .map_err(|e| UpdaterError::Worker(format!("producer: {e}")))??;
            self.set_state(UpdaterState::Draining);
            debug!(unfinished = self.queue.unfinished(), "producer done, draining queue");
            self.queue.join().await;
            Ok::<_, UpdaterError>(report)
        };

        let drained = tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(UpdaterError::Cancelled),
            Some(joined) = consumers.join_next() => Err(self.consumer_exit(joined)),
            limit = &mut watchdog => {
                warn!(vendor = %self.policy.slug, unfinished = self.queue.unfinished(), "run timed out, stopping workers");
                Err(UpdaterError::Timeout(limit))
            }
            result = drain => result,
        };

        // Consumers sit idle on an empty queue once drained; stop them and
        // wait so no catalog write is cut off mid-flight. Timeouts and
        // cancellation take the same path.
        self.cancel.cancel();
        while let Some(joined) = consumers.join_next().await {
            if let Ok(Err(e)) | Err(e) = joined.map_err(|e| UpdaterError::Worker(e.to_string())) {
                debug!(error = %e, "consumer stopped with error during shutdown");
            }
        }
        let report = drained?;

        let accounting = accounting.lock().await;
        Ok(RunSummary {
            vendor: self.policy.slug.clone(),
            office: self.office,
            selected: report.selected,
            enqueued: report.enqueued,
            skipped_duplicates: report.skipped_duplicates,
            counters: accounting.counters,
            final_target_rate: accounting.controller.target_rate(),
            error_streak: accounting.controller.error_streak(),
            final_attempts: accounting.final_attempts.clone(),
            elapsed: started.elapsed(),
        })
    }

    fn consumer_exit(&self, joined: Result<Result<(), UpdaterError>, JoinError>) -> UpdaterError {
        match joined {
            Ok(Err(e)) => e,
            Ok(Ok(())) if self.cancel.is_cancelled() => UpdaterError::Cancelled,
            Ok(Ok(())) => UpdaterError::Worker("consumer exited before the queue drained".into()),
            Err(e) => UpdaterError::Worker(format!("consumer: {e}")),
        }
    }
}

struct Consumer {
    worker_id: usize,
    vendor: String,
    office: Option<OfficeId>,
    policy: VendorPolicy,
    batch_size: usize,
    max_idle_cycles: u32,
    retry: RetryPolicy,
    client: Arc<dyn VendorClient>,
    catalog: Arc<dyn CatalogStore>,
    queue: Arc<TaskQueue>,
    accounting: Arc<Mutex<Accounting>>,
}

impl Consumer {
    async fn run(self, cancel: CancellationToken) -> Result<(), UpdaterError> {
        debug!(worker = self.worker_id, vendor = %self.vendor, "consumer started");
        loop {
            let batch = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                batch = self.assemble_batch() => batch?,
            };
            self.process_batch(batch, &cancel).await?;
        }
        debug!(worker = self.worker_id, "consumer stopped");
        Ok(())
    }

    /// Waits for the first task, then tops the batch up without blocking.
    /// Every pull is preceded by a jittered pause at the current rate.
    async fn assemble_batch(&self) -> Result<Vec<ProcessTask>, QueueError> {
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut idle_cycles = 0;

        while batch.len() < self.batch_size {
            let pause = self.accounting.lock().await.controller.jittered_interval();
            tokio::time::sleep(pause).await;

            if batch.is_empty() {
                batch.push(self.queue.get().await?);
            } else if let Some(task) = self.queue.try_get() {
                batch.push(task);
                idle_cycles = 0;
            } else {
                idle_cycles += 1;
                if idle_cycles > self.max_idle_cycles {
                    break;
                }
            }
        }
        Ok(batch)
    }

    /// Only the vendor call is abandoned on cancellation; catalog writes for a
    /// returned batch always run to completion.
    async fn process_batch(&self, batch: Vec<ProcessTask>, cancel: &CancellationToken) -> Result<(), UpdaterError> {
        let products = batch.iter().map(|task| task.product.clone()).collect();
        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(worker = self.worker_id, pending = batch.len(), "vendor call abandoned on shutdown");
                return Ok(());
            }
            fetched = self.client.fetch_batch(products) => fetched,
        };
        let results = match fetched {
            Ok(results) => results,
            Err(e) => {
                error!(worker = self.worker_id, vendor = %self.vendor, error = %e, "vendor batch call failed");
                return Err(vendor_failure(e, &self.vendor, self.office));
            }
        };

        let mut by_product: HashMap<ProductId, Result<PriceInfo, FetchError>> =
            HashMap::with_capacity(results.len());
        let mut unexpected = 0;
        for (product, outcome) in results {
            if by_product.contains_key(&product.id) {
                unexpected += 1;
            } else {
                by_product.insert(product.id, outcome);
            }
        }

        let mut missing = 0;
        for task in batch {
            let outcome = by_product.remove(&task.product_id()).unwrap_or_else(|| {
                missing += 1;
                Err(FetchError::Unclassified("vendor returned no result for product".into()))
            });
            self.apply(task, outcome).await?;
        }
        unexpected += by_product.len();

        if unexpected > 0 {
            warn!(worker = self.worker_id, vendor = %self.vendor, unexpected, "ignoring results for products outside the batch");
        }
        let mut accounting = self.accounting.lock().await;
        accounting.counters.batches += 1;
        accounting.counters.missing_results += missing;
        accounting.counters.unexpected_results += unexpected;
        Ok(())
    }

    async fn apply(&self, task: ProcessTask, outcome: Result<PriceInfo, FetchError>) -> Result<(), UpdaterError> {
        let product_id = task.product_id();
        let decision = self.retry.decide(outcome, task.attempt);
        let transition = decision.transition();
        let expiration = self.policy.expiration_from(Utc::now(), task.product.is_inventory);
        let mut final_attempt = task.attempt;

        let write = match decision {
            Decision::Update { price, status } => {
                debug!(product_id = %product_id, price = %price.price, status = %status, "price fetched");
                Some(
                    self.catalog
                        .update_price(&task.product, &price, status, expiration)
                        .await,
                )
            }
            Decision::MarkUnavailable => {
                info!(product_id = %product_id, vendor = %self.vendor, "product no longer offered by vendor");
                Some(
                    self.catalog
                        .update_status(&task.product, ProductStatus::Unavailable, expiration)
                        .await,
                )
            }
            Decision::Exhaust { attempt, reason } => {
                final_attempt = attempt;
                log_failure(product_id, attempt, &reason);
                warn!(product_id = %product_id, attempt, "retries exhausted");
                Some(
                    self.catalog
                        .update_status(&task.product, ProductStatus::Exhausted, expiration)
                        .await,
                )
            }
            Decision::Requeue { attempt, reason } => {
                final_attempt = attempt;
                log_failure(product_id, attempt, &reason);
                self.queue.requeue(task.rescheduled())?;
                None
            }
        };

        let write_failed = match write {
            Some(Err(e)) => {
                error!(product_id = %product_id, transition = %transition, error = %e, "catalog write failed");
                true
            }
            _ => false,
        };

        self.accounting
            .lock()
            .await
            .record(product_id, transition, final_attempt, write_failed);
        if transition.is_terminal() {
            self.queue.task_done(product_id)?;
        }
        Ok(())
    }
}

fn log_failure(product_id: ProductId, attempt: u32, reason: &FetchError) {
    match reason {
        FetchError::Unclassified(message) => {
            error!(product_id = %product_id, attempt, error = %message, "unclassified vendor failure");
        }
        other => {
            debug!(product_id = %product_id, attempt, kind = other.kind(), "retryable vendor failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::credentials::Credentials;
    use crate::domain::product::{Price, ProductRecord};
    use crate::infrastructure::credentials::StaticCredentialProvider;
    use crate::infrastructure::memory_catalog::InMemoryCatalog;
    use crate::vendor::client::Capabilities;
    use crate::vendor::scripted::ScriptedVendorClient;

    fn deps(catalog: &Arc<InMemoryCatalog>) -> UpdaterDeps {
        UpdaterDeps {
            selector: Arc::clone(catalog) as Arc<dyn ProductSelector>,
            catalog: Arc::clone(catalog) as Arc<dyn CatalogStore>,
            credentials: Arc::new(
                StaticCredentialProvider::new().with_vendor("darby", Credentials::new("office", "secret")),
            ),
        }
    }

    fn policy(batch_size: usize) -> VendorPolicy {
        VendorPolicy {
            batch_size,
            target_request_rate: 10.0,
            ..VendorPolicy::default_for("darby")
        }
    }

    #[test]
    fn config_rejects_zero_consumers() {
        let config = UpdaterConfig {
            consumers: 0,
            ..UpdaterConfig::default()
        };
        assert!(matches!(config.validate(), Err(UpdaterError::InvalidConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn second_fetch_is_rejected() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let client = Arc::new(ScriptedVendorClient::new("darby"));
        let updater = Updater::new(policy(1), None, client, deps(&catalog), UpdaterConfig::default()).unwrap();

        assert_eq!(updater.state(), UpdaterState::Idle);
        let summary = updater.fetch().await.unwrap();
        assert_eq!(summary.processed(), 0);
        assert_eq!(updater.state(), UpdaterState::Completed);
        assert!(matches!(updater.fetch().await, Err(UpdaterError::AlreadyStarted)));
    }

    #[tokio::test(start_paused = true)]
    async fn bulk_client_receives_batches_up_to_policy_size() {
        let catalog = Arc::new(InMemoryCatalog::new());
        for id in 1..=7 {
            catalog.insert(ProductRecord::new(ProductId(id), "darby", format!("D-{id}"))).await;
        }
        let client = Arc::new(
            ScriptedVendorClient::new("darby")
                .with_capabilities(Capabilities::bulk(Some(3)))
                .with_fallback(Ok(PriceInfo::new(Price::from_cents(100)))),
        );

        let updater = Updater::new(
            policy(5),
            None,
            Arc::clone(&client) as Arc<dyn VendorClient>,
            deps(&catalog),
            UpdaterConfig::default(),
        )
        .unwrap();
        let summary = updater.fetch().await.unwrap();

        assert_eq!(summary.counters.updated, 7);
        let batches = client.batches().await;
        assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= 3));
        assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_batch_result_is_retried_as_unclassified() {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.insert(ProductRecord::new(ProductId(1), "darby", "D-1")).await;
        let client = Arc::new(ScriptedVendorClient::new("darby").omitting(ProductId(1)));

        let updater = Updater::new(
            policy(1),
            None,
            Arc::clone(&client) as Arc<dyn VendorClient>,
            deps(&catalog),
            UpdaterConfig::default(),
        )
        .unwrap();
        let summary = updater.fetch().await.unwrap();

        assert_eq!(summary.counters.exhausted, 1);
        assert_eq!(summary.counters.missing_results, 4);
        assert_eq!(summary.final_attempts[&ProductId(1)], 4);
        assert_eq!(client.fetch_count(ProductId(1)).await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_aborts_run() {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.insert(ProductRecord::new(ProductId(1), "darby", "D-1")).await;
        let client = Arc::new(
            ScriptedVendorClient::new("darby").failing_batches(VendorError::Transport("browser crashed".into())),
        );

        let updater = Updater::new(policy(1), None, client, deps(&catalog), UpdaterConfig::default()).unwrap();
        let result = updater.fetch().await;

        assert!(matches!(result, Err(UpdaterError::Vendor(VendorError::Transport(_)))));
        assert_eq!(updater.state(), UpdaterState::Failed);
        assert!(catalog.writes().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_timeout_aborts_stuck_run() {
        struct HangingClient;

        #[async_trait::async_trait]
        impl VendorClient for HangingClient {
            fn vendor(&self) -> &str {
                "darby"
            }

            async fn fetch_batch(
                &self,
                _products: Vec<ProductRecord>,
            ) -> Result<crate::vendor::client::BatchResult, VendorError> {
                std::future::pending().await
            }
        }

        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.insert(ProductRecord::new(ProductId(1), "darby", "D-1")).await;
        let config = UpdaterConfig {
            run_timeout: Some(Duration::from_secs(30)),
            ..UpdaterConfig::default()
        };
        let updater = Updater::new(policy(1), None, Arc::new(HangingClient), deps(&catalog), config).unwrap();

        assert!(matches!(updater.fetch().await, Err(UpdaterError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn run_timeout_lets_in_flight_write_finish() {
        struct SlowCatalog(Arc<InMemoryCatalog>);

        #[async_trait::async_trait]
        impl CatalogStore for SlowCatalog {
            async fn update_status(
                &self,
                product: &ProductRecord,
                status: ProductStatus,
                price_expiration: chrono::DateTime<Utc>,
            ) -> Result<(), crate::domain::repositories::CatalogError> {
                self.0.update_status(product, status, price_expiration).await
            }

            async fn update_price(
                &self,
                product: &ProductRecord,
                price: &PriceInfo,
                status: ProductStatus,
                price_expiration: chrono::DateTime<Utc>,
            ) -> Result<(), crate::domain::repositories::CatalogError> {
                tokio::time::sleep(Duration::from_secs(10)).await;
                self.0.update_price(product, price, status, price_expiration).await
            }
        }

        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.insert(ProductRecord::new(ProductId(1), "darby", "D-1")).await;
        let client =
            Arc::new(ScriptedVendorClient::new("darby").with_fallback(Ok(PriceInfo::new(Price::from_cents(725)))));
        let slow_deps = UpdaterDeps {
            catalog: Arc::new(SlowCatalog(Arc::clone(&catalog))),
            ..deps(&catalog)
        };
        let config = UpdaterConfig {
            run_timeout: Some(Duration::from_secs(5)),
            ..UpdaterConfig::default()
        };
        let updater = Updater::new(
            policy(1),
            None,
            Arc::clone(&client) as Arc<dyn VendorClient>,
            slow_deps,
            config,
        )
        .unwrap();

        let result = updater.fetch().await;

        assert!(matches!(result, Err(UpdaterError::Timeout(limit)) if limit == Duration::from_secs(5)));
        assert_eq!(client.fetch_count(ProductId(1)).await, 1);
        assert_eq!(catalog.writes().await.len(), 1);
        assert_eq!(
            catalog.product(ProductId(1)).await.unwrap().price,
            Some(Price::from_cents(725))
        );
    }
}
