//! End-to-end runs of the updater against the in-memory catalog

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use vendor_price_sync::crawling::{Updater, UpdaterConfig, UpdaterDeps, UpdaterError, UpdaterState};
use vendor_price_sync::domain::{
    CatalogStore, CredentialProvider, Credentials, Price, PriceInfo, ProductId, ProductRecord, ProductSelector,
    ProductStatus, VendorPolicy,
};
use vendor_price_sync::infrastructure::{CatalogWrite, InMemoryCatalog, StaticCredentialProvider};
use vendor_price_sync::vendor::{
    BatchResult, ClientRegistry, FetchError, ScriptedVendorClient, VendorClient, VendorError,
};

fn priced(cents: i64) -> Result<PriceInfo, FetchError> {
    Ok(PriceInfo::new(Price::from_cents(cents)))
}

fn darby_policy(batch_size: usize) -> VendorPolicy {
    VendorPolicy {
        batch_size,
        target_request_rate: 5.0,
        ..VendorPolicy::default_for("darby")
    }
}

fn deps_with(catalog: &Arc<InMemoryCatalog>, credentials: StaticCredentialProvider) -> UpdaterDeps {
    UpdaterDeps {
        selector: Arc::clone(catalog) as Arc<dyn ProductSelector>,
        catalog: Arc::clone(catalog) as Arc<dyn CatalogStore>,
        credentials: Arc::new(credentials) as Arc<dyn CredentialProvider>,
    }
}

fn deps(catalog: &Arc<InMemoryCatalog>) -> UpdaterDeps {
    deps_with(
        catalog,
        StaticCredentialProvider::new().with_vendor("darby", Credentials::new("dr_smith", "hunter2")),
    )
}

async fn seeded_catalog(ids: impl IntoIterator<Item = i64>) -> Arc<InMemoryCatalog> {
    let catalog = Arc::new(InMemoryCatalog::new());
    for id in ids {
        catalog
            .insert(ProductRecord::new(ProductId(id), "darby", format!("D-{id}")))
            .await;
    }
    catalog
}

#[tokio::test(start_paused = true)]
async fn mixed_outcomes_reach_expected_states() {
    let catalog = seeded_catalog(1..=3).await;
    let client = Arc::new(
        ScriptedVendorClient::new("darby")
            .with_responses(ProductId(1), [priced(1000)])
            .with_responses(ProductId(2), [Err(FetchError::EmptyResult)])
            .with_responses(
                ProductId(3),
                [Err(FetchError::RateLimited), Err(FetchError::RateLimited), priced(500)],
            ),
    );

    let updater = Updater::new(
        darby_policy(1),
        None,
        Arc::clone(&client) as Arc<dyn VendorClient>,
        deps(&catalog),
        UpdaterConfig::default(),
    )
    .unwrap();
    let summary = updater.fetch().await.unwrap();

    let first = catalog.product(ProductId(1)).await.unwrap();
    assert_eq!(first.status, ProductStatus::Active);
    assert_eq!(first.price, Some(Price::from_cents(1000)));

    let second = catalog.product(ProductId(2)).await.unwrap();
    assert_eq!(second.status, ProductStatus::Unavailable);
    assert_eq!(second.price, None);

    let third = catalog.product(ProductId(3)).await.unwrap();
    assert_eq!(third.status, ProductStatus::Active);
    assert_eq!(third.price, Some(Price::from_cents(500)));
    assert_eq!(summary.final_attempts[&ProductId(3)], 2);

    assert_eq!(summary.counters.updated, 2);
    assert_eq!(summary.counters.unavailable, 1);
    assert_eq!(summary.counters.requeued, 2);
    assert_eq!(summary.counters.exhausted, 0);
    assert_eq!(client.fetch_count(ProductId(3)).await, 3);
    assert!(client.batches().await.iter().all(|batch| batch.len() == 1));
    assert_eq!(client.logins().await, vec!["dr_smith".to_string()]);
    assert_eq!(updater.state(), UpdaterState::Completed);
}

#[tokio::test(start_paused = true)]
async fn every_terminal_write_refreshes_expiration() {
    let catalog = seeded_catalog(1..=2).await;
    let client = Arc::new(
        ScriptedVendorClient::new("darby")
            .with_responses(ProductId(1), [priced(250)])
            .with_responses(ProductId(2), [Err(FetchError::EmptyResult)]),
    );
    let before = Utc::now();

    let updater = Updater::new(darby_policy(1), None, client, deps(&catalog), UpdaterConfig::default()).unwrap();
    updater.fetch().await.unwrap();

    let writes = catalog.writes().await;
    assert_eq!(writes.len(), 2);
    for write in writes {
        let expiration = match write {
            CatalogWrite::Status { price_expiration, .. } | CatalogWrite::Price { price_expiration, .. } => {
                price_expiration
            }
        };
        assert!(expiration > before);
    }
}

#[tokio::test(start_paused = true)]
async fn unavailable_product_is_not_selected_again() {
    let catalog = seeded_catalog([7]).await;
    let client = Arc::new(ScriptedVendorClient::new("darby").with_fallback(Err(FetchError::EmptyResult)));

    let first = Updater::new(
        darby_policy(1),
        None,
        Arc::clone(&client) as Arc<dyn VendorClient>,
        deps(&catalog),
        UpdaterConfig::default(),
    )
    .unwrap();
    assert_eq!(first.fetch().await.unwrap().counters.unavailable, 1);

    let second = Updater::new(
        darby_policy(1),
        None,
        Arc::clone(&client) as Arc<dyn VendorClient>,
        deps(&catalog),
        UpdaterConfig::default(),
    )
    .unwrap();
    let summary = second.fetch().await.unwrap();
    assert_eq!(summary.selected, 0);
    assert_eq!(client.fetch_count(ProductId(7)).await, 1);

    let stored = catalog.product(ProductId(7)).await.unwrap();
    let expiration = stored.price_expiration.unwrap();
    let later = catalog
        .candidate_products_at("darby", None, 10, expiration + chrono::Duration::seconds(1))
        .await;
    assert_eq!(later.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_credentials_abort_before_any_fetch() {
    let catalog = seeded_catalog(1..=3).await;
    let client = Arc::new(ScriptedVendorClient::new("darby").with_fallback(priced(100)));

    let updater = Updater::new(
        darby_policy(1),
        None,
        Arc::clone(&client) as Arc<dyn VendorClient>,
        deps_with(&catalog, StaticCredentialProvider::new()),
        UpdaterConfig::default(),
    )
    .unwrap();
    let result = updater.fetch().await;

    assert!(matches!(
        result,
        Err(UpdaterError::MissingCredentials { ref vendor, office: None }) if vendor == "darby"
    ));
    assert!(catalog.writes().await.is_empty());
    assert!(client.batches().await.is_empty());
    assert!(client.logins().await.is_empty());
    assert_eq!(updater.state(), UpdaterState::Failed);
}

#[tokio::test(start_paused = true)]
async fn rejected_login_aborts_run() {
    let catalog = seeded_catalog([1]).await;
    let client = Arc::new(
        ScriptedVendorClient::new("darby")
            .failing_login(VendorError::AuthenticationFailed("invalid password".to_string())),
    );

    let updater = Updater::new(
        darby_policy(1),
        None,
        Arc::clone(&client) as Arc<dyn VendorClient>,
        deps(&catalog),
        UpdaterConfig::default(),
    )
    .unwrap();

    assert!(matches!(
        updater.fetch().await,
        Err(UpdaterError::VendorAuthenticationFailed(_))
    ));
    assert!(client.batches().await.is_empty());
    assert!(catalog.writes().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn vendors_without_login_skip_credentials() {
    let catalog = seeded_catalog([1]).await;
    let client = Arc::new(ScriptedVendorClient::new("darby").with_fallback(priced(100)));
    let policy = VendorPolicy {
        needs_login: false,
        ..darby_policy(1)
    };

    let updater = Updater::new(
        policy,
        None,
        Arc::clone(&client) as Arc<dyn VendorClient>,
        deps_with(&catalog, StaticCredentialProvider::new()),
        UpdaterConfig::default(),
    )
    .unwrap();

    assert_eq!(updater.fetch().await.unwrap().counters.updated, 1);
    assert!(client.logins().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn persistent_rate_limiting_exhausts_product() {
    let catalog = seeded_catalog([1]).await;
    let client = Arc::new(ScriptedVendorClient::new("darby").with_fallback(Err(FetchError::RateLimited)));

    let updater = Updater::new(
        darby_policy(1),
        None,
        Arc::clone(&client) as Arc<dyn VendorClient>,
        deps(&catalog),
        UpdaterConfig::default(),
    )
    .unwrap();
    let summary = updater.fetch().await.unwrap();

    assert_eq!(summary.counters.exhausted, 1);
    assert_eq!(summary.counters.requeued, 3);
    assert_eq!(summary.final_attempts[&ProductId(1)], 4);
    assert_eq!(
        catalog.product(ProductId(1)).await.unwrap().status,
        ProductStatus::Exhausted
    );
}

#[tokio::test(start_paused = true)]
async fn failed_write_is_counted_and_run_completes() {
    let catalog = seeded_catalog(1..=3).await;
    catalog.fail_writes_for(ProductId(2)).await;
    let client = Arc::new(ScriptedVendorClient::new("darby").with_fallback(priced(100)));

    let updater = Updater::new(darby_policy(1), None, client, deps(&catalog), UpdaterConfig::default()).unwrap();
    let summary = updater.fetch().await.unwrap();

    assert_eq!(summary.counters.updated, 3);
    assert_eq!(summary.counters.write_failures, 1);
    assert_eq!(catalog.writes().await.len(), 2);
    assert_eq!(catalog.product(ProductId(2)).await.unwrap().price, None);
}

#[tokio::test(start_paused = true)]
async fn concurrent_consumers_fetch_each_product_once() {
    let catalog = seeded_catalog(1..=24).await;
    let client = Arc::new(ScriptedVendorClient::new("darby").with_fallback(priced(100)));
    let config = UpdaterConfig {
        consumers: 3,
        queue_capacity: 4,
        ..UpdaterConfig::default()
    };

    let updater = Updater::new(
        darby_policy(2),
        None,
        Arc::clone(&client) as Arc<dyn VendorClient>,
        deps(&catalog),
        config,
    )
    .unwrap();
    let summary = updater.fetch().await.unwrap();

    assert_eq!(summary.enqueued, 24);
    assert_eq!(summary.counters.updated, 24);
    for id in 1..=24 {
        assert_eq!(client.fetch_count(ProductId(id)).await, 1, "product {id}");
    }
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_a_stuck_run() {
    struct StallingClient;

    #[async_trait]
    impl VendorClient for StallingClient {
        fn vendor(&self) -> &str {
            "darby"
        }

        async fn fetch_batch(&self, _products: Vec<ProductRecord>) -> Result<BatchResult, VendorError> {
            std::future::pending().await
        }
    }

    let catalog = seeded_catalog(1..=2).await;
    let updater = Arc::new(
        Updater::new(
            darby_policy(1),
            None,
            Arc::new(StallingClient),
            deps(&catalog),
            UpdaterConfig::default(),
        )
        .unwrap(),
    );
    let token = updater.cancellation_token();

    let run = tokio::spawn({
        let updater = Arc::clone(&updater);
        async move { updater.fetch().await }
    });
    tokio::time::sleep(Duration::from_secs(5)).await;
    token.cancel();

    assert!(matches!(run.await.unwrap(), Err(UpdaterError::Cancelled)));
    assert_eq!(updater.state(), UpdaterState::Failed);
    assert!(catalog.writes().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn registry_builds_client_for_policy() {
    let catalog = seeded_catalog([1]).await;
    let mut registry = ClientRegistry::new();
    registry.register("darby", |ctx| {
        Ok(Arc::new(ScriptedVendorClient::new(ctx.policy.slug.clone()).with_fallback(priced(4200)))
            as Arc<dyn VendorClient>)
    });

    let updater =
        Updater::from_registry(&registry, darby_policy(1), None, deps(&catalog), UpdaterConfig::default()).unwrap();
    let summary = updater.fetch().await.unwrap();

    assert_eq!(summary.counters.updated, 1);
    assert_eq!(
        catalog.product(ProductId(1)).await.unwrap().price,
        Some(Price::from_cents(4200))
    );

    let unknown = Updater::from_registry(
        &registry,
        VendorPolicy::default_for("benco"),
        None,
        deps(&catalog),
        UpdaterConfig::default(),
    );
    assert!(matches!(unknown, Err(UpdaterError::Registry(_))));
}

#[tokio::test(start_paused = true)]
async fn summary_serializes_for_schedulers() {
    let catalog = seeded_catalog(1..=2).await;
    let client = Arc::new(
        ScriptedVendorClient::new("darby")
            .with_responses(ProductId(1), [priced(100)])
            .with_responses(ProductId(2), [Err(FetchError::EmptyResult)]),
    );
    let updater = Updater::new(darby_policy(1), None, client, deps(&catalog), UpdaterConfig::default()).unwrap();
    let summary = updater.fetch().await.unwrap();

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["vendor"], "darby");
    assert_eq!(json["updated"], 1);
    assert_eq!(json["unavailable"], 1);
    assert_eq!(json["final_attempts"]["1"], 0);
}

#[tokio::test(start_paused = true)]
async fn sustained_throttling_slows_the_run_down() {
    let catalog = seeded_catalog(1..=40).await;
    let client = Arc::new(ScriptedVendorClient::new("darby").with_fallback(Err(FetchError::RateLimited)));
    let policy = darby_policy(1);
    let initial_rate = policy.target_request_rate;

    let updater = Updater::new(
        policy,
        None,
        Arc::clone(&client) as Arc<dyn VendorClient>,
        deps(&catalog),
        UpdaterConfig::default(),
    )
    .unwrap();
    let summary = updater.fetch().await.unwrap();

    assert_eq!(summary.counters.exhausted, 40);
    assert_eq!(summary.counters.requeued, 120);
    assert_eq!(summary.counters.rate_adjustments, 1);
    assert_eq!(summary.error_streak, 1);
    assert!((summary.final_target_rate - initial_rate / 1.05).abs() < 1e-12);

    // 160 pulls, each paced by at least half the interval at the initial rate
    let fetches: usize = client.batches().await.iter().map(Vec::len).sum();
    assert_eq!(fetches, 160);
    let floor = Duration::from_secs_f64(fetches as f64 * 0.5 / initial_rate);
    assert!(summary.elapsed >= floor, "elapsed {:?} below pacing floor {floor:?}", summary.elapsed);
    assert!(summary.elapsed >= Duration::from_secs(20));
}
