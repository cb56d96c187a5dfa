//! In-memory catalog
//!
//! A process-local [`ProductSelector`] and [`CatalogStore`] with the same
//! selection semantics as the SQLite catalog. Every write is also appended to
//! a log so callers can inspect what a run did.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::domain::product::{OfficeId, Price, PriceInfo, ProductId, ProductRecord, ProductStatus};
use crate::domain::repositories::{CatalogError, CatalogStore, ProductSelector};

/// One applied catalog write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CatalogWrite {
    Status {
        product: ProductId,
        status: ProductStatus,
        price_expiration: DateTime<Utc>,
    },
    Price {
        product: ProductId,
        price: Price,
        status: ProductStatus,
        price_expiration: DateTime<Utc>,
    },
}

impl CatalogWrite {
    #[must_use]
    pub const fn product(&self) -> ProductId {
        match self {
            Self::Status { product, .. } | Self::Price { product, .. } => *product,
        }
    }
}

/// Selection priority: inventory first, never-priced next, then oldest expiration
fn selection_order(a: &ProductRecord, b: &ProductRecord) -> Ordering {
    b.is_inventory
        .cmp(&a.is_inventory)
        .then_with(|| match (a.price_expiration, b.price_expiration) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.cmp(&y),
        })
        .then_with(|| a.id.cmp(&b.id))
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<ProductId, ProductRecord>>,
    writes: RwLock<Vec<CatalogWrite>>,
    failing: RwLock<HashSet<ProductId>>,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, product: ProductRecord) {
        self.products.write().await.insert(product.id, product);
    }

    pub async fn product(&self, id: ProductId) -> Option<ProductRecord> {
        self.products.read().await.get(&id).cloned()
    }

    /// Writes applied so far, in order
    pub async fn writes(&self) -> Vec<CatalogWrite> {
        self.writes.read().await.clone()
    }

    /// Makes every later write for `id` fail with a database error
    pub async fn fail_writes_for(&self, id: ProductId) {
        self.failing.write().await.insert(id);
    }

    pub async fn candidate_products_at(
        &self,
        vendor: &str,
        office: Option<OfficeId>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<ProductRecord> {
        let products = self.products.read().await;
        let mut candidates: Vec<ProductRecord> = products
            .values()
            .filter(|p| p.vendor == vendor && p.office == office && p.is_stale_at(now))
            .cloned()
            .collect();
        candidates.sort_by(selection_order);
        candidates.truncate(limit);
        candidates
    }

    async fn apply(
        &self,
        id: ProductId,
        write: CatalogWrite,
        update: impl FnOnce(&mut ProductRecord),
    ) -> Result<(), CatalogError> {
        if self.failing.read().await.contains(&id) {
            return Err(CatalogError::Database(format!("write rejected for product {id}")));
        }
        let mut products = self.products.write().await;
        let record = products.get_mut(&id).ok_or(CatalogError::NotFound(id.0))?;
        update(record);
        self.writes.write().await.push(write);
        Ok(())
    }
}

#[async_trait]
impl ProductSelector for InMemoryCatalog {
    async fn candidate_products(
        &self,
        vendor: &str,
        office: Option<OfficeId>,
        limit: usize,
    ) -> Result<Vec<ProductRecord>, CatalogError> {
        Ok(self.candidate_products_at(vendor, office, limit, Utc::now()).await)
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn update_status(
        &self,
        product: &ProductRecord,
        status: ProductStatus,
        price_expiration: DateTime<Utc>,
    ) -> Result<(), CatalogError> {
        let write = CatalogWrite::Status {
            product: product.id,
            status,
            price_expiration,
        };
        self.apply(product.id, write, |record| {
            record.status = status;
            record.price_expiration = Some(price_expiration);
        })
        .await
    }

    async fn update_price(
        &self,
        product: &ProductRecord,
        price: &PriceInfo,
        status: ProductStatus,
        price_expiration: DateTime<Utc>,
    ) -> Result<(), CatalogError> {
        let write = CatalogWrite::Price {
            product: product.id,
            price: price.price,
            status,
            price_expiration,
        };
        let new_price = price.price;
        self.apply(product.id, write, |record| {
            record.price = Some(new_price);
            record.status = status;
            record.price_expiration = Some(price_expiration);
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn selection_matches_priority_and_scope() {
        let catalog = InMemoryCatalog::new();
        let now = Utc::now();
        catalog
            .insert(ProductRecord::new(ProductId(1), "darby", "a").with_price_expiration(now - Duration::days(1)))
            .await;
        catalog.insert(ProductRecord::new(ProductId(2), "darby", "b")).await;
        catalog
            .insert(
                ProductRecord::new(ProductId(3), "darby", "c")
                    .with_inventory(true)
                    .with_price_expiration(now - Duration::minutes(1)),
            )
            .await;
        catalog
            .insert(ProductRecord::new(ProductId(4), "darby", "d").with_price_expiration(now + Duration::days(1)))
            .await;
        catalog
            .insert(ProductRecord::new(ProductId(5), "darby", "e").with_office(OfficeId(1)))
            .await;

        let ids: Vec<i64> = catalog
            .candidate_products_at("darby", None, 10, now)
            .await
            .iter()
            .map(|p| p.id.0)
            .collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn writes_update_record_and_log() {
        let catalog = InMemoryCatalog::new();
        let product = ProductRecord::new(ProductId(1), "darby", "a");
        catalog.insert(product.clone()).await;

        let expiration = Utc::now() + Duration::days(30);
        catalog
            .update_price(&product, &PriceInfo::new(Price::from_cents(999)), ProductStatus::Active, expiration)
            .await
            .unwrap();

        let stored = catalog.product(ProductId(1)).await.unwrap();
        assert_eq!(stored.price, Some(Price::from_cents(999)));
        assert_eq!(stored.price_expiration, Some(expiration));
        assert_eq!(catalog.writes().await.len(), 1);
    }

    #[tokio::test]
    async fn failing_products_reject_writes() {
        let catalog = InMemoryCatalog::new();
        let product = ProductRecord::new(ProductId(1), "darby", "a");
        catalog.insert(product.clone()).await;
        catalog.fail_writes_for(ProductId(1)).await;

        let result = catalog
            .update_status(&product, ProductStatus::Unavailable, Utc::now())
            .await;
        assert!(matches!(result, Err(CatalogError::Database(_))));
        assert!(catalog.writes().await.is_empty());
    }
}
