//! Boundary interfaces toward the catalog and credential backends
//!
//! The engine owns none of this storage. It reads candidates through
//! [`ProductSelector`], writes terminal updates through [`CatalogStore`] and
//! resolves secrets through [`CredentialProvider`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::credentials::{CredentialError, Credentials};
use crate::domain::product::{OfficeId, PriceInfo, ProductRecord, ProductStatus};

/// Catalog backend failures
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("product {0} not found in catalog")]
    NotFound(i64),

    #[error("catalog database error: {0}")]
    Database(String),

    #[error("stored row is invalid: {0}")]
    InvalidRow(String),
}

impl From<sqlx::Error> for CatalogError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database(error.to_string())
    }
}

/// Selects products whose prices need refreshing
#[async_trait]
pub trait ProductSelector: Send + Sync {
    /// Returns up to `limit` stale products for the vendor, most urgent first.
    ///
    /// Ordering: inventory items first, then never-priced, then soonest
    /// expired. Products whose `price_expiration` lies in the future are
    /// never returned.
    async fn candidate_products(
        &self,
        vendor: &str,
        office: Option<OfficeId>,
        limit: usize,
    ) -> Result<Vec<ProductRecord>, CatalogError>;
}

/// Writes terminal price sync outcomes back to the catalog
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Sets status and expiration without touching the price
    async fn update_status(
        &self,
        product: &ProductRecord,
        status: ProductStatus,
        price_expiration: DateTime<Utc>,
    ) -> Result<(), CatalogError>;

    /// Stores a fresh price together with status and expiration
    async fn update_price(
        &self,
        product: &ProductRecord,
        price: &PriceInfo,
        status: ProductStatus,
        price_expiration: DateTime<Utc>,
    ) -> Result<(), CatalogError>;
}

/// Resolves vendor login secrets, optionally scoped to an office
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_credentials(
        &self,
        vendor: &str,
        office: Option<OfficeId>,
    ) -> Result<Credentials, CredentialError>;
}
