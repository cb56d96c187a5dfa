//! SQLite-backed catalog
//!
//! Implements [`ProductSelector`] and [`CatalogStore`] over the `products`
//! table. Expirations are stored as RFC 3339 UTC text with fixed precision so
//! string comparison orders them chronologically.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::domain::product::{OfficeId, Price, PriceInfo, ProductId, ProductRecord, ProductStatus};
use crate::domain::repositories::{CatalogError, CatalogStore, ProductSelector};

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, CatalogError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CatalogError::InvalidRow(format!("bad timestamp '{value}': {e}")))
}

const PRODUCT_COLUMNS: &str =
    "id, vendor, office_id, vendor_sku, url, price_cents, status, price_expiration, is_inventory";

#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces a product row
    pub async fn upsert_product(&self, product: &ProductRecord) -> Result<(), CatalogError> {
        sqlx::query(
            r"
            INSERT INTO products (id, vendor, office_id, vendor_sku, url, price_cents, status, price_expiration, is_inventory)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                vendor = excluded.vendor,
                office_id = excluded.office_id,
                vendor_sku = excluded.vendor_sku,
                url = excluded.url,
                price_cents = excluded.price_cents,
                status = excluded.status,
                price_expiration = excluded.price_expiration,
                is_inventory = excluded.is_inventory
            ",
        )
        .bind(product.id.0)
        .bind(&product.vendor)
        .bind(product.office.map(|o| o.0))
        .bind(&product.vendor_sku)
        .bind(&product.url)
        .bind(product.price.map(Price::cents))
        .bind(product.status.as_str())
        .bind(product.price_expiration.map(timestamp))
        .bind(product.is_inventory)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Option<ProductRecord>, CatalogError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?");
        let row = sqlx::query(&sql).bind(id.0).fetch_optional(&self.pool).await?;
        row.as_ref().map(product_from_row).transpose()
    }

    pub async fn candidate_products_at(
        &self,
        vendor: &str,
        office: Option<OfficeId>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<ProductRecord>, CatalogError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products
             WHERE vendor = ? AND office_id IS ?
               AND (price_expiration IS NULL OR price_expiration <= ?)
             ORDER BY is_inventory DESC,
                      price_expiration IS NOT NULL,
                      price_expiration ASC,
                      id ASC
             LIMIT ?"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&sql)
            .bind(vendor)
            .bind(office.map(|o| o.0))
            .bind(timestamp(now))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(product_from_row).collect()
    }
}

fn product_from_row(row: &SqliteRow) -> Result<ProductRecord, CatalogError> {
    let status: String = row.try_get("status")?;
    let expiration: Option<String> = row.try_get("price_expiration")?;
    Ok(ProductRecord {
        id: ProductId(row.try_get("id")?),
        vendor: row.try_get("vendor")?,
        office: row.try_get::<Option<i64>, _>("office_id")?.map(OfficeId),
        vendor_sku: row.try_get("vendor_sku")?,
        url: row.try_get("url")?,
        price: row.try_get::<Option<i64>, _>("price_cents")?.map(Price::from_cents),
        status: status.parse().map_err(CatalogError::InvalidRow)?,
        price_expiration: expiration.as_deref().map(parse_timestamp).transpose()?,
        is_inventory: row.try_get("is_inventory")?,
    })
}

#[async_trait]
impl ProductSelector for SqliteCatalog {
    async fn candidate_products(
        &self,
        vendor: &str,
        office: Option<OfficeId>,
        limit: usize,
    ) -> Result<Vec<ProductRecord>, CatalogError> {
        self.candidate_products_at(vendor, office, limit, Utc::now()).await
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn update_status(
        &self,
        product: &ProductRecord,
        status: ProductStatus,
        price_expiration: DateTime<Utc>,
    ) -> Result<(), CatalogError> {
        let result = sqlx::query(
            "UPDATE products SET status = ?, price_expiration = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(timestamp(price_expiration))
        .bind(timestamp(Utc::now()))
        .bind(product.id.0)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(product.id.0));
        }
        Ok(())
    }

    async fn update_price(
        &self,
        product: &ProductRecord,
        price: &PriceInfo,
        status: ProductStatus,
        price_expiration: DateTime<Utc>,
    ) -> Result<(), CatalogError> {
        let result = sqlx::query(
            r"
            UPDATE products SET
                price_cents = ?,
                special_price_cents = ?,
                is_special = ?,
                sku = COALESCE(?, sku),
                status = ?,
                price_expiration = ?,
                description = COALESCE(?, description),
                image_url = COALESCE(?, image_url),
                updated_at = ?
            WHERE id = ?
            ",
        )
        .bind(price.price.cents())
        .bind(price.special_price.map(Price::cents))
        .bind(price.is_special)
        .bind(&price.sku)
        .bind(status.as_str())
        .bind(timestamp(price_expiration))
        .bind(&price.description)
        .bind(&price.image)
        .bind(timestamp(Utc::now()))
        .bind(product.id.0)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(product.id.0));
        }
        Ok(())
    }
}
