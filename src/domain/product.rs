//! Product catalog entities as seen by the price sync engine
//!
//! The catalog store owns these records; the engine reads a snapshot through
//! the product selector and writes back terminal updates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Catalog identifier of a product row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub i64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Office scope for office-specific catalog copies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfficeId(pub i64);

impl fmt::Display for OfficeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monetary amount in minor units (cents)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(i64);

impl Price {
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Whole currency units, e.g. `Price::from_units(10)` is 10.00
    #[must_use]
    pub const fn from_units(units: i64) -> Self {
        Self(units * 100)
    }

    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Error returned when a vendor price string cannot be read
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid price literal: {0:?}")]
pub struct PriceParseError(pub String);

impl FromStr for Price {
    type Err = PriceParseError;

    /// Accepts vendor formatted amounts such as `"12"`, `"12.5"`, `"$1,234.50"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '$' | ',' | ' '))
            .collect();
        let (negative, digits) = match cleaned.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, cleaned.as_str()),
        };
        let err = || PriceParseError(s.to_string());

        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(err());
        }
        if frac.len() > 2 || !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(err());
        }

        let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| err())? };
        let frac_cents: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| err())? * 10,
            _ => frac.parse().map_err(|_| err())?,
        };
        let cents = whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(frac_cents))
            .ok_or_else(err)?;

        Ok(Self(if negative { -cents } else { cents }))
    }
}

/// Catalog status of a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductStatus {
    Active,
    Unavailable,
    Exhausted,
    Discontinued,
}

impl ProductStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Unavailable => "unavailable",
            Self::Exhausted => "exhausted",
            Self::Discontinued => "discontinued",
        }
    }

    /// Maps a vendor availability label onto a catalog status.
    ///
    /// Unknown labels mean the vendor priced the item, so they map to `Active`.
    #[must_use]
    pub fn from_vendor_label(label: &str) -> Self {
        let label = label.trim().to_ascii_lowercase();
        if label.contains("discontinued") {
            Self::Discontinued
        } else if label.contains("unavailable")
            || label.contains("out of stock")
            || label.contains("not available")
        {
            Self::Unavailable
        } else {
            Self::Active
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "unavailable" => Ok(Self::Unavailable),
            "exhausted" => Ok(Self::Exhausted),
            "discontinued" => Ok(Self::Discontinued),
            other => Err(format!("unknown product status: {other}")),
        }
    }
}

/// Snapshot of a catalog product scheduled for a price refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    /// Vendor slug this product is sourced from
    pub vendor: String,
    /// `None` for the global catalog entry, `Some` for an office copy
    pub office: Option<OfficeId>,
    /// Identifier the vendor uses for the item
    pub vendor_sku: String,
    pub url: Option<String>,
    pub price: Option<Price>,
    pub status: ProductStatus,
    pub price_expiration: Option<DateTime<Utc>>,
    /// Inventory items are refreshed on the shorter inventory age
    pub is_inventory: bool,
}

impl ProductRecord {
    /// Creates a never-priced active record
    #[must_use]
    pub fn new(id: ProductId, vendor: impl Into<String>, vendor_sku: impl Into<String>) -> Self {
        Self {
            id,
            vendor: vendor.into(),
            office: None,
            vendor_sku: vendor_sku.into(),
            url: None,
            price: None,
            status: ProductStatus::Active,
            price_expiration: None,
            is_inventory: false,
        }
    }

    #[must_use]
    pub const fn with_office(mut self, office: OfficeId) -> Self {
        self.office = Some(office);
        self
    }

    #[must_use]
    pub const fn with_inventory(mut self, is_inventory: bool) -> Self {
        self.is_inventory = is_inventory;
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub const fn with_price_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.price_expiration = Some(expiration);
        self
    }

    /// True when the stored price is missing or past its expiration
    #[must_use]
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        self.price_expiration.is_none_or(|expiration| expiration <= now)
    }
}

/// Price payload returned by a vendor client for one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceInfo {
    pub price: Price,
    /// Vendor availability label, e.g. "In Stock"
    pub status_label: String,
    pub is_special: bool,
    pub special_price: Option<Price>,
    pub sku: Option<String>,
    pub image: Option<String>,
    pub description: Option<String>,
}

impl PriceInfo {
    #[must_use]
    pub fn new(price: Price) -> Self {
        Self {
            price,
            status_label: "Active".to_string(),
            is_special: false,
            special_price: None,
            sku: None,
            image: None,
            description: None,
        }
    }

    #[must_use]
    pub fn with_status_label(mut self, label: impl Into<String>) -> Self {
        self.status_label = label.into();
        self
    }

    #[must_use]
    pub const fn with_special_price(mut self, special: Price) -> Self {
        self.is_special = true;
        self.special_price = Some(special);
        self
    }

    /// Catalog status implied by the vendor label
    #[must_use]
    pub fn status(&self) -> ProductStatus {
        ProductStatus::from_vendor_label(&self.status_label)
    }
}
