//! Per-vendor crawl policy table
//!
//! Policies are immutable for the duration of a run. Vendors missing from the
//! table fall back to the default policy.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Crawl parameters for a single vendor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorPolicy {
    pub slug: String,
    /// Maximum products sent to the vendor client in one call
    pub batch_size: usize,
    /// Initial request pacing toward the vendor, in requests per second
    pub target_request_rate: f64,
    /// Freshness window for inventory items, in seconds
    pub inventory_age_secs: i64,
    /// Freshness window for regular items, in seconds
    pub regular_age_secs: i64,
    pub needs_login: bool,
}

impl VendorPolicy {
    /// Default policy for a vendor slug that has no table entry
    #[must_use]
    pub fn default_for(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            batch_size: 1,
            target_request_rate: 1.0,
            inventory_age_secs: 7 * 24 * 3600,
            regular_age_secs: 30 * 24 * 3600,
            needs_login: true,
        }
    }

    #[must_use]
    pub fn inventory_age(&self) -> Duration {
        Duration::seconds(self.inventory_age_secs)
    }

    #[must_use]
    pub fn regular_age(&self) -> Duration {
        Duration::seconds(self.regular_age_secs)
    }

    /// Next `price_expiration` for a product refreshed at `now`
    #[must_use]
    pub fn expiration_from(&self, now: DateTime<Utc>, is_inventory: bool) -> DateTime<Utc> {
        let age = if is_inventory {
            self.inventory_age()
        } else {
            self.regular_age()
        };
        now + age
    }

    /// Checks the invariants the engine relies on
    pub fn validate(&self) -> Result<(), String> {
        if self.slug.trim().is_empty() {
            return Err("vendor slug must not be empty".to_string());
        }
        if self.batch_size == 0 {
            return Err(format!("{}: batch_size must be at least 1", self.slug));
        }
        if !(self.target_request_rate.is_finite() && self.target_request_rate > 0.0) {
            return Err(format!("{}: target_request_rate must be positive", self.slug));
        }
        if self.inventory_age_secs <= 0 || self.regular_age_secs <= 0 {
            return Err(format!("{}: staleness ages must be positive", self.slug));
        }
        Ok(())
    }
}

/// Vendor policies keyed by slug, with a fallback for unlisted vendors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VendorPolicyTable {
    #[serde(default)]
    pub vendors: HashMap<String, VendorPolicy>,
    /// Overrides the built-in default policy when present
    #[serde(default)]
    pub default: Option<VendorPolicy>,
}

impl VendorPolicyTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the policy for `policy.slug`
    #[must_use]
    pub fn with_policy(mut self, policy: VendorPolicy) -> Self {
        self.vendors.insert(policy.slug.clone(), policy);
        self
    }

    /// Resolves the policy for a vendor; unlisted vendors get the default
    #[must_use]
    pub fn policy_for(&self, slug: &str) -> VendorPolicy {
        if let Some(policy) = self.vendors.get(slug) {
            return policy.clone();
        }
        match &self.default {
            Some(default) => VendorPolicy {
                slug: slug.to_string(),
                ..default.clone()
            },
            None => VendorPolicy::default_for(slug),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (key, policy) in &self.vendors {
            if key != &policy.slug {
                return Err(format!("policy key {key} does not match slug {}", policy.slug));
            }
            policy.validate()?;
        }
        if let Some(default) = &self.default {
            VendorPolicy {
                slug: "default".to_string(),
                ..default.clone()
            }
            .validate()?;
        }
        Ok(())
    }

    /// Built-in table for the vendors the catalog currently syncs
    #[must_use]
    pub fn builtin() -> Self {
        let entries = [
            ("henry_schein", 1, 1.0, 2, 14, true),
            ("darby", 1, 1.0, 2, 14, true),
            ("patterson", 1, 0.5, 2, 14, true),
            ("benco", 5, 1.0, 3, 14, true),
            ("ultradent", 1, 1.0, 3, 30, true),
            ("dental_city", 10, 2.0, 1, 14, false),
            ("safco", 1, 1.0, 3, 30, true),
        ];
        let mut table = Self::new();
        for (slug, batch_size, rate, inventory_days, regular_days, needs_login) in entries {
            table = table.with_policy(VendorPolicy {
                slug: slug.to_string(),
                batch_size,
                target_request_rate: rate,
                inventory_age_secs: inventory_days * 24 * 3600,
                regular_age_secs: regular_days * 24 * 3600,
                needs_login,
            });
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlisted_vendor_gets_default_policy() {
        let table = VendorPolicyTable::builtin();
        let policy = table.policy_for("unknown_vendor");
        assert_eq!(policy.slug, "unknown_vendor");
        assert_eq!(policy, VendorPolicy::default_for("unknown_vendor"));
    }

    #[test]
    fn configured_default_keeps_requested_slug() {
        let mut table = VendorPolicyTable::new();
        table.default = Some(VendorPolicy {
            batch_size: 7,
            ..VendorPolicy::default_for("ignored")
        });
        let policy = table.policy_for("acme");
        assert_eq!(policy.slug, "acme");
        assert_eq!(policy.batch_size, 7);
    }

    #[test]
    fn expiration_uses_inventory_age_for_inventory_items() {
        let policy = VendorPolicy {
            inventory_age_secs: 60,
            regular_age_secs: 600,
            ..VendorPolicy::default_for("acme")
        };
        let now = Utc::now();
        assert_eq!(policy.expiration_from(now, true), now + Duration::seconds(60));
        assert_eq!(policy.expiration_from(now, false), now + Duration::seconds(600));
    }

    #[test]
    fn builtin_table_is_valid() {
        assert!(VendorPolicyTable::builtin().validate().is_ok());
    }

    #[test]
    fn validation_rejects_zero_batch_and_rate() {
        let bad_batch = VendorPolicy {
            batch_size: 0,
            ..VendorPolicy::default_for("acme")
        };
        assert!(bad_batch.validate().is_err());

        let bad_rate = VendorPolicy {
            target_request_rate: 0.0,
            ..VendorPolicy::default_for("acme")
        };
        assert!(bad_rate.validate().is_err());
    }
}
