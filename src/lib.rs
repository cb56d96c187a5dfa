//! Vendor Price Sync - adaptive-rate price refresh for vendor catalogs
//!
//! One [`Updater`] run selects stale products for a vendor (optionally scoped
//! to an office), fetches their prices through a pluggable [`VendorClient`]
//! and writes the results back to the catalog, pacing requests with a
//! feedback-driven rate controller.

pub mod crawling;
pub mod domain;
pub mod infrastructure;
pub mod vendor;

pub use crawling::{RunSummary, Updater, UpdaterConfig, UpdaterDeps, UpdaterError};
pub use domain::{ProductId, ProductRecord, ProductStatus, VendorPolicy, VendorPolicyTable};
pub use infrastructure::AppConfig;
pub use vendor::{ClientRegistry, VendorClient};
