//! Infrastructure layer - configuration, logging and boundary adapters
//!
//! Concrete implementations of the domain boundary traits (SQLite and
//! in-memory catalogs, credential providers) plus the HTTP session helper
//! vendor clients build on.

pub mod config;
pub mod credentials;
pub mod database_connection;
pub mod http_client;
pub mod logging;
pub mod memory_catalog;
pub mod sqlite_catalog;

pub use config::{AppConfig, ConfigError, EngineSettings, LoggingConfig};
pub use credentials::{EnvCredentialProvider, StaticCredentialProvider};
pub use database_connection::DatabaseConnection;
pub use http_client::{HttpClientConfig, HttpFailure, VendorHttpClient, classify_status};
pub use logging::{init_logging, init_logging_with_config};
pub use memory_catalog::{CatalogWrite, InMemoryCatalog};
pub use sqlite_catalog::SqliteCatalog;
