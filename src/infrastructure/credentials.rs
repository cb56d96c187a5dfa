//! Credential providers
//!
//! Lookup is office first, then the vendor-wide account.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::credentials::{CredentialError, Credentials};
use crate::domain::product::OfficeId;
use crate::domain::repositories::CredentialProvider;
use crate::infrastructure::config::defaults;

/// Fixed credentials keyed by vendor and optional office
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    entries: HashMap<(String, Option<OfficeId>), Credentials>,
}

impl StaticCredentialProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Vendor-wide account used when no office entry exists
    #[must_use]
    pub fn with_vendor(mut self, vendor: impl Into<String>, credentials: Credentials) -> Self {
        self.entries.insert((vendor.into(), None), credentials);
        self
    }

    #[must_use]
    pub fn with_office(mut self, vendor: impl Into<String>, office: OfficeId, credentials: Credentials) -> Self {
        self.entries.insert((vendor.into(), Some(office)), credentials);
        self
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn get_credentials(
        &self,
        vendor: &str,
        office: Option<OfficeId>,
    ) -> Result<Credentials, CredentialError> {
        let office_entry = office.and_then(|o| self.entries.get(&(vendor.to_string(), Some(o))));
        office_entry
            .or_else(|| self.entries.get(&(vendor.to_string(), None)))
            .cloned()
            .ok_or_else(|| CredentialError::MissingCredentials {
                vendor: vendor.to_string(),
                office,
            })
    }
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads `PRICE_SYNC_<VENDOR>[_<OFFICE>]_USERNAME` and `..._PASSWORD`
#[derive(Clone)]
pub struct EnvCredentialProvider {
    prefix: String,
    lookup: EnvLookup,
}

impl EnvCredentialProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::with_lookup(|key| std::env::var(key).ok())
    }

    /// Uses `lookup` in place of the process environment
    #[must_use]
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            prefix: defaults::ENV_PREFIX.to_string(),
            lookup: Arc::new(lookup),
        }
    }

    fn key(&self, vendor: &str, office: Option<OfficeId>, field: &str) -> String {
        let vendor = vendor.to_ascii_uppercase().replace('-', "_");
        match office {
            Some(office) => format!("{}_{vendor}_{office}_{field}", self.prefix),
            None => format!("{}_{vendor}_{field}", self.prefix),
        }
    }

    fn read(&self, vendor: &str, office: Option<OfficeId>) -> Option<Credentials> {
        let username = (self.lookup)(&self.key(vendor, office, "USERNAME"))?;
        let password = (self.lookup)(&self.key(vendor, office, "PASSWORD"))?;
        Some(Credentials::new(username, password))
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EnvCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvCredentialProvider")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn get_credentials(
        &self,
        vendor: &str,
        office: Option<OfficeId>,
    ) -> Result<Credentials, CredentialError> {
        office
            .and_then(|o| self.read(vendor, Some(o)))
            .or_else(|| self.read(vendor, None))
            .ok_or_else(|| CredentialError::MissingCredentials {
                vendor: vendor.to_string(),
                office,
            })
    }
}
