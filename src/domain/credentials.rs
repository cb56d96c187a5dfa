//! Vendor login credentials

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::product::OfficeId;

/// Username/password pair for a vendor account
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Credential lookup failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("no credentials for vendor {vendor} (office: {office:?})")]
    MissingCredentials {
        vendor: String,
        office: Option<OfficeId>,
    },

    #[error("credential backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_password() {
        let creds = Credentials::new("dr_smith", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("dr_smith"));
        assert!(!rendered.contains("hunter2"));
    }
}
