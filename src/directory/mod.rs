//! Directory client.
//!
//! Translates the handful of side effects the approval workflow needs (probe,
//! create, set password, delete) into calls against the external directory.
//! The transport is hidden behind [`DirectoryClient`]; [`LdapDirectory`] talks to
//! a real server and [`MemoryDirectory`] keeps entries in process.

mod escape;
mod ldap;
mod memory;
mod password;

pub use escape::{escape_directory_dn, escape_directory_filter};
pub use ldap::LdapDirectory;
pub use memory::MemoryDirectory;
pub use password::{generate_password, GENERATED_PASSWORD_LENGTH};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{DirectoryBackend, DirectoryConfig};
use crate::registration::validation::{validate_email, validate_name, validate_username};

/// Directory-side failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The directory could not be reached or did not answer in time. Retry-safe.
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    /// The entry already exists.
    #[error("directory entry already exists: {0}")]
    Conflict(String),

    /// The directory refused the input or our credentials.
    #[error("directory rejected the operation: {0}")]
    Rejected(String),

    /// The entry does not exist.
    #[error("directory entry not found: {0}")]
    NotFound(String),
}

/// Attributes of a user entry to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDirectoryUser {
    /// Unique identifier (`uid`).
    pub username: String,
    /// Mail address (`mail`).
    pub email: String,
    /// Given name (`givenName`).
    pub first_name: String,
    /// Surname (`sn`).
    pub last_name: String,
}

impl NewDirectoryUser {
    /// Create a new entry description.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }

    /// Display name (`cn`).
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Re-run form validation right before the entry is built.
    ///
    /// A failure here means something upstream let bad input through, so it is
    /// reported as [`DirectoryError::Rejected`] and never retried.
    pub fn check(&self) -> Result<(), DirectoryError> {
        validate_username(&self.username)
            .and_then(|_| validate_email(&self.email))
            .and_then(|_| validate_name("first_name", &self.first_name))
            .and_then(|_| validate_name("last_name", &self.last_name))
            .map_err(|e| {
                tracing::error!(username = ?self.username, error = %e, "Refusing to build directory entry from invalid input");
                DirectoryError::Rejected(e.to_string())
            })
    }
}

/// Operations the workflow performs against the directory.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Short name of the implementation, for logs.
    fn backend_name(&self) -> &'static str;

    /// Whether a user entry with this `uid` exists.
    async fn exists(&self, username: &str) -> Result<bool, DirectoryError>;

    /// Whether any user entry carries this `mail` value.
    async fn email_exists(&self, email: &str) -> Result<bool, DirectoryError>;

    /// Create a user entry and set its initial password.
    async fn create_user(
        &self,
        user: &NewDirectoryUser,
        password: &str,
    ) -> Result<(), DirectoryError>;

    /// Replace the password of an existing entry.
    async fn set_password(&self, username: &str, password: &str) -> Result<(), DirectoryError>;

    /// Remove a user entry.
    async fn delete_user(&self, username: &str) -> Result<(), DirectoryError>;
}

/// Build the directory client selected by the configuration.
pub fn from_config(config: &DirectoryConfig) -> crate::Result<Arc<dyn DirectoryClient>> {
    match config.backend {
        DirectoryBackend::Ldap => Ok(Arc::new(LdapDirectory::new(config.clone())?)),
        DirectoryBackend::Memory => {
            tracing::warn!("Using in-memory directory; entries are lost on restart");
            Ok(Arc::new(MemoryDirectory::new()))
        }
    }
}
