//! Registrar - self-service account registration with administrator approval.
//!
//! Visitors submit a registration request; an administrator approves or
//! rejects it. Approval creates the account in an LDAP directory and mails a
//! generated password to the requester. Every decision is recorded in an
//! append-only audit log.

pub mod config;
pub mod datetime;
pub mod db;
pub mod directory;
pub mod error;
pub mod logging;
pub mod notify;
pub mod registration;
pub mod web;

pub use config::Config;
pub use db::{Database, RegistrationRequest, RequestStatus};
pub use directory::{DirectoryClient, DirectoryError, LdapDirectory, MemoryDirectory};
pub use error::{RegistrarError, Result};
pub use notify::{Delivery, Notifier};
pub use registration::{Workflow, WorkflowError};
pub use web::WebServer;
