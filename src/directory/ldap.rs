//! LDAP-backed directory client.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::exop::PasswordModify;
use ldap3::result::{LdapError, LdapResult};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope};
use tracing::{debug, info, warn};

use super::escape::escape_directory_filter;
use super::{DirectoryClient, DirectoryError, NewDirectoryUser};
use crate::config::DirectoryConfig;
use crate::registration::validation::validate_username;

/// Result codes we map explicitly (RFC 4511).
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_BUSY: u32 = 51;
const RC_UNAVAILABLE: u32 = 52;
const RC_ENTRY_ALREADY_EXISTS: u32 = 68;
const RC_OTHER: u32 = 80;

/// Directory client speaking LDAP to a single server.
///
/// Each operation opens its own connection, binds as the configured
/// administrator, performs the request and unbinds. The whole exchange is
/// bounded by `timeout_secs`.
pub struct LdapDirectory {
    config: DirectoryConfig,
    bind_password: String,
    timeout: Duration,
}

impl LdapDirectory {
    /// Create a new client. The bind password is resolved once, here.
    pub fn new(config: DirectoryConfig) -> crate::Result<Self> {
        let bind_password = config.resolve_bind_password()?;
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            config,
            bind_password,
            timeout,
        })
    }

    async fn connect(&self) -> Result<Ldap, DirectoryError> {
        let url = self.config.url();
        debug!(url = %url, "Connecting to directory");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.timeout)
            .set_starttls(self.config.use_starttls);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| classify_error(&format!("connect to {url}"), e))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "Directory connection driver error");
            }
        });

        let bind_dn = self.config.bind_dn();
        let result = ldap
            .simple_bind(&bind_dn, &self.bind_password)
            .await
            .map_err(|e| classify_error("bind", e))?;
        check_result("bind", result)?;

        Ok(ldap)
    }

    /// Run one operation on a fresh connection, bounded by the configured timeout.
    async fn with_connection<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T, DirectoryError>
    where
        F: FnOnce(Ldap) -> Fut,
        Fut: Future<Output = Result<T, DirectoryError>>,
    {
        let exchange = async {
            let mut ldap = self.connect().await?;
            let outcome = f(ldap.clone()).await;
            if let Err(e) = ldap.unbind().await {
                debug!(error = %e, "Error during directory unbind");
            }
            outcome
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(op, timeout_secs = self.timeout.as_secs(), "Directory operation timed out");
                Err(DirectoryError::Unavailable(format!("{op} timed out")))
            }
        }
    }

    async fn search_people(&self, filter: String) -> Result<bool, DirectoryError> {
        let base = self.config.people_dn();
        self.with_connection("search", |mut ldap| async move {
            let result = ldap
                .search(&base, Scope::Subtree, &filter, vec!["dn"])
                .await
                .map_err(|e| classify_error("search", e))?;
            let (entries, _) = result.success().map_err(|e| classify_error("search", e))?;
            Ok(!entries.is_empty())
        })
        .await
    }
}

#[async_trait]
impl DirectoryClient for LdapDirectory {
    fn backend_name(&self) -> &'static str {
        "ldap"
    }

    async fn exists(&self, username: &str) -> Result<bool, DirectoryError> {
        self.search_people(format!("(uid={})", escape_directory_filter(username)))
            .await
    }

    async fn email_exists(&self, email: &str) -> Result<bool, DirectoryError> {
        self.search_people(format!("(mail={})", escape_directory_filter(email)))
            .await
    }

    async fn create_user(
        &self,
        user: &NewDirectoryUser,
        password: &str,
    ) -> Result<(), DirectoryError> {
        user.check()?;

        let dn = self.config.user_dn(&user.username);
        let display_name = user.display_name();

        self.with_connection("create", |mut ldap| async move {
            let attrs: Vec<(&str, HashSet<&str>)> = vec![
                ("objectClass", HashSet::from(["person", "inetOrgPerson"])),
                ("uid", HashSet::from([user.username.as_str()])),
                ("cn", HashSet::from([display_name.as_str()])),
                ("sn", HashSet::from([user.last_name.as_str()])),
                ("givenName", HashSet::from([user.first_name.as_str()])),
                ("mail", HashSet::from([user.email.as_str()])),
            ];

            let result = ldap
                .add(&dn, attrs)
                .await
                .map_err(|e| classify_error("add", e))?;
            check_result("add", result)?;
            info!(username = %user.username, "Directory entry created");

            if let Err(e) = modify_password(&mut ldap, &dn, password).await {
                warn!(username = %user.username, error = %e, "Setting initial password failed, removing entry");
                match ldap.delete(&dn).await {
                    Ok(result) if result.rc == 0 => {}
                    Ok(result) => {
                        warn!(username = %user.username, rc = result.rc, text = %result.text, "Cleanup of partial entry failed")
                    }
                    Err(cleanup) => {
                        warn!(username = %user.username, error = %cleanup, "Cleanup of partial entry failed")
                    }
                }
                return Err(e);
            }

            Ok(())
        })
        .await
    }

    async fn set_password(&self, username: &str, password: &str) -> Result<(), DirectoryError> {
        validate_username(username).map_err(|e| DirectoryError::Rejected(e.to_string()))?;
        let dn = self.config.user_dn(username);

        self.with_connection("set_password", |mut ldap| async move {
            modify_password(&mut ldap, &dn, password).await
        })
        .await
    }

    async fn delete_user(&self, username: &str) -> Result<(), DirectoryError> {
        validate_username(username).map_err(|e| DirectoryError::Rejected(e.to_string()))?;
        let dn = self.config.user_dn(username);

        self.with_connection("delete", |mut ldap| async move {
            let result = ldap
                .delete(&dn)
                .await
                .map_err(|e| classify_error("delete", e))?;
            check_result("delete", result)?;
            info!(dn = %dn, "Directory entry deleted");
            Ok(())
        })
        .await
    }
}

async fn modify_password(ldap: &mut Ldap, dn: &str, password: &str) -> Result<(), DirectoryError> {
    let exop = PasswordModify {
        user_id: Some(dn),
        old_pass: None,
        new_pass: Some(password),
    };
    ldap.extended(exop)
        .await
        .map_err(|e| classify_error("password modify", e))?
        .success()
        .map_err(|e| classify_error("password modify", e))?;
    Ok(())
}

/// Map a non-zero result code onto the directory error taxonomy.
fn check_result(op: &str, result: LdapResult) -> Result<LdapResult, DirectoryError> {
    if result.rc == 0 {
        return Ok(result);
    }
    Err(classify_rc(op, result.rc, &result.text))
}

fn classify_rc(op: &str, rc: u32, text: &str) -> DirectoryError {
    let detail = format!("{op} failed with code {rc}: {text}");
    match rc {
        RC_ENTRY_ALREADY_EXISTS => DirectoryError::Conflict(detail),
        RC_NO_SUCH_OBJECT => DirectoryError::NotFound(detail),
        RC_BUSY | RC_UNAVAILABLE | RC_OTHER => DirectoryError::Unavailable(detail),
        _ => DirectoryError::Rejected(detail),
    }
}

fn classify_error(op: &str, err: LdapError) -> DirectoryError {
    match err {
        LdapError::LdapResult { result } => classify_rc(op, result.rc, &result.text),
        other => DirectoryError::Unavailable(format!("{op}: {other}")),
    }
}
