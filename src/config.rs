//! Configuration module for Registrar.

use serde::Deserialize;
use std::path::Path;

use crate::directory::escape_directory_dn;
use crate::{RegistrarError, Result};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/registrations.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Which directory implementation to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryBackend {
    /// A real LDAP server.
    #[default]
    Ldap,
    /// Process-local directory, for development only.
    Memory,
}

/// Directory (LDAP) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    /// Directory implementation.
    #[serde(default)]
    pub backend: DirectoryBackend,
    /// LDAP server host.
    #[serde(default = "default_ldap_host")]
    pub host: String,
    /// LDAP server port.
    #[serde(default = "default_ldap_port")]
    pub port: u16,
    /// Use `ldaps://` instead of `ldap://`.
    #[serde(default)]
    pub use_ssl: bool,
    /// Upgrade the plain connection with StartTLS.
    #[serde(default)]
    pub use_starttls: bool,
    /// Base DN suffix (e.g. `dc=example,dc=com`).
    #[serde(default = "default_base_dn")]
    pub base_dn: String,
    /// Organizational unit holding user entries.
    #[serde(default = "default_people_ou")]
    pub people_ou: String,
    /// Username of the privileged bind identity.
    #[serde(default = "default_admin_user")]
    pub admin_user: String,
    /// File holding the bind password. Takes precedence over `bind_password`.
    #[serde(default)]
    pub bind_password_file: Option<String>,
    /// Inline bind password (prefer `bind_password_file`).
    #[serde(default)]
    pub bind_password: String,
    /// Upper bound for a single directory operation, in seconds.
    #[serde(default = "default_ldap_timeout")]
    pub timeout_secs: u64,
}

fn default_ldap_host() -> String {
    "lldap".to_string()
}

fn default_ldap_port() -> u16 {
    3890
}

fn default_base_dn() -> String {
    "dc=example,dc=com".to_string()
}

fn default_people_ou() -> String {
    "people".to_string()
}

fn default_admin_user() -> String {
    "admin".to_string()
}

fn default_ldap_timeout() -> u64 {
    10
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            backend: DirectoryBackend::default(),
            host: default_ldap_host(),
            port: default_ldap_port(),
            use_ssl: false,
            use_starttls: false,
            base_dn: default_base_dn(),
            people_ou: default_people_ou(),
            admin_user: default_admin_user(),
            bind_password_file: None,
            bind_password: String::new(),
            timeout_secs: default_ldap_timeout(),
        }
    }
}

impl DirectoryConfig {
    /// Server URL built from host, port and the SSL flag.
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// DN of the container holding user entries.
    pub fn people_dn(&self) -> String {
        format!(
            "ou={},{}",
            escape_directory_dn(&self.people_ou),
            self.base_dn
        )
    }

    /// DN of a user entry. The username is escaped.
    pub fn user_dn(&self, username: &str) -> String {
        format!("uid={},{}", escape_directory_dn(username), self.people_dn())
    }

    /// DN of the privileged bind identity.
    pub fn bind_dn(&self) -> String {
        self.user_dn(&self.admin_user)
    }

    /// Resolve the bind password, reading the secret file when configured.
    pub fn resolve_bind_password(&self) -> Result<String> {
        if let Some(ref file) = self.bind_password_file {
            if Path::new(file).exists() {
                let secret = std::fs::read_to_string(file)?;
                return Ok(secret.trim().to_string());
            }
            tracing::warn!(file = %file, "Bind password file not found, using inline password");
        }
        Ok(self.bind_password.clone())
    }
}

/// Outbound mail configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// Deliver over SMTP. When false every message goes to the sink file.
    #[serde(default)]
    pub enabled: bool,
    /// SMTP relay host.
    #[serde(default = "default_smtp_host")]
    pub host: String,
    /// SMTP relay port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// SMTP username (empty for unauthenticated relays).
    #[serde(default)]
    pub username: String,
    /// SMTP password.
    #[serde(default)]
    pub password: String,
    /// Sender address.
    #[serde(default)]
    pub from: String,
    /// Use STARTTLS.
    #[serde(default = "default_smtp_tls")]
    pub use_tls: bool,
    /// Address receiving new-request alerts. Empty disables admin alerts.
    #[serde(default)]
    pub admin_email: String,
    /// Local file that receives messages which could not be sent.
    #[serde(default = "default_sink_file")]
    pub sink_file: String,
    /// SMTP timeout in seconds.
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
    /// How long an admin action waits for its notification before answering.
    #[serde(default = "default_inline_wait")]
    pub inline_wait_secs: u64,
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_tls() -> bool {
    true
}

fn default_sink_file() -> String {
    "data/emails.log".to_string()
}

fn default_smtp_timeout() -> u64 {
    30
}

/// Default for `mail.inline_wait_secs`.
pub const DEFAULT_INLINE_WAIT_SECS: u64 = 3;

fn default_inline_wait() -> u64 {
    DEFAULT_INLINE_WAIT_SECS
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from: String::new(),
            use_tls: default_smtp_tls(),
            admin_email: String::new(),
            sink_file: default_sink_file(),
            timeout_secs: default_smtp_timeout(),
            inline_wait_secs: default_inline_wait(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/registrar.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// HTTP surface configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    /// Host address to bind.
    #[serde(default = "default_web_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// CORS allowed origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Header carrying the identity asserted by the forward-auth proxy.
    #[serde(default = "default_remote_user_header")]
    pub remote_user_header: String,
    /// Identities allowed on the admin surface. Empty trusts every asserted identity.
    #[serde(default)]
    pub admin_users: Vec<String>,
    /// Submissions per minute per client IP.
    #[serde(default = "default_register_rate_limit")]
    pub register_rate_limit: u32,
    /// Default page size for audit and approved listings.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Take the client address from `X-Forwarded-For`/`X-Real-IP`. Only safe
    /// when every request arrives through a proxy that sets these headers.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

fn default_web_host() -> String {
    "0.0.0.0".to_string()
}

fn default_web_port() -> u16 {
    5000
}

fn default_remote_user_header() -> String {
    "Remote-User".to_string()
}

fn default_register_rate_limit() -> u32 {
    5
}

fn default_page_size() -> u32 {
    20
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
            cors_origins: vec![],
            remote_user_header: default_remote_user_header(),
            admin_users: vec![],
            register_rate_limit: default_register_rate_limit(),
            page_size: default_page_size(),
            trust_proxy_headers: false,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Directory configuration.
    #[serde(default)]
    pub directory: DirectoryConfig,
    /// Mail configuration.
    #[serde(default)]
    pub mail: MailConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// HTTP configuration.
    #[serde(default)]
    pub web: WebConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(RegistrarError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RegistrarError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `REGISTRAR_DATABASE_PATH`
    /// - `REGISTRAR_LDAP_BIND_PASSWORD`
    /// - `REGISTRAR_SMTP_PASSWORD`
    /// - `REGISTRAR_ADMIN_EMAIL`
    ///
    /// Empty values are ignored.
    pub fn apply_env_overrides(&mut self) {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        if let Some(path) = read("REGISTRAR_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(password) = read("REGISTRAR_LDAP_BIND_PASSWORD") {
            self.directory.bind_password = password;
        }
        if let Some(password) = read("REGISTRAR_SMTP_PASSWORD") {
            self.mail.password = password;
        }
        if let Some(email) = read("REGISTRAR_ADMIN_EMAIL") {
            self.mail.admin_email = email;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.directory.base_dn.trim().is_empty() {
            return Err(RegistrarError::Config("directory.base_dn is empty".to_string()));
        }
        if self.directory.timeout_secs == 0 {
            return Err(RegistrarError::Config(
                "directory.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.mail.enabled && (self.mail.host.is_empty() || self.mail.from.is_empty()) {
            return Err(RegistrarError::Config(
                "mail is enabled but mail.host or mail.from is not set".to_string(),
            ));
        }
        if self.web.remote_user_header.trim().is_empty() {
            return Err(RegistrarError::Config(
                "web.remote_user_header is empty".to_string(),
            ));
        }
        if self.web.page_size == 0 {
            return Err(RegistrarError::Config(
                "web.page_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.database.path, "data/registrations.db");

        assert_eq!(config.directory.backend, DirectoryBackend::Ldap);
        assert_eq!(config.directory.host, "lldap");
        assert_eq!(config.directory.port, 3890);
        assert_eq!(config.directory.base_dn, "dc=example,dc=com");
        assert_eq!(config.directory.admin_user, "admin");
        assert_eq!(config.directory.timeout_secs, 10);

        assert!(!config.mail.enabled);
        assert_eq!(config.mail.port, 587);
        assert!(config.mail.use_tls);
        assert!(config.mail.admin_email.is_empty());
        assert_eq!(config.mail.sink_file, "data/emails.log");
        assert_eq!(config.mail.inline_wait_secs, 3);
        assert!(!config.web.trust_proxy_headers);

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/registrar.log");

        assert_eq!(config.web.port, 5000);
        assert_eq!(config.web.remote_user_header, "Remote-User");
        assert_eq!(config.web.page_size, 20);
        assert!(config.web.admin_users.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[database]
path = "custom/db.sqlite"

[directory]
backend = "memory"
host = "ldap.internal"
port = 636
use_ssl = true
base_dn = "dc=corp,dc=test"
admin_user = "binder"
bind_password_file = "/run/secrets/ldap"
timeout_secs = 3

[mail]
enabled = true
host = "smtp.corp.test"
port = 25
from = "noreply@corp.test"
use_tls = false
admin_email = "ops@corp.test"
sink_file = "/var/log/mail.log"
inline_wait_secs = 1

[logging]
level = "debug"
file = "custom/logs/app.log"

[web]
host = "127.0.0.1"
port = 8080
remote_user_header = "X-Forwarded-User"
admin_users = ["alice", "bob"]
register_rate_limit = 10
page_size = 50
trust_proxy_headers = true
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.database.path, "custom/db.sqlite");
        assert_eq!(config.directory.backend, DirectoryBackend::Memory);
        assert_eq!(config.directory.url(), "ldaps://ldap.internal:636");
        assert_eq!(config.directory.admin_user, "binder");
        assert_eq!(
            config.directory.bind_password_file.as_deref(),
            Some("/run/secrets/ldap")
        );
        assert_eq!(config.directory.timeout_secs, 3);

        assert!(config.mail.enabled);
        assert_eq!(config.mail.host, "smtp.corp.test");
        assert_eq!(config.mail.port, 25);
        assert!(!config.mail.use_tls);
        assert_eq!(config.mail.admin_email, "ops@corp.test");
        assert_eq!(config.mail.inline_wait_secs, 1);

        assert_eq!(config.logging.level, "debug");

        assert_eq!(config.web.port, 8080);
        assert_eq!(config.web.remote_user_header, "X-Forwarded-User");
        assert_eq!(config.web.admin_users, vec!["alice", "bob"]);
        assert_eq!(config.web.register_rate_limit, 10);
        assert_eq!(config.web.page_size, 50);
        assert!(config.web.trust_proxy_headers);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.directory.port, 3890);
        assert_eq!(config.database.path, "data/registrations.db");
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("this is not valid toml [[[");
        match result {
            Err(RegistrarError::Config(msg)) => assert!(msg.contains("config parse error")),
            other => panic!("Expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load("nonexistent.toml");
        assert!(matches!(result, Err(RegistrarError::Io(_))));
    }

    #[test]
    fn test_directory_dns() {
        let config = DirectoryConfig::default();
        assert_eq!(config.url(), "ldap://lldap:3890");
        assert_eq!(config.people_dn(), "ou=people,dc=example,dc=com");
        assert_eq!(
            config.user_dn("alice"),
            "uid=alice,ou=people,dc=example,dc=com"
        );
        assert_eq!(config.bind_dn(), "uid=admin,ou=people,dc=example,dc=com");
    }

    #[test]
    fn test_user_dn_is_escaped() {
        let config = DirectoryConfig::default();
        assert_eq!(
            config.user_dn("a,ou=admins"),
            "uid=a\\,ou\\=admins,ou=people,dc=example,dc=com"
        );
    }

    #[test]
    fn test_resolve_bind_password_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("LDAP_USER_PASS");
        std::fs::write(&path, "s3cret\n").unwrap();

        let config = DirectoryConfig {
            bind_password_file: Some(path.to_string_lossy().into_owned()),
            bind_password: "inline".to_string(),
            ..Default::default()
        };
        assert_eq!(config.resolve_bind_password().unwrap(), "s3cret");
    }

    #[test]
    fn test_resolve_bind_password_missing_file_falls_back() {
        let config = DirectoryConfig {
            bind_password_file: Some("/nonexistent/secret".to_string()),
            bind_password: "inline".to_string(),
            ..Default::default()
        };
        assert_eq!(config.resolve_bind_password().unwrap(), "inline");
    }

    #[test]
    fn test_apply_env_overrides() {
        let original = std::env::var("REGISTRAR_ADMIN_EMAIL").ok();

        std::env::set_var("REGISTRAR_ADMIN_EMAIL", "root@example.com");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.mail.admin_email, "root@example.com");

        std::env::set_var("REGISTRAR_ADMIN_EMAIL", "");
        let mut config = Config::default();
        config.mail.admin_email = "keep@example.com".to_string();
        config.apply_env_overrides();
        assert_eq!(config.mail.admin_email, "keep@example.com");

        if let Some(val) = original {
            std::env::set_var("REGISTRAR_ADMIN_EMAIL", val);
        } else {
            std::env::remove_var("REGISTRAR_ADMIN_EMAIL");
        }
    }

    #[test]
    fn test_validate_default() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_mail_enabled_without_from() {
        let mut config = Config::default();
        config.mail.enabled = true;
        let result = config.validate();
        match result {
            Err(RegistrarError::Config(msg)) => assert!(msg.contains("mail.from")),
            other => panic!("Expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.directory.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_base_dn() {
        let mut config = Config::default();
        config.directory.base_dn = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
