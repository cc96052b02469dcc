//! Shared fixtures for integration tests.
//!
//! Every harness runs against an in-memory SQLite database, the in-memory
//! directory and a sink file in a temporary directory.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum_test::TestServer;
use registrar::config::WebConfig;
use registrar::db::{AuditAction, AuditLogEntry};
use registrar::directory::NewDirectoryUser;
use registrar::notify::FileSink;
use registrar::registration::{ClientInfo, Submission};
use registrar::web::handlers::AppState;
use registrar::web::middleware::{ForwardAuthState, RateLimitState};
use registrar::web::router::create_router;
use registrar::{
    Database, DirectoryClient, MemoryDirectory, Notifier, RegistrationRequest, Workflow,
};
use tempfile::TempDir;

/// Identity used for admin actions.
pub const ADMIN: &str = "admin";

/// Address that receives admin alerts.
pub const ADMIN_EMAIL: &str = "admin@example.com";

/// Workflow wired to in-memory collaborators.
pub struct Harness {
    pub db: Database,
    pub directory: Arc<MemoryDirectory>,
    pub workflow: Arc<Workflow>,
    pub sink_path: PathBuf,
    _dir: TempDir,
}

impl Harness {
    /// Create a harness with admin alerts enabled.
    pub async fn new() -> Self {
        Self::with_directory(|directory, _| directory).await
    }

    /// Like [`Harness::new`], but the workflow talks to whatever `wrap` builds
    /// around the in-memory directory.
    pub async fn with_directory<F>(wrap: F) -> Self
    where
        F: FnOnce(Arc<MemoryDirectory>, Database) -> Arc<dyn DirectoryClient>,
    {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let sink_path = dir.path().join("mail").join("sent.log");

        let db = Database::open_in_memory()
            .await
            .expect("Failed to create test database");
        let directory = Arc::new(MemoryDirectory::new());
        let notifier = Arc::new(
            Notifier::sink_only(FileSink::new(&sink_path)).with_admin_email(ADMIN_EMAIL),
        );
        let workflow = Arc::new(Workflow::new(
            db.clone(),
            wrap(directory.clone(), db.clone()),
            notifier,
            20,
        ));

        Self {
            db,
            directory,
            workflow,
            sink_path,
            _dir: dir,
        }
    }

    /// Submit a well-formed request for `username`.
    pub async fn submit(&self, username: &str) -> RegistrationRequest {
        self.workflow
            .submit(&submission(username), ClientInfo::default())
            .await
            .expect("Submission should succeed")
    }

    /// Everything written to the sink file so far.
    pub async fn sink_contents(&self) -> String {
        tokio::fs::read_to_string(&self.sink_path)
            .await
            .unwrap_or_default()
    }

    /// Audit actions of one request, oldest first.
    pub async fn actions(&self, id: i64) -> Vec<AuditAction> {
        self.history(id).await.into_iter().map(|e| e.action).collect()
    }

    /// Audit entries of one request, oldest first.
    pub async fn history(&self, id: i64) -> Vec<AuditLogEntry> {
        self.workflow
            .request_history(id)
            .await
            .expect("History should load")
    }

    /// Put an entry in the directory behind the workflow's back.
    pub async fn seed_directory(&self, username: &str, email: &str) {
        self.directory
            .insert_existing(
                NewDirectoryUser::new(username, email, "Existing", "User"),
                "existing-password",
            )
            .await;
    }
}

/// A valid submission for `username` with a matching email.
pub fn submission(username: &str) -> Submission {
    Submission {
        username: username.to_string(),
        email: format!("{username}@example.com"),
        first_name: "Test".to_string(),
        last_name: "User".to_string(),
        reason: "Needs access to the wiki".to_string(),
    }
}

/// Web settings for tests: generous rate limit, `admin` on the allow-list and
/// forwarding headers trusted, as behind the proxy.
pub fn web_config() -> WebConfig {
    WebConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        admin_users: vec![ADMIN.to_string()],
        register_rate_limit: 100,
        trust_proxy_headers: true,
        ..WebConfig::default()
    }
}

/// HTTP test server over a harness.
pub fn test_server(harness: &Harness, config: &WebConfig) -> TestServer {
    let app_state = Arc::new(AppState::new(harness.workflow.clone()));
    let auth_state =
        Arc::new(ForwardAuthState::from_config(config).expect("Invalid forward auth config"));
    let rate_limit = Arc::new(RateLimitState::from_config(config));

    let router = create_router(app_state, auth_state, rate_limit, &config.cors_origins);
    TestServer::new(router).expect("Failed to create test server")
}
