//! Request store: registration requests and their audit trail.

use thiserror::Error;
use tracing::{debug, warn};

use super::{AuditAction, AuditLogEntry, DbPool, NewRequest, RegistrationRequest, RequestStatus};

/// Largest page any listing returns.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Performer recorded for entries the service writes on its own.
pub const SYSTEM_ACTOR: &str = "system";

/// Prefix of the `APPROVE_FAILED` details written when a directory create timed
/// out or lost its connection, so the entry may or may not exist.
pub const INTERRUPTED_CREATE: &str = "directory create interrupted";

const REQUEST_COLUMNS: &str = "id, username, email, first_name, last_name, reason, status, \
     ip_address, user_agent, created_at, reviewed_at, reviewed_by, rejection_reason";

const AUDIT_COLUMNS: &str = "id, request_id, action, username, email, first_name, last_name, \
     reason, ip_address, user_agent, request_created_at, performed_by, rejection_reason, \
     details, timestamp";

/// Copies the current request row into the audit log.
const INSERT_AUDIT_FROM_REQUEST: &str = "INSERT INTO audit_log (
         request_id, action, username, email, first_name, last_name, reason,
         ip_address, user_agent, request_created_at, performed_by, rejection_reason, details)
     SELECT id, ?, username, email, first_name, last_name, reason,
            ip_address, user_agent, created_at, ?, rejection_reason, ?
     FROM registration_requests WHERE id = ?";

/// Clamp a page size to `1..=MAX_PAGE_SIZE`.
pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_PAGE_SIZE)
}

/// Request store errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Another pending request already holds this username.
    #[error("a pending request for username '{0}' already exists")]
    DuplicateUsername(String),

    /// Another pending request already uses this email.
    #[error("a pending request for email '{0}' already exists")]
    DuplicateEmail(String),

    /// No request with this ID.
    #[error("request {0} not found")]
    NotFound(i64),

    /// The request was not in the expected state (a concurrent decision won).
    #[error("request {id} is {actual}, expected {expected}")]
    StaleState {
        id: i64,
        expected: RequestStatus,
        actual: RequestStatus,
    },

    /// The requested transition is not part of the lifecycle.
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Extra data recorded with a transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionDetails {
    /// Stored on the request when moving to `rejected`.
    pub rejection_reason: Option<String>,
    /// Free-form note for the audit entry.
    pub details: Option<String>,
}

impl TransitionDetails {
    /// Details carrying a rejection reason.
    pub fn rejection(reason: impl Into<String>) -> Self {
        Self {
            rejection_reason: Some(reason.into()),
            details: None,
        }
    }

    /// Details carrying only an audit note.
    pub fn note(details: impl Into<String>) -> Self {
        Self {
            rejection_reason: None,
            details: Some(details.into()),
        }
    }
}

/// Repository for registration requests and the audit log.
pub struct RequestRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> RequestRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Store a new pending request together with its `CREATED` audit entry.
    ///
    /// Uniqueness among pending requests is enforced by partial unique indexes,
    /// so two concurrent submissions for the same name cannot both succeed.
    pub async fn submit(&self, new: &NewRequest) -> Result<RegistrationRequest, StoreError> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO registration_requests
                 (username, email, first_name, last_name, reason, ip_address, user_agent)
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.reason)
        .bind(&new.ip_address)
        .bind(&new.user_agent)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, new))?;

        sqlx::query(INSERT_AUDIT_FROM_REQUEST)
            .bind(AuditAction::Created)
            .bind(SYSTEM_ACTOR)
            .bind(None::<String>)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(id, username = %new.username, "Registration request stored");

        self.get(id).await
    }

    /// Get a request by ID.
    pub async fn get(&self, id: i64) -> Result<RegistrationRequest, StoreError> {
        self.find(id).await?.ok_or(StoreError::NotFound(id))
    }

    /// Get a request by ID, if it exists.
    pub async fn find(&self, id: i64) -> Result<Option<RegistrationRequest>, StoreError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM registration_requests WHERE id = ?");
        let request = sqlx::query_as::<_, RegistrationRequest>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(request)
    }

    /// Pending requests, oldest first.
    pub async fn list_pending(&self) -> Result<Vec<RegistrationRequest>, StoreError> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM registration_requests
             WHERE status = 'pending' ORDER BY created_at ASC, id ASC"
        );
        let requests = sqlx::query_as::<_, RegistrationRequest>(&sql)
            .fetch_all(self.pool)
            .await?;
        Ok(requests)
    }

    /// Approved requests, most recently reviewed first.
    pub async fn list_approved(&self, limit: i64) -> Result<Vec<RegistrationRequest>, StoreError> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM registration_requests
             WHERE status = 'approved' ORDER BY reviewed_at DESC, id DESC LIMIT ?"
        );
        let requests = sqlx::query_as::<_, RegistrationRequest>(&sql)
            .bind(clamp_limit(limit))
            .fetch_all(self.pool)
            .await?;
        Ok(requests)
    }

    /// Whether a directory create for this request was interrupted after its
    /// last decision (`CREATED`, `APPROVED`, `REJECTED`, ...).
    ///
    /// Such an entry was issued by this service, so a later attempt may take it
    /// over instead of refusing it as a foreign account.
    pub async fn has_interrupted_create(&self, request_id: i64) -> Result<bool, StoreError> {
        let interrupted: bool = sqlx::query_scalar(
            "SELECT EXISTS(
                 SELECT 1 FROM audit_log
                 WHERE request_id = ? AND action = 'APPROVE_FAILED' AND details LIKE ?
                   AND id > (SELECT COALESCE(MAX(id), 0) FROM audit_log
                             WHERE request_id = ? AND action != 'APPROVE_FAILED'))",
        )
        .bind(request_id)
        .bind(format!("{INTERRUPTED_CREATE}%"))
        .bind(request_id)
        .fetch_one(self.pool)
        .await?;
        Ok(interrupted)
    }

    /// Audit entries, most recent first.
    pub async fn list_audit(&self, limit: i64) -> Result<Vec<AuditLogEntry>, StoreError> {
        let sql = format!("SELECT {AUDIT_COLUMNS} FROM audit_log ORDER BY id DESC LIMIT ?");
        let entries = sqlx::query_as::<_, AuditLogEntry>(&sql)
            .bind(clamp_limit(limit))
            .fetch_all(self.pool)
            .await?;
        Ok(entries)
    }

    /// Audit entries of one request, oldest first.
    pub async fn list_audit_for_request(
        &self,
        request_id: i64,
    ) -> Result<Vec<AuditLogEntry>, StoreError> {
        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log WHERE request_id = ? ORDER BY id ASC"
        );
        let entries = sqlx::query_as::<_, AuditLogEntry>(&sql)
            .bind(request_id)
            .fetch_all(self.pool)
            .await?;
        Ok(entries)
    }

    /// Move a request from `from` to `to` and append the audit entry.
    ///
    /// The update only applies while the request is still in `from`; if another
    /// decision got there first the caller gets [`StoreError::StaleState`] and
    /// nothing is written.
    pub async fn transition(
        &self,
        id: i64,
        from: RequestStatus,
        to: RequestStatus,
        actor: &str,
        action: AuditAction,
        extra: TransitionDetails,
    ) -> Result<RegistrationRequest, StoreError> {
        if !from.can_transition_to(to) {
            warn!(id, %from, %to, "Refusing illegal transition");
            return Err(StoreError::IllegalTransition { from, to });
        }

        let rejection_reason = match to {
            RequestStatus::Rejected => extra.rejection_reason,
            _ => None,
        };

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE registration_requests
             SET status = ?, reviewed_at = datetime('now'), reviewed_by = ?, rejection_reason = ?
             WHERE id = ? AND status = ?",
        )
        .bind(to)
        .bind(actor)
        .bind(&rejection_reason)
        .bind(id)
        .bind(from)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            let current = self.get(id).await?;
            debug!(id, expected = %from, actual = %current.status, "Transition lost the race");
            return Err(StoreError::StaleState {
                id,
                expected: from,
                actual: current.status,
            });
        }

        sqlx::query(INSERT_AUDIT_FROM_REQUEST)
            .bind(action)
            .bind(actor)
            .bind(&extra.details)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(id, %from, %to, %action, actor, "Request transitioned");

        self.get(id).await
    }

    /// Append an `APPROVE_FAILED` entry without touching the request.
    pub async fn record_failure(&self, id: i64, actor: &str, details: &str) -> Result<(), StoreError> {
        let result = sqlx::query(INSERT_AUDIT_FROM_REQUEST)
            .bind(AuditAction::ApproveFailed)
            .bind(actor)
            .bind(details)
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

fn map_insert_error(e: sqlx::Error, new: &NewRequest) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return if db_err.message().contains("email") {
                StoreError::DuplicateEmail(new.email.clone())
            } else {
                StoreError::DuplicateUsername(new.username.clone())
            };
        }
    }
    StoreError::Database(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn alice() -> NewRequest {
        NewRequest::new("alice", "alice@x.com", "Alice", "Smith")
            .with_reason("wiki")
            .with_client(Some("10.0.0.1".to_string()), Some("curl/8".to_string()))
    }

    #[tokio::test]
    async fn test_submit_and_get() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = RequestRepository::new(db.pool());

        let req = repo.submit(&alice()).await.unwrap();
        assert_eq!(req.username, "alice");
        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(req.ip_address.as_deref(), Some("10.0.0.1"));
        assert!(req.reviewed_at.is_none());

        let fetched = repo.get(req.id).await.unwrap();
        assert_eq!(fetched, req);

        let audit = repo.list_audit_for_request(req.id).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::Created);
        assert_eq!(audit[0].performed_by, SYSTEM_ACTOR);
        assert_eq!(audit[0].reason, "wiki");
        assert_eq!(audit[0].request_created_at, req.created_at);
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = RequestRepository::new(db.pool());
        assert_eq!(repo.get(42).await, Err(StoreError::NotFound(42)));
        assert_eq!(repo.find(42).await, Ok(None));
    }

    #[tokio::test]
    async fn test_duplicate_pending_username() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = RequestRepository::new(db.pool());

        repo.submit(&alice()).await.unwrap();
        let dup = NewRequest::new("alice", "other@x.com", "Alice", "Jones");
        assert_eq!(
            repo.submit(&dup).await,
            Err(StoreError::DuplicateUsername("alice".to_string()))
        );
        assert_eq!(repo.list_pending().await.unwrap().len(), 1);
        assert_eq!(repo.list_audit(100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_pending_email() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = RequestRepository::new(db.pool());

        repo.submit(&alice()).await.unwrap();
        let dup = NewRequest::new("alice2", "alice@x.com", "Alice", "Smith");
        assert_eq!(
            repo.submit(&dup).await,
            Err(StoreError::DuplicateEmail("alice@x.com".to_string()))
        );
    }

    #[tokio::test]
    async fn test_resubmit_after_terminal_state() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = RequestRepository::new(db.pool());

        let first = repo.submit(&alice()).await.unwrap();
        repo.transition(
            first.id,
            RequestStatus::Pending,
            RequestStatus::Rejected,
            "admin",
            AuditAction::Rejected,
            TransitionDetails::rejection("spam"),
        )
        .await
        .unwrap();
        assert!(repo.list_pending().await.unwrap().is_empty());

        let second = repo.submit(&alice()).await.unwrap();
        assert_ne!(second.id, first.id);
        let pending = repo.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);
    }

    #[tokio::test]
    async fn test_interrupted_create_until_next_decision() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = RequestRepository::new(db.pool());
        let req = repo.submit(&alice()).await.unwrap();
        assert!(!repo.has_interrupted_create(req.id).await.unwrap());

        repo.record_failure(req.id, "admin", "directory unavailable: connect refused")
            .await
            .unwrap();
        assert!(!repo.has_interrupted_create(req.id).await.unwrap());

        repo.record_failure(req.id, "admin", &format!("{INTERRUPTED_CREATE}: timed out"))
            .await
            .unwrap();
        // Later failures do not clear it.
        repo.record_failure(req.id, "admin", "directory unavailable: connect refused")
            .await
            .unwrap();
        assert!(repo.has_interrupted_create(req.id).await.unwrap());

        repo.transition(
            req.id,
            RequestStatus::Pending,
            RequestStatus::Approved,
            "admin",
            AuditAction::Approved,
            TransitionDetails::note("took over entry from interrupted create"),
        )
        .await
        .unwrap();
        assert!(!repo.has_interrupted_create(req.id).await.unwrap());

        let history = repo.list_audit_for_request(req.id).await.unwrap();
        assert_eq!(
            history.last().unwrap().details.as_deref(),
            Some("took over entry from interrupted create")
        );
    }

    #[tokio::test]
    async fn test_transition_reject_and_reapprove() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = RequestRepository::new(db.pool());
        let req = repo.submit(&alice()).await.unwrap();

        let rejected = repo
            .transition(
                req.id,
                RequestStatus::Pending,
                RequestStatus::Rejected,
                "bob",
                AuditAction::Rejected,
                TransitionDetails::rejection("not a member"),
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.reviewed_by.as_deref(), Some("bob"));
        assert_eq!(rejected.rejection_reason.as_deref(), Some("not a member"));

        let approved = repo
            .transition(
                req.id,
                RequestStatus::Rejected,
                RequestStatus::Approved,
                "carol",
                AuditAction::ReApproved,
                TransitionDetails::default(),
            )
            .await
            .unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);
        assert_eq!(approved.reviewed_by.as_deref(), Some("carol"));
        assert!(approved.rejection_reason.is_none());

        let audit = repo.list_audit_for_request(req.id).await.unwrap();
        let actions: Vec<_> = audit.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::Created,
                AuditAction::Rejected,
                AuditAction::ReApproved
            ]
        );
        assert_eq!(audit[1].rejection_reason.as_deref(), Some("not a member"));
        assert_eq!(audit[1].performed_by, "bob");
    }

    #[tokio::test]
    async fn test_transition_stale_state() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = RequestRepository::new(db.pool());
        let req = repo.submit(&alice()).await.unwrap();

        repo.transition(
            req.id,
            RequestStatus::Pending,
            RequestStatus::Approved,
            "a1",
            AuditAction::Approved,
            TransitionDetails::default(),
        )
        .await
        .unwrap();

        let err = repo
            .transition(
                req.id,
                RequestStatus::Pending,
                RequestStatus::Rejected,
                "a2",
                AuditAction::Rejected,
                TransitionDetails::rejection("late"),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::StaleState {
                id: req.id,
                expected: RequestStatus::Pending,
                actual: RequestStatus::Approved,
            }
        );

        // The loser writes nothing.
        assert_eq!(repo.list_audit_for_request(req.id).await.unwrap().len(), 2);
        assert_eq!(repo.get(req.id).await.unwrap().reviewed_by.as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn test_transition_illegal() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = RequestRepository::new(db.pool());
        let req = repo.submit(&alice()).await.unwrap();

        let err = repo
            .transition(
                req.id,
                RequestStatus::Approved,
                RequestStatus::Rejected,
                "admin",
                AuditAction::Rejected,
                TransitionDetails::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn test_transition_not_found() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = RequestRepository::new(db.pool());
        let err = repo
            .transition(
                7,
                RequestStatus::Pending,
                RequestStatus::Approved,
                "admin",
                AuditAction::Approved,
                TransitionDetails::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound(7));
    }

    #[tokio::test]
    async fn test_record_failure() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = RequestRepository::new(db.pool());
        let req = repo.submit(&alice()).await.unwrap();

        repo.record_failure(req.id, "admin", "directory unavailable")
            .await
            .unwrap();

        let after = repo.get(req.id).await.unwrap();
        assert_eq!(after.status, RequestStatus::Pending);
        let audit = repo.list_audit(10).await.unwrap();
        assert_eq!(audit[0].action, AuditAction::ApproveFailed);
        assert_eq!(audit[0].details.as_deref(), Some("directory unavailable"));

        assert_eq!(
            repo.record_failure(999, "admin", "x").await,
            Err(StoreError::NotFound(999))
        );
    }

    #[tokio::test]
    async fn test_list_pending_order_and_approved() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = RequestRepository::new(db.pool());

        let a = repo.submit(&alice()).await.unwrap();
        let b = repo
            .submit(&NewRequest::new("bob", "bob@x.com", "Bob", "Brown"))
            .await
            .unwrap();

        let pending = repo.list_pending().await.unwrap();
        assert_eq!(
            pending.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![a.id, b.id]
        );

        repo.transition(
            b.id,
            RequestStatus::Pending,
            RequestStatus::Approved,
            "admin",
            AuditAction::Approved,
            TransitionDetails::default(),
        )
        .await
        .unwrap();

        let approved = repo.list_approved(20).await.unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].username, "bob");
        assert_eq!(repo.list_pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_audit_log_is_append_only() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = RequestRepository::new(db.pool());
        repo.submit(&alice()).await.unwrap();

        let update = sqlx::query("UPDATE audit_log SET performed_by = 'mallory'")
            .execute(db.pool())
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM audit_log").execute(db.pool()).await;
        assert!(delete.is_err());

        let delete_request = sqlx::query("DELETE FROM registration_requests")
            .execute(db.pool())
            .await;
        assert!(delete_request.is_err());

        let audit = repo.list_audit(10).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].performed_by, SYSTEM_ACTOR);
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(-5), 1);
        assert_eq!(clamp_limit(20), 20);
        assert_eq!(clamp_limit(1000), MAX_PAGE_SIZE);
    }
}
