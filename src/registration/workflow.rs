//! Approval workflow.
//!
//! Drives a request through its lifecycle:
//!
//! ```text
//! submit ──► pending ──approve──► approved ──re_approve──► approved
//!               │                               (entry recreated)
//!               └──reject──► rejected ──re_approve──► approved
//! ```
//!
//! Directory side effects happen before the store transition. If the
//! transition then fails, the entry that was just created is deleted again so
//! a retry starts from a clean directory.
//!
//! A create that times out may still have been applied. It is audited as an
//! interrupted create, and the next attempt for the same request takes the
//! entry over (fresh password) instead of refusing it as a foreign account.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use super::validation::{validate_reason, validate_submission, ValidationError};
use crate::db::{
    clamp_limit, AuditAction, AuditLogEntry, Database, NewRequest, RegistrationRequest,
    RequestRepository, RequestStatus, StoreError, TransitionDetails, INTERRUPTED_CREATE,
};
use crate::directory::{generate_password, DirectoryClient, DirectoryError, NewDirectoryUser};
use crate::notify::{Delivery, Notifier};

/// Rejection reason used when the admin gives none.
pub const DEFAULT_REJECTION_REASON: &str = "No reason provided";

/// Audit note on a transition that reused an entry from an interrupted create.
pub const TAKEN_OVER_NOTE: &str = "took over directory entry left by an interrupted create";

/// Workflow errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Input failed validation.
    #[error(transparent)]
    ValidationFailed(#[from] ValidationError),

    /// The username is pending or already exists in the directory.
    #[error("username '{0}' is already taken or has a pending request")]
    DuplicateUsername(String),

    /// The email is pending or already exists in the directory.
    #[error("email '{0}' is already registered or has a pending request")]
    DuplicateEmail(String),

    /// No such request.
    #[error("request {0} not found")]
    NotFound(i64),

    /// The request is not in a state that allows this action.
    #[error("request {id} is already {actual}")]
    StaleState { id: i64, actual: RequestStatus },

    /// The directory could not be reached; the action can be retried.
    #[error("directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// A directory entry with this username already exists.
    #[error("directory entry for '{0}' already exists")]
    DirectoryConflict(String),

    /// The directory refused the operation.
    #[error("directory rejected the operation: {0}")]
    DirectoryRejected(String),

    /// The store refused a transition that should have been legal.
    #[error("store inconsistent: {0}")]
    StoreInconsistent(String),

    /// Underlying store failure.
    #[error("store error: {0}")]
    Store(String),
}

impl From<StoreError> for WorkflowError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateUsername(username) => WorkflowError::DuplicateUsername(username),
            StoreError::DuplicateEmail(email) => WorkflowError::DuplicateEmail(email),
            StoreError::NotFound(id) => WorkflowError::NotFound(id),
            StoreError::StaleState { id, actual, .. } => WorkflowError::StaleState { id, actual },
            e @ StoreError::IllegalTransition { .. } => {
                WorkflowError::StoreInconsistent(e.to_string())
            }
            StoreError::Database(msg) => WorkflowError::Store(msg),
        }
    }
}

/// Raw registration form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub reason: String,
}

/// Where a submission came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Trim every field and lowercase username and email.
pub fn normalize_submission(submission: &Submission) -> Submission {
    Submission {
        username: submission.username.trim().to_lowercase(),
        email: submission.email.trim().to_lowercase(),
        first_name: submission.first_name.trim().to_string(),
        last_name: submission.last_name.trim().to_string(),
        reason: submission.reason.trim().to_string(),
    }
}

/// Result of a successful approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApproveOutcome {
    /// The request after the transition.
    pub request: RegistrationRequest,
    /// How the credentials were delivered.
    pub delivery: Delivery,
}

/// Result of a successful rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectOutcome {
    /// The request after the transition.
    pub request: RegistrationRequest,
    /// How the rejection notice was delivered.
    pub delivery: Delivery,
}

/// Result of a re-approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReApproveOutcome {
    /// A rejected request was approved and its entry created.
    ReApproved {
        request: RegistrationRequest,
        delivery: Delivery,
    },
    /// The missing entry of an approved request was recreated.
    Recreated {
        request: RegistrationRequest,
        delivery: Delivery,
    },
    /// The directory already has the entry; nothing was changed.
    AlreadyPresent { request: RegistrationRequest },
    /// The request is still pending and must go through `approve`.
    NotEligible { request: RegistrationRequest },
}

impl ReApproveOutcome {
    /// The request as it stands after the call.
    pub fn request(&self) -> &RegistrationRequest {
        match self {
            ReApproveOutcome::ReApproved { request, .. }
            | ReApproveOutcome::Recreated { request, .. }
            | ReApproveOutcome::AlreadyPresent { request }
            | ReApproveOutcome::NotEligible { request } => request,
        }
    }

    /// Whether the call changed anything.
    pub fn is_noop(&self) -> bool {
        matches!(
            self,
            ReApproveOutcome::AlreadyPresent { .. } | ReApproveOutcome::NotEligible { .. }
        )
    }
}

/// Presence of an approved user in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryStatus {
    /// The entry exists.
    Active,
    /// The entry is gone (deleted out-of-band).
    Missing,
    /// The probe failed.
    Unknown,
}

/// An approved request annotated with its directory status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedEntry {
    pub request: RegistrationRequest,
    pub directory_status: DirectoryStatus,
}

impl From<&RegistrationRequest> for NewDirectoryUser {
    fn from(request: &RegistrationRequest) -> Self {
        NewDirectoryUser::new(
            request.username.clone(),
            request.email.clone(),
            request.first_name.clone(),
            request.last_name.clone(),
        )
    }
}

/// The registration workflow.
pub struct Workflow {
    db: Database,
    directory: Arc<dyn DirectoryClient>,
    notifier: Arc<Notifier>,
    default_page_size: i64,
}

impl Workflow {
    /// Create a new workflow.
    pub fn new(
        db: Database,
        directory: Arc<dyn DirectoryClient>,
        notifier: Arc<Notifier>,
        default_page_size: u32,
    ) -> Self {
        Self {
            db,
            directory,
            notifier,
            default_page_size: i64::from(default_page_size),
        }
    }

    fn repo(&self) -> RequestRepository<'_> {
        RequestRepository::new(self.db.pool())
    }

    fn page_size(&self, limit: Option<i64>) -> i64 {
        clamp_limit(limit.unwrap_or(self.default_page_size))
    }

    /// Accept a public submission into the pending queue.
    pub async fn submit(
        &self,
        submission: &Submission,
        client: ClientInfo,
    ) -> Result<RegistrationRequest, WorkflowError> {
        let s = normalize_submission(submission);
        validate_submission(&s.username, &s.email, &s.first_name, &s.last_name, &s.reason)?;

        match self.directory.exists(&s.username).await {
            Ok(true) => return Err(WorkflowError::DuplicateUsername(s.username)),
            Ok(false) => {}
            Err(e) => {
                warn!(username = %s.username, error = %e, "Directory username check failed, accepting submission")
            }
        }
        match self.directory.email_exists(&s.email).await {
            Ok(true) => return Err(WorkflowError::DuplicateEmail(s.email)),
            Ok(false) => {}
            Err(e) => {
                warn!(email = %s.email, error = %e, "Directory email check failed, accepting submission")
            }
        }

        let new = NewRequest::new(s.username, s.email, s.first_name, s.last_name)
            .with_reason(s.reason)
            .with_client(client.ip_address, client.user_agent);
        let request = self.repo().submit(&new).await?;

        info!(
            id = request.id,
            username = %request.username,
            ip = ?request.ip_address,
            "Registration request submitted"
        );

        self.notifier.notify_admin_new_request(&request).await;
        Ok(request)
    }

    /// Approve a pending request: create the directory entry, mark the request
    /// approved and mail the credentials.
    pub async fn approve(&self, id: i64, actor: &str) -> Result<ApproveOutcome, WorkflowError> {
        let repo = self.repo();
        let request = repo.get(id).await?;
        if request.status != RequestStatus::Pending {
            return Err(WorkflowError::StaleState {
                id,
                actual: request.status,
            });
        }

        let present = match self.directory.exists(&request.username).await {
            Ok(present) => present,
            Err(e) => return Err(self.directory_failure(&request, actor, e).await),
        };

        let password = generate_password();
        let details = if present {
            self.take_over_or_refuse(&request, actor, &password).await?
        } else {
            match self
                .directory
                .create_user(&NewDirectoryUser::from(&request), &password)
                .await
            {
                Ok(()) => TransitionDetails::default(),
                Err(DirectoryError::Conflict(_)) => {
                    self.take_over_or_refuse(&request, actor, &password).await?
                }
                Err(e) => return Err(self.create_failure(&request, actor, e).await),
            }
        };

        let approved = match repo
            .transition(
                id,
                RequestStatus::Pending,
                RequestStatus::Approved,
                actor,
                AuditAction::Approved,
                details,
            )
            .await
        {
            Ok(approved) => approved,
            Err(e) => {
                self.compensate(&request.username, &e).await;
                return Err(e.into());
            }
        };

        info!(id, username = %approved.username, actor, "Request approved, directory entry created");
        let delivery = self.notifier.notify_credentials(&approved, &password).await;

        Ok(ApproveOutcome {
            request: approved,
            delivery,
        })
    }

    /// Reject a pending request.
    pub async fn reject(
        &self,
        id: i64,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<RejectOutcome, WorkflowError> {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REJECTION_REASON);
        validate_reason(reason)?;

        let rejected = self
            .repo()
            .transition(
                id,
                RequestStatus::Pending,
                RequestStatus::Rejected,
                actor,
                AuditAction::Rejected,
                TransitionDetails::rejection(reason),
            )
            .await?;

        info!(id, username = %rejected.username, actor, reason, "Request rejected");
        let delivery = self.notifier.notify_rejection(&rejected, reason).await;

        Ok(RejectOutcome {
            request: rejected,
            delivery,
        })
    }

    /// Approve a rejected request, or recreate the missing entry of an approved one.
    ///
    /// Calling this when the entry already exists is a no-op, so repeating it
    /// never issues a second set of credentials. The one exception is an entry
    /// left by an interrupted create of this same request, which is taken over.
    pub async fn re_approve(&self, id: i64, actor: &str) -> Result<ReApproveOutcome, WorkflowError> {
        let repo = self.repo();
        let request = repo.get(id).await?;

        let (from, action) = match request.status {
            RequestStatus::Pending => {
                info!(id, "Re-approve requested for a pending request, ignoring");
                return Ok(ReApproveOutcome::NotEligible { request });
            }
            RequestStatus::Rejected => (RequestStatus::Rejected, AuditAction::ReApproved),
            RequestStatus::Approved => {
                (RequestStatus::Approved, AuditAction::RecreatedInDirectory)
            }
        };

        let password = generate_password();
        let resumed = match self.directory.exists(&request.username).await {
            Ok(false) => match self
                .directory
                .create_user(&NewDirectoryUser::from(&request), &password)
                .await
            {
                Ok(()) => Some(TransitionDetails::default()),
                Err(DirectoryError::Conflict(_)) => {
                    self.resume_interrupted(&request, actor, &password).await?
                }
                Err(e) => return Err(self.create_failure(&request, actor, e).await),
            },
            Ok(true) => self.resume_interrupted(&request, actor, &password).await?,
            Err(e) => return Err(self.directory_failure(&request, actor, e).await),
        };
        let Some(details) = resumed else {
            info!(id, username = %request.username, "Directory entry already present, nothing to do");
            return Ok(ReApproveOutcome::AlreadyPresent { request });
        };

        let updated = match repo
            .transition(
                id,
                from,
                RequestStatus::Approved,
                actor,
                action,
                details,
            )
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                self.compensate(&request.username, &e).await;
                return Err(e.into());
            }
        };

        info!(id, username = %updated.username, actor, %action, "Directory entry created");
        let delivery = self.notifier.notify_credentials(&updated, &password).await;

        Ok(match action {
            AuditAction::ReApproved => ReApproveOutcome::ReApproved {
                request: updated,
                delivery,
            },
            _ => ReApproveOutcome::Recreated {
                request: updated,
                delivery,
            },
        })
    }

    /// Get a request by ID.
    pub async fn get(&self, id: i64) -> Result<RegistrationRequest, WorkflowError> {
        Ok(self.repo().get(id).await?)
    }

    /// Pending requests, oldest first.
    pub async fn list_pending(&self) -> Result<Vec<RegistrationRequest>, WorkflowError> {
        Ok(self.repo().list_pending().await?)
    }

    /// Most recent audit entries.
    pub async fn list_audit(&self, limit: Option<i64>) -> Result<Vec<AuditLogEntry>, WorkflowError> {
        Ok(self.repo().list_audit(self.page_size(limit)).await?)
    }

    /// Audit entries of one request, oldest first.
    pub async fn request_history(&self, id: i64) -> Result<Vec<AuditLogEntry>, WorkflowError> {
        let repo = self.repo();
        repo.get(id).await?;
        Ok(repo.list_audit_for_request(id).await?)
    }

    /// Approved requests with the live presence of their directory entry.
    ///
    /// One directory probe per row. A failed probe is reported as
    /// [`DirectoryStatus::Unknown`]; nothing is changed either way.
    pub async fn list_approved_with_status(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<ApprovedEntry>, WorkflowError> {
        let approved = self.repo().list_approved(self.page_size(limit)).await?;

        let mut entries = Vec::with_capacity(approved.len());
        for request in approved {
            let directory_status = match self.directory.exists(&request.username).await {
                Ok(true) => DirectoryStatus::Active,
                Ok(false) => DirectoryStatus::Missing,
                Err(e) => {
                    warn!(username = %request.username, error = %e, "Directory probe failed");
                    DirectoryStatus::Unknown
                }
            };
            entries.push(ApprovedEntry {
                request,
                directory_status,
            });
        }
        Ok(entries)
    }

    /// Reuse the entry left by an interrupted create of this request.
    ///
    /// Resets its password and returns the audit note for the transition, or
    /// `None` when the existing entry did not come from this request.
    async fn resume_interrupted(
        &self,
        request: &RegistrationRequest,
        actor: &str,
        password: &str,
    ) -> Result<Option<TransitionDetails>, WorkflowError> {
        if !self.repo().has_interrupted_create(request.id).await? {
            return Ok(None);
        }
        if let Err(e) = self.directory.set_password(&request.username, password).await {
            return Err(self.create_failure(request, actor, e).await);
        }
        info!(id = request.id, username = %request.username, actor, "Took over directory entry from an interrupted create");
        Ok(Some(TransitionDetails::note(TAKEN_OVER_NOTE)))
    }

    /// Like [`Self::resume_interrupted`], but an entry this request did not
    /// create is refused: credentials are never issued for a foreign account.
    async fn take_over_or_refuse(
        &self,
        request: &RegistrationRequest,
        actor: &str,
        password: &str,
    ) -> Result<TransitionDetails, WorkflowError> {
        if let Some(details) = self.resume_interrupted(request, actor, password).await? {
            return Ok(details);
        }
        warn!(id = request.id, username = %request.username, actor, "Refusing approval, directory entry already exists");
        self.record_failure(request.id, actor, "directory entry already exists")
            .await;
        Err(WorkflowError::DirectoryConflict(request.username.clone()))
    }

    /// Classify a failure of a directory write that may have been applied.
    async fn create_failure(
        &self,
        request: &RegistrationRequest,
        actor: &str,
        err: DirectoryError,
    ) -> WorkflowError {
        match err {
            DirectoryError::Unavailable(msg) => {
                warn!(id = request.id, username = %request.username, error = %msg, "Directory create interrupted, the entry may exist");
                self.record_failure(request.id, actor, &format!("{INTERRUPTED_CREATE}: {msg}"))
                    .await;
                WorkflowError::DirectoryUnavailable(msg)
            }
            other => self.directory_failure(request, actor, other).await,
        }
    }

    /// Classify a directory failure, auditing the retryable ones.
    async fn directory_failure(
        &self,
        request: &RegistrationRequest,
        actor: &str,
        err: DirectoryError,
    ) -> WorkflowError {
        match err {
            DirectoryError::Unavailable(msg) => {
                warn!(id = request.id, username = %request.username, error = %msg, "Directory unavailable");
                self.record_failure(request.id, actor, &format!("directory unavailable: {msg}"))
                    .await;
                WorkflowError::DirectoryUnavailable(msg)
            }
            DirectoryError::Conflict(msg) => {
                warn!(id = request.id, username = %request.username, error = %msg, "Directory entry already exists");
                self.record_failure(request.id, actor, &format!("directory conflict: {msg}"))
                    .await;
                WorkflowError::DirectoryConflict(request.username.clone())
            }
            DirectoryError::Rejected(msg) | DirectoryError::NotFound(msg) => {
                error!(id = request.id, username = %request.username, error = %msg, "Directory rejected the entry");
                WorkflowError::DirectoryRejected(msg)
            }
        }
    }

    async fn record_failure(&self, id: i64, actor: &str, details: &str) {
        if let Err(e) = self.repo().record_failure(id, actor, details).await {
            error!(id, error = %e, "Could not record failed approval in the audit log");
        }
    }

    /// Undo a directory creation whose store transition failed.
    async fn compensate(&self, username: &str, cause: &StoreError) {
        warn!(username, error = %cause, "Store transition failed after directory creation, removing entry");
        if let Err(e) = self.directory.delete_user(username).await {
            error!(
                username,
                error = %e,
                "Could not remove directory entry; it must be deleted manually"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_submission() {
        let raw = Submission {
            username: "  Alice_01 ".to_string(),
            email: " Alice@Example.COM ".to_string(),
            first_name: " Alice ".to_string(),
            last_name: "Smith\t".to_string(),
            reason: "\n wiki \n".to_string(),
        };
        let s = normalize_submission(&raw);
        assert_eq!(s.username, "alice_01");
        assert_eq!(s.email, "alice@example.com");
        assert_eq!(s.first_name, "Alice");
        assert_eq!(s.last_name, "Smith");
        assert_eq!(s.reason, "wiki");
    }

    #[test]
    fn test_store_error_mapping() {
        assert_eq!(
            WorkflowError::from(StoreError::NotFound(3)),
            WorkflowError::NotFound(3)
        );
        assert_eq!(
            WorkflowError::from(StoreError::StaleState {
                id: 3,
                expected: RequestStatus::Pending,
                actual: RequestStatus::Rejected,
            }),
            WorkflowError::StaleState {
                id: 3,
                actual: RequestStatus::Rejected
            }
        );
        assert!(matches!(
            WorkflowError::from(StoreError::IllegalTransition {
                from: RequestStatus::Approved,
                to: RequestStatus::Rejected,
            }),
            WorkflowError::StoreInconsistent(_)
        ));
        assert!(matches!(
            WorkflowError::from(StoreError::Database("locked".to_string())),
            WorkflowError::Store(_)
        ));
    }

    #[test]
    fn test_reapprove_outcome_is_noop() {
        let request = RegistrationRequest {
            id: 1,
            username: "alice".to_string(),
            email: "alice@x.com".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Smith".to_string(),
            reason: String::new(),
            status: RequestStatus::Approved,
            ip_address: None,
            user_agent: None,
            created_at: "2026-01-01 00:00:00".to_string(),
            reviewed_at: None,
            reviewed_by: None,
            rejection_reason: None,
        };
        assert!(ReApproveOutcome::AlreadyPresent {
            request: request.clone()
        }
        .is_noop());
        assert!(!ReApproveOutcome::Recreated {
            request: request.clone(),
            delivery: Delivery::Sunk
        }
        .is_noop());
        assert_eq!(
            ReApproveOutcome::NotEligible {
                request: request.clone()
            }
            .request(),
            &request
        );
    }
}
