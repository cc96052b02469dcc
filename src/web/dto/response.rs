//! Response DTOs for Web API.

use serde::Serialize;
use utoipa::ToSchema;

use crate::datetime::to_rfc3339;
use crate::db::{AuditLogEntry, RegistrationRequest};
use crate::notify::Delivery;
use crate::registration::{ApprovedEntry, DirectoryStatus, ReApproveOutcome};

// ============================================================================
// Generic Response Wrappers
// ============================================================================

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new API response.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Always "healthy" when the process is serving.
    pub status: String,
}

// ============================================================================
// Registration
// ============================================================================

/// Response to a public submission.
#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    /// Request ID.
    pub id: i64,
    /// Normalized username.
    pub username: String,
    /// Always "pending".
    pub status: String,
    /// Human-readable confirmation.
    pub message: String,
}

impl From<&RegistrationRequest> for RegisterResponse {
    fn from(request: &RegistrationRequest) -> Self {
        Self {
            id: request.id,
            username: request.username.clone(),
            status: request.status.to_string(),
            message: "Your request has been submitted and is awaiting review".to_string(),
        }
    }
}

// ============================================================================
// Admin
// ============================================================================

/// A registration request as seen by an administrator.
#[derive(Debug, Serialize, ToSchema)]
pub struct RequestResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub reason: String,
    /// pending, approved or rejected.
    pub status: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Submission time (RFC 3339).
    pub created_at: String,
    /// Decision time (RFC 3339).
    pub reviewed_at: Option<String>,
    /// Administrator who made the last decision.
    pub reviewed_by: Option<String>,
    pub rejection_reason: Option<String>,
}

impl From<RegistrationRequest> for RequestResponse {
    fn from(r: RegistrationRequest) -> Self {
        Self {
            id: r.id,
            username: r.username,
            email: r.email,
            first_name: r.first_name,
            last_name: r.last_name,
            reason: r.reason,
            status: r.status.to_string(),
            ip_address: r.ip_address,
            user_agent: r.user_agent,
            created_at: to_rfc3339(&r.created_at),
            reviewed_at: r.reviewed_at.as_deref().map(to_rfc3339),
            reviewed_by: r.reviewed_by,
            rejection_reason: r.rejection_reason,
        }
    }
}

/// An approved user with the live state of their directory entry.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApprovedUserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub reviewed_at: Option<String>,
    pub reviewed_by: Option<String>,
    /// active, missing or unknown.
    #[schema(value_type = String)]
    pub directory_status: DirectoryStatus,
}

impl From<ApprovedEntry> for ApprovedUserResponse {
    fn from(entry: ApprovedEntry) -> Self {
        let r = entry.request;
        Self {
            id: r.id,
            username: r.username,
            email: r.email,
            first_name: r.first_name,
            last_name: r.last_name,
            reviewed_at: r.reviewed_at.as_deref().map(to_rfc3339),
            reviewed_by: r.reviewed_by,
            directory_status: entry.directory_status,
        }
    }
}

/// One audit log entry.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuditEntryResponse {
    pub id: i64,
    pub request_id: i64,
    /// CREATED, APPROVED, REJECTED, APPROVE_FAILED, RE_APPROVED or RECREATED_IN_DIRECTORY.
    pub action: String,
    pub username: String,
    pub email: String,
    pub performed_by: String,
    pub rejection_reason: Option<String>,
    pub details: Option<String>,
    /// When the entry was written (RFC 3339).
    pub timestamp: String,
}

impl From<AuditLogEntry> for AuditEntryResponse {
    fn from(e: AuditLogEntry) -> Self {
        Self {
            id: e.id,
            request_id: e.request_id,
            action: e.action.to_string(),
            username: e.username,
            email: e.email,
            performed_by: e.performed_by,
            rejection_reason: e.rejection_reason,
            details: e.details,
            timestamp: to_rfc3339(&e.timestamp),
        }
    }
}

/// Result of an approve, reject or re-approve call.
#[derive(Debug, Serialize, ToSchema)]
pub struct DecisionResponse {
    /// The request after the call.
    pub request: RequestResponse,
    /// What happened: approved, rejected, re_approved, recreated,
    /// already_present or not_eligible.
    pub outcome: String,
    /// How the user was notified (`sent`, `sunk`, `failed`, `queued`). Absent when nothing was sent.
    pub notification: Option<String>,
}

impl DecisionResponse {
    /// Build a response for a decision that notified the user.
    pub fn new(outcome: &str, request: RegistrationRequest, delivery: Delivery) -> Self {
        Self {
            request: request.into(),
            outcome: outcome.to_string(),
            notification: Some(delivery_name(delivery).to_string()),
        }
    }
}

impl From<ReApproveOutcome> for DecisionResponse {
    fn from(outcome: ReApproveOutcome) -> Self {
        match outcome {
            ReApproveOutcome::ReApproved { request, delivery } => {
                Self::new("re_approved", request, delivery)
            }
            ReApproveOutcome::Recreated { request, delivery } => {
                Self::new("recreated", request, delivery)
            }
            ReApproveOutcome::AlreadyPresent { request } => Self {
                request: request.into(),
                outcome: "already_present".to_string(),
                notification: None,
            },
            ReApproveOutcome::NotEligible { request } => Self {
                request: request.into(),
                outcome: "not_eligible".to_string(),
                notification: None,
            },
        }
    }
}

fn delivery_name(delivery: Delivery) -> &'static str {
    match delivery {
        Delivery::Sent => "sent",
        Delivery::Sunk => "sunk",
        Delivery::Failed => "failed",
        Delivery::Queued => "queued",
    }
}

/// Identity of the calling administrator.
#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub username: String,
}
