//! Registration request entity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Waiting for an admin decision.
    Pending,
    /// Approved; a directory entry was created at least once.
    Approved,
    /// Rejected by an admin.
    Rejected,
}

impl RequestStatus {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    /// Whether `self → to` is a legal transition.
    ///
    /// `approved → approved` is the recreation of a directory entry that went
    /// missing; `rejected → approved` is a re-approval.
    pub fn can_transition_to(&self, to: RequestStatus) -> bool {
        matches!(
            (self, to),
            (RequestStatus::Pending, RequestStatus::Approved)
                | (RequestStatus::Pending, RequestStatus::Rejected)
                | (RequestStatus::Rejected, RequestStatus::Approved)
                | (RequestStatus::Approved, RequestStatus::Approved)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            _ => Err(format!("unknown request status: {s}")),
        }
    }
}

/// Registration request entity.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RegistrationRequest {
    /// Request ID.
    pub id: i64,
    /// Requested username (lowercase).
    pub username: String,
    /// Contact email (lowercase).
    pub email: String,
    /// Given name.
    pub first_name: String,
    /// Surname.
    pub last_name: String,
    /// Free-text reason supplied by the requester.
    pub reason: String,
    /// Current status.
    pub status: RequestStatus,
    /// Client IP at submission.
    pub ip_address: Option<String>,
    /// Client user agent at submission.
    pub user_agent: Option<String>,
    /// Submission timestamp.
    pub created_at: String,
    /// Timestamp of the last admin decision.
    pub reviewed_at: Option<String>,
    /// Admin who made the last decision.
    pub reviewed_by: Option<String>,
    /// Reason given on rejection. Cleared on re-approval.
    pub rejection_reason: Option<String>,
}

/// Data for a new registration request.
///
/// Values are expected to be normalized and validated already.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewRequest {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub reason: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl NewRequest {
    /// Create a new request with the required fields.
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
            ..Default::default()
        }
    }

    /// Set the free-text reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Set the client provenance.
    pub fn with_client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}
