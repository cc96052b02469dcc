//! Audit log entity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Created,
    Approved,
    Rejected,
    ApproveFailed,
    ReApproved,
    RecreatedInDirectory,
}

impl AuditAction {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "CREATED",
            AuditAction::Approved => "APPROVED",
            AuditAction::Rejected => "REJECTED",
            AuditAction::ApproveFailed => "APPROVE_FAILED",
            AuditAction::ReApproved => "RE_APPROVED",
            AuditAction::RecreatedInDirectory => "RECREATED_IN_DIRECTORY",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the audit log.
///
/// Request fields are copied at write time so the trail stays readable even
/// after the request itself changes.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AuditLogEntry {
    pub id: i64,
    pub request_id: i64,
    pub action: AuditAction,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub reason: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_created_at: String,
    /// Admin identity, or `system`.
    pub performed_by: String,
    pub rejection_reason: Option<String>,
    pub details: Option<String>,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_strings() {
        assert_eq!(AuditAction::Created.as_str(), "CREATED");
        assert_eq!(AuditAction::ApproveFailed.as_str(), "APPROVE_FAILED");
        assert_eq!(AuditAction::ReApproved.as_str(), "RE_APPROVED");
        assert_eq!(
            AuditAction::RecreatedInDirectory.to_string(),
            "RECREATED_IN_DIRECTORY"
        );
    }

    #[test]
    fn test_action_serde_matches_as_str() {
        let json = serde_json::to_string(&AuditAction::RecreatedInDirectory).unwrap();
        assert_eq!(json, "\"RECREATED_IN_DIRECTORY\"");
        let json = serde_json::to_string(&AuditAction::ReApproved).unwrap();
        assert_eq!(json, "\"RE_APPROVED\"");
    }
}
