//! Request DTOs for Web API.

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::validation::{no_control_chars, required_text};
use crate::registration::Submission;

/// Self-service registration request.
///
/// Only shape is checked here; the workflow applies the full rules after
/// normalizing the values.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    /// Desired username (lowercase letters, digits, underscore).
    #[validate(custom(function = "required_text"))]
    pub username: String,
    /// Contact email; credentials are sent here.
    #[validate(custom(function = "required_text"))]
    pub email: String,
    /// Given name.
    #[validate(custom(function = "required_text"))]
    pub first_name: String,
    /// Surname.
    #[validate(custom(function = "required_text"))]
    pub last_name: String,
    /// Why the account is needed.
    #[serde(default)]
    #[validate(custom(function = "no_control_chars"))]
    pub reason: Option<String>,
}

impl From<RegisterRequest> for Submission {
    fn from(req: RegisterRequest) -> Self {
        Submission {
            username: req.username,
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
            reason: req.reason.unwrap_or_default(),
        }
    }
}

/// Body of a rejection.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RejectRequest {
    /// Reason shown to the requester. Defaults to "No reason provided".
    #[serde(default)]
    pub reason: Option<String>,
}

/// Page size for listings.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListQuery {
    /// Number of entries (1-100).
    pub limit: Option<i64>,
}
