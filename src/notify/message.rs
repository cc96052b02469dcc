//! Outgoing notification messages.

use crate::db::RegistrationRequest;

/// A plain-text mail ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

impl OutgoingMessage {
    /// Alert the administrator about a new request.
    pub fn admin_alert(admin_email: &str, request: &RegistrationRequest) -> Self {
        let reason = if request.reason.is_empty() {
            "(none given)"
        } else {
            request.reason.as_str()
        };
        Self {
            to: admin_email.to_string(),
            subject: format!("New registration request: {}", request.username),
            body: format!(
                "A new user has requested an account:\n\n\
                 Username: {}\n\
                 Name: {} {}\n\
                 Email: {}\n\
                 Reason: {}\n\n\
                 Please review and approve or reject it in the admin dashboard.\n",
                request.username, request.first_name, request.last_name, request.email, reason
            ),
        }
    }

    /// Deliver initial credentials to the requester.
    pub fn credentials(request: &RegistrationRequest, password: &str) -> Self {
        Self {
            to: request.email.clone(),
            subject: "Account approved".to_string(),
            body: format!(
                "Your account request has been approved!\n\n\
                 Username: {}\n\
                 Temporary Password: {}\n\n\
                 Please log in and change your password immediately after your first login.\n\
                 This password was generated randomly and should not be kept.\n",
                request.username, password
            ),
        }
    }

    /// Tell the requester their request was rejected.
    pub fn rejection(request: &RegistrationRequest, reason: &str) -> Self {
        Self {
            to: request.email.clone(),
            subject: "Account request rejected".to_string(),
            body: format!(
                "Your account request for username '{}' has been rejected.\n\n\
                 Reason: {}\n\n\
                 If you believe this was an error, please contact the administrator.\n",
                request.username, reason
            ),
        }
    }
}
