//! Input validation for registration requests.
//!
//! Every value that can end up in the request store or in a directory entry
//! passes through these checks. The directory client runs `validate_username`
//! again on its own before building a DN, so a bug in one layer does not
//! compromise the other.

use thiserror::Error;

/// Minimum username length.
pub const MIN_USERNAME_LENGTH: usize = 2;

/// Maximum username length.
pub const MAX_USERNAME_LENGTH: usize = 64;

/// Maximum first/last name length (in characters).
pub const MAX_NAME_LENGTH: usize = 100;

/// Maximum email length.
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Maximum length of the free-text reason (in characters).
pub const MAX_REASON_LENGTH: usize = 500;

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is empty.
    #[error("{0} is required")]
    Missing(&'static str),

    /// Username is too short.
    #[error("username must be at least {MIN_USERNAME_LENGTH} characters")]
    UsernameTooShort,

    /// Username is too long.
    #[error("username must be at most {MAX_USERNAME_LENGTH} characters")]
    UsernameTooLong,

    /// Username does not start with a letter.
    #[error("username must start with a letter")]
    UsernameMustStartWithLetter,

    /// Username contains invalid characters.
    #[error("username can only contain lowercase letters, numbers, and underscores")]
    UsernameInvalidChars,

    /// Email is too long.
    #[error("email must be at most {MAX_EMAIL_LENGTH} characters")]
    EmailTooLong,

    /// Email format is invalid.
    #[error("invalid email address")]
    EmailInvalidFormat,

    /// Name is too long.
    #[error("{0} must be at most {MAX_NAME_LENGTH} characters")]
    NameTooLong(&'static str),

    /// Name contains control characters.
    #[error("{0} contains invalid characters")]
    NameInvalidChars(&'static str),

    /// Reason is too long.
    #[error("reason must be at most {MAX_REASON_LENGTH} characters")]
    ReasonTooLong,

    /// Reason contains control characters.
    #[error("reason contains invalid characters")]
    ReasonInvalidChars,
}

impl ValidationError {
    /// Name of the offending field, for field-level error reporting.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::Missing(field)
            | ValidationError::NameTooLong(field)
            | ValidationError::NameInvalidChars(field) => field,
            ValidationError::UsernameTooShort
            | ValidationError::UsernameTooLong
            | ValidationError::UsernameMustStartWithLetter
            | ValidationError::UsernameInvalidChars => "username",
            ValidationError::EmailTooLong | ValidationError::EmailInvalidFormat => "email",
            ValidationError::ReasonTooLong | ValidationError::ReasonInvalidChars => "reason",
        }
    }
}

/// Validate a username.
///
/// Requirements:
/// - Length: 2-64 characters
/// - First character: lowercase ASCII letter
/// - Remaining characters: lowercase ASCII letters, digits and underscore
///
/// Uppercase is rejected rather than folded; callers normalize first.
///
/// # Examples
///
/// ```
/// use registrar::registration::validation::validate_username;
///
/// assert!(validate_username("alice_01").is_ok());
/// assert!(validate_username("a").is_err()); // too short
/// assert!(validate_username("1alice").is_err()); // must start with a letter
/// assert!(validate_username("Alice").is_err()); // lowercase only
/// ```
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.len() < MIN_USERNAME_LENGTH {
        return Err(ValidationError::UsernameTooShort);
    }
    if username.len() > MAX_USERNAME_LENGTH {
        return Err(ValidationError::UsernameTooLong);
    }

    let mut chars = username.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        Some(c) if c.is_ascii_alphabetic() => return Err(ValidationError::UsernameInvalidChars),
        _ => return Err(ValidationError::UsernameMustStartWithLetter),
    }

    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        return Err(ValidationError::UsernameInvalidChars);
    }

    Ok(())
}

/// Validate an email address.
///
/// This is a structural check (local part, `@`, dotted domain), not a full
/// RFC 5322 parser.
///
/// # Examples
///
/// ```
/// use registrar::registration::validation::validate_email;
///
/// assert!(validate_email("user@example.com").is_ok());
/// assert!(validate_email("user@localhost").is_err());
/// ```
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::Missing("email"));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::EmailTooLong);
    }
    if email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::EmailInvalidFormat);
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::EmailInvalidFormat);
    };

    if local.is_empty() || domain.contains('@') {
        return Err(ValidationError::EmailInvalidFormat);
    }

    if !domain.contains('.') || domain.split('.').any(|label| label.is_empty()) {
        return Err(ValidationError::EmailInvalidFormat);
    }

    Ok(())
}

/// Validate a first or last name.
///
/// `field` names the field in the resulting error.
pub fn validate_name(field: &'static str, name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Missing(field));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::NameTooLong(field));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(ValidationError::NameInvalidChars(field));
    }
    Ok(())
}

/// Validate the optional free-text reason. Newlines and tabs are allowed.
pub fn validate_reason(reason: &str) -> Result<(), ValidationError> {
    if reason.chars().count() > MAX_REASON_LENGTH {
        return Err(ValidationError::ReasonTooLong);
    }
    if reason
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\r' && c != '\t')
    {
        return Err(ValidationError::ReasonInvalidChars);
    }
    Ok(())
}

/// Validate all fields of a normalized submission.
///
/// Returns the first validation error encountered.
pub fn validate_submission(
    username: &str,
    email: &str,
    first_name: &str,
    last_name: &str,
    reason: &str,
) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::Missing("username"));
    }
    validate_username(username)?;
    validate_email(email)?;
    validate_name("first_name", first_name)?;
    validate_name("last_name", last_name)?;
    validate_reason(reason)?;
    Ok(())
}
