//! Forward-auth identity.
//!
//! The admin surface sits behind a reverse proxy that authenticates the
//! operator and passes the identity in a header (`Remote-User` by default).
//! The proxy strips any client-supplied copy of that header, so its value is
//! trusted as-is.

use axum::{
    async_trait,
    body::Body,
    extract::FromRequestParts,
    http::{request::Parts, HeaderName, Request},
    middleware::Next,
    response::Response,
};
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::WebConfig;
use crate::web::error::ApiError;
use crate::{RegistrarError, Result};

/// Longest identity accepted from the proxy.
pub const MAX_IDENTITY_LENGTH: usize = 255;

/// Forward-auth settings, injected into request extensions.
#[derive(Debug, Clone)]
pub struct ForwardAuthState {
    header: HeaderName,
    admin_users: HashSet<String>,
}

impl ForwardAuthState {
    /// Create a new state.
    ///
    /// An empty allow-list admits every identity the proxy asserts.
    pub fn new(header: &str, admin_users: &[String]) -> Result<Self> {
        let header = HeaderName::try_from(header).map_err(|e| {
            RegistrarError::Config(format!("invalid remote user header '{header}': {e}"))
        })?;
        Ok(Self {
            header,
            admin_users: admin_users
                .iter()
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect(),
        })
    }

    /// Create the state from the `[web]` section.
    pub fn from_config(config: &WebConfig) -> Result<Self> {
        Self::new(&config.remote_user_header, &config.admin_users)
    }

    /// Name of the identity header.
    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    /// Whether `identity` may use the admin surface.
    pub fn is_allowed(&self, identity: &str) -> bool {
        self.admin_users.is_empty() || self.admin_users.contains(identity)
    }

    /// Resolve the identity carried by `parts`.
    fn authenticate(&self, parts: &Parts) -> std::result::Result<String, ApiError> {
        let identity = parts
            .headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ApiError::unauthorized("Missing authenticated user"))?;

        if identity.len() > MAX_IDENTITY_LENGTH || identity.chars().any(char::is_control) {
            return Err(ApiError::unauthorized("Invalid authenticated user"));
        }

        if !self.is_allowed(identity) {
            tracing::warn!(user = %identity, "Admin access denied, user not on allow-list");
            return Err(ApiError::forbidden("Not an administrator"));
        }

        Ok(identity.to_string())
    }
}

/// Extractor for the calling administrator.
///
/// Fails with 401 when the proxy did not assert an identity and 403 when the
/// identity is not on the allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        let auth = parts
            .extensions
            .get::<Arc<ForwardAuthState>>()
            .ok_or_else(|| ApiError::internal("Forward auth not configured"))?;

        auth.authenticate(parts).map(AdminUser)
    }
}

/// Middleware function to inject forward-auth state into request extensions.
pub async fn forward_auth(
    auth_state: Arc<ForwardAuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    request.extensions_mut().insert(auth_state);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::StatusCode,
        middleware,
        response::IntoResponse,
        routing::get,
        Router,
    };
    use tower::util::ServiceExt;

    async fn whoami(admin: AdminUser) -> impl IntoResponse {
        admin.0
    }

    fn app(admin_users: &[String]) -> Router {
        let state = Arc::new(ForwardAuthState::new("Remote-User", admin_users).unwrap());
        Router::new()
            .route("/", get(whoami))
            .layer(middleware::from_fn(move |req, next| {
                let state = state.clone();
                forward_auth(state, req, next)
            }))
    }

    async fn call(app: Router, user: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/");
        if let Some(user) = user {
            builder = builder.header("Remote-User", user);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthorized() {
        let (status, _) = call(app(&[]), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(app(&[]), Some("   ")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_any_identity_without_allow_list() {
        let (status, body) = call(app(&[]), Some("carol")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "carol");
    }

    #[tokio::test]
    async fn test_allow_list_enforced() {
        let admins = vec!["admin".to_string()];
        let (status, body) = call(app(&admins), Some("admin")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "admin");

        let (status, _) = call(app(&admins), Some("mallory")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_overlong_identity_rejected() {
        let long = "a".repeat(MAX_IDENTITY_LENGTH + 1);
        let (status, _) = call(app(&[]), Some(&long)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_state_is_internal_error() {
        let app = Router::new().route("/", get(whoami));
        let (status, _) = call(app, Some("admin")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_invalid_header_name() {
        assert!(ForwardAuthState::new("Remote User", &[]).is_err());
        let state = ForwardAuthState::new("X-Forwarded-User", &[" ops ".to_string()]).unwrap();
        assert_eq!(state.header().as_str(), "x-forwarded-user");
        assert!(state.is_allowed("ops"));
        assert!(!state.is_allowed("dev"));
    }
}
