//! Router configuration for Web API.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::dto;
use super::handlers::{self, admin, AppState};
use super::middleware::{
    create_cors_layer, forward_auth, register_rate_limit, security_headers, ForwardAuthState,
    RateLimitState,
};

/// OpenAPI document of the HTTP surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Registrar API",
        description = "Self-service account registration with administrator approval"
    ),
    paths(
        handlers::health,
        handlers::register::register,
        admin::admin_me,
        admin::list_pending,
        admin::get_request,
        admin::request_history,
        admin::approve_request,
        admin::reject_request,
        admin::reapprove_request,
        admin::list_approved,
        admin::list_audit,
    ),
    components(schemas(
        dto::HealthResponse,
        dto::RegisterRequest,
        dto::RegisterResponse,
        dto::RejectRequest,
        dto::RequestResponse,
        dto::ApprovedUserResponse,
        dto::AuditEntryResponse,
        dto::DecisionResponse,
        dto::MeResponse,
    )),
    tags(
        (name = "health", description = "Liveness"),
        (name = "registration", description = "Public self-service registration"),
        (name = "admin", description = "Review of registration requests, behind forward-auth")
    )
)]
pub struct ApiDoc;

/// Create the main API router.
pub fn create_router(
    app_state: Arc<AppState>,
    auth_state: Arc<ForwardAuthState>,
    rate_limit: Arc<RateLimitState>,
    cors_origins: &[String],
) -> Router {
    // Public submission, rate limited per client
    let register_routes = Router::new()
        .route("/register", post(handlers::register))
        .layer(middleware::from_fn(move |req, next| {
            let state = rate_limit.clone();
            register_rate_limit(state, req, next)
        }));

    let admin_routes = Router::new()
        .route("/me", get(admin::admin_me))
        .route("/requests", get(admin::list_pending))
        .route("/requests/:id", get(admin::get_request))
        .route("/requests/:id/history", get(admin::request_history))
        .route("/requests/:id/approve", post(admin::approve_request))
        .route("/requests/:id/reject", post(admin::reject_request))
        .route("/requests/:id/reapprove", post(admin::reapprove_request))
        .route("/approved", get(admin::list_approved))
        .route("/audit", get(admin::list_audit))
        .layer(middleware::from_fn(move |req, next| {
            let state = auth_state.clone();
            forward_auth(state, req, next)
        }));

    let api_routes = Router::new()
        .merge(register_routes)
        .nest("/admin", admin_routes);

    Router::new()
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins))
                .layer(middleware::from_fn(security_headers)),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(handlers::health))
}

/// Create the Swagger UI router serving the OpenAPI document.
pub fn create_swagger_router() -> Router {
    Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_routes() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        assert!(paths.contains_key("/health"));
        assert!(paths.contains_key("/api/register"));
        assert!(paths.contains_key("/api/admin/requests/{id}/reapprove"));
        assert!(paths.contains_key("/api/admin/audit"));
    }

    #[tokio::test]
    async fn test_health_router() {
        let server = axum_test::TestServer::new(create_health_router()).unwrap();
        let response = server.get("/health").await;
        response.assert_status_ok();
        response.assert_json(&serde_json::json!({"status": "healthy"}));
    }
}
