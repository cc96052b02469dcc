//! Admin handlers for Web API.
//!
//! Every route here requires an [`AdminUser`]; the identity is recorded as
//! `performed_by` on each decision.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use crate::web::dto::{
    ApiResponse, ApprovedUserResponse, AuditEntryResponse, DecisionResponse, ListQuery,
    MeResponse, RejectRequest, RequestResponse,
};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::web::middleware::AdminUser;

/// GET /api/admin/me - Identity of the calling administrator.
#[utoipa::path(
    get,
    path = "/api/admin/me",
    tag = "admin",
    responses(
        (status = 200, description = "Calling administrator", body = MeResponse),
        (status = 401, description = "No identity asserted by the proxy"),
        (status = 403, description = "Not an administrator")
    )
)]
pub async fn admin_me(AdminUser(username): AdminUser) -> Json<ApiResponse<MeResponse>> {
    Json(ApiResponse::new(MeResponse { username }))
}

/// GET /api/admin/requests - Pending requests, oldest first.
#[utoipa::path(
    get,
    path = "/api/admin/requests",
    tag = "admin",
    responses(
        (status = 200, description = "Pending requests", body = Vec<RequestResponse>),
        (status = 401, description = "No identity asserted by the proxy"),
        (status = 403, description = "Not an administrator")
    )
)]
pub async fn list_pending(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<ApiResponse<Vec<RequestResponse>>>, ApiError> {
    let pending = state.workflow.list_pending().await?;
    Ok(Json(ApiResponse::new(
        pending.into_iter().map(RequestResponse::from).collect(),
    )))
}

/// GET /api/admin/requests/:id - One request in any state.
#[utoipa::path(
    get,
    path = "/api/admin/requests/{id}",
    tag = "admin",
    params(
        ("id" = i64, Path, description = "Request ID")
    ),
    responses(
        (status = 200, description = "The request", body = RequestResponse),
        (status = 404, description = "Request not found")
    )
)]
pub async fn get_request(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<RequestResponse>>, ApiError> {
    let request = state.workflow.get(id).await?;
    Ok(Json(ApiResponse::new(request.into())))
}

/// GET /api/admin/requests/:id/history - Audit trail of one request.
#[utoipa::path(
    get,
    path = "/api/admin/requests/{id}/history",
    tag = "admin",
    params(
        ("id" = i64, Path, description = "Request ID")
    ),
    responses(
        (status = 200, description = "Audit entries, oldest first", body = Vec<AuditEntryResponse>),
        (status = 404, description = "Request not found")
    )
)]
pub async fn request_history(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<AuditEntryResponse>>>, ApiError> {
    let entries = state.workflow.request_history(id).await?;
    Ok(Json(ApiResponse::new(
        entries.into_iter().map(AuditEntryResponse::from).collect(),
    )))
}

/// POST /api/admin/requests/:id/approve - Approve a pending request.
#[utoipa::path(
    post,
    path = "/api/admin/requests/{id}/approve",
    tag = "admin",
    params(
        ("id" = i64, Path, description = "Request ID")
    ),
    responses(
        (status = 200, description = "Approved, credentials sent", body = DecisionResponse),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request is not pending, or the directory entry exists"),
        (status = 503, description = "Directory unavailable, try again")
    )
)]
pub async fn approve_request(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<DecisionResponse>>, ApiError> {
    let outcome = state.workflow.approve(id, &admin).await?;
    Ok(Json(ApiResponse::new(DecisionResponse::new(
        "approved",
        outcome.request,
        outcome.delivery,
    ))))
}

/// POST /api/admin/requests/:id/reject - Reject a pending request.
#[utoipa::path(
    post,
    path = "/api/admin/requests/{id}/reject",
    tag = "admin",
    params(
        ("id" = i64, Path, description = "Request ID")
    ),
    request_body(content = RejectRequest, description = "Optional rejection reason"),
    responses(
        (status = 200, description = "Rejected, requester notified", body = DecisionResponse),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request is not pending"),
        (status = 422, description = "Invalid reason")
    )
)]
pub async fn reject_request(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    body: Option<Json<RejectRequest>>,
) -> Result<Json<ApiResponse<DecisionResponse>>, ApiError> {
    let reason = body.and_then(|Json(req)| req.reason);
    let outcome = state
        .workflow
        .reject(id, &admin, reason.as_deref())
        .await?;
    Ok(Json(ApiResponse::new(DecisionResponse::new(
        "rejected",
        outcome.request,
        outcome.delivery,
    ))))
}

/// POST /api/admin/requests/:id/reapprove - Approve a rejected request or
/// recreate a missing directory entry.
#[utoipa::path(
    post,
    path = "/api/admin/requests/{id}/reapprove",
    tag = "admin",
    params(
        ("id" = i64, Path, description = "Request ID")
    ),
    responses(
        (status = 200, description = "Outcome of the re-approval", body = DecisionResponse),
        (status = 404, description = "Request not found"),
        (status = 503, description = "Directory unavailable, try again")
    )
)]
pub async fn reapprove_request(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<DecisionResponse>>, ApiError> {
    let outcome = state.workflow.re_approve(id, &admin).await?;
    Ok(Json(ApiResponse::new(DecisionResponse::from(outcome))))
}

/// GET /api/admin/approved - Approved users with their directory status.
#[utoipa::path(
    get,
    path = "/api/admin/approved",
    tag = "admin",
    params(ListQuery),
    responses(
        (status = 200, description = "Approved users, most recent first", body = Vec<ApprovedUserResponse>)
    )
)]
pub async fn list_approved(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<ApprovedUserResponse>>>, ApiError> {
    let entries = state.workflow.list_approved_with_status(query.limit).await?;
    Ok(Json(ApiResponse::new(
        entries.into_iter().map(ApprovedUserResponse::from).collect(),
    )))
}

/// GET /api/admin/audit - Most recent audit entries.
#[utoipa::path(
    get,
    path = "/api/admin/audit",
    tag = "admin",
    params(ListQuery),
    responses(
        (status = 200, description = "Audit entries, newest first", body = Vec<AuditEntryResponse>)
    )
)]
pub async fn list_audit(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<AuditEntryResponse>>>, ApiError> {
    let entries = state.workflow.list_audit(query.limit).await?;
    Ok(Json(ApiResponse::new(
        entries.into_iter().map(AuditEntryResponse::from).collect(),
    )))
}
