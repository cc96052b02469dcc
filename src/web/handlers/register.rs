//! Public registration handler.

use axum::{
    extract::{ConnectInfo, State},
    Extension,
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    Json,
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::registration::{ClientInfo, Submission};
use crate::web::dto::{ApiResponse, RegisterRequest, RegisterResponse, ValidatedJson};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::web::middleware::{client_ip, ClientAddr};

/// Longest User-Agent kept with a request.
const MAX_USER_AGENT_LENGTH: usize = 512;

/// POST /api/register - Submit a registration request.
#[utoipa::path(
    post,
    path = "/api/register",
    tag = "registration",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Request accepted for review", body = RegisterResponse),
        (status = 409, description = "Username or email already taken or pending"),
        (status = 422, description = "Validation error"),
        (status = 429, description = "Too many requests")
    )
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    client_addr: Option<Extension<ClientAddr>>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RegisterResponse>>), ApiError> {
    // The rate limiter already resolved the address; without it only the peer counts.
    let ip_address = match client_addr {
        Some(Extension(ClientAddr(ip))) => ip,
        None => client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr), false),
    };
    let client = ClientInfo {
        ip_address,
        user_agent: user_agent(&headers),
    };

    let request = state
        .workflow
        .submit(&Submission::from(req), client)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(RegisterResponse::from(&request))),
    ))
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    let ua = headers.get(USER_AGENT)?.to_str().ok()?.trim();
    if ua.is_empty() {
        return None;
    }
    Some(ua.chars().take(MAX_USER_AGENT_LENGTH).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_truncated() {
        let mut headers = HeaderMap::new();
        assert_eq!(user_agent(&headers), None);

        headers.insert(USER_AGENT, "curl/8.5.0".parse().unwrap());
        assert_eq!(user_agent(&headers).as_deref(), Some("curl/8.5.0"));

        let long = "x".repeat(MAX_USER_AGENT_LENGTH * 2);
        headers.insert(USER_AGENT, long.parse().unwrap());
        assert_eq!(user_agent(&headers).unwrap().len(), MAX_USER_AGENT_LENGTH);
    }
}
