//! Middleware for Web API.

pub mod auth;
pub mod cors;
pub mod rate_limit;
pub mod security;

pub use auth::{forward_auth, AdminUser, ForwardAuthState};
pub use cors::create_cors_layer;
pub use rate_limit::{client_ip, register_rate_limit, ClientAddr, RateLimitState};
pub use security::security_headers;
