//! HTTP surface.
//!
//! - `POST /api/register`: public submission, rate limited per client
//! - `/api/admin/*`: review of requests, behind a forward-auth proxy
//! - `/health`, `/swagger-ui`, `/api-docs/openapi.json`

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::{ApiError, ErrorCode};
pub use handlers::AppState;
pub use router::{create_health_router, create_router, create_swagger_router, ApiDoc};
pub use server::WebServer;
