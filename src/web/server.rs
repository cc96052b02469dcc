//! Web server for the registration service.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use crate::config::WebConfig;
use crate::registration::Workflow;
use crate::{RegistrarError, Result};

use super::handlers::AppState;
use super::middleware::{ForwardAuthState, RateLimitState};
use super::router::{create_health_router, create_router, create_swagger_router};

/// Web server for the API.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    app_state: Arc<AppState>,
    /// Forward-auth settings.
    auth_state: Arc<ForwardAuthState>,
    /// Submission rate limiter.
    rate_limit: Arc<RateLimitState>,
    /// Web configuration.
    web_config: WebConfig,
}

impl WebServer {
    /// Create a new web server.
    pub fn new(config: &WebConfig, workflow: Arc<Workflow>) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| {
                RegistrarError::Config(format!(
                    "invalid web address {}:{}: {e}",
                    config.host, config.port
                ))
            })?;

        Ok(Self {
            addr,
            app_state: Arc::new(AppState::new(workflow)),
            auth_state: Arc::new(ForwardAuthState::from_config(config)?),
            rate_limit: Arc::new(RateLimitState::from_config(config)),
            web_config: config.clone(),
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Build the complete application router.
    pub fn router(&self) -> Router {
        create_router(
            self.app_state.clone(),
            self.auth_state.clone(),
            self.rate_limit.clone(),
            &self.web_config.cors_origins,
        )
        .merge(create_health_router())
        .merge(create_swagger_router())
    }

    async fn bind(self) -> Result<(TcpListener, Router, SocketAddr)> {
        let router = self.router();
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        self.rate_limit.clone().start_cleanup_task();

        tracing::info!(
            header = %self.auth_state.header(),
            rate_limit = self.rate_limit.requests_per_minute(),
            trust_proxy_headers = self.rate_limit.trusts_proxy_headers(),
            "Web server listening on http://{}",
            local_addr
        );
        Ok((listener, router, local_addr))
    }

    /// Run the web server.
    pub async fn run(self) -> Result<()> {
        let (listener, router, _) = self.bind().await?;
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        Ok(())
    }

    /// Run the server in the background and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> Result<SocketAddr> {
        let (listener, router, local_addr) = self.bind().await?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}
