//! HTTP API for Assay.
//!
//! Exposes analysis management, job triggering and polling, and streamed
//! result downloads over REST.
//!
//! # Example
//!
//! ```ignore
//! use assay_server::{AppState, Server, ServerConfig};
//!
//! let config = ServerConfig::new().with_bind_address("127.0.0.1:3000".parse()?);
//! let server = Server::from_state(AppState::new(runner, config));
//! server.run(shutdown_signal()).await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::{ErrorResponse, Result, ServerError};
pub use middleware::request_logging_middleware;
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// The Assay HTTP server.
pub struct Server {
    /// Application state.
    state: AppState,
}

impl Server {
    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .merge(routes::health_routes())
            .nest("/api/v1", self.api_routes())
            .layer(axum::middleware::from_fn_with_state(
                self.state.clone(),
                middleware::request_logging_middleware,
            ))
            .layer(DefaultBodyLimit::max(self.state.config.max_body_size))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone());

        if let Some(cors) = cors_layer(&self.state.config.cors_origins) {
            router = router.layer(cors);
        }
        router
    }

    /// API routes (v1).
    fn api_routes(&self) -> Router<AppState> {
        use axum::routing::{get, post};

        Router::new()
            .route(
                "/analyses",
                post(routes::create_analysis_handler).get(routes::list_analyses_handler),
            )
            .route(
                "/analyses/{id}",
                get(routes::get_analysis_handler)
                    .put(routes::update_analysis_handler)
                    .delete(routes::delete_analysis_handler),
            )
            .route("/analyses/{id}/run", post(routes::run_analysis_handler))
            .route("/jobs", get(routes::list_jobs_handler))
            .route("/jobs/{id}", get(routes::get_job_handler))
            .route("/jobs/{id}/download", get(routes::download_handler))
    }

    /// Run until `shutdown` resolves, then drain in-flight requests.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.run_on(addr, shutdown).await
    }

    /// Run on a specific address (useful for testing).
    pub async fn run_on(
        self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let router = self.router();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind {addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        info!(addr = %local_addr, "Starting server");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {e}")))?;

        info!("Server stopped");
        Ok(())
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return Some(layer.allow_origin(Any));
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    Some(layer.allow_origin(allowed))
}
