//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request telemetry, panic capture, timeout, tracing)
//! - Bind server to listener
//! - Stop accepting on the shutdown broadcast and drain in-flight requests

use axum::{middleware, routing::get, Router};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::TimeoutConfig;
use crate::http::error::panic_response;
use crate::http::handlers;
use crate::http::middleware::request_telemetry;
use crate::telemetry::provider::Tracer;
use crate::telemetry::registry::InstrumentRegistry;

/// Instrumentation scope of server spans.
pub const TRACER_SCOPE: &str = "telemetry_demo::http";

/// Application state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<InstrumentRegistry>,
    pub tracer: Tracer,
}

/// HTTP server for the demo application.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState, timeouts: &TimeoutConfig) -> Self {
        Self {
            router: Self::build_router(state, Duration::from_secs(timeouts.request_secs)),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            .route("/items", get(handlers::list_items))
            .route("/items/{item_id}", get(handlers::get_item))
            .route("/crash", get(handlers::crash))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(middleware::from_fn_with_state(state.clone(), request_telemetry))
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` resolves, then finish in-flight requests.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
