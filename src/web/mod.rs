//! HTTP control surface for the bridge.
//!
//! ## Endpoints
//!
//! - `GET /health` - liveness and basic counters
//! - `GET /printers` - probe and list registered printers
//! - `POST /printers` - register a printer
//! - `DELETE /printers/{id}` - remove a printer
//! - `POST /printers/{id}/test` - print a diagnostic label
//! - `POST /print` - render and print a badge
//! - `POST /print-raw` - print caller-supplied ZPL
//! - `GET /jobs/{id}` - job status

mod handlers;

use anyhow::Context;
use axum::{
    Router,
    http::{HeaderValue, Method, header::CONTENT_TYPE},
    routing::{delete, get, post},
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::context::AppContext;

/// Build the API router. CORS applies to every route, including the
/// fallbacks.
pub fn router(ctx: AppContext) -> Router {
    let cors = cors_layer(&ctx.config.allowed_origins);

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/printers",
            get(handlers::list_printers).post(handlers::register_printer),
        )
        .route("/printers/{id}", delete(handlers::remove_printer))
        .route("/printers/{id}/test", post(handlers::test_print))
        .route("/print", post(handlers::print_badge))
        .route("/print-raw", post(handlers::print_raw))
        .route("/jobs/{id}", get(handlers::job_status))
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .layer(cors)
        .with_state(ctx)
}

/// `*` allows any origin; otherwise only the listed origins are echoed back.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins = allowed_origins.iter().filter_map(|origin| {
            HeaderValue::from_str(origin)
                .inspect_err(|_| tracing::warn!(origin, "Ignoring invalid CORS origin"))
                .ok()
        });
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60))
}

/// HTTP server for the bridge API.
pub struct BridgeServer {
    bind_addr: SocketAddr,
    ctx: AppContext,
    shutdown_tx: broadcast::Sender<()>,
}

impl BridgeServer {
    pub fn new(ctx: AppContext, bind_addr: SocketAddr) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            bind_addr,
            ctx,
            shutdown_tx,
        }
    }

    /// Bind and serve. Runs until shutdown() is called.
    pub async fn start(&self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.bind_addr))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener. Runs until shutdown() is called.
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        let app = router(self.ctx.clone());
        tracing::info!(addr = %listener.local_addr()?, "Print bridge listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        tracing::info!("Print bridge stopped");
        Ok(())
    }

    /// Signal the server to shut down gracefully.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
