//! HTTP and WebSocket surface.
//!
//! Producers drive the viewer through the JSON API under `/api`, browser views
//! connect to `/ws` as observers. Only compiled with the `http-server` feature.

#[cfg(feature = "http-server")]
mod error;
#[cfg(feature = "http-server")]
mod handlers;
#[cfg(feature = "http-server")]
mod ws;

#[cfg(feature = "http-server")]
pub use error::{ApiError, ErrorResponse};
#[cfg(feature = "http-server")]
pub use handlers::{CreateTabResponse, ListTabsResponse, TabSummary};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::viewer::Viewer;

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub viewer: Arc<Viewer>,
    /// Parent of every observer connection's cancellation token.
    pub shutdown: CancellationToken,
}

/// Build the router.
#[cfg(feature = "http-server")]
pub fn router(state: AppState) -> axum::Router {
    use axum::routing::{get, post};
    use tower_http::cors::CorsLayer;

    axum::Router::new()
        .route(
            "/api/tabs",
            post(handlers::create_tab)
                .get(handlers::list_tabs)
                .delete(handlers::clear_tabs),
        )
        .route("/api/tabs/reopen", post(handlers::reopen_tab))
        .route(
            "/api/tabs/{id}",
            get(handlers::get_tab).delete(handlers::delete_tab),
        )
        .route("/api/tabs/{id}/activate", post(handlers::activate_tab))
        .route("/api/status", get(handlers::status))
        .route("/health", get(handlers::health_check))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve on `bind` until `shutdown` is cancelled.
#[cfg(feature = "http-server")]
pub async fn serve(
    viewer: Arc<Viewer>,
    bind: &str,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    serve_on(listener, viewer, shutdown).await
}

/// Serve on an already bound listener until `shutdown` is cancelled.
#[cfg(feature = "http-server")]
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    viewer: Arc<Viewer>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    crate::log_event!("http", "listening", "http://{addr}");

    let app = router(AppState {
        viewer,
        shutdown: shutdown.clone(),
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    crate::log_event!("http", "stopped");
    Ok(())
}

#[cfg(not(feature = "http-server"))]
pub async fn serve(
    _viewer: Arc<Viewer>,
    _bind: &str,
    _shutdown: CancellationToken,
) -> anyhow::Result<()> {
    anyhow::bail!("HTTP server support is not compiled in; rebuild with --features http-server")
}
