//! Browser-facing web server
//!
//! Serves the embedded index page, relays the collector live feed as
//! server-sent events, and serves stored image files.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::error::Result;

use super::config::WebConfig;
use super::relay::{self, UrlRewriter};

static INDEX_HTML: &str = include_str!("../../static/index.html");

struct AppState {
    collector_addr: String,
    rewriter: UrlRewriter,
}

/// Web server
pub struct WebServer {
    config: WebConfig,
}

impl WebServer {
    pub fn new(config: WebConfig) -> Self {
        Self { config }
    }

    /// Assemble the router
    pub fn router(&self) -> Router {
        let state = Arc::new(AppState {
            collector_addr: self.config.collector_addr.clone(),
            rewriter: UrlRewriter::new(&self.config.upstream_image_base, "/image"),
        });

        Router::new()
            .route("/", get(index_handler))
            .route("/feed/{feed_id}", get(feed_handler))
            .nest_service("/image", ServeDir::new(&self.config.image_dir))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "web server listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn feed_handler(
    Path(feed_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Sse<impl futures_util::Stream<Item = std::result::Result<axum::response::sse::Event, std::convert::Infallible>>>
{
    tracing::info!(feed_id = %feed_id, "feed subscriber connected");

    let events = relay::feed_events(
        state.collector_addr.clone(),
        state.rewriter.clone(),
        feed_id,
    );
    Sse::new(events).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_page_subscribes_to_feed() {
        assert!(INDEX_HTML.contains("EventSource"));
        assert!(INDEX_HTML.contains("/feed/"));
    }

    #[test]
    fn test_router_builds() {
        let server = WebServer::new(WebConfig::default());
        let _router = server.router();
    }
}
