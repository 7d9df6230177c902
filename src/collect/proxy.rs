//! Image proxy
//!
//! A small HTTP server exposing the collector's image directory, so
//! the URLs embedded in announcements are actually dereferenceable.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::error::Result;

/// Serves `GET /image/...` from the image directory
pub struct ImageProxy {
    bind_addr: SocketAddr,
    image_dir: PathBuf,
}

impl ImageProxy {
    pub fn new(bind_addr: SocketAddr, image_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr,
            image_dir: image_dir.into(),
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .nest_service("/image", ServeDir::new(&self.image_dir))
            .layer(TraceLayer::new_for_http())
    }

    /// Run until the shutdown future resolves
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, dir = %self.image_dir.display(), "image proxy listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}
