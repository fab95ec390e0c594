mod routes;

use std::future::Future;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{config::Config, Result};

pub struct Server {
    addr: String,
}

impl Server {
    pub fn new(config: &Config) -> Self {
        Self {
            addr: config.server.addr.clone(),
        }
    }

    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/health", get(routes::health))
            .route("/metrics", get(routes::metrics))
            .layer(TraceLayer::new_for_http())
    }

    /// Serves until `shutdown` resolves.
    pub async fn start<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!("Serving health and metrics on {}", self.addr);
        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}
