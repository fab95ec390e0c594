use axum::{response::IntoResponse, Json};
use http::header;
use serde_json::{json, Value};

use crate::metrics;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}
