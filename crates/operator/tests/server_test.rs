use axum::http::StatusCode;
use gitops_operator::{config::Config, metrics, server::Server};

#[tokio::test]
async fn test_health_endpoint() {
    let server = Server::new(&Config::default());
    let client = axum_test::TestServer::new(server.build_router()).unwrap();

    let response = client.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    metrics::COMPLETION_EVENTS_TOTAL
        .with_label_values(&["JobFailed"])
        .inc();

    let server = Server::new(&Config::default());
    let client = axum_test::TestServer::new(server.build_router()).unwrap();

    let response = client.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.text();
    assert!(body.contains("gitops_job_completion_events_total{reason=\"JobFailed\"}"));
}

#[tokio::test]
async fn test_unknown_route() {
    let server = Server::new(&Config::default());
    let client = axum_test::TestServer::new(server.build_router()).unwrap();

    let response = client.get("/alerts").expect_failure().await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}
