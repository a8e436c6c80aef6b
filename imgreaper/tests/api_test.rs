use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use imgreaper::api::models::HealthResponse;
use imgreaper::api::routes::service_router;
use imgreaper::metrics::ReaperMetrics;

// Serve the router on a random local port
async fn start_test_server(registry: prometheus::Registry) -> (JoinHandle<()>, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let app = service_router(registry);
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting
    sleep(Duration::from_millis(100)).await;

    (handle, port)
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let registry = prometheus::Registry::new();
    let metrics = ReaperMetrics::new(&registry).unwrap();
    metrics.add_deleted("production", "web", true);
    metrics.add_pass("completed");

    let (server, port) = start_test_server(registry).await;

    let response = reqwest::get(format!("http://127.0.0.1:{}/metrics", port))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = response.text().await.unwrap();
    assert!(body.contains(
        r#"imgreaper_images_deleted_total{cluster_type="production",repository="web",tagged="true"} 1"#
    ));
    assert!(body.contains(r#"imgreaper_passes_total{outcome="completed"} 1"#));

    server.abort();
}

#[tokio::test]
async fn test_health_endpoint() {
    let (server, port) = start_test_server(prometheus::Registry::new()).await;

    let response = reqwest::get(format!("http://127.0.0.1:{}/healthz", port))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let health: HealthResponse = response.json().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));

    server.abort();
}

#[tokio::test]
async fn test_unknown_path() {
    let (server, port) = start_test_server(prometheus::Registry::new()).await;

    let response = reqwest::get(format!("http://127.0.0.1:{}/v2/", port))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    server.abort();
}
