use axum::{
    Router,
    body::Body,
    http::{Request, header},
};
use tower::ServiceExt;

use image_transform_backend::config::{AppConfig, CorsConfig};
use image_transform_backend::cors::build_cors_layer;
use image_transform_backend::{AppState, build_router};

#[tokio::test]
async fn cors_exposes_memory_usage_header_by_default() {
    let tmp = tempfile::tempdir().expect("tempdir");
    std::fs::write(tmp.path().join("a.bin"), b"raw").unwrap();

    let mut config = AppConfig::default();
    config.resources.root = tmp.path().to_string_lossy().into_owned();
    config.cors = CorsConfig {
        enabled: true,
        allowed_origins: vec!["https://demo.example".to_string()],
        ..CorsConfig::default()
    };
    let app = build_router(AppState::from_config(&config), &config);

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/image?src=a.bin")
                .header(header::ORIGIN, "https://demo.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("call app");

    assert_eq!(
        resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://demo.example"
    );
    let exposed = resp
        .headers()
        .get(header::ACCESS_CONTROL_EXPOSE_HEADERS)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();
    assert!(exposed.contains("x-memory-usage"), "exposed: {exposed}");
    assert!(resp.headers().contains_key("x-memory-usage"));
}

#[tokio::test]
async fn cors_preflight_defaults_to_get() {
    let cors = CorsConfig {
        enabled: true,
        allowed_origins: vec!["https://demo.example".to_string()],
        ..CorsConfig::default()
    };

    let layer = build_cors_layer(&cors).expect("cors layer");
    let app = Router::new()
        .route("/", axum::routing::get(|| async { "ok" }))
        .layer(layer);

    let req = Request::builder()
        .method("OPTIONS")
        .uri("/")
        .header(header::ORIGIN, "https://demo.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("call app");

    let allow_methods = resp
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_METHODS)
        .expect("missing allow methods")
        .to_str()
        .expect("invalid allow methods");
    assert!(allow_methods.contains("GET"));
}
