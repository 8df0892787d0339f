use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use hololens_server::config::{Config, CorsOrigins};
use hololens_server::ingest::IngestValidation;
use hololens_server::store::StorePolicy;
use hololens_server::{create_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(store_policy: StorePolicy, ingest_validation: IngestValidation) -> Router {
    let config = Config {
        store_policy,
        ingest_validation,
        ..Config::default()
    };
    create_router(AppState::new(&config), &config)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, value)
}

fn position_type() -> Value {
    json!({
        "name": "positionData",
        "structure": {"x": "float", "y": "float", "z": "float", "position": "float"}
    })
}

#[tokio::test]
async fn test_root_liveness() {
    let app = app(StorePolicy::Append, IngestValidation::Off);
    let (status, body) = send(&app, "GET", "/", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "HoloLens Communication Server is running"}));
}

#[tokio::test]
async fn test_post_then_get_device_data() {
    let app = app(StorePolicy::Overwrite, IngestValidation::Off);

    let reading = json!({"device_id": "HOLO1", "sensor_data": {"x": 1}});
    let (status, body) = send(&app, "POST", "/hololens/data", Some(reading)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "Data received successfully"}));

    let (status, body) = send(&app, "GET", "/hololens/data/HOLO1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"x": 1}));

    let (status, body) = send(&app, "GET", "/hololens/data/HOLO2", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"detail": "Device data not found"}));
}

#[tokio::test]
async fn test_overwrite_policy_keeps_second_write() {
    let app = app(StorePolicy::Overwrite, IngestValidation::Off);
    for x in [1, 2] {
        let reading = json!({"device_id": "HOLO1", "sensor_data": {"x": x}});
        send(&app, "POST", "/hololens/data", Some(reading)).await;
    }

    let (_, body) = send(&app, "GET", "/hololens/data/HOLO1", None).await;
    assert_eq!(body, json!({"x": 2}));
}

#[tokio::test]
async fn test_append_policy_keeps_both_writes_in_order() {
    let app = app(StorePolicy::Append, IngestValidation::Off);
    for x in [1, 2] {
        let reading = json!({"device_id": "HOLO1", "sensor_data": {"x": x}});
        send(&app, "POST", "/hololens/data", Some(reading)).await;
    }

    let (_, body) = send(&app, "GET", "/hololens/data/HOLO1", None).await;
    assert_eq!(body, json!([{"x": 1}, {"x": 2}]));
}

#[tokio::test]
async fn test_register_message_type_twice() {
    let app = app(StorePolicy::Append, IngestValidation::Off);

    let (status, body) = send(&app, "POST", "/message-types", Some(position_type())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"status": "Message type 'positionData' added successfully"})
    );

    let (status, body) = send(&app, "POST", "/message-types", Some(position_type())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"detail": "Message type already exists"}));

    let (status, body) = send(&app, "GET", "/message-types", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_object().map(|m| m.len()), Some(1));
    // Declared field order survives the round trip through the registry.
    let fields: Vec<&String> = body["positionData"].as_object().unwrap().keys().collect();
    assert_eq!(fields, vec!["x", "y", "z", "position"]);
}

#[tokio::test]
async fn test_register_unknown_tag_is_rejected() {
    let app = app(StorePolicy::Append, IngestValidation::Off);
    let body = json!({"name": "evil", "structure": {"x": "__import__('os').system('id')"}});

    let (status, body) = send(&app, "POST", "/message-types", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Unsupported type tag"));

    let (_, listing) = send(&app, "GET", "/message-types", None).await;
    assert_eq!(listing, json!({}));
}

#[tokio::test]
async fn test_get_single_message_type() {
    let app = app(StorePolicy::Append, IngestValidation::Off);
    send(&app, "POST", "/message-types", Some(position_type())).await;

    let (status, body) = send(&app, "GET", "/message-types/positionData", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["position"], "float");

    let (status, body) = send(&app, "GET", "/message-types/handData", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"detail": "Message type not found"}));
}

#[tokio::test]
async fn test_http_ingest_skips_validation_by_default() {
    let app = app(StorePolicy::Append, IngestValidation::Off);
    send(&app, "POST", "/message-types", Some(position_type())).await;

    let reading = json!({
        "device_id": "HOLO1",
        "message_type": "positionData",
        "sensor_data": {"x": "bad"}
    });
    let (status, _) = send(&app, "POST", "/hololens/data", Some(reading)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_tagged_ingest_validation() {
    let app = app(StorePolicy::Append, IngestValidation::Tagged);
    send(&app, "POST", "/message-types", Some(position_type())).await;

    let bad = json!({
        "device_id": "HOLO1",
        "message_type": "positionData",
        "sensor_data": {"x": "bad", "y": 4.56, "z": 7.89, "position": 4.34}
    });
    let (status, body) = send(&app, "POST", "/hololens/data", Some(bad)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body,
        json!({"detail": "Key 'x' has invalid type. Expected float, got string"})
    );

    let (status, _) = send(&app, "GET", "/hololens/data/HOLO1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let good = json!({
        "device_id": "HOLO1",
        "message_type": "positionData",
        "sensor_data": {"x": 1.23, "y": 4.56, "z": 7.89, "position": 4.34}
    });
    let (status, _) = send(&app, "POST", "/hololens/data", Some(good)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let app = app(StorePolicy::Append, IngestValidation::Off);
    let (status, body) = send(
        &app,
        "POST",
        "/hololens/data",
        Some(json!({"device_id": "HOLO1"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("sensor_data"));

    let request = Request::builder()
        .method("POST")
        .uri("/message-types")
        .header("content-type", "application/json")
        .body(Body::from("{\"name\": "))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_cors_allows_any_origin_by_default() {
    let app = app(StorePolicy::Append, IngestValidation::Off);
    let request = Request::builder()
        .uri("/")
        .header("origin", "http://dashboard.local")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_cors_wildcard_inside_origin_list() {
    let config = Config {
        cors_origins: CorsOrigins::List(vec!["*".to_string(), "http://a.local".to_string()]),
        ..Config::default()
    };
    let app = create_router(AppState::new(&config), &config);
    let request = Request::builder()
        .uri("/")
        .header("origin", "http://elsewhere.local")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_device_id_with_reserved_characters() {
    let app = app(StorePolicy::Overwrite, IngestValidation::Off);

    let reading = json!({"device_id": "rig/7?x", "sensor_data": {"x": 1}});
    let (status, _) = send(&app, "POST", "/hololens/data", Some(reading)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "GET", "/hololens/data/rig%2F7%3Fx", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"x": 1}));
}
