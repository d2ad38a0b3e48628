//! HTTP behaviour of the serving worker.

use axum::body::Body;
use harbor_serving::content::Payload;
use harbor_serving::{ServingError, ServingModule, Transformer, router};
use harbor_training::Model;
use http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tower::ServiceExt;

#[derive(Default)]
struct Counting {
    loads: AtomicUsize,
    predictions: AtomicUsize,
}

impl ServingModule for Counting {
    fn model_fn(&self, _model_dir: &Path) -> anyhow::Result<Model> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Model::Json(json!({"bias": 1})))
    }

    fn predict_fn(&self, input: Payload, model: &Model) -> anyhow::Result<Value> {
        self.predictions.fetch_add(1, Ordering::SeqCst);
        let Some(values) = input.as_json().and_then(Value::as_array) else {
            let shape = ServingError::UnsupportedInputShape("expected a JSON array".to_string());
            return Err(shape.into());
        };
        if values.is_empty() {
            anyhow::bail!("cannot predict on an empty batch");
        }
        let bias = model.as_json().and_then(|m| m["bias"].as_f64()).unwrap_or(0.0);
        Ok(values.iter().map(|v| json!(v.as_f64().unwrap_or(0.0) + bias)).collect())
    }
}

fn setup() -> (Arc<Counting>, Arc<Transformer>) {
    let module = Arc::new(Counting::default());
    let transformer = Arc::new(Transformer::new(module.clone(), "/opt/ml/model"));
    (module, transformer)
}

fn app(transformer: &Arc<Transformer>) -> axum::Router {
    router(transformer.clone(), 4, Duration::from_secs(5))
}

fn invocation(body: &str, content_type: Option<&str>, accept: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/invocations");
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    if let Some(accept) = accept {
        builder = builder.header(header::ACCEPT, accept);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

#[tokio::test]
async fn test_ping_reports_readiness_after_model_load() {
    let (_module, transformer) = setup();
    let ping = || Request::builder().uri("/ping").body(Body::empty()).unwrap();

    let response = app(&transformer).oneshot(ping()).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    transformer.initialize().unwrap();
    let response = app(&transformer).oneshot(ping()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_ten_invocations_load_model_once() {
    let (module, transformer) = setup();
    transformer.initialize().unwrap();
    let app = app(&transformer);

    for i in 0..10 {
        let request = invocation(&format!("[{i}]"), None, None);
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert!(response.headers().contains_key("x-request-id"));
        let prediction: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(prediction, json!([f64::from(i) + 1.0]));
    }

    assert_eq!(module.predictions.load(Ordering::SeqCst), 10);
    assert_eq!(module.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_csv_round_trip_through_headers() {
    let (_module, transformer) = setup();
    transformer.initialize().unwrap();

    let request = invocation("[1, 2]", Some("application/json"), Some("text/csv"));
    let response = app(&transformer).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
    assert_eq!(body_bytes(response).await, b"2.0\n3.0\n");
}

#[tokio::test]
async fn test_error_status_mapping() {
    let (module, transformer) = setup();
    transformer.initialize().unwrap();

    let cases = [
        (invocation("[1]", Some("image/png"), None), StatusCode::UNSUPPORTED_MEDIA_TYPE),
        (invocation("[1]", None, Some("image/png")), StatusCode::NOT_ACCEPTABLE),
        (invocation(r#"{"not": "an array"}"#, None, None), StatusCode::PRECONDITION_FAILED),
        (invocation("[]", None, None), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (request, expected) in cases {
        let response = app(&transformer).oneshot(request).await.unwrap();
        assert_eq!(response.status(), expected);
        if expected == StatusCode::INTERNAL_SERVER_ERROR {
            assert!(body_bytes(response).await.is_empty());
        }
    }

    // The worker keeps serving after failures.
    let response = app(&transformer).oneshot(invocation("[0]", None, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(module.predictions.load(Ordering::SeqCst) >= 3);
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let (_module, transformer) = setup();
    transformer.initialize().unwrap();

    let mut request = invocation("[1]", None, None);
    request.headers_mut().insert("x-request-id", "abc-123".parse().unwrap());
    let response = app(&transformer).oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");
}

#[tokio::test]
async fn test_invocation_before_load_is_unavailable() {
    let (_module, transformer) = setup();
    let response = app(&transformer).oneshot(invocation("[1]", None, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[derive(Default)]
struct Slow {
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ServingModule for Slow {
    fn model_fn(&self, _model_dir: &Path) -> anyhow::Result<Model> {
        Ok(Model::Json(Value::Null))
    }

    fn predict_fn(&self, _input: Payload, _model: &Model) -> anyhow::Result<Value> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(300));
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(json!([]))
    }
}

#[tokio::test]
async fn test_timed_out_predictions_still_count_against_limit() {
    let module = Arc::new(Slow::default());
    let transformer = Arc::new(Transformer::new(module.clone(), "/opt/ml/model"));
    transformer.initialize().unwrap();
    let app = router(transformer, 1, Duration::from_millis(50));

    for _ in 0..4 {
        let response = app.clone().oneshot(invocation("[1]", None, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_bytes(response).await.is_empty());
    }
    assert_eq!(module.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_legacy_content_type_header_wins() {
    let (_module, transformer) = setup();
    transformer.initialize().unwrap();

    let mut request = invocation("1,2\n", Some("image/png"), None);
    request.headers_mut().insert("contenttype", "text/csv".parse().unwrap());
    let response = app(&transformer).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
