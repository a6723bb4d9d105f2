use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::Mutex};

use super::*;
use crate::error::API_ERROR;

#[derive(Clone, Default)]
struct Captured {
    api_keys: Arc<Mutex<Vec<Option<String>>>>,
    summary_requests: Arc<Mutex<Vec<SummaryRequest>>>,
    evaluation_requests: Arc<Mutex<Vec<EvaluationRequest>>>,
    departments: Arc<Mutex<Vec<String>>>,
}

#[derive(Clone)]
struct BackendState {
    captured: Captured,
    status: StatusCode,
    reply: Value,
}

fn api_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn handle_generate(
    State(state): State<BackendState>,
    headers: HeaderMap,
    Json(payload): Json<SummaryRequest>,
) -> (StatusCode, Json<Value>) {
    state.captured.api_keys.lock().await.push(api_key(&headers));
    state.captured.summary_requests.lock().await.push(payload);
    (state.status, Json(state.reply))
}

async fn handle_evaluate(
    State(state): State<BackendState>,
    headers: HeaderMap,
    Json(payload): Json<EvaluationRequest>,
) -> (StatusCode, Json<Value>) {
    state.captured.api_keys.lock().await.push(api_key(&headers));
    state.captured.evaluation_requests.lock().await.push(payload);
    (state.status, Json(state.reply))
}

async fn handle_doctors(
    State(state): State<BackendState>,
    Path(department): Path<String>,
) -> (StatusCode, Json<Value>) {
    state.captured.departments.lock().await.push(department);
    (state.status, Json(state.reply))
}

async fn spawn_backend(app: Router) -> Url {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Url::parse(&format!("http://{addr}")).expect("base url")
}

async fn spawn_replying_backend(status: StatusCode, reply: Value) -> (Url, Captured) {
    let captured = Captured::default();
    let state = BackendState {
        captured: captured.clone(),
        status,
        reply,
    };
    let app = Router::new()
        .route("/api/summary/generate", post(handle_generate))
        .route("/api/evaluation/evaluate", post(handle_evaluate))
        .route("/api/settings/doctors/:department", get(handle_doctors))
        .with_state(state);
    (spawn_backend(app).await, captured)
}

fn gateway(base_url: Url, api_key: Option<&str>) -> HttpGateway {
    HttpGateway::new(GatewayConfig {
        base_url,
        api_key: api_key.map(str::to_string),
    })
}

fn summary_request() -> SummaryRequest {
    SummaryRequest {
        referral_purpose: "精査加療依頼".to_string(),
        current_prescription: "メトホルミン 500mg".to_string(),
        medical_text: "患者は...".to_string(),
        additional_info: String::new(),
        department: "default".to_string(),
        doctor: "default".to_string(),
        document_type: "他院への紹介".to_string(),
        model: "Claude".to_string(),
    }
}

fn evaluation_request() -> EvaluationRequest {
    EvaluationRequest {
        document_type: "他院への紹介".to_string(),
        input_text: "患者は...".to_string(),
        current_prescription: String::new(),
        additional_info: String::new(),
        output_summary: "全文要約".to_string(),
    }
}

#[tokio::test]
async fn generate_posts_request_and_normalizes_success() {
    let (base_url, captured) = spawn_replying_backend(
        StatusCode::OK,
        json!({
            "success": true,
            "output_summary": "全文要約",
            "parsed_summary": {"主病名": "糖尿病"},
            "processing_time": 12.5,
            "model_used": "Claude",
            "model_switched": false,
            "input_tokens": 120,
            "output_tokens": 80
        }),
    )
    .await;

    let result = gateway(base_url, Some("secret-key"))
        .generate(summary_request())
        .await
        .expect("generate");

    assert_eq!(result.output_summary, "全文要約");
    assert_eq!(result.section("主病名"), Some("糖尿病"));
    assert_eq!(result.processing_time, Some(12.5));
    assert_eq!(result.model_used, "Claude");
    assert!(!result.model_switched);

    assert_eq!(
        captured.summary_requests.lock().await.as_slice(),
        &[summary_request()]
    );
    assert_eq!(
        captured.api_keys.lock().await.as_slice(),
        &[Some("secret-key".to_string())]
    );
}

#[tokio::test]
async fn partial_success_falls_back_to_empty_values() {
    let (base_url, _captured) =
        spawn_replying_backend(StatusCode::OK, json!({"success": true})).await;

    let result = gateway(base_url, None)
        .generate(summary_request())
        .await
        .expect("generate");

    assert_eq!(result, GenerationResult::default());
}

#[tokio::test]
async fn api_key_header_is_omitted_when_not_configured() {
    let (base_url, captured) = spawn_replying_backend(
        StatusCode::OK,
        json!({"success": true, "output_summary": "x"}),
    )
    .await;

    gateway(base_url, Some(""))
        .generate(summary_request())
        .await
        .expect("generate");

    assert_eq!(captured.api_keys.lock().await.as_slice(), &[None::<String>]);
}

#[tokio::test]
async fn application_failure_surfaces_server_message() {
    let (base_url, _captured) = spawn_replying_backend(
        StatusCode::OK,
        json!({"success": false, "error_message": "サーバーエラー"}),
    )
    .await;

    let err = gateway(base_url, None)
        .generate(summary_request())
        .await
        .expect_err("rejected");

    assert!(matches!(&err, GatewayError::Rejected(message) if message == "サーバーエラー"));
    assert_eq!(err.to_string(), "サーバーエラー");
}

#[tokio::test]
async fn application_failure_without_message_uses_fallback() {
    let (base_url, _captured) = spawn_replying_backend(
        StatusCode::OK,
        json!({"success": false, "error_message": ""}),
    )
    .await;

    let err = gateway(base_url, None)
        .generate(summary_request())
        .await
        .expect_err("rejected");

    assert_eq!(err.to_string(), GENERATION_FAILED);
}

#[tokio::test]
async fn error_status_maps_to_generic_api_error() {
    let (base_url, _captured) = spawn_replying_backend(
        StatusCode::UNAUTHORIZED,
        json!({"detail": "APIキーが必要です"}),
    )
    .await;

    let err = gateway(base_url, None)
        .generate(summary_request())
        .await
        .expect_err("unauthorized");

    match &err {
        GatewayError::Status { status, detail } => {
            assert_eq!(*status, 401);
            assert_eq!(detail.as_deref(), Some("APIキーが必要です"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.to_string(), API_ERROR);
}

#[tokio::test]
async fn malformed_body_maps_to_transport_error() {
    let app = Router::new().route(
        "/api/summary/generate",
        post(|| async { (StatusCode::OK, "<html>upstream timeout</html>") }),
    );
    let base_url = spawn_backend(app).await;

    let err = gateway(base_url, None)
        .generate(summary_request())
        .await
        .expect_err("malformed");

    assert!(matches!(err, GatewayError::Transport { .. }));
    assert_eq!(err.to_string(), API_ERROR);
}

#[tokio::test]
async fn unreachable_backend_maps_to_transport_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    let base_url = Url::parse(&format!("http://{addr}")).expect("base url");

    let err = gateway(base_url, None)
        .generate(summary_request())
        .await
        .expect_err("unreachable");

    assert!(matches!(err, GatewayError::Transport { .. }));
}

#[tokio::test]
async fn evaluate_posts_request_and_normalizes_success() {
    let (base_url, captured) = spawn_replying_backend(
        StatusCode::OK,
        json!({"success": true, "evaluation_result": "評価: A", "processing_time": 3.0}),
    )
    .await;

    let result = gateway(base_url, Some("secret-key"))
        .evaluate(evaluation_request())
        .await
        .expect("evaluate");

    assert_eq!(result.result_text, "評価: A");
    assert_eq!(result.processing_time, Some(3.0));
    assert_eq!(
        captured.evaluation_requests.lock().await.as_slice(),
        &[evaluation_request()]
    );
    assert_eq!(
        captured.api_keys.lock().await.as_slice(),
        &[Some("secret-key".to_string())]
    );
}

#[tokio::test]
async fn evaluate_failure_without_message_uses_evaluation_fallback() {
    let (base_url, _captured) =
        spawn_replying_backend(StatusCode::OK, json!({"success": false})).await;

    let err = gateway(base_url, None)
        .evaluate(evaluation_request())
        .await
        .expect_err("rejected");

    assert_eq!(err.to_string(), EVALUATION_FAILED);
}

#[tokio::test]
async fn doctors_sends_department_as_one_path_segment() {
    let (base_url, captured) = spawn_replying_backend(
        StatusCode::OK,
        json!({"doctors": ["default", "橋本義弘"]}),
    )
    .await;
    let gateway = gateway(base_url, None);

    let doctors = gateway.doctors("眼科").await.expect("doctors");
    assert_eq!(doctors, vec!["default".to_string(), "橋本義弘".to_string()]);

    gateway.doctors("a/b").await.expect("doctors");
    assert_eq!(
        captured.departments.lock().await.as_slice(),
        &["眼科".to_string(), "a/b".to_string()]
    );
}

#[tokio::test]
async fn catalog_lookups_read_settings_endpoints() {
    let app = Router::new()
        .route(
            "/api/settings/departments",
            get(|| async { Json(json!({"departments": ["default", "眼科"]})) }),
        )
        .route(
            "/api/settings/document-types",
            get(|| async { Json(json!({"document_types": ["他院への紹介", "返書"]})) }),
        )
        .route(
            "/api/summary/models",
            get(|| async {
                Json(json!({"available_models": ["Claude", "Gemini_Pro"], "default_model": "Claude"}))
            }),
        );
    let gateway = gateway(spawn_backend(app).await, None);

    assert_eq!(
        gateway.departments().await.expect("departments"),
        vec!["default".to_string(), "眼科".to_string()]
    );
    assert_eq!(
        gateway.document_types().await.expect("document types"),
        vec!["他院への紹介".to_string(), "返書".to_string()]
    );
    let models = gateway.available_models().await.expect("models");
    assert_eq!(models.available_models, vec!["Claude", "Gemini_Pro"]);
    assert_eq!(models.default_model.as_deref(), Some("Claude"));
}

#[test]
fn endpoint_keeps_base_url_path_prefix() {
    let gateway = gateway(
        Url::parse("http://127.0.0.1:8000/medidocs/").expect("base url"),
        None,
    );

    let url = gateway
        .endpoint(&["api", "summary", "generate"])
        .expect("endpoint");

    assert_eq!(
        url.as_str(),
        "http://127.0.0.1:8000/medidocs/api/summary/generate"
    );
}

#[tokio::test]
async fn missing_gateway_is_always_unavailable() {
    let gateway = MissingDocumentGateway;
    assert!(matches!(
        gateway.generate(summary_request()).await,
        Err(GatewayError::Transport { .. })
    ));
    assert!(matches!(
        gateway.doctors("default").await,
        Err(GatewayError::Transport { .. })
    ));
}
