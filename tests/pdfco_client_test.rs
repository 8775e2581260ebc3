use axum::{
    Json, Router,
    body::Bytes,
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rinvo_backend::models::{ConversionKind, RemoteFileRef};
use rinvo_backend::services::error::RelayError;
use rinvo_backend::services::remote::ConversionClient;
use rinvo_backend::services::remote::pdfco::PdfCoClient;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

const GOOD_KEY: &str = "good-key";
const NO_URL_KEY: &str = "no-url-key";

#[derive(Clone)]
struct StubState {
    base: String,
    uploaded: Arc<Mutex<Vec<(String, usize)>>>,
    conversions: Arc<Mutex<Vec<Value>>>,
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": true, "status": 401, "message": "Invalid API key"})),
    )
        .into_response()
}

fn key_of(headers: &HeaderMap) -> &str {
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

async fn upload(
    State(state): State<StubState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let key = key_of(&headers);
    if key != GOOD_KEY && key != NO_URL_KEY {
        return unauthorized();
    }

    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.unwrap();
        state.uploaded.lock().unwrap().push((name, data.len()));
    }

    if key == NO_URL_KEY {
        return Json(json!({"error": false, "status": 200})).into_response();
    }
    Json(json!({
        "url": format!("{}/files/source.pdf", state.base),
        "error": false,
        "status": 200,
        "name": "source.pdf",
    }))
    .into_response()
}

async fn to_doc(
    State(state): State<StubState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if key_of(&headers) != GOOD_KEY {
        return unauthorized();
    }
    state.conversions.lock().unwrap().push(body);
    Json(json!({
        "url": format!("{}/results/out.docx", state.base),
        "error": false,
        "status": 200,
        "pageCount": 1,
    }))
    .into_response()
}

async fn to_xls() -> Response {
    Json(json!({"error": true, "status": 400, "message": "Password protected document"}))
        .into_response()
}

async fn result_file() -> Bytes {
    Bytes::from_static(b"DOCX!")
}

async fn spawn_stub() -> StubState {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = StubState {
        base: format!("http://{}", addr),
        uploaded: Arc::new(Mutex::new(Vec::new())),
        conversions: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .route("/v1/file/upload", post(upload))
        .route("/v1/pdf/convert/to/doc", post(to_doc))
        .route("/v1/pdf/convert/to/xls", post(to_xls))
        .route("/results/out.docx", get(result_file))
        .with_state(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    state
}

async fn staged_source(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("1700000000000-report.pdf");
    tokio::fs::write(&path, b"%PDF-1.7 ten").await.unwrap();
    path
}

#[tokio::test]
async fn test_full_exchange_against_stub() {
    let stub = spawn_stub().await;
    let dir = tempfile::tempdir().unwrap();
    let source = staged_source(dir.path()).await;
    let client = PdfCoClient::new(&stub.base, GOOD_KEY, None).unwrap();

    let remote = client.upload_file(&source).await.unwrap();
    assert_eq!(remote.as_str(), format!("{}/files/source.pdf", stub.base));
    assert_eq!(
        *stub.uploaded.lock().unwrap(),
        vec![("1700000000000-report.pdf".to_string(), 12)]
    );

    let result = client
        .request_conversion(&remote, ConversionKind::PdfToWord)
        .await
        .unwrap();
    assert_eq!(result.as_str(), format!("{}/results/out.docx", stub.base));
    {
        let conversions = stub.conversions.lock().unwrap();
        assert_eq!(conversions[0]["url"], remote.as_str());
        assert_eq!(conversions[0]["async"], false);
        assert_eq!(conversions[0]["name"], "converted.docx");
    }

    let destination = dir.path().join("converted-1.docx");
    let written = client.fetch_result(&result, &destination).await.unwrap();
    assert_eq!(written, 5);
    assert_eq!(tokio::fs::read(&destination).await.unwrap(), b"DOCX!");
}

#[tokio::test]
async fn test_rejected_key_is_auth_error() {
    let stub = spawn_stub().await;
    let dir = tempfile::tempdir().unwrap();
    let source = staged_source(dir.path()).await;
    let client = PdfCoClient::new(&stub.base, "wrong-key", None).unwrap();

    let err = client.upload_file(&source).await.unwrap_err();
    assert!(matches!(err, RelayError::Auth(_)), "{:?}", err);
}

#[tokio::test]
async fn test_upload_without_url_is_upstream_error() {
    let stub = spawn_stub().await;
    let dir = tempfile::tempdir().unwrap();
    let source = staged_source(dir.path()).await;
    let client = PdfCoClient::new(&stub.base, NO_URL_KEY, None).unwrap();

    let err = client.upload_file(&source).await.unwrap_err();
    assert!(matches!(err, RelayError::Upstream(_)), "{:?}", err);
}

#[tokio::test]
async fn test_conversion_error_carries_upstream_message() {
    let stub = spawn_stub().await;
    let client = PdfCoClient::new(&stub.base, GOOD_KEY, None).unwrap();
    let source = RemoteFileRef::new(format!("{}/files/source.pdf", stub.base));

    let err = client
        .request_conversion(&source, ConversionKind::PdfToExcel)
        .await
        .unwrap_err();
    match err {
        RelayError::Conversion(message) => assert!(message.contains("Password protected")),
        other => panic!("expected conversion error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_result_is_network_error() {
    let stub = spawn_stub().await;
    let dir = tempfile::tempdir().unwrap();
    let client = PdfCoClient::new(&stub.base, GOOD_KEY, None).unwrap();
    let missing = RemoteFileRef::new(format!("{}/results/gone.docx", stub.base));

    let err = client
        .fetch_result(&missing, &dir.path().join("converted-2.docx"))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Network(_)), "{:?}", err);
}
