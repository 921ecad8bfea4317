use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use covenant_database::{MemoryBlobStore, MemoryCache, MemoryStore};
use covenant_document_processing::{
    CompletionClient, CompletionRequest, ExtractedText, ExtractionTask, PipelineQueue, TextExtractor,
};
use covenant_utils::{AppConfig, CovenantResult};

use crate::app::{build_state, create_app, Backends};
use crate::middleware::REQUEST_ID_HEADER;

const BOUNDARY: &str = "covenant-test-boundary";

const CONTRACT_REPLY: &str = r#"{"data": {
    "contract_number": "SVC-2024-009",
    "contract_title": "Facilities Services Agreement",
    "effective_date": "2024-01-01",
    "expiration_date": "2025-12-31",
    "currency": "USD",
    "parties": [{"legal_name": "Northwind Facilities", "role": "vendor"}]
}, "metadata": {"confidence": 0.93, "source_pages": [1, 2]}}"#;

struct FixedClient;

#[async_trait]
impl CompletionClient for FixedClient {
    fn model(&self) -> &str {
        "fixed"
    }

    async fn complete(&self, request: &CompletionRequest) -> CovenantResult<String> {
        Ok(match request.task {
            ExtractionTask::Classify => r#"{"document_type": "contract", "confidence": 0.9}"#.to_string(),
            ExtractionTask::ExtractContract => CONTRACT_REPLY.to_string(),
            ExtractionTask::ExtractInvoice => "{}".to_string(),
        })
    }
}

struct Utf8Text;

#[async_trait]
impl TextExtractor for Utf8Text {
    async fn extract(&self, _file_name: &str, _content_type: &str, data: &[u8]) -> CovenantResult<ExtractedText> {
        Ok(ExtractedText::from_text(String::from_utf8_lossy(data).into_owned()))
    }
}

async fn test_app() -> (Router, PipelineQueue) {
    let config = AppConfig::default();
    let backends = Backends {
        store: Arc::new(MemoryStore::new()),
        cache: Arc::new(MemoryCache::new(Duration::from_secs(60))),
        blobs: Arc::new(MemoryBlobStore::new()),
        client: Arc::new(FixedClient),
        text: Arc::new(Utf8Text),
    };
    let (state, queue) = build_state(&config, backends).await.unwrap();
    (create_app(state), queue)
}

fn multipart_upload(file_name: &str, document_type: &str, contents: &str) -> Request<Body> {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"document_type\"\r\n\r\n{t}\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
         Content-Type: application/pdf\r\n\r\n{c}\r\n--{b}--\r\n",
        b = BOUNDARY,
        t = document_type,
        f = file_name,
        c = contents
    );
    Request::builder()
        .method("POST")
        .uri("/api/v1/documents")
        .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_echoes_request_id() {
    let (app, _queue) = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(REQUEST_ID_HEADER, "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-123");
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_upload_then_poll_until_completed() {
    let (app, queue) = test_app().await;

    let response = app
        .clone()
        .oneshot(multipart_upload("msa.pdf", "contract", "FACILITIES SERVICES AGREEMENT SVC-2024-009"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    let receipt = json_body(response).await;
    assert_eq!(receipt["stage"], "uploaded");
    let document_id = receipt["document_id"].as_str().unwrap().to_string();

    tokio::time::timeout(Duration::from_secs(10), queue.wait_idle())
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/documents/{}/status", document_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = json_body(response).await;
    assert_eq!(status["stage"], "completed");
    assert_eq!(status["progress_percent"], 100);
    assert!(status["contract_id"].is_string());

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let text = String::from_utf8(to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()).unwrap();
    assert!(text.contains("covenant_documents_submitted_total{document_type=\"contract\"} 1"));
}

#[tokio::test]
async fn test_rejected_upload_maps_to_415() {
    let (app, _queue) = test_app().await;

    let response = app
        .oneshot(multipart_upload("photo.png", "invoice", "not a document"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body = json_body(response).await;
    assert_eq!(body["code"], "UNSUPPORTED_MEDIA_TYPE");
}

#[tokio::test]
async fn test_unknown_document_type_is_bad_request() {
    let (app, _queue) = test_app().await;

    let response = app
        .oneshot(multipart_upload("po.pdf", "purchase_order", "PO 42"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_document_is_404() {
    let (app, _queue) = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/documents/{}/status", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_approval_listing_and_sweep() {
    let (app, _queue) = test_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/approvals?status=Pending")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, serde_json::json!([]));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/approvals/sweep")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["examined"], 0);
}
