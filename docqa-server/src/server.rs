//! HTTP API for document question answering, built on axum.
//!
//! Routes:
//! - `GET /`: health check
//! - `POST /chat`: answer a question from the ingested corpus (form)
//! - `POST /ingest/pdf`: upload and index a PDF (multipart)
//! - `POST /ingest/url`: fetch and index a web page (form)
//!
//! Failures map to real HTTP statuses: quota exhaustion is 429, bad input is
//! 400, upstream provider trouble is 502, everything internal is 500. Full
//! error detail goes to the log; response bodies carry the user-facing
//! message only.

use std::path::Path;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Form, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use docqa_core::engine::{EMBEDDING_QUOTA_MESSAGE, GENERATION_QUOTA_MESSAGE, RagEngine};
use docqa_core::error::{ProviderError, RagError};

/// Upload size ceiling. PDFs routinely exceed axum's 2 MB default body limit.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Thread-safe shared engine reference for axum handlers.
pub type SharedEngine = Arc<RagEngine>;

/// Build the axum router with all API routes.
pub fn router(engine: SharedEngine) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/chat", post(chat_handler))
        .route("/ingest/pdf", post(ingest_pdf_handler))
        .route("/ingest/url", post(ingest_url_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// Serve the API on `host:port`. Runs until cancelled.
pub async fn run(engine: SharedEngine, host: &str, port: u16) -> Result<(), std::io::Error> {
    let app = router(engine);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = addr.as_str(), "Serving document QA API");
    axum::serve(listener, app).await?;
    Ok(())
}

/// HTTP status for an engine failure.
fn error_status(err: &RagError) -> StatusCode {
    match err {
        RagError::Embedding(ProviderError::RateLimited { .. })
        | RagError::Generation(ProviderError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
        RagError::Load(_) => StatusCode::BAD_REQUEST,
        RagError::Embedding(_) | RagError::Generation(_) => StatusCode::BAD_GATEWAY,
        RagError::Index(_) | RagError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// User-facing message for an engine failure.
///
/// Quota exhaustion gets fixed, actionable wording; internal failures are
/// not echoed to the client.
fn error_message(err: &RagError) -> String {
    match err {
        RagError::Generation(ProviderError::RateLimited { .. }) => {
            GENERATION_QUOTA_MESSAGE.to_string()
        }
        RagError::Embedding(ProviderError::RateLimited { .. }) => {
            EMBEDDING_QUOTA_MESSAGE.to_string()
        }
        RagError::Load(e) => e.to_string(),
        RagError::Embedding(e) | RagError::Generation(e) => e.to_string(),
        RagError::Index(_) | RagError::Config(_) => "Internal server error".to_string(),
    }
}

fn ingest_error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        axum::Json(serde_json::json!({
            "status": "error",
            "message": message,
        })),
    )
        .into_response()
}

/// Health check.
async fn root_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "message": "Document QA API is running",
    }))
}

#[derive(Deserialize)]
struct ChatForm {
    #[serde(default)]
    question: String,
}

/// Answer a question from the ingested corpus.
async fn chat_handler(State(engine): State<SharedEngine>, Form(form): Form<ChatForm>) -> Response {
    if form.question.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            axum::Json(serde_json::json!({
                "error": "Question must not be empty",
            })),
        )
            .into_response();
    }

    match engine.query(&form.question).await {
        Ok(answer) => axum::Json(serde_json::json!({
            "question": form.question,
            "answer": answer,
        }))
        .into_response(),
        Err(err) => {
            error!(error = %err, "Chat request failed");
            (
                error_status(&err),
                axum::Json(serde_json::json!({
                    "error": error_message(&err),
                })),
            )
                .into_response()
        }
    }
}

/// Reduce a client-supplied filename to its final path component.
///
/// The upload's filename is client-controlled and may contain path
/// separators. Only the last component survives, so a name like
/// `../../etc/passwd` stages as `passwd`; names with no usable component
/// fall back to a fixed default.
fn safe_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.pdf".to_string())
}

/// Upload and index a PDF.
///
/// The first multipart field carrying a filename is taken as the upload. It
/// is staged inside a temporary directory under the client's sanitized
/// filename, so the source recorded in the index is the uploaded name, not
/// a generated temp name. The directory removes itself on drop, cleaning up
/// the staged file on every exit path.
async fn ingest_pdf_handler(
    State(engine): State<SharedEngine>,
    mut multipart: Multipart,
) -> Response {
    let (filename, bytes) = loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if let Some(name) = field.file_name() {
                    let filename = name.to_string();
                    match field.bytes().await {
                        Ok(bytes) => break (filename, bytes),
                        Err(e) => {
                            return ingest_error_response(
                                StatusCode::BAD_REQUEST,
                                &format!("Failed to read upload: {}", e),
                            );
                        }
                    }
                }
                // Non-file fields are skipped.
            }
            Ok(None) => {
                return ingest_error_response(StatusCode::BAD_REQUEST, "No file field in upload");
            }
            Err(e) => {
                return ingest_error_response(
                    StatusCode::BAD_REQUEST,
                    &format!("Malformed multipart request: {}", e),
                );
            }
        }
    };

    let filename = safe_file_name(&filename);

    let staging = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            error!(error = %e, "Failed to create staging directory for upload");
            return ingest_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
            );
        }
    };
    let staged = staging.path().join(&filename);
    if let Err(e) = tokio::fs::write(&staged, &bytes).await {
        error!(error = %e, "Failed to stage upload");
        return ingest_error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
    }

    match engine.ingest_pdf(&staged).await {
        Ok(report) => {
            info!(
                file = filename.as_str(),
                chunks = report.chunks_ingested,
                "PDF ingested"
            );
            axum::Json(serde_json::json!({
                "status": "success",
                "message": format!("Ingested {}", filename),
            }))
            .into_response()
        }
        Err(err) => {
            warn!(error = %err, file = filename.as_str(), "PDF ingestion failed");
            ingest_error_response(error_status(&err), &error_message(&err))
        }
    }
}

#[derive(Deserialize)]
struct IngestUrlForm {
    #[serde(default)]
    url: String,
}

/// Fetch and index a web page.
async fn ingest_url_handler(
    State(engine): State<SharedEngine>,
    Form(form): Form<IngestUrlForm>,
) -> Response {
    let url = form.url.trim();
    if url.is_empty() {
        return ingest_error_response(StatusCode::BAD_REQUEST, "URL must not be empty");
    }

    match engine.ingest_url(url).await {
        Ok(report) => {
            info!(
                url,
                chunks = report.chunks_ingested,
                "URL ingested"
            );
            axum::Json(serde_json::json!({
                "status": "success",
                "message": format!("Ingested URL: {}", url),
            }))
            .into_response()
        }
        Err(err) => {
            warn!(error = %err, url, "URL ingestion failed");
            ingest_error_response(error_status(&err), &error_message(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use docqa_core::chunker::ChunkingConfig;
    use docqa_core::config::RetrievalConfig;
    use docqa_core::embedding::MockEmbedder;
    use docqa_core::engine::EMPTY_INDEX_MESSAGE;
    use docqa_core::error::{IndexError, LoadError};
    use docqa_core::generation::MockGenerator;
    use docqa_core::index::VectorIndex;
    use docqa_core::loader::Document;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn make_engine(dir: &TempDir, generator: MockGenerator) -> SharedEngine {
        let index = VectorIndex::open(&dir.path().join("index.db")).unwrap();
        Arc::new(
            RagEngine::new(
                Arc::new(MockEmbedder::new(64)),
                Arc::new(generator),
                index,
                ChunkingConfig::default(),
                RetrievalConfig::default(),
            )
            .unwrap(),
        )
    }

    async fn ingest(engine: &SharedEngine, source: &str, text: &str) {
        engine
            .ingest_documents(vec![Document {
                source: source.to_string(),
                text: text.to_string(),
            }])
            .await
            .unwrap();
    }

    fn form_request(uri: &str, body: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn response_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_root_endpoint() {
        let dir = TempDir::new().unwrap();
        let app = router(make_engine(&dir, MockGenerator::new()));

        let req = axum::http::Request::builder()
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let json = response_json(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["message"], "Document QA API is running");
    }

    #[tokio::test]
    async fn test_chat_with_empty_index_returns_init_message() {
        let dir = TempDir::new().unwrap();
        let app = router(make_engine(&dir, MockGenerator::new()));

        let req = form_request("/chat", "question=hello");
        let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let json = response_json(resp).await;
        assert_eq!(json["question"], "hello");
        assert_eq!(json["answer"], EMPTY_INDEX_MESSAGE);
    }

    #[tokio::test]
    async fn test_chat_answers_from_ingested_content() {
        let dir = TempDir::new().unwrap();
        let engine = make_engine(&dir, MockGenerator::with_response("Paris."));
        ingest(&engine, "geo.txt", "The capital of France is Paris.").await;
        let app = router(engine);

        let req = form_request("/chat", "question=What+is+the+capital+of+France%3F");
        let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let json = response_json(resp).await;
        assert_eq!(json["question"], "What is the capital of France?");
        assert_eq!(json["answer"], "Paris.");
    }

    #[tokio::test]
    async fn test_chat_blank_question_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let app = router(make_engine(&dir, MockGenerator::new()));

        let req = form_request("/chat", "question=+++");
        let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let json = response_json(resp).await;
        assert!(json["error"].as_str().unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn test_chat_missing_field_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let app = router(make_engine(&dir, MockGenerator::new()));

        let req = form_request("/chat", "");
        let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn test_chat_quota_exhaustion_is_429_with_fixed_message() {
        let dir = TempDir::new().unwrap();
        let engine = make_engine(&dir, MockGenerator::rate_limited());
        ingest(&engine, "doc.txt", "Some indexed content.").await;
        let app = router(engine);

        let req = form_request("/chat", "question=anything");
        let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
            .await
            .unwrap();
        assert_eq!(resp.status(), 429);

        let json = response_json(resp).await;
        assert_eq!(json["error"], GENERATION_QUOTA_MESSAGE);
    }

    #[tokio::test]
    async fn test_ingest_url_blank_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let app = router(make_engine(&dir, MockGenerator::new()));

        let req = form_request("/ingest/url", "url=");
        let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let json = response_json(resp).await;
        assert_eq!(json["status"], "error");
    }

    #[tokio::test]
    async fn test_ingest_url_invalid_scheme_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let app = router(make_engine(&dir, MockGenerator::new()));

        let req = form_request("/ingest/url", "url=ftp%3A%2F%2Fexample.com");
        let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let json = response_json(resp).await;
        assert_eq!(json["status"], "error");
        assert!(json["message"].as_str().unwrap().contains("http"));
    }

    fn multipart_request(uri: &str, filename: Option<&str>, payload: &[u8]) -> axum::http::Request<Body> {
        let boundary = "docqa-test-boundary";
        let disposition = match filename {
            Some(name) => format!("form-data; name=\"file\"; filename=\"{}\"", name),
            None => "form-data; name=\"note\"".to_string(),
        };
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: {}\r\nContent-Type: application/pdf\r\n\r\n",
                disposition
            )
            .as_bytes(),
        );
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    /// Assemble a minimal one-page PDF whose content stream draws `text`.
    /// Offsets in the xref table are computed while the body is built, so
    /// the output is a well-formed document `pdf_extract` can parse.
    fn minimal_pdf(text: &str) -> Vec<u8> {
        let content = format!("BT /F1 24 Tf 72 720 Td ({}) Tj ET", text);
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 5 0 R >> >> /Contents 4 0 R >>"
                .to_string(),
            format!(
                "<< /Length {} >>\nstream\n{}\nendstream",
                content.len(),
                content
            ),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref_at = pdf.len();
        pdf.extend_from_slice(b"xref\n0 6\n0000000000 65535 f \n");
        for off in offsets {
            pdf.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
        }
        pdf.extend_from_slice(
            format!(
                "trailer\n<< /Size 6 /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                xref_at
            )
            .as_bytes(),
        );
        pdf
    }

    #[tokio::test]
    async fn test_ingest_pdf_rejects_non_pdf_upload() {
        let dir = TempDir::new().unwrap();
        let app = router(make_engine(&dir, MockGenerator::new()));

        let req = multipart_request("/ingest/pdf", Some("report.pdf"), b"this is not a pdf");
        let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let json = response_json(resp).await;
        assert_eq!(json["status"], "error");
    }

    #[tokio::test]
    async fn test_ingest_pdf_without_file_field_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let app = router(make_engine(&dir, MockGenerator::new()));

        let req = multipart_request("/ingest/pdf", None, b"just a text field");
        let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let json = response_json(resp).await;
        assert_eq!(json["status"], "error");
        assert!(json["message"].as_str().unwrap().contains("file"));
    }

    #[tokio::test]
    async fn test_ingest_pdf_records_uploaded_filename_as_source() {
        let dir = TempDir::new().unwrap();
        let engine = make_engine(&dir, MockGenerator::new());
        let app = router(engine);

        let pdf = minimal_pdf("Quarterly revenue grew twelve percent.");
        let req = multipart_request("/ingest/pdf", Some("report.pdf"), &pdf);
        let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let json = response_json(resp).await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["message"], "Ingested report.pdf");

        // Every persisted chunk must carry the uploaded name as its source,
        // not the name of whatever file the handler staged the bytes in.
        let index = VectorIndex::open(&dir.path().join("index.db")).unwrap();
        let hits = index.search(&vec![0.0f32; 64], 8).unwrap();
        assert!(!hits.is_empty());
        for hit in hits {
            assert_eq!(hit.source, "report.pdf");
        }
    }

    #[test]
    fn test_safe_file_name_strips_path_components() {
        assert_eq!(safe_file_name("report.pdf"), "report.pdf");
        assert_eq!(safe_file_name("nested/dir/doc.pdf"), "doc.pdf");
        assert_eq!(safe_file_name("../../etc/passwd"), "passwd");
        assert_eq!(safe_file_name(""), "upload.pdf");
        assert_eq!(safe_file_name(".."), "upload.pdf");
    }

    #[test]
    fn test_error_status_mapping() {
        let quota = RagError::Embedding(ProviderError::RateLimited {
            retry_after_secs: 30,
        });
        assert_eq!(error_status(&quota), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(error_message(&quota), EMBEDDING_QUOTA_MESSAGE);

        let quota = RagError::Generation(ProviderError::RateLimited {
            retry_after_secs: 30,
        });
        assert_eq!(error_status(&quota), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(error_message(&quota), GENERATION_QUOTA_MESSAGE);

        let load = RagError::Load(LoadError::EmptyDocument {
            origin: "empty.pdf".to_string(),
        });
        assert_eq!(error_status(&load), StatusCode::BAD_REQUEST);
        assert!(error_message(&load).contains("empty.pdf"));

        let upstream = RagError::Generation(ProviderError::ApiRequest {
            message: "HTTP 500 from Gemini API".to_string(),
        });
        assert_eq!(error_status(&upstream), StatusCode::BAD_GATEWAY);

        let internal = RagError::Index(IndexError::Io(std::io::Error::other("disk full")));
        assert_eq!(error_status(&internal), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error_message(&internal), "Internal server error");
    }
}
