use crate::agent::AgentError;
use crate::cli::Args;
use crate::document::{ is_pdf_upload, ExtractError };
use crate::models::chat::SessionView;
use crate::server::AppState;
use crate::session::UploadOutcome;
use std::error::Error;
use std::net::SocketAddr;
use axum::{
    routing::{ get, post },
    Router,
    Json,
    extract::{ DefaultBodyLimit, Multipart, State },
    response::{ IntoResponse, Response },
    http::StatusCode,
};
use chrono::Utc;
use serde::{ Deserialize, Serialize };
use thiserror::Error;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, error, warn };

const UPLOAD_FIELD: &str = "file";

#[derive(Deserialize)]
pub struct ChatRequest {
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ChatResponse {
    pub content: String,
    pub timestamp: i64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UploadResponse {
    pub status: String,
    pub name: String,
    pub chars: Option<usize>,
}

impl From<UploadOutcome> for UploadResponse {
    fn from(outcome: UploadOutcome) -> Self {
        match outcome {
            UploadOutcome::Ready { name, chars } =>
                Self { status: "ready".into(), name, chars: Some(chars) },
            UploadOutcome::Unchanged { name } =>
                Self { status: "unchanged".into(), name, chars: None },
            UploadOutcome::Empty { name } => Self { status: "empty".into(), name, chars: None },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Upload needs a 'file' field with a file name")]
    MissingFile,
    #[error("Only PDF uploads are supported (got '{0}')")]
    UnsupportedType(String),
    #[error("Invalid upload: {0}")]
    Multipart(String),
    #[error("Error reading PDF: {0}")]
    Extract(#[from] ExtractError),
    #[error("Message must not be empty")]
    EmptyMessage,
    #[error("{0}")]
    Agent(#[from] AgentError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MissingFile | ApiError::Multipart(_) | ApiError::EmptyMessage =>
                StatusCode::BAD_REQUEST,
            ApiError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Extract(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Agent(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/session", get(session_handler))
        .route("/api/new-chat", post(new_chat_handler))
        .route("/api/upload", post(upload_handler))
        .route("/api/chat", post(chat_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(
    http_port: u16,
    state: AppState,
    args: Args
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    let app = router(state, args.max_upload_bytes);

    if let Some((cert_path, key_path)) = args.tls_paths()? {
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            cert_path,
            key_path
        ).await?;

        tokio::spawn(async move {
            let result = axum_server::bind_rustls(addr, tls_config).serve(
                app.into_make_service()
            ).await;

            if let Err(e) = result {
                error!("HTTPS server error: {}", e);
            }
        });

        info!("HTTPS API server started on: https://{}", addr);
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                error!("HTTP server error: {}", e);
            }
        });

        info!("HTTP API server started on: http://{}", addr);
    }

    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn session_handler(State(state): State<AppState>) -> Json<SessionView> {
    Json(state.session.lock().await.view())
}

async fn new_chat_handler(State(state): State<AppState>) -> Json<SessionView> {
    let mut session = state.session.lock().await;
    session.reset();
    Json(session.view())
}

async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::Multipart(e.to_string()))? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        // The name decides whether an upload replaces the retained document.
        let file_name = match field.file_name().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                warn!("Rejected upload without a file name");
                return Err(ApiError::MissingFile);
            }
        };
        let content_type = field.content_type().map(str::to_string);
        if !is_pdf_upload(&file_name, content_type.as_deref()) {
            warn!("Rejected upload '{}' ({:?})", file_name, content_type);
            return Err(ApiError::UnsupportedType(content_type.unwrap_or(file_name)));
        }

        let bytes = field.bytes().await.map_err(|e| ApiError::Multipart(e.to_string()))?;
        info!("Reading document '{}' ({} bytes)", file_name, bytes.len());

        let mut session = state.session.lock().await;
        let outcome = session.ingest_document(&file_name, &bytes, state.extractor.as_ref())?;
        return Ok(Json(outcome.into()));
    }

    Err(ApiError::MissingFile)
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>
) -> Result<Json<ChatResponse>, ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::EmptyMessage);
    }

    let mut session = state.session.lock().await;
    let content = state.agent.respond(&mut session, &req.content, None).await?;
    Ok(Json(ChatResponse { content, timestamp: Utc::now().timestamp() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::DocAgent;
    use crate::config::prompt::PromptConfig;
    use crate::llm::chat::tests::ScriptedChatClient;
    use crate::session::tests::FakeExtractor;
    use axum::body::{ to_bytes, Body };
    use axum::http::{ header, Request };
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "docaiboundary";

    fn state_with(client: ScriptedChatClient, extractor: FakeExtractor) -> (AppState, Arc<ScriptedChatClient>) {
        let client = Arc::new(client);
        let agent = DocAgent::new(client.clone(), PromptConfig::default());
        (AppState::new(agent, Arc::new(extractor)), client)
    }

    fn upload_request(file_name: &str, content_type: &str, body: &str) -> Request<Body> {
        let payload = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: {ct}\r\n\r\n{body}\r\n--{b}--\r\n",
            b = BOUNDARY,
            f = file_name,
            ct = content_type,
            body = body
        );
        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(payload))
            .unwrap()
    }

    fn nameless_upload_request(body: &str) -> Request<Body> {
        let payload = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"\r\nContent-Type: application/pdf\r\n\r\n{body}\r\n--{b}--\r\n",
            b = BOUNDARY,
            body = body
        );
        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(payload))
            .unwrap()
    }

    fn chat_request(content: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::json!({ "content": content }).to_string()))
            .unwrap()
    }

    async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn upload_then_chat_splices_document() {
        let extractor = FakeExtractor::default().with("pdf-bytes", Ok("Height: 90cm"));
        let (state, client) = state_with(ScriptedChatClient::replying(&["It says 90cm."]), extractor);
        let app = router(state.clone(), 1024 * 1024);

        let response = app
            .clone()
            .oneshot(upload_request("growth_chart.pdf", "application/pdf", "pdf-bytes")).await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let upload: UploadResponse = json_body(response).await;
        assert_eq!(upload.status, "ready");

        let response = app.oneshot(chat_request("what does my document say?")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let chat: ChatResponse = json_body(response).await;
        assert_eq!(chat.content, "It says 90cm.");

        let sent = client.last_request();
        assert_eq!(
            sent.last().unwrap().content,
            "DOCUMENT CONTEXT:\nHeight: 90cm\n\nUSER QUESTION: what does my document say?"
        );
        let session = state.session.lock().await;
        assert_eq!(session.history()[0].content, "what does my document say?");
    }

    #[tokio::test]
    async fn upload_without_file_name_is_rejected() {
        let extractor = FakeExtractor::default()
            .with("first", Ok("first doc"))
            .with("second", Ok("second doc"));
        let (state, _) = state_with(ScriptedChatClient::replying(&[]), extractor);
        let app = router(state.clone(), 1024 * 1024);

        let first = app.clone().oneshot(nameless_upload_request("first")).await.unwrap();
        let second = app.clone().oneshot(upload_request("  ", "application/pdf", "second")).await.unwrap();

        assert_eq!(first.status(), StatusCode::BAD_REQUEST);
        assert_eq!(second.status(), StatusCode::BAD_REQUEST);
        let session = state.session.lock().await;
        assert!(!session.document_ready());
        assert!(session.last_uploaded_name().is_none());
    }

    #[tokio::test]
    async fn differently_named_upload_replaces_document() {
        let extractor = FakeExtractor::default()
            .with("first", Ok("first doc"))
            .with("second", Ok("second doc"));
        let (state, _) = state_with(ScriptedChatClient::replying(&[]), extractor);
        let app = router(state.clone(), 1024 * 1024);

        app.clone().oneshot(upload_request("one.pdf", "application/pdf", "first")).await.unwrap();
        let response = app.oneshot(upload_request("two.pdf", "application/pdf", "second")).await.unwrap();

        let upload: UploadResponse = json_body(response).await;
        assert_eq!(upload.status, "ready");
        assert_eq!(state.session.lock().await.document_text(), Some("second doc"));
    }

    #[tokio::test]
    async fn non_pdf_upload_is_rejected() {
        let (state, _) = state_with(ScriptedChatClient::replying(&[]), FakeExtractor::default());
        let app = router(state.clone(), 1024 * 1024);

        let response = app.oneshot(upload_request("photo.png", "image/png", "png")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(!state.session.lock().await.document_ready());
    }

    #[tokio::test]
    async fn unreadable_pdf_reports_error_and_keeps_state() {
        let extractor = FakeExtractor::default().with("junk", Err("invalid file header"));
        let (state, _) = state_with(ScriptedChatClient::replying(&[]), extractor);
        let app = router(state.clone(), 1024 * 1024);

        let response = app.oneshot(upload_request("scan.pdf", "application/pdf", "junk")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = json_body(response).await;
        assert!(body["error"].as_str().unwrap().starts_with("Error reading PDF:"));
        assert!(!state.session.lock().await.document_ready());
    }

    #[tokio::test]
    async fn new_chat_clears_session() {
        let extractor = FakeExtractor::default().with("pdf-bytes", Ok("Height: 90cm"));
        let (state, _) = state_with(ScriptedChatClient::replying(&["ok"]), extractor);
        let app = router(state.clone(), 1024 * 1024);
        app.clone()
            .oneshot(upload_request("growth_chart.pdf", "application/pdf", "pdf-bytes")).await
            .unwrap();
        app.clone().oneshot(chat_request("hi")).await.unwrap();

        let request = Request::builder().method("POST").uri("/api/new-chat").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        let view: SessionView = json_body(response).await;
        assert!(view.messages.is_empty());
        assert!(!view.document_ready);
        assert!(state.session.lock().await.document_text().is_none());
    }

    #[tokio::test]
    async fn completion_failure_maps_to_bad_gateway() {
        let (state, _) = state_with(ScriptedChatClient::failing("connection refused"), FakeExtractor::default());
        let app = router(state, 1024 * 1024);

        let response = app.oneshot(chat_request("hello")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn blank_message_is_rejected() {
        let (state, client) = state_with(ScriptedChatClient::replying(&[]), FakeExtractor::default());
        let app = router(state, 1024 * 1024);

        let response = app.oneshot(chat_request("   ")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(client.last_request().is_empty());
    }
}
