//! # Summary REST API Handler
//!
//! ## Endpoint: `POST /api/v1/summaries`
//!
//! Multipart form with:
//! - `file` (required): the recording; `.mp3`, `.wav`, `.m4a` or `.aac` by default
//! - `api_key` (optional): used only when no key is configured on the server
//!
//! ## Response:
//! ```json
//! {
//!   "status": "success",
//!   "model": "models/gemini-1.5-flash",
//!   "file_name": "weekly-sync.m4a",
//!   "summary": "1. Basic Information ...",
//!   "stages": [{"stage": "idle", "elapsed_ms": 0}, ...],
//!   "elapsed_ms": 48211,
//!   "timestamp": "2025-01-01T12:00:00Z"
//! }
//! ```
//!
//! The workflow runs in its own task so that a client disconnecting mid-request
//! cannot skip the cleanup of the temp file and the remote upload.

use crate::credentials::{resolve_credential, Credential, CredentialSource};
use crate::error::{AppError, AppResult, SummaryError};
use crate::gemini::GenerativeService;
use crate::selector;
use crate::state::AppState;
use crate::workflow::{AudioUpload, SummaryWorkflow};
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures_util::stream::StreamExt;
use serde_json::json;
use tracing::{debug, info, warn};

const FILE_FIELD: &str = "file";
const API_KEY_FIELD: &str = "api_key";
const MAX_API_KEY_BYTES: usize = 4096;

/// Fields collected from the multipart body.
#[derive(Debug, Default)]
struct SummaryForm {
    upload: Option<AudioUpload>,
    api_key: Option<String>,
}

async fn read_field(field: &mut Field, limit: usize, what: &str) -> AppResult<Vec<u8>> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk =
            chunk.map_err(|e| AppError::BadRequest(format!("Failed to read {}: {}", what, e)))?;
        if bytes.len() + chunk.len() > limit {
            return Err(SummaryError::InvalidUpload(format!(
                "{} exceeds the {} byte limit",
                what, limit
            ))
            .into());
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

async fn parse_form(mut payload: Multipart, max_upload_bytes: usize) -> AppResult<SummaryForm> {
    let mut form = SummaryForm::default();

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;

        let content_disposition = field
            .content_disposition()
            .ok_or_else(|| AppError::BadRequest("Missing content disposition".to_string()))?;
        let field_name = content_disposition
            .get_name()
            .ok_or_else(|| AppError::BadRequest("Missing field name".to_string()))?
            .to_string();
        let file_name = content_disposition.get_filename().map(str::to_string);

        match field_name.as_str() {
            FILE_FIELD => {
                let file_name = file_name.ok_or_else(|| {
                    AppError::ValidationError("The file field has no file name".to_string())
                })?;
                let bytes = read_field(&mut field, max_upload_bytes, "recording").await?;
                form.upload = Some(AudioUpload::new(file_name, bytes));
            }
            API_KEY_FIELD => {
                let bytes = read_field(&mut field, MAX_API_KEY_BYTES, "api_key").await?;
                let key = String::from_utf8(bytes).map_err(|_| {
                    AppError::ValidationError("api_key is not valid UTF-8".to_string())
                })?;
                form.api_key = Some(key);
            }
            other => {
                warn!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    Ok(form)
}

/// Model for this request: cached for the secrets-store key, detected otherwise.
async fn model_for(
    state: &AppState,
    service: &dyn GenerativeService,
    credential: &Credential,
) -> Result<String, SummaryError> {
    let config = state.get_config();
    let shared_key = credential.source == CredentialSource::SecretsStore;

    if shared_key {
        if let Some(model) = state.cached_model() {
            return Ok(model);
        }
    }

    let model = selector::resolve_model(service, &config.models).await?;
    if shared_key {
        state.cache_model(model.clone());
    }
    Ok(model)
}

pub async fn create_summary(
    state: web::Data<AppState>,
    payload: Multipart,
) -> AppResult<HttpResponse> {
    let config = state.get_config();
    let form = parse_form(payload, config.max_upload_bytes()).await?;

    let upload = form.upload.ok_or_else(|| {
        AppError::ValidationError(format!("Missing '{}' field with the recording", FILE_FIELD))
    })?;
    if upload.bytes.is_empty() {
        return Err(SummaryError::InvalidUpload(format!("'{}' is empty", upload.file_name)).into());
    }
    let format = upload.format(&config.upload.allowed_extensions)?;

    let credential = resolve_credential(&state.secrets, form.api_key.as_deref())?;

    let session = state
        .begin_session(config.performance.max_concurrent_sessions)
        .ok_or_else(|| {
            AppError::Busy("Another recording is being summarized, try again later".to_string())
        })?;

    let service = state.build_client(&credential)?;
    let model = model_for(&state, service.as_ref(), &credential).await?;

    info!(
        file = %upload.file_name,
        format = %format,
        bytes = upload.size_bytes(),
        credential = credential.source.as_str(),
        model = %model,
        "Summary requested"
    );

    let workflow = SummaryWorkflow::new(service, model, &config, state.shutdown.child_token());
    let outcome = tokio::spawn(async move {
        let _session = session;
        workflow.run(upload).await
    })
    .await
    .map_err(|e| AppError::Internal(format!("Summary task failed: {}", e)))?;

    state.record_summary(outcome.is_ok());
    let report = outcome.map_err(|failure| {
        debug!(stages = ?failure.stages, "Failed workflow stage trail");
        AppError::from(failure)
    })?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "model": report.model,
        "file_name": report.file_name,
        "summary": report.summary,
        "stages": report.stages,
        "elapsed_ms": report.elapsed_ms,
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::credentials::SecretsStore;
    use actix_web::{http::StatusCode, test, App};
    use mockito::{Matcher, Server};

    const BOUNDARY: &str = "meeting-minutes-test-boundary";

    enum Part<'a> {
        File(&'a str, &'a [u8]),
        Text(&'a str, &'a str),
    }

    fn multipart(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                Part::File(name, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n",
                            name
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                }
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                            .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn post(state: AppState, parts: &[Part<'_>]) -> (StatusCode, serde_json::Value) {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/api/v1/summaries", web::post().to(create_summary)),
        )
        .await;

        let request = test::TestRequest::post()
            .uri("/api/v1/summaries")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(multipart(parts))
            .to_request();

        let response = test::call_service(&app, request).await;
        let status = response.status();
        let body: serde_json::Value = test::read_body_json(response).await;
        (status, body)
    }

    fn state_with(config: AppConfig, key: Option<&str>) -> AppState {
        AppState::new(config, SecretsStore::from_value(key.map(str::to_string)))
    }

    #[actix_web::test]
    async fn test_rejects_unsupported_extension() {
        let state = state_with(AppConfig::default(), Some("store-key"));
        let (status, body) = post(state, &[Part::File("agenda.pdf", b"%PDF")]).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "invalid_upload");
    }

    #[actix_web::test]
    async fn test_missing_key_halts_before_remote_calls() {
        let state = state_with(AppConfig::default(), None);
        let (status, body) = post(state, &[Part::File("standup.mp3", b"ID3")]).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["type"], "missing_credential");
    }

    #[actix_web::test]
    async fn test_busy_when_all_slots_taken() {
        let state = state_with(AppConfig::default(), Some("store-key"));
        let _running = state.begin_session(1).unwrap();

        let (status, body) = post(state.clone(), &[Part::File("standup.mp3", b"ID3")]).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["type"], "busy");
    }

    #[actix_web::test]
    async fn test_prompted_key_is_sent_and_listing_failure_reported() {
        let mut server = Server::new_async().await;
        let listing = server
            .mock("GET", "/v1beta/models")
            .match_header("x-goog-api-key", "typed-key")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error": {"code": 400, "message": "API key not valid."}}"#)
            .expect(1)
            .create_async()
            .await;

        let mut config = AppConfig::default();
        config.gemini.api_base = server.url();
        let state = state_with(config, None);

        let (status, body) = post(
            state.clone(),
            &[
                Part::Text("api_key", "typed-key"),
                Part::File("standup.mp3", b"ID3"),
            ],
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["type"], "model_listing");
        assert_eq!(state.get_metrics_snapshot().active_sessions, 0);
        listing.assert_async().await;
    }

    #[actix_web::test]
    async fn test_summary_end_to_end() {
        let mut server = Server::new_async().await;
        let session_url = format!("{}/upload-session/1", server.url());

        let listing = server
            .mock("GET", "/v1beta/models")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"models": [
                    {"name": "models/embedding-001", "supportedGenerationMethods": ["embedContent"]},
                    {"name": "models/gemini-1.5-pro", "supportedGenerationMethods": ["generateContent"]}
                ]}"#,
            )
            .expect(1)
            .create_async()
            .await;
        server
            .mock("POST", "/upload/v1beta/files")
            .with_status(200)
            .with_header("x-goog-upload-url", &session_url)
            .create_async()
            .await;
        server
            .mock("POST", "/upload-session/1")
            .with_status(200)
            .with_body(
                r#"{"file": {"name": "files/rec1", "mimeType": "audio/mpeg",
                    "uri": "https://example.test/v1beta/files/rec1", "state": "ACTIVE"}}"#,
            )
            .create_async()
            .await;
        let generate = server
            .mock("POST", "/v1beta/models/gemini-1.5-pro:generateContent")
            .with_status(200)
            .with_body(r#"{"candidates": [{"content": {"parts": [{"text": "1. Basic Information\n..."}]}}]}"#)
            .expect(1)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/v1beta/files/rec1")
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        let mut config = AppConfig::default();
        config.gemini.api_base = server.url();
        let state = state_with(config, Some("store-key"));

        let (status, body) = post(state.clone(), &[Part::File("standup.mp3", b"ID3 audio")]).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["model"], "models/gemini-1.5-pro");
        assert_eq!(body["summary"], "1. Basic Information\n...");
        assert_eq!(body["stages"].as_array().map(Vec::len), Some(6));
        assert_eq!(state.cached_model().as_deref(), Some("models/gemini-1.5-pro"));
        assert_eq!(state.get_metrics_snapshot().summaries_completed, 1);

        listing.assert_async().await;
        generate.assert_async().await;
        delete.assert_async().await;
    }
}
