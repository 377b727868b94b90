//! REST implementation of [`GenerativeService`] against the Gemini `v1beta` API.

use super::error::ServiceError;
use super::types::{
    ApiErrorEnvelope, GenerateContentRequest, GenerateContentResponse, ListModelsResponse,
    ModelInfo, RemoteFile, UploadResponse,
};
use super::GenerativeService;
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const API_VERSION: &str = "v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";
const MODELS_PAGE_SIZE: &str = "1000";

/// Gemini API client.
///
/// Holds a single `reqwest::Client` (connection pool) and the credential for
/// one workflow. The key is sent as a header, never as a query parameter, so
/// it does not end up in request logs.
pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: SecretString,
}

impl GeminiClient {
    pub fn new(
        api_base: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("meeting-minutes-backend/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.api_base, API_VERSION, path)
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/{}/files", self.api_base, API_VERSION)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(API_KEY_HEADER, self.api_key.expose_secret())
    }

    /// Turn a non-2xx response into `ServiceError::Api`, preferring the
    /// message from the JSON error envelope over the raw body.
    async fn check_status(response: Response) -> Result<Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
            .ok()
            .map(|envelope| envelope.error.message)
            .filter(|message| !message.is_empty())
            .unwrap_or(body);

        Err(ServiceError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
        let response = Self::check_status(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ServiceError::Decode(e.to_string()))
    }
}

/// `gemini-1.5-flash` and `models/gemini-1.5-flash` name the same model.
fn qualified_model(model: &str) -> String {
    if model.starts_with("models/") || model.starts_with("tunedModels/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

#[async_trait]
impl GenerativeService for GeminiClient {
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ServiceError> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(self.url("models"))
                .query(&[("pageSize", MODELS_PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: ListModelsResponse = Self::decode(self.authorized(request).send().await?).await?;
            models.extend(page.models);

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = models.len(), "Listed remote models");
        Ok(models)
    }

    /// Resumable upload: one request opens the session, a second sends the
    /// bytes and finalizes it.
    async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFile, ServiceError> {
        let bytes = tokio::fs::read(path).await?;

        let start = self
            .authorized(self.http.post(self.upload_url()))
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;
        let start = Self::check_status(start).await?;

        let session_url = start
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or(ServiceError::MissingUploadUrl)?;

        debug!(bytes = bytes.len(), mime_type, "Upload session opened");

        let response = self
            .authorized(self.http.post(&session_url))
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await?;

        let uploaded: UploadResponse = Self::decode(response).await?;
        Ok(uploaded.file)
    }

    async fn get_file(&self, name: &str) -> Result<RemoteFile, ServiceError> {
        let request = self.authorized(self.http.get(self.url(name)));
        Self::decode(request.send().await?).await
    }

    async fn generate_content(
        &self,
        model: &str,
        file: &RemoteFile,
        prompt: &str,
    ) -> Result<String, ServiceError> {
        let endpoint = self.url(&format!("{}:generateContent", qualified_model(model)));
        let body = GenerateContentRequest::for_file(file, prompt);

        let request = self.authorized(self.http.post(endpoint)).json(&body);
        let response: GenerateContentResponse = Self::decode(request.send().await?).await?;

        response
            .text()
            .ok_or_else(|| ServiceError::Decode(response.empty_reason()))
    }

    async fn delete_file(&self, name: &str) -> Result<(), ServiceError> {
        let request = self.authorized(self.http.delete(self.url(name)));
        Self::check_status(request.send().await?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::FileState;
    use mockito::{Matcher, Server};

    fn client_for(server: &Server) -> GeminiClient {
        GeminiClient::new(
            server.url(),
            SecretString::from("test-key".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_qualified_model() {
        assert_eq!(qualified_model("gemini-1.5-flash"), "models/gemini-1.5-flash");
        assert_eq!(qualified_model("models/gemini-1.5-pro"), "models/gemini-1.5-pro");
    }

    #[tokio::test]
    async fn test_list_models_follows_pagination() {
        let mut server = Server::new_async().await;

        let first = server
            .mock("GET", "/v1beta/models")
            .match_header(API_KEY_HEADER, "test-key")
            .match_query(Matcher::Exact("pageSize=1000".into()))
            .with_status(200)
            .with_body(
                r#"{"models": [{"name": "models/gemini-1.5-pro", "supportedGenerationMethods": ["generateContent"]}],
                    "nextPageToken": "page-2"}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/v1beta/models")
            .match_query(Matcher::Exact("pageSize=1000&pageToken=page-2".into()))
            .with_status(200)
            .with_body(
                r#"{"models": [{"name": "models/text-embedding-004", "supportedGenerationMethods": ["embedContent"]}]}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let models = client_for(&server).list_models().await.unwrap();

        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "models/gemini-1.5-pro");
        assert_eq!(models[1].name, "models/text-embedding-004");
        second.assert_async().await;
        first.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_message_is_extracted() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v1beta/models")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}}"#)
            .create_async()
            .await;

        let err = client_for(&server).list_models().await.unwrap_err();

        match &err {
            ServiceError::Api { status, message } => {
                assert_eq!(*status, 400);
                assert_eq!(message, "API key not valid.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_auth_failure());
    }

    #[tokio::test]
    async fn test_resumable_upload() {
        let mut server = Server::new_async().await;
        let session_url = format!("{}/upload-session/42", server.url());

        let start = server
            .mock("POST", "/upload/v1beta/files")
            .match_header("x-goog-upload-protocol", "resumable")
            .match_header("x-goog-upload-command", "start")
            .match_header("x-goog-upload-header-content-length", "5")
            .match_header("x-goog-upload-header-content-type", "audio/mpeg")
            .with_status(200)
            .with_header(UPLOAD_URL_HEADER, &session_url)
            .create_async()
            .await;
        let finalize = server
            .mock("POST", "/upload-session/42")
            .match_header("x-goog-upload-command", "upload, finalize")
            .match_body("audio")
            .with_status(200)
            .with_body(
                r#"{"file": {"name": "files/abc", "mimeType": "audio/mpeg",
                    "uri": "https://example.test/v1beta/files/abc", "state": "PROCESSING"}}"#,
            )
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("standup.mp3");
        std::fs::write(&path, b"audio").unwrap();

        let file = client_for(&server)
            .upload_file(&path, "audio/mpeg", "standup.mp3")
            .await
            .unwrap();

        assert_eq!(file.name, "files/abc");
        assert_eq!(file.state, FileState::Processing);
        start.assert_async().await;
        finalize.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_without_session_url_fails() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/upload/v1beta/files")
            .with_status(200)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("standup.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let err = client_for(&server)
            .upload_file(&path, "audio/wav", "standup.wav")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::MissingUploadUrl));
    }

    #[tokio::test]
    async fn test_get_and_delete_file() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v1beta/files/abc")
            .with_status(200)
            .with_body(r#"{"name": "files/abc", "state": "ACTIVE"}"#)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/v1beta/files/abc")
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let file = client.get_file("files/abc").await.unwrap();
        assert_eq!(file.state, FileState::Active);

        client.delete_file("files/abc").await.unwrap();
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_content() {
        let mut server = Server::new_async().await;
        let generate = server
            .mock("POST", "/v1beta/models/gemini-1.5-flash:generateContent")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "contents": [{"parts": [
                    {"fileData": {"mimeType": "audio/mpeg", "fileUri": "https://example.test/v1beta/files/abc"}},
                    {"text": "Write the minutes"}
                ]}]
            })))
            .with_status(200)
            .with_body(r#"{"candidates": [{"content": {"parts": [{"text": "1. Basic Information"}]}}]}"#)
            .expect(1)
            .create_async()
            .await;

        let file = RemoteFile {
            name: "files/abc".to_string(),
            display_name: "standup.mp3".to_string(),
            mime_type: "audio/mpeg".to_string(),
            uri: "https://example.test/v1beta/files/abc".to_string(),
            state: FileState::Active,
            error: None,
        };

        let text = client_for(&server)
            .generate_content("gemini-1.5-flash", &file, "Write the minutes")
            .await
            .unwrap();

        assert_eq!(text, "1. Basic Information");
        generate.assert_async().await;
    }
}
