//! # Gemini Generative-Language Client
//!
//! The remote service boundary of the summary pipeline. The workflow and the
//! model selector only ever talk to the [`GenerativeService`] trait; the REST
//! implementation lives in `client.rs` and tests substitute a mock.
//!
//! ## Operations consumed:
//! - **list_models**: which models exist and what they can do
//! - **upload_file**: push the recording, receive a remote file handle
//! - **get_file**: re-read the handle to follow its processing state
//! - **generate_content**: one prompt over the uploaded file
//! - **delete_file**: drop the remote copy once we are done

pub mod client;
pub mod error;
pub mod types;

pub use client::GeminiClient;
pub use error::ServiceError;
pub use types::{FileState, ModelInfo, RemoteFile};

use async_trait::async_trait;
use std::path::Path;

/// Abstraction over the hosted generative-language API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerativeService: Send + Sync {
    /// Every model visible to the credential, in the order the service returned them.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ServiceError>;

    /// Upload a local file; the returned handle is usually still processing.
    async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFile, ServiceError>;

    /// Fetch the current state of a remote file handle.
    async fn get_file(&self, name: &str) -> Result<RemoteFile, ServiceError>;

    /// Run the prompt over the file and return the generated text.
    async fn generate_content(
        &self,
        model: &str,
        file: &RemoteFile,
        prompt: &str,
    ) -> Result<String, ServiceError>;

    /// Delete a remote file handle.
    async fn delete_file(&self, name: &str) -> Result<(), ServiceError>;
}
