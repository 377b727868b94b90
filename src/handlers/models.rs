//! # Model Diagnostics Handler
//!
//! ## Endpoint: `GET /api/v1/models`
//!
//! Lists the models visible to the resolved API key that can generate content,
//! and which one the selector would pick. Accepts `?api_key=...` for deployments
//! without a configured key. Useful for checking a key before uploading a
//! long recording.

use crate::credentials::resolve_credential;
use crate::error::{AppResult, SummaryError};
use crate::selector;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct ModelsQuery {
    pub api_key: Option<String>,
}

pub async fn list_models(
    state: web::Data<AppState>,
    query: web::Query<ModelsQuery>,
) -> AppResult<HttpResponse> {
    let config = state.get_config();
    let credential = resolve_credential(&state.secrets, query.api_key.as_deref())?;
    let service = state.build_client(&credential)?;

    let models = service
        .list_models()
        .await
        .map_err(SummaryError::ModelListing)?;
    let available = selector::generation_models(&models);
    let selected = if config.models.auto_detect {
        selector::select_model(&available, &config.models.priority).ok()
    } else {
        Some(config.models.default_model.clone())
    };

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "credential_source": credential.source.as_str(),
        "auto_detect": config.models.auto_detect,
        "priority": config.models.priority,
        "available": available,
        "selected": selected,
        "total_listed": models.len()
    })))
}
