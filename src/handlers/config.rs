use crate::{error::AppResult, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// `GET /api/v1/config`: effective configuration. The API key is never part of
/// `AppConfig`; only whether one is configured is reported.
pub async fn get_config(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "credential": {
            "configured": state.secrets.has_api_key()
        },
        "selected_model": state.cached_model(),
        "config": config
    })))
}
