//! # Model Selector
//!
//! Picks the model that will write the minutes.
//!
//! ## Selection rules (auto-detect):
//! 1. List every model the credential can see
//! 2. Keep the ones advertising `generateContent`
//! 3. Take the first entry of the priority list that is in that set
//! 4. Otherwise take the first available model, in the order the service listed them
//! 5. Nothing available → `SummaryError::NoModelAvailable`
//!
//! Step 4 depends on the listing order, which the API does not promise to keep
//! stable between calls. The fallback is therefore not reproducible across runs;
//! pin the model (`models.auto_detect = false`) when that matters.

use crate::config::ModelsConfig;
use crate::error::SummaryError;
use crate::gemini::{GenerativeService, ModelInfo};
use tracing::{info, warn};

/// Names of the models that can generate content, in service order.
pub fn generation_models(models: &[ModelInfo]) -> Vec<String> {
    models
        .iter()
        .filter(|model| model.supports_generate_content())
        .map(|model| model.name.clone())
        .collect()
}

/// Pure selection over an already-filtered list.
pub fn select_model(available: &[String], priority: &[String]) -> Result<String, SummaryError> {
    if let Some(preferred) = priority
        .iter()
        .find(|candidate| available.iter().any(|name| name == *candidate))
    {
        return Ok(preferred.clone());
    }

    available
        .first()
        .cloned()
        .ok_or(SummaryError::NoModelAvailable)
}

/// Ask the service what is available and pick from it.
pub async fn detect_model(
    service: &dyn GenerativeService,
    priority: &[String],
) -> Result<String, SummaryError> {
    let models = service.list_models().await.map_err(|e| {
        if e.is_auth_failure() {
            warn!(error = %e, "The service rejected the API key");
        }
        SummaryError::ModelListing(e)
    })?;
    let available = generation_models(&models);

    let selected = select_model(&available, priority)?;
    if !priority.contains(&selected) {
        warn!(
            model = %selected,
            available = available.len(),
            "No preferred model available, falling back to the first listed model"
        );
    }

    info!(model = %selected, available = available.len(), "Model selected");
    Ok(selected)
}

/// Honour `models.auto_detect`: detect, or use the pinned model without a remote call.
pub async fn resolve_model(
    service: &dyn GenerativeService,
    config: &ModelsConfig,
) -> Result<String, SummaryError> {
    if config.auto_detect {
        detect_model(service, &config.priority).await
    } else {
        info!(model = %config.default_model, "Using pinned model");
        Ok(config.default_model.clone())
    }
}
