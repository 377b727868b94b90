//! # Application State Management
//!
//! Shared state handed to every HTTP request handler through `web::Data`.
//!
//! ## What lives here:
//! - **config**: The validated `AppConfig`, read by every handler
//! - **secrets**: The secrets store (API key), loaded once at startup
//! - **selected_model**: Model chosen for the secrets-store key, detected once and reused
//! - **metrics**: Request and workflow counters for `/metrics` and `/health`
//! - **shutdown**: Cancelled when the server stops so running workflows end early
//!
//! ## Arc<RwLock<T>> Pattern
//! Every mutable piece is an `Arc<RwLock<T>>`: many handlers hold a reference, many
//! may read at once, one may write. Lock poisoning is tolerated: a handler that
//! panicked while holding a metrics lock must not take the whole server down.

use crate::config::AppConfig;
use crate::credentials::{Credential, SecretsStore};
use crate::error::AppError;
use crate::gemini::{GeminiClient, GenerativeService};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// State shared by all handlers. Cloning is cheap: every field is a handle.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<RwLock<AppConfig>>,
    pub secrets: Arc<SecretsStore>,
    /// Model picked for the secrets-store key. Keys typed in per request are
    /// never cached here because each may see a different model list.
    pub selected_model: Arc<RwLock<Option<String>>>,
    pub metrics: Arc<RwLock<AppMetrics>>,
    pub shutdown: CancellationToken,
    pub start_time: Instant,
}

/// Counters collected across all HTTP requests and summary runs.
#[derive(Debug, Default)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    /// Summary workflows currently running
    pub active_sessions: u32,
    pub summaries_completed: u64,
    pub summaries_failed: u64,
    /// Key: "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Per-endpoint request statistics.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

/// Holds one workflow slot. The slot is given back when the guard is dropped,
/// including when the request future is dropped mid-flight.
#[derive(Debug)]
pub struct SessionGuard {
    metrics: Arc<RwLock<AppMetrics>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.active_sessions = metrics.active_sessions.saturating_sub(1);
    }
}

impl AppState {
    pub fn new(config: AppConfig, secrets: SecretsStore) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            secrets: Arc::new(secrets),
            selected_model: Arc::new(RwLock::new(None)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            shutdown: CancellationToken::new(),
            start_time: Instant::now(),
        }
    }

    fn metrics_read(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn metrics_write(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current configuration; the lock is released immediately.
    pub fn get_config(&self) -> AppConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn cached_model(&self) -> Option<String> {
        self.selected_model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn cache_model(&self, model: impl Into<String>) {
        *self
            .selected_model
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(model.into());
    }

    /// REST client for the given credential, configured from `[gemini]`.
    pub fn build_client(
        &self,
        credential: &Credential,
    ) -> Result<Arc<dyn GenerativeService>, AppError> {
        let config = self.get_config();
        let client = GeminiClient::new(
            config.gemini.api_base.clone(),
            credential.secret(),
            config.request_timeout(),
        )
        .map_err(|e| AppError::Internal(format!("Failed to build API client: {}", e)))?;

        Ok(Arc::new(client))
    }

    /// Claim a workflow slot, or `None` when `max` workflows are already running.
    pub fn begin_session(&self, max: usize) -> Option<SessionGuard> {
        let mut metrics = self.metrics_write();
        if metrics.active_sessions as usize >= max {
            return None;
        }
        metrics.active_sessions += 1;

        Some(SessionGuard {
            metrics: Arc::clone(&self.metrics),
        })
    }

    pub fn increment_request_count(&self) {
        self.metrics_write().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics_write().error_count += 1;
    }

    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_write();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    pub fn record_summary(&self, succeeded: bool) {
        let mut metrics = self.metrics_write();
        if succeeded {
            metrics.summaries_completed += 1;
        } else {
            metrics.summaries_failed += 1;
        }
    }

    /// Consistent copy of the metrics, so no lock is held while serializing.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics_read();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_sessions: metrics.active_sessions,
            summaries_completed: metrics.summaries_completed,
            summaries_failed: metrics.summaries_failed,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of failed requests, 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
