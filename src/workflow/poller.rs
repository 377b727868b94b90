//! Waiting for an uploaded file to become usable.
//!
//! The remote API processes audio asynchronously: right after upload the file is
//! usually `PROCESSING`. We re-read the handle with exponential backoff until it
//! turns `ACTIVE` or `FAILED`, giving up after a bounded number of checks, an
//! overall deadline, or a cancellation request.

use crate::config::PollingConfig;
use crate::error::SummaryError;
use crate::gemini::{FileState, GenerativeService, RemoteFile};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Backoff schedule for status checks.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    pub max_attempts: u32,
    pub timeout: Duration,
}

impl PollPolicy {
    /// Delay before the check numbered `attempt` (0-based), capped at `max_interval`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_interval.as_secs_f64()))
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&crate::config::AppConfig::default().polling)
    }
}

impl From<&PollingConfig> for PollPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self {
            initial_interval: Duration::from_millis(config.initial_interval_ms),
            multiplier: config.multiplier,
            max_interval: Duration::from_millis(config.max_interval_ms),
            max_attempts: config.max_attempts,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Poll `file` until it leaves the uploading/processing states.
///
/// The state carried by `file` itself is checked first, so an upload that is
/// already `ACTIVE` costs no extra request.
pub async fn wait_until_ready(
    service: &dyn GenerativeService,
    file: RemoteFile,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<RemoteFile, SummaryError> {
    let started = Instant::now();
    let mut current = file;
    let mut attempts: u32 = 0;

    while current.state.is_pending() {
        let timed_out = || SummaryError::PollTimeout {
            attempts,
            elapsed_secs: started.elapsed().as_secs(),
        };

        if attempts >= policy.max_attempts {
            return Err(timed_out());
        }
        let remaining = policy
            .timeout
            .checked_sub(started.elapsed())
            .filter(|left| !left.is_zero())
            .ok_or_else(timed_out)?;

        let delay = policy.delay_for(attempts).min(remaining);
        debug!(
            file = %current.name,
            state = %current.state,
            attempt = attempts + 1,
            delay_ms = delay.as_millis() as u64,
            "Remote file not ready, waiting"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(SummaryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }

        attempts += 1;
        let name = current.name.clone();
        current = tokio::select! {
            _ = cancel.cancelled() => return Err(SummaryError::Cancelled),
            result = service.get_file(&name) => result.map_err(|e| {
                SummaryError::Processing(format!("status check for {} failed: {}", name, e))
            })?,
        };
    }

    if current.state == FileState::Failed {
        let reason = current
            .error
            .as_ref()
            .map(|status| status.message.clone())
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| "the service could not process the recording".to_string());
        return Err(SummaryError::Processing(format!("{}: {}", current.name, reason)));
    }

    debug!(file = %current.name, checks = attempts, "Remote file active");
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::{MockGenerativeService, ServiceError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> PollPolicy {
        PollPolicy {
            initial_interval: Duration::from_millis(1),
            multiplier: 2.0,
            max_interval: Duration::from_millis(4),
            max_attempts: 5,
            timeout: Duration::from_secs(5),
        }
    }

    fn file(state: FileState) -> RemoteFile {
        RemoteFile {
            name: "files/abc".to_string(),
            display_name: String::new(),
            mime_type: "audio/mpeg".to_string(),
            uri: "https://example.test/v1beta/files/abc".to_string(),
            state,
            error: None,
        }
    }

    /// Mock whose `get_file` walks through `states` in order.
    fn service_with_states(states: Vec<FileState>) -> MockGenerativeService {
        let mut service = MockGenerativeService::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let expected = states.len();
        service
            .expect_get_file()
            .times(expected)
            .returning(move |_| {
                let i = calls.fetch_add(1, Ordering::SeqCst);
                Ok(file(states[i]))
            });
        service
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = PollPolicy {
            initial_interval: Duration::from_secs(2),
            multiplier: 2.0,
            max_interval: Duration::from_secs(10),
            max_attempts: 10,
            timeout: Duration::from_secs(60),
        };

        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(2), Duration::from_secs(8));
        assert_eq!(policy.delay_for(3), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = PollPolicy::default();
        assert_eq!(policy.initial_interval, Duration::from_secs(2));
        assert_eq!(policy.max_attempts, 60);
    }

    #[tokio::test]
    async fn test_active_upload_needs_no_polling() {
        let mut service = MockGenerativeService::new();
        service.expect_get_file().never();

        let ready = wait_until_ready(&service, file(FileState::Active), &fast_policy(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ready.state, FileState::Active);
    }

    #[tokio::test]
    async fn test_waits_until_active() {
        let service = service_with_states(vec![FileState::Processing, FileState::Active]);

        let ready = wait_until_ready(&service, file(FileState::Processing), &fast_policy(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ready.state, FileState::Active);
    }

    #[tokio::test]
    async fn test_failed_state_is_processing_error() {
        let service = service_with_states(vec![FileState::Processing, FileState::Failed]);

        let err = wait_until_ready(&service, file(FileState::Processing), &fast_policy(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SummaryError::Processing(_)));
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let service = service_with_states(vec![FileState::Processing; 5]);

        let err = wait_until_ready(&service, file(FileState::Processing), &fast_policy(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SummaryError::PollTimeout { attempts: 5, .. }));
    }

    #[tokio::test]
    async fn test_status_check_error_stops_polling() {
        let mut service = MockGenerativeService::new();
        service.expect_get_file().times(1).returning(|_| {
            Err(ServiceError::Api {
                status: 500,
                message: "backend error".to_string(),
            })
        });

        let err = wait_until_ready(&service, file(FileState::Uploading), &fast_policy(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SummaryError::Processing(_)));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_wait() {
        let mut service = MockGenerativeService::new();
        service.expect_get_file().never();

        let policy = PollPolicy {
            initial_interval: Duration::from_secs(30),
            max_interval: Duration::from_secs(30),
            ..fast_policy()
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = wait_until_ready(&service, file(FileState::Processing), &policy, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SummaryError::Cancelled));
    }
}
