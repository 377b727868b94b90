/// Failures talking to the generative-language API.
///
/// These are step-agnostic: the workflow wraps them into a `SummaryError`
/// variant naming the step that failed.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Unexpected response: {0}")]
    Decode(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Upload session URL missing from response")]
    MissingUploadUrl,
}

impl ServiceError {
    /// True when the API rejected the credential itself.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ServiceError::Api { status: 401 | 403, .. })
            || matches!(self, ServiceError::Api { status: 400, message } if message.contains("API key"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failure_detection() {
        let forbidden = ServiceError::Api { status: 403, message: "denied".to_string() };
        assert!(forbidden.is_auth_failure());

        let bad_key = ServiceError::Api {
            status: 400,
            message: "API key not valid. Please pass a valid API key.".to_string(),
        };
        assert!(bad_key.is_auth_failure());

        let server = ServiceError::Api { status: 500, message: "internal".to_string() };
        assert!(!server.is_auth_failure());
        assert!(!ServiceError::MissingUploadUrl.is_auth_failure());
    }
}
