//! # Key Resolver
//!
//! Finds the Gemini API key for a request.
//!
//! ## Sources (first non-empty wins):
//! 1. **Secrets store**: `GOOGLE_API_KEY` from `secrets.toml` (optional), overridden by
//!    the `GOOGLE_API_KEY` environment variable (a `.env` file works too, see `main.rs`).
//!    Loaded once at startup and shared through `AppState`.
//! 2. **Prompt**: the `api_key` field sent with the request, for deployments that
//!    have no secrets configured.
//!
//! If neither yields a value the request stops with `SummaryError::MissingCredential`
//! before anything is sent to the remote API.
//!
//! Keys are wrapped in `secrecy::SecretString` so they never show up in `Debug`
//! output or logs.

use crate::error::SummaryError;
use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use std::env;
use tracing::{debug, warn};

/// Name the key is stored under, both in `secrets.toml` and the environment.
pub const SECRET_KEY_NAME: &str = "GOOGLE_API_KEY";

/// Where a resolved credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    SecretsStore,
    Prompt,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::SecretsStore => "secrets_store",
            CredentialSource::Prompt => "prompt",
        }
    }
}

/// A non-empty API key plus where it came from.
#[derive(Debug)]
pub struct Credential {
    key: SecretString,
    pub source: CredentialSource,
}

impl Credential {
    pub fn secret(&self) -> SecretString {
        SecretString::from(self.key.expose_secret().to_owned())
    }
}

/// Process-wide secrets, loaded once and passed around explicitly.
#[derive(Debug, Default)]
pub struct SecretsStore {
    google_api_key: Option<SecretString>,
}

impl SecretsStore {
    /// Read `secrets.toml` (if present) and the environment.
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("secrets").required(false));

        if let Ok(value) = env::var(SECRET_KEY_NAME) {
            builder = builder.set_override(SECRET_KEY_NAME, value)?;
        }

        let settings = builder.build()?;
        // config may normalise key case depending on the source
        let value = settings
            .get_string(SECRET_KEY_NAME)
            .or_else(|_| settings.get_string(&SECRET_KEY_NAME.to_lowercase()))
            .ok();

        Ok(Self::from_value(value))
    }

    /// Build a store from an already-read value. Empty strings count as absent.
    pub fn from_value(value: Option<String>) -> Self {
        Self {
            google_api_key: value
                .filter(|key| !key.is_empty())
                .map(SecretString::from),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.google_api_key.is_some()
    }

    fn api_key(&self) -> Option<&SecretString> {
        self.google_api_key.as_ref()
    }
}

/// Resolve the credential for one request.
///
/// Any non-empty string is accepted as-is; whether the remote API accepts it is
/// discovered on the first remote call.
pub fn resolve_credential(
    store: &SecretsStore,
    prompt: Option<&str>,
) -> Result<Credential, SummaryError> {
    if let Some(key) = store.api_key() {
        debug!(source = "secrets_store", "API key resolved");
        return Ok(Credential {
            key: SecretString::from(key.expose_secret().to_owned()),
            source: CredentialSource::SecretsStore,
        });
    }

    match prompt {
        Some(value) if !value.is_empty() => {
            debug!(source = "prompt", "API key resolved");
            Ok(Credential {
                key: SecretString::from(value.to_owned()),
                source: CredentialSource::Prompt,
            })
        }
        _ => {
            warn!("No API key in the secrets store and none supplied with the request");
            Err(SummaryError::MissingCredential)
        }
    }
}
