//! Error taxonomy for the extraction pipeline.
//!
//! Each component owns a small error enum and converts foreign failures at its
//! boundary. The request-level [`PipelineError`] aggregates them so callers can
//! turn any failure into an [`ErrorPayload`](crate::models::ErrorPayload).
//!
//! | Failure | Type |
//! |---------|------|
//! | Login could not be confirmed | [`AuthError`] |
//! | Content landmark absent / navigation error | [`ExtractionError`] |
//! | Provider or transport error | [`SummarizationError`] / [`ApiError`] |
//! | Session missing required credentials | [`PipelineError::SessionExpired`] |
//! | API key rejected on session setup | [`CredentialError`] |
//!
//! An empty inbox scrape is not an error; see [`InboxScrape`](crate::models::InboxScrape).

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by the browser-automation adapter.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("webdriver transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("webdriver command `{command}` failed ({error}): {message}")]
    Command {
        command: String,
        error: String,
        message: String,
    },

    #[error("no element matches `{0}`")]
    NoSuchElement(String),

    #[error("malformed webdriver response: {0}")]
    Protocol(String),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// AuthenticationFailure: the authenticated marker never appeared.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login was not confirmed within {0:?}")]
    LoginTimeout(Duration),

    #[error("login is blocked on a two-factor verification step that was not completed within {0:?}")]
    TwoFactorRequired(Duration),

    #[error("login step `{step}` did not become available within {timeout:?}")]
    LoginStep {
        step: &'static str,
        timeout: Duration,
    },

    #[error("browser error during login: {0}")]
    Browser(#[from] BrowserError),
}

/// ExtractionFailure: the article page could not be turned into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("content landmark `{landmark}` not found at {url}")]
    LandmarkMissing { url: String, landmark: String },

    #[error("content landmark `{landmark}` at {url} has no text")]
    EmptyContent { url: String, landmark: String },

    #[error("failed to load {url}: {source}")]
    Navigation {
        url: String,
        #[source]
        source: BrowserError,
    },
}

/// Failure talking to the generative text API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider rejected the API key")]
    Unauthorized,

    #[error("rate limited by provider (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// SummarizationFailure.
#[derive(Debug, Error)]
pub enum SummarizationError {
    #[error("summarization request failed: {0}")]
    Api(#[from] ApiError),

    #[error("provider returned an empty summary")]
    EmptySummary,
}

/// Rejection of credentials handed to the credential store.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("an API key is required")]
    MissingApiKey,

    #[error("email and password must be provided together")]
    PartialLogin,

    #[error("API key validation failed: {0}")]
    InvalidApiKey(#[source] ApiError),
}

impl CredentialError {
    /// Payload tag shared by every rejected session setup.
    pub fn kind(&self) -> &'static str {
        "credentials_rejected"
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Request-level error surfaced by the operations in [`crate::pipeline`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("session expired: {0}")]
    SessionExpired(&'static str),

    #[error(transparent)]
    Authentication(#[from] AuthError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Summarization(#[from] SummarizationError),

    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Stable tag for the error field of a response payload.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::SessionExpired(_) => "session_expired",
            PipelineError::Authentication(AuthError::TwoFactorRequired(_)) => "two_factor_required",
            PipelineError::Authentication(_) => "authentication_failure",
            PipelineError::Extraction(_) => "extraction_failure",
            PipelineError::Summarization(_) => "summarization_failure",
            PipelineError::Browser(_) => "browser_failure",
            PipelineError::Config(_) => "config_error",
        }
    }
}
