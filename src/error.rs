//! Defines the application's primary error type `AppError` and a convenience `Result` alias.
//!
//! Uses the `thiserror` crate for ergonomic error definition and provides `From`
//! implementations to convert common external errors into `AppError` variants.
//! Errors that do not implement `Clone` are wrapped in `Arc` to allow `AppError` to be cloneable.
//!
//! Adapters never let an error cross their boundary (see `crate::adapters`): every
//! variant here except `ConfigurationFatal` is captured locally as diagnostics and
//! only surfaced for logging or test assertions. `ConfigurationFatal` is the sole
//! variant allowed to propagate to `main` and set a non-zero exit code.

use std::sync::Arc;
use thiserror::Error;

/// The primary error enumeration for all application-specific errors.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    /// A source adapter's HTTP call failed with a 5xx, a timeout, or a connection reset.
    /// Retried twice with linear back-off before being recorded as this variant.
    #[error("transient upstream error from {source_tag}: {message}")]
    TransientUpstream { source_tag: String, message: String },

    /// A satellite pixel failed the NASA-compliant quality filters (quality flag,
    /// cloud fraction, fill value, sign). Recorded for audit, never promoted to a value.
    #[error("quality filtered ({source_tag}): {reason}")]
    QualityFiltered { source_tag: String, reason: String },

    /// A ground-station search exhausted its maximum radius / grid without a result.
    #[error("no data in range for {source_tag}")]
    NoDataInRange { source_tag: String },

    /// A source reported units outside the conversion table; the value was dropped.
    #[error("unsupported unit '{unit}' for pollutant {pollutant}")]
    UnitUnsupported { pollutant: String, unit: String },

    /// AQI was computed on the current-hour fallback because the EPA averaging
    /// window did not meet its completeness rule.
    #[error("insufficient history for EPA averaging of {pollutant}")]
    InsufficientHistoryForEpa { pollutant: String },

    /// A database upsert failed validation or the connection dropped; retried once.
    #[error("persistence conflict: {0}")]
    PersistenceConflict(String),

    /// Missing DB coordinates, missing bearer token, or other unrecoverable
    /// start-up misconfiguration. The only variant that propagates to process exit.
    #[error("configuration error: {0}")]
    ConfigurationFatal(String),

    /// Error originating from an adapter's HTTP client (`reqwest`).
    #[error("API Error: {0}")]
    Api(Arc<reqwest::Error>),

    /// Error originating from database operations (`sqlx`).
    #[error("Database Error: {0}")]
    Db(Arc<sqlx::Error>),

    /// Error during JSON parsing (`serde_json`). Wrapped in Arc as serde_json::Error is not Clone.
    #[error("JSON Parsing Error: {0}")]
    JsonParse(Arc<serde_json::Error>),

    /// Error related to accessing environment variables.
    #[error("Environment Error: {0}")]
    Env(#[from] std::env::VarError),

    /// Error related to standard I/O operations.
    #[error("I/O Error: {0}")]
    Io(Arc<std::io::Error>),

    /// Error specific to CLI logic or argument handling.
    #[error("CLI Error: {0}")]
    Cli(String),

    /// Error originating from user interaction prompts (`dialoguer`).
    #[error("Dialoguer Error: {0}")]
    Dialoguer(Arc<dialoguer::Error>),

    /// Error related to progress bar style templating (`indicatif`).
    #[error("Progress Style Template Error: {0}")]
    Template(Arc<indicatif::style::TemplateError>),
}

/// A specialized `Result` type using the application's `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

// --- From implementations ---
// These allow easy conversion from external error types into AppError
// using the `?` operator. Arc is used for non-Clone error types.

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Api(Arc::new(err))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Db(Arc::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(Arc::new(err))
    }
}

impl From<dialoguer::Error> for AppError {
    fn from(err: dialoguer::Error) -> Self {
        AppError::Dialoguer(Arc::new(err))
    }
}

impl From<indicatif::style::TemplateError> for AppError {
    fn from(err: indicatif::style::TemplateError) -> Self {
        AppError::Template(Arc::new(err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::JsonParse(Arc::new(err))
    }
}
