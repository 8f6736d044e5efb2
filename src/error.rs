//! Error types for location tracking.
//!
//! All errors implement `std::error::Error` and carry enough context to decide
//! whether an operation can be retried.
//!
//! ## Error Categories
//!
//! - **Backend Errors**: a positioning backend refused a request or went away
//! - **Exhaustion**: both the primary and the fallback source have failed
//! - **Enrichment Errors**: reverse geocoding failed (never fatal)
//! - **Record Errors**: a persisted location record could not be decoded
//! - **Configuration Errors**: invalid or unreadable configuration
//! - **Precondition Errors**: the API was misused (e.g. no geocoder configured)
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use locus::LocationError;
//!
//! let error = LocationError::backend_failed("fused service disconnected");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::backend::BackendFailure;
use crate::types::SourceRole;

/// Result type alias for location operations.
pub type Result<T, E = LocationError> = std::result::Result<T, E>;

/// Main error type for location operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LocationError {
    #[error("Positioning backend failed: {reason}")]
    Backend {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Location permission denied for {role} source")]
    PermissionDenied { role: SourceRole },

    #[error("All positioning sources failed: {reason}")]
    ProvidersExhausted { reason: String },

    #[error("Reverse geocoding failed: {message}")]
    Enrichment { message: String },

    #[error("Malformed location record: {details}")]
    Record { details: String },

    #[error("Configuration error in {context}: {details}")]
    Config { context: String, details: String },

    #[error("Configuration file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Precondition violated: {reason}")]
    Precondition { reason: String },

    #[error("Location driver has stopped")]
    DriverStopped,
}

impl LocationError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            LocationError::Backend { .. } => true,
            LocationError::Enrichment { .. } => true,
            LocationError::PermissionDenied { .. } => false,
            LocationError::ProvidersExhausted { .. } => false,
            LocationError::Record { .. } => false,
            LocationError::Config { .. } => false,
            LocationError::File { .. } => false,
            LocationError::Precondition { .. } => false,
            LocationError::DriverStopped => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            LocationError::Backend { .. } => vec![
                "Check that the positioning service is enabled",
                "Retry once the backend reports a connection",
            ],
            LocationError::PermissionDenied { .. } => vec![
                "Grant a location permission to the application",
                "Ask the user to enable location services",
            ],
            LocationError::ProvidersExhausted { .. } => vec![
                "Recreate the location handle to supervise fresh sources",
                "Check device positioning settings",
            ],
            LocationError::Enrichment { .. } => vec![
                "Request an address update again later",
                "Check network connectivity of the geocoding service",
            ],
            LocationError::Record { .. } => vec![
                "Discard the stored record",
                "Wait for a fresh location fix",
            ],
            LocationError::Config { .. } => vec![
                "Check configuration values against the documented defaults",
                "Remove the offending key to fall back to its default",
            ],
            LocationError::File { .. } => vec![
                "Check the configuration file exists and is readable",
                "Check file permissions",
            ],
            LocationError::Precondition { .. } => vec![
                "Configure the missing collaborator when building the handle",
            ],
            LocationError::DriverStopped => vec![
                "Keep the location handle alive while using it",
                "Build a new handle",
            ],
        }
    }

    /// Helper constructor for backend failures.
    pub fn backend_failed(reason: impl Into<String>) -> Self {
        LocationError::Backend { reason: reason.into(), source: None }
    }

    /// Helper constructor for backend failures with source.
    pub fn backend_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        LocationError::Backend { reason: reason.into(), source: Some(source) }
    }

    /// Map a synchronous backend refusal for the source in `role`.
    pub fn from_backend_failure(role: SourceRole, failure: BackendFailure) -> Self {
        match failure {
            BackendFailure::PermissionDenied => LocationError::PermissionDenied { role },
            other => LocationError::backend_failed_with_source(
                format!("{} source request refused", role),
                Box::new(other),
            ),
        }
    }

    /// Helper constructor for exhausted supervisors.
    pub fn providers_exhausted(reason: impl Into<String>) -> Self {
        LocationError::ProvidersExhausted { reason: reason.into() }
    }

    /// Helper constructor for enrichment failures.
    pub fn enrichment_failed(message: impl Into<String>) -> Self {
        LocationError::Enrichment { message: message.into() }
    }

    /// Helper constructor for record decoding failures.
    pub fn malformed_record(details: impl Into<String>) -> Self {
        LocationError::Record { details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        LocationError::Config { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration file errors.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        LocationError::File { path, source }
    }

    /// Helper constructor for API misuse.
    pub fn precondition(reason: impl Into<String>) -> Self {
        LocationError::Precondition { reason: reason.into() }
    }
}

impl From<serde_yaml_ng::Error> for LocationError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        LocationError::Config { context: "yaml".to_string(), details: err.to_string() }
    }
}
