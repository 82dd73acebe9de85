//! Error types for the pdf2records library.
//!
//! Two error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] — the request failed and no records are returned
//!   (bad input file, missing question, API rejected the call, reply could
//!   not be turned into records). Returned from the top-level `extract*`
//!   functions.
//!
//! * [`ParseError`] — the model answered, but its text does not contain a
//!   usable JSON array of objects. Returned directly by
//!   [`crate::pipeline::parse::parse_records`] and wrapped in
//!   [`ExtractError::Parse`] by the pipeline together with an excerpt of
//!   the raw reply.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the pdf2records pipeline.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The document was read, but is not a PDF.
    #[error("'{name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: Vec<u8> },

    /// The extraction question is empty or whitespace.
    #[error("Please enter a question: the extraction question is empty")]
    MissingQuestion,

    // ── API errors ────────────────────────────────────────────────────────
    /// No API key was configured.
    #[error("Model provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The API rejected the credentials (401/403) — retry will not help.
    #[error("Authentication error from '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// The API returned HTTP 429.
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimitExceeded {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// A single API call exceeded the per-call timeout.
    #[error("API call '{operation}' timed out after {secs}s")]
    ApiTimeout { operation: String, secs: u64 },

    /// Any other API failure.
    ///
    /// `status` is `None` for transport-level failures (connection reset,
    /// DNS, TLS) that never produced an HTTP response.
    #[error("API error{}: {message}", status_suffix(.status))]
    ApiError {
        status: Option<u16>,
        message: String,
        retryable: bool,
    },

    /// Every attempt failed; wraps the last error.
    #[error("'{operation}' failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        last_error: Box<ExtractError>,
    },

    /// The model answered with no text content at all.
    #[error("The model returned an empty response")]
    EmptyResponse,

    // ── Result errors ─────────────────────────────────────────────────────
    /// The model's answer could not be turned into records.
    #[error("Failed to parse JSON: {source}\nModel output began with: {raw_excerpt:?}")]
    Parse {
        #[source]
        source: ParseError,
        raw_excerpt: String,
    },

    /// The result has zero records, but the caller needs at least one.
    #[error("No records were extracted: the model returned an empty array")]
    NoRecords,

    // ── Store errors ──────────────────────────────────────────────────────
    /// A table or column name is not a plain SQL identifier.
    #[error("Invalid SQL identifier '{0}': use letters, digits and '_' only")]
    InvalidIdentifier(String),

    /// The relational store rejected an operation.
    #[error("Database error: {0}")]
    Store(#[from] rusqlite::Error),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl ExtractError {
    /// Whether another attempt at the same call could succeed.
    ///
    /// Rate limits, timeouts, 5xx and transport failures are transient;
    /// auth failures, other 4xx and everything local are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExtractError::RateLimitExceeded { .. } | ExtractError::ApiTimeout { .. } => true,
            ExtractError::ApiError { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Server-requested delay before the next attempt, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ExtractError::RateLimitExceeded {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

/// Why a model reply could not be turned into records.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ParseError {
    /// The payload is not syntactically valid JSON.
    #[error("payload is not valid JSON: {detail}")]
    InvalidJson { detail: String },

    /// The payload is valid JSON but not an array.
    #[error("expected a JSON array of objects, found {found}")]
    NotAnArray { found: String },

    /// An array element is not a JSON object.
    #[error("element {index} of the array is {found}, expected an object")]
    NotAnObject { index: usize, found: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_with_status() {
        let e = ExtractError::ApiError {
            status: Some(500),
            message: "overloaded".into(),
            retryable: true,
        };
        let msg = e.to_string();
        assert!(msg.contains("HTTP 500"), "got: {msg}");
        assert!(msg.contains("overloaded"));
    }

    #[test]
    fn api_error_display_without_status() {
        let e = ExtractError::ApiError {
            status: None,
            message: "connection reset".into(),
            retryable: true,
        };
        assert_eq!(e.to_string(), "API error: connection reset");
    }

    #[test]
    fn retryable_classification() {
        assert!(ExtractError::RateLimitExceeded {
            provider: "anthropic".into(),
            retry_after_secs: Some(3),
        }
        .is_retryable());
        assert!(ExtractError::ApiTimeout {
            operation: "messages".into(),
            secs: 5,
        }
        .is_retryable());
        assert!(!ExtractError::AuthError {
            provider: "anthropic".into(),
            detail: "invalid x-api-key".into(),
        }
        .is_retryable());
        assert!(!ExtractError::ApiError {
            status: Some(400),
            message: "bad request".into(),
            retryable: false,
        }
        .is_retryable());
        assert!(!ExtractError::MissingQuestion.is_retryable());
    }

    #[test]
    fn retry_after_only_for_rate_limit() {
        let e = ExtractError::RateLimitExceeded {
            provider: "anthropic".into(),
            retry_after_secs: Some(7),
        };
        assert_eq!(e.retry_after_secs(), Some(7));
        assert_eq!(ExtractError::EmptyResponse.retry_after_secs(), None);
    }

    #[test]
    fn parse_error_wraps_with_excerpt() {
        let e = ExtractError::Parse {
            source: ParseError::NotAnArray {
                found: "an object".into(),
            },
            raw_excerpt: "{\"a\": 1}".into(),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("Failed to parse JSON:"), "got: {msg}");
        assert!(msg.contains("an object"));
    }

    #[test]
    fn retries_exhausted_keeps_last_error() {
        let e = ExtractError::RetriesExhausted {
            operation: "messages".into(),
            attempts: 4,
            last_error: Box::new(ExtractError::ApiError {
                status: Some(529),
                message: "overloaded".into(),
                retryable: true,
            }),
        };
        let msg = e.to_string();
        assert!(msg.contains("4 attempts"));
        assert!(msg.contains("HTTP 529"));
    }
}
