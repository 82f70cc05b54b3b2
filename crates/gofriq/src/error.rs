//! Error taxonomy for the gofr-iq workspace.
//!
//! Every service error maps to a stable code that the tool surface returns
//! in its response envelope, plus an optional recovery hint for callers.

use thiserror::Error;

/// Errors raised anywhere in the ingestion, storage or retrieval pipeline.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No auth token was supplied for a tool that requires one.
    #[error("Authentication required: {0}")]
    AuthRequired(String),

    /// An admin-only operation was attempted without the admin group.
    #[error("Admin access required: {0}")]
    AdminRequired(String),

    /// The source exists but cannot be used for this ingest (inactive,
    /// wrong group).
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    /// The referenced source does not exist.
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// Document content exceeds the word-count ceiling.
    #[error("Word count {count} exceeds maximum {max}")]
    WordCountExceeded { count: usize, max: usize },

    /// Input failed shape or range validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The referenced document does not exist in any searched group.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// The document exists but belongs to a group the caller cannot read.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The language model returned JSON that does not conform to the
    /// extraction schema.
    #[error("Extraction parse error: {0}")]
    ExtractionParse(String),

    /// Ingest failed after the commit point; compensating rollback has run.
    #[error("Ingest failed: {0}")]
    Ingest(String),

    /// Graph backend failure.
    #[error("Graph error: {0}")]
    Graph(String),

    /// Vector backend failure.
    #[error("Vector index error: {0}")]
    Vector(String),

    /// Language-model provider failure.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Provider asked us to back off.
    #[error("Rate limited, retry after {retry_after:?}s")]
    RateLimited { retry_after: Option<f64> },

    /// A required configuration key is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File store failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Unclassified internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable error code surfaced in the tool-call envelope.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::AuthRequired(_) => "AUTH_REQUIRED",
            Error::AdminRequired(_) => "ADMIN_REQUIRED",
            Error::InvalidSource(_) => "INVALID_SOURCE",
            Error::SourceNotFound(_) => "SOURCE_NOT_FOUND",
            Error::WordCountExceeded { .. } => "WORD_COUNT_EXCEEDED",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
            Error::AccessDenied(_) => "ACCESS_DENIED",
            Error::ExtractionParse(_) => "EXTRACTION_PARSE_ERROR",
            Error::Ingest(_) => "INGEST_ERROR",
            Error::Graph(_) => "GRAPH_ERROR",
            Error::Vector(_) => "VECTOR_ERROR",
            Error::Llm(_) | Error::RateLimited { .. } => "LLM_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Store(_) | Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Human-oriented hint on how a caller might recover.
    #[must_use]
    pub fn recovery_strategy(&self) -> Option<&'static str> {
        match self {
            Error::AuthRequired(_) => Some("Supply a bearer token in auth_tokens"),
            Error::AdminRequired(_) => Some("Use a token carrying the admin group"),
            Error::InvalidSource(_) | Error::SourceNotFound(_) => {
                Some("Verify the source_id with list_sources and that it belongs to your write group")
            }
            Error::WordCountExceeded { .. } => Some("Split the document and ingest the parts separately"),
            Error::DocumentNotFound(_) => Some("Check the doc_id, or pass a date_hint to narrow the search"),
            Error::AccessDenied(_) => Some("Request a token for the owning group"),
            Error::Ingest(_) => Some("The ingest was rolled back; it is safe to retry"),
            Error::RateLimited { .. } => Some("Back off and retry after the indicated delay"),
            Error::Graph(_) | Error::Vector(_) | Error::Llm(_) => {
                Some("Check backend connectivity with health_check and retry")
            }
            Error::Config(_) => Some("Set the missing GOFR_IQ_* environment variable"),
            _ => None,
        }
    }

    /// Build a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Build a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Build a graph backend error.
    pub fn graph(msg: impl Into<String>) -> Self {
        Error::Graph(msg.into())
    }

    /// Build a vector backend error.
    pub fn vector(msg: impl Into<String>) -> Self {
        Error::Vector(msg.into())
    }

    /// Build an LLM provider error.
    pub fn llm(msg: impl Into<String>) -> Self {
        Error::Llm(msg.into())
    }

    /// Build a file-store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }

    /// Build an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}

/// Result type used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(Error::AuthRequired(String::new()).error_code(), "AUTH_REQUIRED");
        assert_eq!(Error::AdminRequired(String::new()).error_code(), "ADMIN_REQUIRED");
        assert_eq!(Error::InvalidSource(String::new()).error_code(), "INVALID_SOURCE");
        assert_eq!(Error::SourceNotFound(String::new()).error_code(), "SOURCE_NOT_FOUND");
        assert_eq!(
            Error::WordCountExceeded { count: 30_000, max: 20_000 }.error_code(),
            "WORD_COUNT_EXCEEDED"
        );
        assert_eq!(Error::Validation(String::new()).error_code(), "VALIDATION_ERROR");
        assert_eq!(Error::DocumentNotFound(String::new()).error_code(), "DOCUMENT_NOT_FOUND");
        assert_eq!(Error::AccessDenied(String::new()).error_code(), "ACCESS_DENIED");
        assert_eq!(Error::ExtractionParse(String::new()).error_code(), "EXTRACTION_PARSE_ERROR");
        assert_eq!(Error::Ingest(String::new()).error_code(), "INGEST_ERROR");
        assert_eq!(Error::Graph(String::new()).error_code(), "GRAPH_ERROR");
        assert_eq!(Error::Vector(String::new()).error_code(), "VECTOR_ERROR");
        assert_eq!(Error::Llm(String::new()).error_code(), "LLM_ERROR");
        assert_eq!(Error::Config(String::new()).error_code(), "CONFIG_ERROR");
        assert_eq!(Error::Internal(String::new()).error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_rate_limited_maps_to_llm_error() {
        let err = Error::RateLimited { retry_after: Some(2.0) };
        assert_eq!(err.error_code(), "LLM_ERROR");
        assert!(err.to_string().contains("retry after"));
    }

    #[test]
    fn test_word_count_display() {
        let err = Error::WordCountExceeded { count: 25_000, max: 20_000 };
        assert_eq!(err.to_string(), "Word count 25000 exceeds maximum 20000");
    }

    #[test]
    fn test_recovery_strategy_present_for_retryable() {
        assert!(Error::Ingest("boom".into()).recovery_strategy().is_some());
        assert!(Error::Graph("down".into()).recovery_strategy().is_some());
        assert!(Error::Internal("?".into()).recovery_strategy().is_none());
    }
}
