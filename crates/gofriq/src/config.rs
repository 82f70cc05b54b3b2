//! Environment configuration.
//!
//! All knobs are read from `GOFR_IQ_*` environment variables. Optional
//! backends (Chroma server, OpenRouter, Neo4j credentials) stay `None` when
//! unset; the composition root decides whether that means "embedded mode"
//! or a hard failure.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default OpenRouter API base.
pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
/// Default chat model used for extraction.
pub const DEFAULT_LLM_MODEL: &str = "meta-llama/llama-3.1-70b-instruct";
/// Default embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "qwen/qwen3-embedding-8b";
/// Default LLM request timeout in seconds.
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
/// Default retry budget for LLM calls.
pub const DEFAULT_LLM_MAX_RETRIES: u32 = 3;
/// Default ChromaDB server port.
pub const DEFAULT_CHROMADB_PORT: u16 = 8000;
/// Default tool-surface bind address.
pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:8735";

/// Read an environment variable, treating the empty string as unset.
pub fn env_string(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Read and parse an environment variable, falling back to `default` when
/// unset or unparseable.
pub fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_string(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a float env var clamped into `[lo, hi]`, falling back to `default`.
pub fn env_float_clamped(key: &str, default: f64, lo: f64, hi: f64) -> f64 {
    match env_string(key).and_then(|v| v.trim().parse::<f64>().ok()) {
        Some(v) => v.clamp(lo, hi),
        None => default,
    }
}

/// Process-wide configuration, resolved once at startup and passed down by
/// the composition root.
#[derive(Debug, Clone)]
pub struct GofrIqConfig {
    /// Root of document, source and audit files.
    pub storage_dir: PathBuf,

    /// Neo4j Bolt URI; `None` selects the in-memory graph.
    pub neo4j_uri: Option<String>,
    pub neo4j_user: String,
    pub neo4j_password: Option<String>,

    /// ChromaDB server host; `None` selects the in-memory vector index.
    pub chromadb_host: Option<String>,
    pub chromadb_port: u16,

    /// OpenRouter credentials; `None` disables extraction and real
    /// embeddings (ingest degrades per the error-handling design).
    pub openrouter_api_key: Option<String>,
    pub openrouter_base_url: String,
    pub llm_model: String,
    pub embedding_model: String,
    pub llm_timeout: Duration,
    pub llm_max_retries: u32,

    /// HS256 secret for bearer-token group claims.
    pub jwt_secret: Option<String>,

    /// Tool-surface bind address.
    pub http_addr: String,
}

impl GofrIqConfig {
    /// Resolve configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `GOFR_IQ_STORAGE_DIR` is missing,
    /// since nothing can run without the canonical file store.
    pub fn from_env() -> Result<Self> {
        let storage_dir = env_string("GOFR_IQ_STORAGE_DIR")
            .map(PathBuf::from)
            .ok_or_else(|| Error::config("GOFR_IQ_STORAGE_DIR must be set"))?;

        Ok(Self {
            storage_dir,
            neo4j_uri: env_string("GOFR_IQ_NEO4J_URI"),
            neo4j_user: env_string("GOFR_IQ_NEO4J_USER").unwrap_or_else(|| "neo4j".to_string()),
            neo4j_password: env_string("GOFR_IQ_NEO4J_PASSWORD"),
            chromadb_host: env_string("GOFR_IQ_CHROMADB_HOST"),
            chromadb_port: env_parse("GOFR_IQ_CHROMADB_PORT", DEFAULT_CHROMADB_PORT),
            openrouter_api_key: env_string("GOFR_IQ_OPENROUTER_API_KEY"),
            openrouter_base_url: env_string("GOFR_IQ_OPENROUTER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENROUTER_BASE_URL.to_string()),
            llm_model: env_string("GOFR_IQ_OPENROUTER_MODEL")
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            embedding_model: env_string("GOFR_IQ_OPENROUTER_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            llm_timeout: Duration::from_secs(env_parse(
                "GOFR_IQ_OPENROUTER_TIMEOUT",
                DEFAULT_LLM_TIMEOUT_SECS,
            )),
            llm_max_retries: env_parse("GOFR_IQ_OPENROUTER_MAX_RETRIES", DEFAULT_LLM_MAX_RETRIES),
            jwt_secret: env_string("GOFR_IQ_JWT_SECRET"),
            http_addr: env_string("GOFR_IQ_HTTP_ADDR")
                .unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string()),
        })
    }

    /// Build a configuration rooted at `storage_dir` with every optional
    /// backend disabled. Used by tests and embedded deployments.
    pub fn embedded(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            neo4j_uri: None,
            neo4j_user: "neo4j".to_string(),
            neo4j_password: None,
            chromadb_host: None,
            chromadb_port: DEFAULT_CHROMADB_PORT,
            openrouter_api_key: None,
            openrouter_base_url: DEFAULT_OPENROUTER_BASE_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            llm_timeout: Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS),
            llm_max_retries: DEFAULT_LLM_MAX_RETRIES,
            jwt_secret: None,
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
        }
    }

    /// Whether the LLM provider is configured.
    #[must_use]
    pub fn llm_available(&self) -> bool {
        self.openrouter_api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}
