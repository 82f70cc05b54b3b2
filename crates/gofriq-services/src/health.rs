//! Backend liveness probing for the `health_check` tool.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use gofriq_chroma::VectorStore;
use gofriq_neo4j::GraphStore;

/// Health of one backing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Up,
    Down,
    Unconfigured,
}

/// Aggregate health report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// `healthy`, `degraded` or `unhealthy`.
    pub status: String,
    pub neo4j: ServiceState,
    pub chromadb: ServiceState,
    pub llm: ServiceState,
}

/// Probes the three backends.
pub struct HealthService {
    graph: Arc<dyn GraphStore>,
    vector: Arc<dyn VectorStore>,
    llm_configured: bool,
}

impl HealthService {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        vector: Arc<dyn VectorStore>,
        llm_configured: bool,
    ) -> Self {
        Self { graph, vector, llm_configured }
    }

    /// Probe every backend and classify the overall status.
    ///
    /// The graph is load-bearing: its loss makes the system unhealthy.
    /// A lost vector index or an unconfigured LLM only degrades — queries
    /// lose semantic search and ingestion loses extraction, but the core
    /// keeps serving.
    pub async fn check(&self) -> HealthReport {
        let neo4j = match self.graph.verify_connectivity().await {
            Ok(()) => ServiceState::Up,
            Err(e) => {
                tracing::warn!(error = %e, "graph health probe failed");
                ServiceState::Down
            }
        };
        let chromadb = match self.vector.verify_connectivity().await {
            Ok(()) => ServiceState::Up,
            Err(e) => {
                tracing::warn!(error = %e, "vector health probe failed");
                ServiceState::Down
            }
        };
        let llm = if self.llm_configured { ServiceState::Up } else { ServiceState::Unconfigured };

        let status = if neo4j == ServiceState::Down {
            "unhealthy"
        } else if chromadb == ServiceState::Down || llm != ServiceState::Up {
            "degraded"
        } else {
            "healthy"
        };

        HealthReport { status: status.to_string(), neo4j, chromadb, llm }
    }
}
