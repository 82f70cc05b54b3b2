//! Composition root: constructor-injected services with process-wide
//! lifecycles, no hidden globals.
//!
//! Backend selection follows configuration: a Bolt URI selects Neo4j,
//! otherwise the in-memory graph; a ChromaDB host selects the server
//! index, otherwise the in-memory index; an OpenRouter key enables real
//! embeddings and extraction, otherwise the deterministic embedder and no
//! extraction.

use std::sync::Arc;

use gofriq::GofrIqConfig;
use gofriq::Result;
use gofriq_chroma::{ChromaIndex, ChunkConfig, DeterministicEmbedder, Embedder, MemoryIndex, VectorStore};
use gofriq_neo4j::{AliasResolver, GraphSourceMirror, GraphStore, MemoryGraph, Neo4jGraph, schema};
use gofriq_openrouter::{ExtractionService, OpenRouterClient};
use gofriq_services::{
    AvatarFeedService, ClientService, GroupService, HealthService, IngestService, QueryService,
};
use gofriq_store::{AuditLog, DocumentStore, SourceRegistry};

/// Shared application state behind the tool router.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GofrIqConfig>,
    pub store: Arc<DocumentStore>,
    pub registry: Arc<SourceRegistry>,
    pub audit: Arc<AuditLog>,
    pub graph: Arc<dyn GraphStore>,
    pub vector: Arc<dyn VectorStore>,
    pub groups: GroupService,
    pub ingest: Arc<IngestService>,
    pub query: Arc<QueryService>,
    pub feed: Arc<AvatarFeedService>,
    pub clients: Arc<ClientService>,
    pub health: Arc<HealthService>,
}

impl AppState {
    /// Build every service from configuration, initialize the graph
    /// schema and seed the taxonomy.
    pub async fn build(config: GofrIqConfig) -> Result<AppState> {
        let store = Arc::new(DocumentStore::new(&config.storage_dir)?);
        let audit = Arc::new(AuditLog::new(&config.storage_dir)?);

        // Graph backend.
        let graph: Arc<dyn GraphStore> = match (&config.neo4j_uri, &config.neo4j_password) {
            (Some(uri), Some(password)) => {
                tracing::info!(uri, "connecting to Neo4j");
                Arc::new(Neo4jGraph::connect(uri, &config.neo4j_user, password).await?)
            }
            _ => {
                tracing::info!("no Neo4j configured; using the in-memory graph");
                Arc::new(MemoryGraph::new())
            }
        };
        graph.init_schema().await?;
        graph.seed_taxonomy().await?;

        // LLM client (optional).
        let llm = if config.llm_available() {
            Some(OpenRouterClient::from_config(&config)?)
        } else {
            tracing::warn!("no OpenRouter key; extraction disabled, deterministic embeddings");
            None
        };
        let embedder: Arc<dyn Embedder> = match &llm {
            Some(client) => Arc::new(client.clone()),
            None => Arc::new(DeterministicEmbedder::default()),
        };

        // Vector backend.
        let vector: Arc<dyn VectorStore> = match &config.chromadb_host {
            Some(host) => {
                tracing::info!(host, port = config.chromadb_port, "connecting to ChromaDB");
                Arc::new(
                    ChromaIndex::connect(
                        host,
                        config.chromadb_port,
                        gofriq_chroma::chroma::DEFAULT_COLLECTION,
                        embedder,
                        ChunkConfig::default(),
                    )
                    .await?,
                )
            }
            None => {
                tracing::info!("no ChromaDB configured; using the in-memory index");
                Arc::new(MemoryIndex::new(embedder))
            }
        };

        let registry = Arc::new(
            SourceRegistry::new(&config.storage_dir)?
                .with_mirror(Arc::new(GraphSourceMirror::new(graph.clone()))),
        );

        let aliases = Arc::new(AliasResolver::new(graph.clone()));
        let extraction = llm.as_ref().map(|client| {
            Arc::new(ExtractionService::new(
                Arc::new(client.clone()),
                schema::event_type_codes().iter().map(|c| (*c).to_string()).collect(),
            ))
        });

        let ingest = Arc::new(IngestService::new(
            store.clone(),
            registry.clone(),
            graph.clone(),
            vector.clone(),
            audit.clone(),
            aliases,
            extraction,
        ));
        let query = Arc::new(QueryService::new(
            vector.clone(),
            graph.clone(),
            registry.clone(),
            audit.clone(),
        ));
        let feed = Arc::new(AvatarFeedService::new(graph.clone()));
        let clients = Arc::new(ClientService::new(graph.clone()));
        let health =
            Arc::new(HealthService::new(graph.clone(), vector.clone(), llm.is_some()));
        let groups = GroupService::new(config.jwt_secret.as_deref());

        Ok(AppState {
            config: Arc::new(config),
            store,
            registry,
            audit,
            graph,
            vector,
            groups,
            ingest,
            query,
            feed,
            clients,
            health,
        })
    }
}
