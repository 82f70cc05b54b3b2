//! Graph bootstrap: initialize the schema, seed the taxonomy and load a
//! universe file into the configured graph backend.
//!
//! Usage:
//!   gofriq-bootstrap --universe universe.json
//!   gofriq-bootstrap            # schema + taxonomy only

use std::path::PathBuf;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use gofriq::GofrIqConfig;
use gofriq_neo4j::universe::{load_universe, Universe};
use gofriq_neo4j::{GraphStore, Neo4jGraph};

fn universe_path() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--universe" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GofrIqConfig::from_env().context("configuration")?;
    let uri = config.neo4j_uri.as_deref().context("GOFR_IQ_NEO4J_URI must be set")?;
    let password =
        config.neo4j_password.as_deref().context("GOFR_IQ_NEO4J_PASSWORD must be set")?;

    let graph = Neo4jGraph::connect(uri, &config.neo4j_user, password)
        .await
        .context("connect to Neo4j")?;

    graph.init_schema().await.context("schema initialization")?;
    graph.seed_taxonomy().await.context("taxonomy seeding")?;
    tracing::info!("schema and taxonomy ready");

    if let Some(path) = universe_path() {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        let universe = Universe::from_json(&raw).context("parse universe")?;
        let summary = load_universe(&graph, &universe).await.context("load universe")?;
        tracing::info!(
            instruments = summary.instruments,
            companies = summary.companies,
            relations = summary.relations,
            exposures = summary.exposures,
            aliases = summary.aliases,
            "bootstrap complete"
        );
    }

    Ok(())
}
