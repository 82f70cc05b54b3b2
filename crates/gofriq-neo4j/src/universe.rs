//! Universe loading.
//!
//! The instrument/company universe is the trusted backbone of the graph:
//! AFFECTS edges may only ever point at instruments that came from here
//! (or from explicitly registered aliases), never at raw extractor
//! output. A universe file is a JSON document listing instruments,
//! companies, inter-company relations, factor exposures and extra
//! aliases; loading is MERGE-based and safe to repeat.

use serde::{Deserialize, Serialize};

use gofriq::{Error, Result};

use crate::graph_store::GraphStore;
use crate::types::{CompanySpec, InstrumentSpec, RelationType};

/// A company-to-company relation in the universe file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRelation {
    /// `PEER_OF`, `SUPPLIES_TO` or `COMPETES_WITH`.
    pub relation: String,
    pub from_ticker: String,
    pub to_ticker: String,
}

/// A factor exposure in the universe file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureEntry {
    pub ticker: String,
    pub factor_id: String,
    pub beta: f64,
}

/// An extra alias (ISIN, name variant) in the universe file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub value: String,
    /// e.g. `TICKER`, `ISIN`, `NAME_VARIANT`.
    pub scheme: String,
    pub canonical_ticker: String,
}

/// The full universe file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Universe {
    #[serde(default)]
    pub instruments: Vec<InstrumentSpec>,
    #[serde(default)]
    pub companies: Vec<CompanySpec>,
    #[serde(default)]
    pub relations: Vec<CompanyRelation>,
    #[serde(default)]
    pub exposures: Vec<ExposureEntry>,
    #[serde(default)]
    pub aliases: Vec<AliasEntry>,
}

/// Counts of what a load touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoadSummary {
    pub instruments: usize,
    pub companies: usize,
    pub relations: usize,
    pub exposures: usize,
    pub aliases: usize,
}

impl Universe {
    /// Parse a universe file.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::validation(format!("invalid universe file: {e}")))
    }

    /// Validate referential integrity before loading: every company,
    /// relation, exposure and alias must point at a declared instrument.
    pub fn validate(&self) -> Result<()> {
        let tickers: Vec<String> =
            self.instruments.iter().map(|i| i.ticker.trim().to_uppercase()).collect();
        let known = |ticker: &str| tickers.iter().any(|t| t == &ticker.trim().to_uppercase());

        for company in &self.companies {
            if !known(&company.ticker) {
                return Err(Error::validation(format!(
                    "company {} has no matching instrument",
                    company.ticker
                )));
            }
        }
        for relation in &self.relations {
            if RelationType::parse(&relation.relation)
                .filter(|r| {
                    matches!(
                        r,
                        RelationType::PeerOf
                            | RelationType::SuppliesTo
                            | RelationType::CompetesWith
                    )
                })
                .is_none()
            {
                return Err(Error::validation(format!(
                    "unsupported company relation: {}",
                    relation.relation
                )));
            }
            if !known(&relation.from_ticker) || !known(&relation.to_ticker) {
                return Err(Error::validation(format!(
                    "relation {} -> {} references an unknown ticker",
                    relation.from_ticker, relation.to_ticker
                )));
            }
        }
        for exposure in &self.exposures {
            if !known(&exposure.ticker) {
                return Err(Error::validation(format!(
                    "exposure for unknown ticker {}",
                    exposure.ticker
                )));
            }
        }
        for alias in &self.aliases {
            if !known(&alias.canonical_ticker) {
                return Err(Error::validation(format!(
                    "alias {} points at unknown ticker {}",
                    alias.value, alias.canonical_ticker
                )));
            }
        }
        Ok(())
    }
}

/// Merge a universe into the graph. Idempotent; repeated loads update in
/// place.
pub async fn load_universe(graph: &dyn GraphStore, universe: &Universe) -> Result<LoadSummary> {
    universe.validate()?;

    for instrument in &universe.instruments {
        graph.upsert_instrument(instrument).await?;
    }
    for company in &universe.companies {
        graph.upsert_company(company).await?;
    }
    for relation in &universe.relations {
        let rel = RelationType::parse(&relation.relation)
            .ok_or_else(|| Error::validation(format!("unsupported relation: {}", relation.relation)))?;
        graph.relate_companies(rel, &relation.from_ticker, &relation.to_ticker).await?;
    }
    for exposure in &universe.exposures {
        graph.set_factor_exposure(&exposure.ticker, &exposure.factor_id, exposure.beta).await?;
    }
    for alias in &universe.aliases {
        graph
            .add_alias(&alias.value, &alias.scheme, &alias.canonical_ticker.to_uppercase())
            .await?;
    }

    let summary = LoadSummary {
        instruments: universe.instruments.len(),
        companies: universe.companies.len(),
        relations: universe.relations.len(),
        exposures: universe.exposures.len(),
        aliases: universe.aliases.len(),
    };
    tracing::info!(
        instruments = summary.instruments,
        companies = summary.companies,
        relations = summary.relations,
        "universe loaded"
    );
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory_graph::MemoryGraph;
    use crate::types::NodeLabel;

    const SAMPLE: &str = r#"{
        "instruments": [
            {"ticker": "TRUCK", "name": "Heavy Truck Co", "instrument_type": "equity", "currency": "USD"},
            {"ticker": "PARTS", "name": "Precision Parts", "instrument_type": "equity"}
        ],
        "companies": [
            {"ticker": "TRUCK", "name": "Heavy Truck Co", "sector": "INDUSTRIALS", "aliases": ["Heavy Truck"]},
            {"ticker": "PARTS", "name": "Precision Parts", "sector": "INDUSTRIALS"}
        ],
        "relations": [
            {"relation": "SUPPLIES_TO", "from_ticker": "PARTS", "to_ticker": "TRUCK"}
        ],
        "exposures": [
            {"ticker": "TRUCK", "factor_id": "oil", "beta": -0.6}
        ],
        "aliases": [
            {"value": "US8888888888", "scheme": "ISIN", "canonical_ticker": "TRUCK"}
        ]
    }"#;

    #[tokio::test]
    async fn test_load_sample_universe() {
        let graph = MemoryGraph::new();
        graph.seed_taxonomy().await.unwrap();
        let universe = Universe::from_json(SAMPLE).unwrap();

        let summary = load_universe(&graph, &universe).await.unwrap();
        assert_eq!(summary.instruments, 2);
        assert_eq!(summary.relations, 1);

        assert!(graph.get_node(NodeLabel::Instrument, "TRUCK").await.unwrap().is_some());
        let overview = graph.instrument_overview("TRUCK").await.unwrap().unwrap();
        assert_eq!(overview.suppliers, vec!["PARTS".to_string()]);
        assert_eq!(overview.factor_exposures.len(), 1);

        // Extra aliases resolve to the canonical ticker.
        let isin = graph.lookup_alias("US8888888888", Some("ISIN")).await.unwrap();
        assert_eq!(isin.as_deref(), Some("TRUCK"));
        let name = graph.lookup_alias("heavy truck", Some("NAME_VARIANT")).await.unwrap();
        assert_eq!(name.as_deref(), Some("TRUCK"));
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let graph = MemoryGraph::new();
        let universe = Universe::from_json(SAMPLE).unwrap();
        load_universe(&graph, &universe).await.unwrap();
        load_universe(&graph, &universe).await.unwrap();
        assert_eq!(graph.count_nodes(Some(NodeLabel::Instrument)).await.unwrap(), 2);
        assert_eq!(graph.count_nodes(Some(NodeLabel::Company)).await.unwrap(), 2);
    }

    #[test]
    fn test_validate_rejects_orphan_company() {
        let universe = Universe {
            companies: vec![CompanySpec {
                ticker: "GHOST".into(),
                name: "Ghost Co".into(),
                sector: None,
                aliases: vec![],
            }],
            ..Universe::default()
        };
        assert!(universe.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_relation() {
        let raw = r#"{
            "instruments": [{"ticker": "A", "name": "A"}, {"ticker": "B", "name": "B"}],
            "relations": [{"relation": "MARRIED_TO", "from_ticker": "A", "to_ticker": "B"}]
        }"#;
        let universe = Universe::from_json(raw).unwrap();
        assert!(universe.validate().is_err());
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(Universe::from_json("nope").is_err());
    }
}
