//! Query request/response types and hybrid scoring weights.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::document::ImpactTier;

/// Filters applied as AND conditions over query results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub regions: Option<Vec<String>>,
    #[serde(default)]
    pub sectors: Option<Vec<String>>,
    #[serde(default)]
    pub companies: Option<Vec<String>>,
    #[serde(default)]
    pub sources: Option<Vec<Uuid>>,
    #[serde(default)]
    pub languages: Option<Vec<String>>,
    #[serde(default)]
    pub min_impact_score: Option<f64>,
    #[serde(default)]
    pub impact_tiers: Option<Vec<ImpactTier>>,
    #[serde(default)]
    pub event_types: Option<Vec<String>>,
    #[serde(default)]
    pub include_duplicates: bool,
    #[serde(default)]
    pub client_guid: Option<Uuid>,
}

impl QueryFilters {
    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(Error::validation("date_from must be before date_to"));
            }
        }
        if let Some(min) = self.min_impact_score {
            if !(0.0..=100.0).contains(&min) {
                return Err(Error::validation("min_impact_score must be within [0, 100]"));
            }
        }
        Ok(())
    }

    /// Whether any filter is set.
    #[must_use]
    pub fn has_filters(&self) -> bool {
        self.date_from.is_some()
            || self.date_to.is_some()
            || self.regions.is_some()
            || self.sectors.is_some()
            || self.companies.is_some()
            || self.sources.is_some()
            || self.languages.is_some()
            || self.min_impact_score.is_some()
            || self.impact_tiers.is_some()
            || self.event_types.is_some()
    }
}

/// Weights blending the hybrid score. Must sum to 1 within a 0.01
/// tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub semantic: f64,
    pub trust: f64,
    pub recency: f64,
    pub graph_boost: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self { semantic: 0.6, trust: 0.2, recency: 0.1, graph_boost: 0.1 }
    }
}

impl ScoringWeights {
    /// Validate the sum-to-one constraint.
    pub fn validate(&self) -> Result<()> {
        let total = self.semantic + self.trust + self.recency + self.graph_boost;
        if (total - 1.0).abs() > 0.01 {
            return Err(Error::validation(format!(
                "scoring weights must sum to 1.0, got {total}"
            )));
        }
        Ok(())
    }
}

/// How a result entered the candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveredVia {
    Semantic,
    Graph,
    Both,
}

/// A single ranked query result with its score breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub document_guid: Uuid,
    pub title: String,
    #[serde(default)]
    pub snippet: Option<String>,
    pub score: f64,
    pub similarity_score: f64,
    pub trust_score: f64,
    pub recency_score: f64,
    pub graph_score: f64,
    pub source_guid: Option<Uuid>,
    #[serde(default)]
    pub source_name: Option<String>,
    pub language: String,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub impact_score: Option<f64>,
    #[serde(default)]
    pub impact_tier: Option<ImpactTier>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub is_duplicate: bool,
    pub discovered_via: DiscoveredVia,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Response of a hybrid query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub results: Vec<QueryResult>,
    pub total_found: usize,
    #[serde(default)]
    pub filters_applied: Option<QueryFilters>,
    pub execution_time_ms: f64,
}

impl QueryResponse {
    /// An empty response for callers with no permitted groups.
    #[must_use]
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            results: Vec::new(),
            total_found: 0,
            filters_applied: None,
            execution_time_ms: 0.0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_one() {
        ScoringWeights::default().validate().unwrap();
    }

    #[test]
    fn test_bad_weights_rejected() {
        let weights = ScoringWeights { semantic: 0.9, trust: 0.5, recency: 0.0, graph_boost: 0.0 };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_weights_tolerance() {
        let weights =
            ScoringWeights { semantic: 0.601, trust: 0.2, recency: 0.1, graph_boost: 0.1 };
        assert!(weights.validate().is_ok());
    }

    #[test]
    fn test_filters_date_range() {
        let filters = QueryFilters {
            date_from: Some(Utc::now()),
            date_to: Some(Utc::now() - chrono::Duration::days(1)),
            ..QueryFilters::default()
        };
        assert!(filters.validate().is_err());
    }

    #[test]
    fn test_filters_min_impact_range() {
        let filters =
            QueryFilters { min_impact_score: Some(120.0), ..QueryFilters::default() };
        assert!(filters.validate().is_err());
    }

    #[test]
    fn test_has_filters() {
        assert!(!QueryFilters::default().has_filters());
        let filters = QueryFilters {
            languages: Some(vec!["en".to_string()]),
            ..QueryFilters::default()
        };
        assert!(filters.has_filters());
    }

    #[test]
    fn test_empty_response() {
        let resp = QueryResponse::empty("anything");
        assert_eq!(resp.total_found, 0);
        assert!(resp.results.is_empty());
    }
}
