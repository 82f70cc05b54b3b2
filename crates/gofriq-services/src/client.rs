//! Client management and the profile completeness score (CPCS).
//!
//! CPCS weighs four sections: Holdings 0.35 (any position or watchlist
//! entry), Mandate 0.35 (mandate_type and mandate_text each half),
//! Constraints 0.20 (`esg_constrained` explicitly set, either way) and
//! Engagement 0.10 (primary contact plus alert frequency).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use gofriq::models::{Client, ClientProfile};
use gofriq::{Error, Result};
use gofriq_neo4j::{ClientContext, GraphStore};

/// One CPCS section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionScore {
    pub score: f64,
    pub weight: f64,
    pub value: f64,
    #[serde(default)]
    pub details: BTreeMap<String, Value>,
}

/// The profile completeness result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileCompleteness {
    /// Weighted total in [0, 1], rounded to two decimals.
    pub score: f64,
    pub breakdown: BTreeMap<String, SectionScore>,
    pub missing_fields: Vec<String>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Client, portfolio, watchlist and profile operations over the graph.
pub struct ClientService {
    graph: Arc<dyn GraphStore>,
}

impl ClientService {
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self { graph }
    }

    /// Register a client (with its empty portfolio and watchlist).
    pub async fn create_client(&self, client: &Client) -> Result<()> {
        if client.name.trim().is_empty() {
            return Err(Error::validation("client name must not be empty"));
        }
        self.graph.upsert_client(client).await
    }

    /// Add or update a portfolio position. The instrument must exist in
    /// the seeded universe.
    pub async fn add_to_portfolio(
        &self,
        client_guid: Uuid,
        ticker: &str,
        weight: f64,
        sentiment: Option<&str>,
        shares: Option<f64>,
        avg_cost: Option<f64>,
    ) -> Result<()> {
        let linked = self
            .graph
            .add_portfolio_holding(client_guid, ticker, weight, sentiment, shares, avg_cost)
            .await?;
        if !linked {
            return Err(Error::validation(format!(
                "instrument {} is not in the universe",
                ticker.to_uppercase()
            )));
        }
        Ok(())
    }

    /// Add or update a watchlist entry.
    pub async fn add_to_watchlist(
        &self,
        client_guid: Uuid,
        ticker: &str,
        alert_threshold: Option<f64>,
    ) -> Result<()> {
        let linked =
            self.graph.add_watchlist_entry(client_guid, ticker, alert_threshold).await?;
        if !linked {
            return Err(Error::validation(format!(
                "instrument {} is not in the universe",
                ticker.to_uppercase()
            )));
        }
        Ok(())
    }

    /// Fetch a client's profile.
    pub async fn get_client_profile(&self, client_guid: Uuid) -> Result<Option<ClientProfile>> {
        Ok(self.context(client_guid).await?.profile)
    }

    /// Validate and store a client's profile.
    pub async fn update_client_profile(
        &self,
        client_guid: Uuid,
        profile: &ClientProfile,
    ) -> Result<()> {
        profile.validate()?;
        // Ensure the client exists before attaching a profile.
        self.context(client_guid).await?;
        self.graph.upsert_client_profile(client_guid, profile).await
    }

    /// List clients, optionally per group.
    pub async fn list_clients(&self, group_guid: Option<Uuid>) -> Result<Vec<Client>> {
        self.graph.list_clients(group_guid).await
    }

    async fn context(&self, client_guid: Uuid) -> Result<ClientContext> {
        self.graph
            .get_client_context(client_guid)
            .await?
            .ok_or_else(|| Error::validation(format!("client {client_guid} not found")))
    }

    /// Compute the client profile completeness score.
    pub async fn calculate_profile_completeness(
        &self,
        client_guid: Uuid,
    ) -> Result<ProfileCompleteness> {
        let ctx = self.context(client_guid).await?;
        Ok(Self::compute_score(&ctx))
    }

    fn compute_score(ctx: &ClientContext) -> ProfileCompleteness {
        let profile = ctx.profile.as_ref();

        // 1. Holdings (35%): coverage for the MAINTENANCE channel.
        let has_holdings = !ctx.holdings.is_empty() || !ctx.watchlist.is_empty();
        let score_holdings = if has_holdings { 1.0 } else { 0.0 };

        // 2. Mandate (35%): type and free text each contribute half.
        let mandate_type = profile.and_then(|p| p.mandate_type.as_deref());
        let mandate_text = profile
            .and_then(|p| p.mandate_text.as_deref())
            .filter(|t| !t.trim().is_empty());
        let score_mandate = if mandate_type.is_some() { 0.5 } else { 0.0 }
            + if mandate_text.is_some() { 0.5 } else { 0.0 };

        // 3. Constraints (20%): tri-state, counted when explicitly set.
        let esg_set = profile.and_then(|p| p.esg_constrained).is_some();
        let score_constraints = if esg_set { 1.0 } else { 0.0 };

        // 4. Engagement (10%): contact and alert cadence, from the client
        // record or the profile.
        let primary_contact = ctx
            .client
            .primary_contact
            .as_deref()
            .or_else(|| profile.and_then(|p| p.primary_contact.as_deref()));
        let alert_frequency = ctx
            .client
            .alert_frequency
            .as_deref()
            .or_else(|| profile.and_then(|p| p.alert_frequency.as_deref()));
        let score_engagement =
            if primary_contact.is_some() && alert_frequency.is_some() { 1.0 } else { 0.0 };

        let total = round2(
            score_holdings * 0.35
                + score_mandate * 0.35
                + score_constraints * 0.20
                + score_engagement * 0.10,
        );

        let mut breakdown = BTreeMap::new();
        breakdown.insert(
            "holdings".to_string(),
            SectionScore {
                score: round2(score_holdings),
                weight: 0.35,
                value: score_holdings * 0.35,
                details: BTreeMap::from([
                    ("positions".to_string(), Value::from(ctx.holdings.len())),
                    ("watchlist_items".to_string(), Value::from(ctx.watchlist.len())),
                ]),
            },
        );
        breakdown.insert(
            "mandate".to_string(),
            SectionScore {
                score: round2(score_mandate),
                weight: 0.35,
                value: score_mandate * 0.35,
                details: BTreeMap::from([
                    ("mandate_type".to_string(), Value::from(mandate_type.is_some())),
                    ("mandate_text".to_string(), Value::from(mandate_text.is_some())),
                ]),
            },
        );
        breakdown.insert(
            "constraints".to_string(),
            SectionScore {
                score: round2(score_constraints),
                weight: 0.20,
                value: score_constraints * 0.20,
                details: BTreeMap::from([(
                    "esg_constrained_set".to_string(),
                    Value::from(esg_set),
                )]),
            },
        );
        breakdown.insert(
            "engagement".to_string(),
            SectionScore {
                score: round2(score_engagement),
                weight: 0.10,
                value: score_engagement * 0.10,
                details: BTreeMap::from([
                    ("primary_contact_set".to_string(), Value::from(primary_contact.is_some())),
                    ("alert_frequency_set".to_string(), Value::from(alert_frequency.is_some())),
                ]),
            },
        );

        let mut missing_fields = Vec::new();
        if !has_holdings {
            missing_fields.push("Holdings/Watchlist (no positions or watchlist items)".to_string());
        }
        if mandate_type.is_none() {
            missing_fields.push("Mandate type (client_profile.mandate_type)".to_string());
        }
        if mandate_text.is_none() {
            missing_fields.push("Mandate description (client_profile.mandate_text)".to_string());
        }
        if !esg_set {
            missing_fields.push("ESG constraint (client_profile.esg_constrained unset)".to_string());
        }
        if primary_contact.is_none() {
            missing_fields.push("Primary contact".to_string());
        }
        if alert_frequency.is_none() {
            missing_fields.push("Alert frequency".to_string());
        }

        ProfileCompleteness { score: total, breakdown, missing_fields }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use gofriq_neo4j::{InstrumentSpec, MemoryGraph};

    fn client(group: Uuid) -> Client {
        Client {
            client_guid: Uuid::new_v4(),
            name: "Teachers Retirement".to_string(),
            client_type_code: Some("PENSION".to_string()),
            group_guid: group,
            primary_contact: None,
            alert_frequency: None,
        }
    }

    async fn service_with_universe() -> (ClientService, Arc<MemoryGraph>) {
        let graph = Arc::new(MemoryGraph::new());
        graph
            .upsert_instrument(&InstrumentSpec {
                ticker: "TRUCK".into(),
                name: "Heavy Truck Co".into(),
                instrument_type: None,
                exchange: None,
                currency: None,
                country: None,
            })
            .await
            .unwrap();
        (ClientService::new(graph.clone()), graph)
    }

    #[tokio::test]
    async fn test_empty_profile_scores_zero() {
        let (service, _graph) = service_with_universe().await;
        let c = client(Uuid::new_v4());
        service.create_client(&c).await.unwrap();

        let result = service.calculate_profile_completeness(c.client_guid).await.unwrap();
        assert_eq!(result.score, 0.0);
        assert_eq!(result.missing_fields.len(), 6);
    }

    #[tokio::test]
    async fn test_full_profile_scores_one() {
        let (service, _graph) = service_with_universe().await;
        let mut c = client(Uuid::new_v4());
        c.primary_contact = Some("pm@example.com".to_string());
        c.alert_frequency = Some("daily".to_string());
        service.create_client(&c).await.unwrap();
        service.add_to_portfolio(c.client_guid, "TRUCK", 0.4, Some("LONG"), None, None).await.unwrap();

        let profile = ClientProfile {
            mandate_type: Some("INCOME".to_string()),
            mandate_text: Some("Stable income with capital preservation.".to_string()),
            esg_constrained: Some(true),
            ..ClientProfile::default()
        };
        service.update_client_profile(c.client_guid, &profile).await.unwrap();

        let result = service.calculate_profile_completeness(c.client_guid).await.unwrap();
        assert_eq!(result.score, 1.0);
        assert!(result.missing_fields.is_empty());
        assert_eq!(result.breakdown["mandate"].score, 1.0);
    }

    #[tokio::test]
    async fn test_esg_false_still_counts_as_set() {
        let (service, _graph) = service_with_universe().await;
        let c = client(Uuid::new_v4());
        service.create_client(&c).await.unwrap();
        let profile =
            ClientProfile { esg_constrained: Some(false), ..ClientProfile::default() };
        service.update_client_profile(c.client_guid, &profile).await.unwrap();

        let result = service.calculate_profile_completeness(c.client_guid).await.unwrap();
        assert_eq!(result.breakdown["constraints"].score, 1.0);
        assert_eq!(result.score, 0.20);
    }

    #[tokio::test]
    async fn test_mandate_halves() {
        let (service, _graph) = service_with_universe().await;
        let c = client(Uuid::new_v4());
        service.create_client(&c).await.unwrap();
        let profile = ClientProfile {
            mandate_type: Some("GROWTH".to_string()),
            mandate_text: Some("   ".to_string()),
            ..ClientProfile::default()
        };
        service.update_client_profile(c.client_guid, &profile).await.unwrap();

        let result = service.calculate_profile_completeness(c.client_guid).await.unwrap();
        assert_eq!(result.breakdown["mandate"].score, 0.5);
        // 0.5 * 0.35 rounded.
        assert_eq!(result.score, 0.18);
    }

    #[tokio::test]
    async fn test_watchlist_counts_for_holdings_section() {
        let (service, _graph) = service_with_universe().await;
        let c = client(Uuid::new_v4());
        service.create_client(&c).await.unwrap();
        service.add_to_watchlist(c.client_guid, "TRUCK", Some(50.0)).await.unwrap();

        let result = service.calculate_profile_completeness(c.client_guid).await.unwrap();
        assert_eq!(result.breakdown["holdings"].score, 1.0);
        assert_eq!(result.score, 0.35);
    }

    #[tokio::test]
    async fn test_unknown_instrument_rejected() {
        let (service, _graph) = service_with_universe().await;
        let c = client(Uuid::new_v4());
        service.create_client(&c).await.unwrap();
        let err =
            service.add_to_portfolio(c.client_guid, "GHOST", 0.2, None, None, None).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_profile_validation_enforced() {
        let (service, _graph) = service_with_universe().await;
        let c = client(Uuid::new_v4());
        service.create_client(&c).await.unwrap();
        let bad = ClientProfile {
            mandate_themes: vec!["astrology".to_string()],
            ..ClientProfile::default()
        };
        assert!(service.update_client_profile(c.client_guid, &bad).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_client_errors() {
        let (service, _graph) = service_with_universe().await;
        let err = service.calculate_profile_completeness(Uuid::new_v4()).await;
        assert!(err.is_err());
    }
}
