//! The two-channel personalized avatar feed.
//!
//! MAINTENANCE carries stories affecting the client's existing positions
//! (holdings and watchlist) that clear the client's impact threshold.
//! OPPORTUNITY carries stories matching the client's mandate themes whose
//! affected instruments do NOT touch any position (the novelty
//! guarantee), screened against the client's restrictions.
//!
//! A document never appears in both channels; MAINTENANCE wins. All
//! scoring flows through the λ-derived [`ScoringConfig`]: at λ = 0 the
//! feed defends positions, at λ = 1 it hunts novel thematic ideas, and
//! the recency half-life stretches from one to three hours across the
//! sweep.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gofriq::models::ImpactTier;
use gofriq::scoring::{ClientNewsWeights, ScoringConfig};
use gofriq::{Error, Result};
use gofriq_neo4j::{ClientContext, FeedCandidate, GraphStore};

/// Which channel an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeedChannel {
    Maintenance,
    Opportunity,
}

/// One story in a client's feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub channel: FeedChannel,
    pub document_guid: Uuid,
    pub title: String,
    pub impact_tier: Option<ImpactTier>,
    pub relevance_score: f64,
    pub affected_instruments: Vec<String>,
    pub themes: Vec<String>,
    /// Human-readable explanation naming a ticker (MAINTENANCE) or a
    /// theme (OPPORTUNITY).
    pub reason: String,
}

/// The full two-channel response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AvatarFeed {
    pub maintenance: Vec<FeedItem>,
    pub opportunity: Vec<FeedItem>,
    /// maintenance ∪ opportunity, sorted by relevance descending.
    pub combined: Vec<FeedItem>,
}

/// Builds personalized feeds from the graph.
pub struct AvatarFeedService {
    graph: Arc<dyn GraphStore>,
}

impl AvatarFeedService {
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self { graph }
    }

    /// Build the avatar feed for one client.
    pub async fn get_client_avatar_feed(
        &self,
        client_guid: Uuid,
        limit: usize,
        time_window_hours: i64,
        opportunity_bias: f64,
    ) -> Result<AvatarFeed> {
        let ctx = self
            .graph
            .get_client_context(client_guid)
            .await?
            .ok_or_else(|| Error::validation(format!("client {client_guid} not found")))?;

        let config = ScoringConfig::from_opportunity_bias(opportunity_bias);
        let since = Utc::now() - Duration::hours(time_window_hours.max(1));
        let groups = [ctx.client.group_guid];

        let position_tickers: HashSet<String> =
            ctx.position_tickers().into_iter().collect();

        // MAINTENANCE: stories hitting existing positions.
        let mut maintenance = Vec::new();
        if !position_tickers.is_empty() {
            let tickers: Vec<String> = position_tickers.iter().cloned().collect();
            let candidates = self.graph.documents_affecting(&tickers, &groups, since).await?;
            for candidate in candidates {
                if let Some(item) = Self::maintenance_item(&ctx, &config, &position_tickers, &candidate)
                {
                    maintenance.push(item);
                }
            }
        }
        maintenance.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        maintenance.truncate(limit);
        let maintenance_guids: HashSet<Uuid> =
            maintenance.iter().map(|i| i.document_guid).collect();

        // OPPORTUNITY: thematic stories away from existing positions.
        let mut opportunity = Vec::new();
        let mandate_themes = ctx
            .profile
            .as_ref()
            .map(|p| p.mandate_themes.clone())
            .unwrap_or_default();
        if !mandate_themes.is_empty() {
            let candidates =
                self.graph.documents_with_themes(&mandate_themes, &groups, since).await?;
            for candidate in candidates {
                if maintenance_guids.contains(&candidate.record.guid) {
                    continue;
                }
                if let Some(item) = Self::opportunity_item(
                    &ctx,
                    &config,
                    &position_tickers,
                    &mandate_themes,
                    &candidate,
                ) {
                    opportunity.push(item);
                }
            }
        }
        opportunity.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        opportunity.truncate(limit);

        let mut combined: Vec<FeedItem> =
            maintenance.iter().chain(opportunity.iter()).cloned().collect();
        combined.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        combined.truncate(limit);

        tracing::debug!(
            client = %client_guid,
            maintenance = maintenance.len(),
            opportunity = opportunity.len(),
            lambda = config.opportunity_bias,
            "avatar feed built"
        );

        Ok(AvatarFeed { maintenance, opportunity, combined })
    }

    /// Flat ranked article list for the `get_top_client_news` tool: the
    /// combined feed re-blended with the client-type news weights.
    pub async fn get_top_client_news(
        &self,
        client_guid: Uuid,
        limit: usize,
        time_window_hours: i64,
        opportunity_bias: f64,
    ) -> Result<Vec<FeedItem>> {
        let ctx = self
            .graph
            .get_client_context(client_guid)
            .await?
            .ok_or_else(|| Error::validation(format!("client {client_guid} not found")))?;
        let weights = ClientNewsWeights::for_client_type(ctx.client.client_type_code.as_deref());

        let feed = self
            .get_client_avatar_feed(client_guid, limit.max(1) * 2, time_window_hours, opportunity_bias)
            .await?;

        // Without a query there is no semantic component; blend the
        // channel relevance (graph), impact and recency, renormalized
        // over the remaining weights.
        let denom = weights.graph + weights.impact + weights.recency;
        let mut articles: Vec<FeedItem> = feed
            .combined
            .into_iter()
            .map(|mut item| {
                let impact_norm = item
                    .impact_tier
                    .map_or(0.0, |tier| match tier {
                        ImpactTier::Platinum => 0.95,
                        ImpactTier::Gold => 0.8,
                        ImpactTier::Silver => 0.6,
                        ImpactTier::Bronze => 0.4,
                        ImpactTier::Standard => 0.2,
                    });
                // Feed items keep no timestamp; the channel relevance
                // already carries the recency decay.
                let blended = (weights.graph * item.relevance_score
                    + weights.impact * impact_norm
                    + weights.recency * item.relevance_score)
                    / denom.max(f64::EPSILON);
                item.relevance_score = blended;
                item
            })
            .collect();
        articles.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        articles.truncate(limit);
        Ok(articles)
    }

    fn recency_for(config: &ScoringConfig, candidate: &FeedCandidate) -> f64 {
        let age_minutes = candidate
            .record
            .created_at
            .map(|at| (Utc::now() - at).num_seconds() as f64 / 60.0)
            .unwrap_or(f64::MAX);
        config.recency(age_minutes)
    }

    fn maintenance_item(
        ctx: &ClientContext,
        config: &ScoringConfig,
        position_tickers: &HashSet<String>,
        candidate: &FeedCandidate,
    ) -> Option<FeedItem> {
        if candidate.record.is_duplicate {
            return None;
        }

        // The story must hit at least one position; the best-weighted
        // match drives the score and the reason.
        let hit_tickers: Vec<&String> = candidate
            .affected_tickers
            .iter()
            .filter(|t| position_tickers.contains(*t))
            .collect();
        let best = hit_tickers
            .iter()
            .max_by(|a, b| {
                let wa = ctx.position_weight(a).unwrap_or(0.0);
                let wb = ctx.position_weight(b).unwrap_or(0.0);
                wa.total_cmp(&wb)
            })
            .copied()?;
        let position_weight = ctx.position_weight(best)?;

        // Threshold gate: the client only wants stories above their
        // impact bar.
        let impact_score = candidate.record.impact_score.unwrap_or(0.0);
        if let Some(threshold) = ctx.profile.as_ref().and_then(|p| p.impact_threshold) {
            if impact_score < threshold {
                return None;
            }
        }

        let is_held = position_weight >= 1.0;
        let base = if is_held { config.direct_holding_base } else { config.watchlist_base };
        let impact_norm = impact_score / 100.0;
        let recency = Self::recency_for(config, candidate);
        let relevance_score = impact_norm * recency * position_weight * base;

        let reason = if is_held {
            format!("Affects held position {best}")
        } else {
            format!("Affects watchlist name {best}")
        };

        Some(FeedItem {
            channel: FeedChannel::Maintenance,
            document_guid: candidate.record.guid,
            title: candidate.record.title.clone(),
            impact_tier: candidate.record.impact_tier,
            relevance_score,
            affected_instruments: candidate.affected_tickers.clone(),
            themes: candidate.record.themes.clone(),
            reason,
        })
    }

    fn opportunity_item(
        ctx: &ClientContext,
        config: &ScoringConfig,
        position_tickers: &HashSet<String>,
        mandate_themes: &[String],
        candidate: &FeedCandidate,
    ) -> Option<FeedItem> {
        if candidate.record.is_duplicate {
            return None;
        }

        // Novelty guarantee: nothing the client already holds or watches.
        if candidate.affected_tickers.iter().any(|t| position_tickers.contains(t)) {
            return None;
        }

        // Anti-pitch: screen out stories whose affected sectors the
        // client excludes.
        if let Some(restrictions) = ctx.profile.as_ref().and_then(|p| p.restrictions.as_ref()) {
            if candidate.affected_sectors.iter().any(|s| restrictions.excludes_sector(s)) {
                return None;
            }
        }

        let matched: Vec<&String> = candidate
            .record
            .themes
            .iter()
            .filter(|t| mandate_themes.contains(t))
            .collect();
        let first_match = matched.first()?;
        let theme_fit = matched.len() as f64 / mandate_themes.len() as f64;

        let impact_norm = candidate.record.impact_score.unwrap_or(0.0) / 100.0;
        let recency = Self::recency_for(config, candidate);
        let relevance_score = theme_fit * impact_norm * recency * config.thematic_base;

        Some(FeedItem {
            channel: FeedChannel::Opportunity,
            document_guid: candidate.record.guid,
            title: candidate.record.title.clone(),
            impact_tier: candidate.record.impact_tier,
            relevance_score,
            affected_instruments: candidate.affected_tickers.clone(),
            themes: candidate.record.themes.clone(),
            reason: format!("Matches mandate theme {first_match}"),
        })
    }
}
