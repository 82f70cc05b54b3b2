//! Feed scoring configuration.
//!
//! The avatar feed is steered by a single opportunity-bias dial λ in
//! [0, 1]. λ = 0 is pure defense (protect existing positions, fast recency
//! decay); λ = 1 is pure offense (novel thematic ideas, slow decay). Every
//! base weight is a linear function of λ so the sweep between the two
//! regimes is monotonic.

use serde::{Deserialize, Serialize};

use crate::config::env_float_clamped;

/// Default half-life of the recency decay at λ = 0, in minutes.
pub const BASE_RECENCY_HALF_LIFE_MINUTES: f64 = 60.0;

/// Exponential recency decay: 1.0 at age zero, 0.5 at one half-life.
#[must_use]
pub fn recency_decay(age_minutes: f64, half_life_minutes: f64) -> f64 {
    if half_life_minutes <= 0.0 {
        return 0.0;
    }
    let age = age_minutes.max(0.0);
    0.5_f64.powf(age / half_life_minutes)
}

/// λ-derived scoring configuration for the avatar feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub opportunity_bias: f64,
    pub direct_holding_base: f64,
    pub watchlist_base: f64,
    pub thematic_base: f64,
    pub vector_base: f64,
    pub competitor_base: f64,
    pub supplier_base: f64,
    pub peer_base: f64,
    pub vector_similarity_threshold: f64,
    pub vector_activation_threshold: f64,
    pub recency_half_life_minutes: f64,
}

impl ScoringConfig {
    /// Derive the full configuration from the opportunity bias λ.
    ///
    /// λ is clamped into [0, 1]. The two vector thresholds may be
    /// overridden by environment (`GOFR_IQ_VECTOR_ACTIVATION_THRESHOLD`,
    /// `GOFR_IQ_VECTOR_SIMILARITY_THRESHOLD`), clamped into [0, 1].
    #[must_use]
    pub fn from_opportunity_bias(opportunity_bias: f64) -> Self {
        let lam = opportunity_bias.clamp(0.0, 1.0);

        let vector_activation_threshold =
            env_float_clamped("GOFR_IQ_VECTOR_ACTIVATION_THRESHOLD", 0.5, 0.0, 1.0);
        let vector_similarity_threshold =
            env_float_clamped("GOFR_IQ_VECTOR_SIMILARITY_THRESHOLD", 0.5, 0.0, 1.0);

        Self {
            opportunity_bias: lam,
            direct_holding_base: 1.0 - 0.4 * lam,
            watchlist_base: 0.80,
            thematic_base: 0.5 + 0.5 * lam,
            vector_base: 0.4 + 0.4 * lam,
            // Lateral relevance tracks the mode: defense cares about
            // supplier/ops risk, offense about peer relative value.
            competitor_base: 0.4 + 0.3 * lam,
            supplier_base: 0.6 - 0.2 * lam,
            peer_base: 0.4 + 0.2 * lam,
            vector_similarity_threshold,
            vector_activation_threshold,
            // Recency decays slower as the dial moves toward opportunity.
            recency_half_life_minutes: BASE_RECENCY_HALF_LIFE_MINUTES + 120.0 * lam,
        }
    }

    /// Recency multiplier for a story of the given age.
    #[must_use]
    pub fn recency(&self, age_minutes: f64) -> f64 {
        recency_decay(age_minutes, self.recency_half_life_minutes)
    }
}

/// Blend weights for the top-client-news ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClientNewsWeights {
    pub semantic: f64,
    pub graph: f64,
    pub impact: f64,
    pub recency: f64,
}

impl Default for ClientNewsWeights {
    fn default() -> Self {
        Self { semantic: 0.35, graph: 0.35, impact: 0.20, recency: 0.10 }
    }
}

impl ClientNewsWeights {
    /// Apply optional env overrides
    /// (`GOFR_IQ_CLIENT_NEWS_WEIGHT_{SEMANTIC,GRAPH,IMPACT,RECENCY}`) and
    /// renormalize to sum to 1. Fails closed to `self` when the overridden
    /// sum is not positive.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        fn read(key: &str) -> Option<f64> {
            crate::config::env_string(key).and_then(|v| v.trim().parse().ok())
        }

        let semantic = read("GOFR_IQ_CLIENT_NEWS_WEIGHT_SEMANTIC");
        let graph = read("GOFR_IQ_CLIENT_NEWS_WEIGHT_GRAPH");
        let impact = read("GOFR_IQ_CLIENT_NEWS_WEIGHT_IMPACT");
        let recency = read("GOFR_IQ_CLIENT_NEWS_WEIGHT_RECENCY");

        if semantic.is_none() && graph.is_none() && impact.is_none() && recency.is_none() {
            return self;
        }

        let proposed = Self {
            semantic: semantic.unwrap_or(self.semantic),
            graph: graph.unwrap_or(self.graph),
            impact: impact.unwrap_or(self.impact),
            recency: recency.unwrap_or(self.recency),
        };

        let total = proposed.semantic + proposed.graph + proposed.impact + proposed.recency;
        if total <= 0.0 {
            tracing::warn!(total, "invalid client news weight overrides (sum <= 0); ignoring");
            return self;
        }

        let normalized = Self {
            semantic: proposed.semantic / total,
            graph: proposed.graph / total,
            impact: proposed.impact / total,
            recency: proposed.recency / total,
        };
        tracing::info!(
            semantic = normalized.semantic,
            graph = normalized.graph,
            impact = normalized.impact,
            recency = normalized.recency,
            "applied client news weight overrides"
        );
        normalized
    }

    /// Preset per client type: long-only and pension mandates weigh
    /// recency higher and semantics lower.
    #[must_use]
    pub fn for_client_type(client_type: Option<&str>) -> Self {
        let base = match client_type {
            Some("LONG_ONLY" | "PENSION") => {
                Self { semantic: 0.30, graph: 0.30, impact: 0.20, recency: 0.20 }
            }
            _ => Self::default(),
        };
        base.with_env_overrides()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    // ============================================================
    // Recency decay
    // ============================================================

    #[test]
    fn test_recency_fresh_story() {
        assert_eq!(recency_decay(0.0, 60.0), 1.0);
    }

    #[test]
    fn test_recency_one_half_life() {
        let decayed = recency_decay(60.0, 60.0);
        assert!((decayed - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_recency_negative_age_clamped() {
        assert_eq!(recency_decay(-5.0, 60.0), 1.0);
    }

    #[test]
    fn test_recency_zero_half_life() {
        assert_eq!(recency_decay(10.0, 0.0), 0.0);
    }

    // ============================================================
    // λ-derived config
    // ============================================================

    #[test]
    fn test_defense_regime() {
        let cfg = ScoringConfig::from_opportunity_bias(0.0);
        assert_eq!(cfg.direct_holding_base, 1.0);
        assert_eq!(cfg.watchlist_base, 0.8);
        assert_eq!(cfg.thematic_base, 0.5);
        assert_eq!(cfg.vector_base, 0.4);
        assert_eq!(cfg.supplier_base, 0.6);
        assert_eq!(cfg.recency_half_life_minutes, 60.0);
    }

    #[test]
    fn test_offense_regime() {
        let cfg = ScoringConfig::from_opportunity_bias(1.0);
        assert!((cfg.direct_holding_base - 0.6).abs() < 1e-9);
        assert_eq!(cfg.thematic_base, 1.0);
        assert!((cfg.vector_base - 0.8).abs() < 1e-9);
        assert!((cfg.supplier_base - 0.4).abs() < 1e-9);
        assert_eq!(cfg.recency_half_life_minutes, 180.0);
    }

    #[test]
    fn test_lambda_clamped() {
        let low = ScoringConfig::from_opportunity_bias(-2.0);
        let high = ScoringConfig::from_opportunity_bias(7.0);
        assert_eq!(low.opportunity_bias, 0.0);
        assert_eq!(high.opportunity_bias, 1.0);
    }

    #[test]
    fn test_thematic_crosses_direct_holding() {
        // The whole point of the dial: somewhere in [0, 1] a thematic story
        // overtakes a direct-holding story.
        let defense = ScoringConfig::from_opportunity_bias(0.0);
        let offense = ScoringConfig::from_opportunity_bias(1.0);
        assert!(defense.direct_holding_base > defense.thematic_base);
        assert!(offense.thematic_base > offense.direct_holding_base);
    }

    // ============================================================
    // Client news weights
    // ============================================================

    #[test]
    fn test_default_client_news_weights_sum_to_one() {
        let w = ClientNewsWeights::default();
        assert!((w.semantic + w.graph + w.impact + w.recency - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pension_preset() {
        let w = ClientNewsWeights::for_client_type(Some("PENSION"));
        assert_eq!(w.recency, 0.20);
        let hedge = ClientNewsWeights::for_client_type(Some("HEDGE_FUND"));
        assert_eq!(hedge.recency, 0.10);
    }

    #[test]
    fn test_no_overrides_returns_self() {
        // No GOFR_IQ_CLIENT_NEWS_WEIGHT_* set in the test environment.
        let w = ClientNewsWeights::default().with_env_overrides();
        assert_eq!(w, ClientNewsWeights::default());
    }
}
