//! Controlled theme vocabulary.
//!
//! Every theme attached to a document or a client mandate must come from
//! this closed set. Extraction output is filtered against it on ingest;
//! anything outside the set is dropped, never stored.

/// The controlled vocabulary. Stable snake_case identifiers.
pub const VALID_THEMES: &[&str] = &[
    "agriculture",
    "ai",
    "banking",
    "biotech",
    "blockchain",
    "circular_economy",
    "clean_energy",
    "cloud_computing",
    "commodities",
    "cybersecurity",
    "defense",
    "diversity",
    "e_commerce",
    "energy_transition",
    "ev_battery",
    "fintech",
    "healthcare_innovation",
    "infrastructure",
    "insurance",
    "logistics",
    "luxury_goods",
    "rare_earths",
    "real_estate",
    "renewable_energy",
    "semiconductor",
    "social_housing",
    "supply_chain",
    "sustainable_transport",
    "telecom_5g",
    "tourism",
];

/// Whether `theme` belongs to the controlled vocabulary.
#[must_use]
pub fn is_valid_theme(theme: &str) -> bool {
    VALID_THEMES.binary_search(&theme).is_ok()
}

/// Drop every theme outside the vocabulary, normalizing to lowercase and
/// deduplicating while preserving first-seen order.
#[must_use]
pub fn filter_themes<I, S>(themes: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut kept: Vec<String> = Vec::new();
    for theme in themes {
        let normalized = theme.as_ref().trim().to_lowercase();
        if is_valid_theme(&normalized) && !kept.iter().any(|t| t == &normalized) {
            kept.push(normalized);
        }
    }
    kept
}
