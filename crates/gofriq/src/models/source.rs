//! News source model with trust-level scoring.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Credibility level of a source. Higher trust boosts query ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    High,
    Medium,
    Low,
    Unverified,
}

impl TrustLevel {
    /// Multiplicative ranking boost applied at query time.
    #[must_use]
    pub fn boost_factor(&self) -> f64 {
        match self {
            TrustLevel::High => 1.2,
            TrustLevel::Medium => 1.0,
            TrustLevel::Low => 0.8,
            TrustLevel::Unverified => 0.6,
        }
    }

    /// Parse a trust level name, case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "high" => Some(TrustLevel::High),
            "medium" => Some(TrustLevel::Medium),
            "low" => Some(TrustLevel::Low),
            "unverified" => Some(TrustLevel::Unverified),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::High => "high",
            TrustLevel::Medium => "medium",
            TrustLevel::Low => "low",
            TrustLevel::Unverified => "unverified",
        }
    }
}

/// Kind of news source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    NewsAgency,
    Internal,
    Research,
    Government,
    Corporate,
    Social,
    Other,
}

impl SourceType {
    /// Parse a source type name, case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "news_agency" => Some(SourceType::NewsAgency),
            "internal" => Some(SourceType::Internal),
            "research" => Some(SourceType::Research),
            "government" => Some(SourceType::Government),
            "corporate" => Some(SourceType::Corporate),
            "social" => Some(SourceType::Social),
            "other" => Some(SourceType::Other),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::NewsAgency => "news_agency",
            SourceType::Internal => "internal",
            SourceType::Research => "research",
            SourceType::Government => "government",
            SourceType::Corporate => "corporate",
            SourceType::Social => "social",
            SourceType::Other => "other",
        }
    }
}

/// A registered news source. Belongs to exactly one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub source_guid: Uuid,
    pub group_guid: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    #[serde(default)]
    pub region: Option<String>,
    pub languages: Vec<String>,
    pub trust_level: TrustLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub active: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Source {
    /// Create a new active source with a fresh guid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty name.
    pub fn new(
        group_guid: Uuid,
        name: impl Into<String>,
        source_type: SourceType,
        trust_level: TrustLevel,
    ) -> Result<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(Error::validation("source name must not be empty"));
        }
        let now = Utc::now();
        Ok(Self {
            source_guid: Uuid::new_v4(),
            group_guid,
            name,
            source_type,
            region: None,
            languages: vec!["en".to_string()],
            trust_level,
            created_at: now,
            updated_at: now,
            active: true,
            metadata: BTreeMap::new(),
        })
    }

    /// Ranking boost derived from the trust level.
    #[must_use]
    pub fn boost_factor(&self) -> f64 {
        self.trust_level.boost_factor()
    }

    /// Soft-delete: flip `active` and bump `updated_at`.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.updated_at = Utc::now();
    }

    /// Undo a soft delete.
    pub fn reactivate(&mut self) {
        self.active = true;
        self.updated_at = Utc::now();
    }

    /// Normalize language codes to lowercase.
    pub fn set_languages(&mut self, languages: Vec<String>) {
        self.languages = languages.into_iter().map(|l| l.trim().to_lowercase()).collect();
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_boost_factors() {
        assert!((TrustLevel::High.boost_factor() - 1.2).abs() < f64::EPSILON);
        assert!((TrustLevel::Medium.boost_factor() - 1.0).abs() < f64::EPSILON);
        assert!((TrustLevel::Low.boost_factor() - 0.8).abs() < f64::EPSILON);
        assert!((TrustLevel::Unverified.boost_factor() - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_trust_level_parse() {
        assert_eq!(TrustLevel::parse("High"), Some(TrustLevel::High));
        assert_eq!(TrustLevel::parse("unverified"), Some(TrustLevel::Unverified));
        assert_eq!(TrustLevel::parse("platinum"), None);
    }

    #[test]
    fn test_source_type_serde_snake_case() {
        let json = serde_json::to_string(&SourceType::NewsAgency).unwrap();
        assert_eq!(json, "\"news_agency\"");
        let back: SourceType = serde_json::from_str("\"research\"").unwrap();
        assert_eq!(back, SourceType::Research);
    }

    #[test]
    fn test_new_source_defaults() {
        let source = Source::new(
            Uuid::new_v4(),
            "Reuters APAC",
            SourceType::NewsAgency,
            TrustLevel::High,
        )
        .unwrap();
        assert!(source.active);
        assert_eq!(source.languages, vec!["en"]);
        assert!((source.boost_factor() - 1.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = Source::new(Uuid::new_v4(), "  ", SourceType::Other, TrustLevel::Medium);
        assert!(err.is_err());
    }

    #[test]
    fn test_deactivate_bumps_updated_at() {
        let mut source =
            Source::new(Uuid::new_v4(), "Desk Notes", SourceType::Internal, TrustLevel::Medium)
                .unwrap();
        let before = source.updated_at;
        source.deactivate();
        assert!(!source.active);
        assert!(source.updated_at >= before);
        source.reactivate();
        assert!(source.active);
    }

    #[test]
    fn test_languages_normalized() {
        let mut source =
            Source::new(Uuid::new_v4(), "Nikkei", SourceType::NewsAgency, TrustLevel::High)
                .unwrap();
        source.set_languages(vec!["JA".to_string(), " EN ".to_string()]);
        assert_eq!(source.languages, vec!["ja", "en"]);
    }

    #[test]
    fn test_source_json_roundtrip() {
        let source = Source::new(
            Uuid::new_v4(),
            "Bloomberg",
            SourceType::NewsAgency,
            TrustLevel::High,
        )
        .unwrap();
        let json = serde_json::to_string(&source).unwrap();
        assert!(json.contains("\"type\":\"news_agency\""));
        let back: Source = serde_json::from_str(&json).unwrap();
        assert_eq!(source, back);
    }
}
