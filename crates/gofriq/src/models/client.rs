//! Client, client profile and restriction models.
//!
//! A client owns one portfolio and one watchlist and has one profile. The
//! profile drives the avatar feed: mandate themes feed the OPPORTUNITY
//! channel, the impact threshold gates MAINTENANCE, and the restrictions
//! screen stories out (anti-pitch).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Maximum length of the free-text mandate.
pub const MAX_MANDATE_TEXT_LEN: usize = 5000;

/// Investment horizon of a mandate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Horizon {
    Short,
    Medium,
    Long,
}

impl Horizon {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "short" => Some(Horizon::Short),
            "medium" => Some(Horizon::Medium),
            "long" => Some(Horizon::Long),
            _ => None,
        }
    }
}

/// Sentiment of a portfolio position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSentiment {
    Long,
    Short,
}

/// Negative screening and values-based exclusions. Drives the anti-pitch
/// filter in the OPPORTUNITY channel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EthicalSector {
    #[serde(default)]
    pub excluded_industries: Vec<String>,
    #[serde(default)]
    pub faith_based: Option<String>,
}

/// Positive screening and active stewardship.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImpactSustainability {
    #[serde(default)]
    pub impact_mandate: bool,
    #[serde(default)]
    pub impact_themes: Vec<String>,
    #[serde(default)]
    pub stewardship_obligations: bool,
}

/// Jurisdictional constraints.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LegalRegulatory {
    #[serde(default)]
    pub jurisdictions: Vec<String>,
    #[serde(default)]
    pub investor_eligibility: Option<String>,
    #[serde(default)]
    pub sanctions_restricted: bool,
}

/// Quantitative portfolio construction limits.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OperationalRisk {
    #[serde(default)]
    pub max_issuer_concentration_pct: Option<f64>,
    #[serde(default)]
    pub leverage_limit_nav_pct: Option<f64>,
}

/// Structured restrictions stored as JSON on the profile node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Restrictions {
    #[serde(default)]
    pub ethical_sector: EthicalSector,
    #[serde(default)]
    pub impact_sustainability: ImpactSustainability,
    #[serde(default)]
    pub legal_regulatory: LegalRegulatory,
    #[serde(default)]
    pub operational_risk: OperationalRisk,
}

impl Restrictions {
    /// Whether any exclusion rule is defined.
    #[must_use]
    pub fn has_exclusions(&self) -> bool {
        !self.ethical_sector.excluded_industries.is_empty()
            || self.ethical_sector.faith_based.as_deref().is_some_and(|f| f != "none")
    }

    /// Whether impact boosting should be applied.
    #[must_use]
    pub fn has_impact_mandate(&self) -> bool {
        self.impact_sustainability.impact_mandate
            || !self.impact_sustainability.impact_themes.is_empty()
    }

    /// Whether `sector` is screened out, case-insensitively.
    #[must_use]
    pub fn excludes_sector(&self, sector: &str) -> bool {
        self.ethical_sector
            .excluded_industries
            .iter()
            .any(|e| e.eq_ignore_ascii_case(sector))
    }

    /// Parse from the JSON string form stored on the graph node.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::validation(format!("invalid restrictions JSON: {e}")))
    }
}

/// A brokerage client. Owns one portfolio and one watchlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub client_guid: Uuid,
    pub name: String,
    #[serde(default)]
    pub client_type_code: Option<String>,
    pub group_guid: Uuid,
    #[serde(default)]
    pub primary_contact: Option<String>,
    #[serde(default)]
    pub alert_frequency: Option<String>,
}

/// The profile attached to a client via HAS_PROFILE.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClientProfile {
    #[serde(default)]
    pub profile_guid: Option<Uuid>,
    #[serde(default)]
    pub mandate_type: Option<String>,
    #[serde(default)]
    pub mandate_text: Option<String>,
    #[serde(default)]
    pub mandate_themes: Vec<String>,
    #[serde(default)]
    pub mandate_embedding: Vec<f32>,
    #[serde(default)]
    pub horizon: Option<Horizon>,
    /// Tri-state: `None` means "never set", which CPCS treats as missing.
    #[serde(default)]
    pub esg_constrained: Option<bool>,
    #[serde(default)]
    pub restrictions: Option<Restrictions>,
    #[serde(default)]
    pub impact_threshold: Option<f64>,
    #[serde(default)]
    pub benchmark: Option<String>,
    #[serde(default)]
    pub alert_frequency: Option<String>,
    #[serde(default)]
    pub primary_contact: Option<String>,
}

impl ClientProfile {
    /// Validate field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the mandate text is over-long or
    /// a mandate theme falls outside the controlled vocabulary.
    pub fn validate(&self) -> Result<()> {
        if let Some(text) = &self.mandate_text {
            if text.chars().count() > MAX_MANDATE_TEXT_LEN {
                return Err(Error::validation(format!(
                    "mandate_text exceeds {MAX_MANDATE_TEXT_LEN} characters"
                )));
            }
        }
        for theme in &self.mandate_themes {
            if !crate::themes::is_valid_theme(theme) {
                return Err(Error::validation(format!(
                    "mandate theme '{theme}' is not in the controlled vocabulary"
                )));
            }
        }
        if let Some(threshold) = self.impact_threshold {
            if !(0.0..=100.0).contains(&threshold) {
                return Err(Error::validation("impact_threshold must be within [0, 100]"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_restrictions_default_has_nothing() {
        let r = Restrictions::default();
        assert!(!r.has_exclusions());
        assert!(!r.has_impact_mandate());
    }

    #[test]
    fn test_excluded_sector_case_insensitive() {
        let r = Restrictions {
            ethical_sector: EthicalSector {
                excluded_industries: vec!["TOBACCO".to_string(), "Gambling".to_string()],
                faith_based: None,
            },
            ..Restrictions::default()
        };
        assert!(r.has_exclusions());
        assert!(r.excludes_sector("tobacco"));
        assert!(r.excludes_sector("GAMBLING"));
        assert!(!r.excludes_sector("banking"));
    }

    #[test]
    fn test_faith_based_none_is_not_exclusion() {
        let r = Restrictions {
            ethical_sector: EthicalSector {
                excluded_industries: vec![],
                faith_based: Some("none".to_string()),
            },
            ..Restrictions::default()
        };
        assert!(!r.has_exclusions());
    }

    #[test]
    fn test_impact_themes_imply_mandate() {
        let r = Restrictions {
            impact_sustainability: ImpactSustainability {
                impact_mandate: false,
                impact_themes: vec!["clean_energy".to_string()],
                stewardship_obligations: false,
            },
            ..Restrictions::default()
        };
        assert!(r.has_impact_mandate());
    }

    #[test]
    fn test_restrictions_json_roundtrip() {
        let raw = r#"{
            "ethical_sector": {"excluded_industries": ["TOBACCO"], "faith_based": "shariah"},
            "impact_sustainability": {"impact_mandate": true, "impact_themes": ["clean_energy"]}
        }"#;
        let r = Restrictions::from_json(raw).unwrap();
        assert!(r.has_exclusions());
        assert!(r.has_impact_mandate());
        let encoded = serde_json::to_string(&r).unwrap();
        let back = Restrictions::from_json(&encoded).unwrap();
        assert_eq!(r, back);
    }

    #[test]
    fn test_profile_validates_mandate_length() {
        let profile = ClientProfile {
            mandate_text: Some("x".repeat(MAX_MANDATE_TEXT_LEN + 1)),
            ..ClientProfile::default()
        };
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_profile_validates_themes() {
        let profile = ClientProfile {
            mandate_themes: vec!["blockchain".to_string()],
            ..ClientProfile::default()
        };
        assert!(profile.validate().is_ok());

        let bad = ClientProfile {
            mandate_themes: vec!["astrology".to_string()],
            ..ClientProfile::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_profile_validates_threshold() {
        let profile = ClientProfile {
            impact_threshold: Some(250.0),
            ..ClientProfile::default()
        };
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_esg_tristate_serde() {
        let unset: ClientProfile = serde_json::from_str("{}").unwrap();
        assert_eq!(unset.esg_constrained, None);
        let set: ClientProfile = serde_json::from_str(r#"{"esg_constrained": false}"#).unwrap();
        assert_eq!(set.esg_constrained, Some(false));
    }
}
