//! Structured output of the LLM extraction pass.

use serde::{Deserialize, Serialize};

use crate::models::document::ImpactTier;

/// Direction of an instrument's expected move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
    Neutral,
}

impl Direction {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "positive" => Some(Direction::Positive),
            "negative" => Some(Direction::Negative),
            "neutral" => Some(Direction::Neutral),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Positive => "positive",
            Direction::Negative => "negative",
            Direction::Neutral => "neutral",
        }
    }
}

/// A detected event with the model's confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDetection {
    pub event_type: String,
    pub confidence: f64,
    #[serde(default)]
    pub details: Option<String>,
}

/// An instrument the story affects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentMention {
    /// Uppercased ticker symbol.
    pub ticker: String,
    #[serde(default)]
    pub name: Option<String>,
    pub direction: Direction,
    /// Expected move magnitude in [0, 1].
    pub magnitude: f64,
}

/// Everything the extraction pass pulls from a document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub impact_score: f64,
    #[serde(default)]
    pub impact_tier: Option<ImpactTier>,
    #[serde(default)]
    pub events: Vec<EventDetection>,
    #[serde(default)]
    pub instruments: Vec<InstrumentMention>,
    #[serde(default)]
    pub companies: Vec<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub sectors: Vec<String>,
    #[serde(default)]
    pub summary: String,
    /// Raw model output, kept for audit.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw: String,
}

impl ExtractionResult {
    /// Uppercased tickers of every mentioned instrument.
    #[must_use]
    pub fn tickers(&self) -> Vec<String> {
        self.instruments.iter().map(|i| i.ticker.clone()).collect()
    }

    /// The highest-confidence detected event type, if any.
    #[must_use]
    pub fn primary_event_type(&self) -> Option<&str> {
        self.events
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .map(|e| e.event_type.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_parse() {
        assert_eq!(Direction::parse("Positive"), Some(Direction::Positive));
        assert_eq!(Direction::parse("NEGATIVE"), Some(Direction::Negative));
        assert_eq!(Direction::parse("sideways"), None);
    }

    #[test]
    fn test_primary_event_picks_highest_confidence() {
        let result = ExtractionResult {
            events: vec![
                EventDetection { event_type: "EARNINGS".into(), confidence: 0.6, details: None },
                EventDetection { event_type: "GUIDANCE_CHANGE".into(), confidence: 0.9, details: None },
            ],
            ..ExtractionResult::default()
        };
        assert_eq!(result.primary_event_type(), Some("GUIDANCE_CHANGE"));
    }

    #[test]
    fn test_primary_event_empty() {
        assert_eq!(ExtractionResult::default().primary_event_type(), None);
    }

    #[test]
    fn test_tickers() {
        let result = ExtractionResult {
            instruments: vec![InstrumentMention {
                ticker: "TRUCK".into(),
                name: None,
                direction: Direction::Negative,
                magnitude: 0.7,
            }],
            ..ExtractionResult::default()
        };
        assert_eq!(result.tickers(), vec!["TRUCK".to_string()]);
    }
}
