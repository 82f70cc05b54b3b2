//! Structured extraction over the chat endpoint.
//!
//! The model receives a system prompt describing the JSON schema, the
//! recognized event type codes and the controlled theme vocabulary, plus
//! the document as the user message, and answers in JSON mode at low
//! temperature. The parser validates the shape, clamps ranges, drops
//! themes outside the vocabulary and uppercases tickers. A response that
//! cannot be parsed raises `ExtractionParseError`; the ingest pipeline
//! keeps the document and skips graph edges in that case.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use gofriq::models::{Direction, EventDetection, ExtractionResult, ImpactTier, InstrumentMention};
use gofriq::themes::{filter_themes, VALID_THEMES};
use gofriq::{Error, Result};

use crate::client::{ChatMessage, OpenRouterClient};

/// Maximum characters of content forwarded to the model.
const MAX_CONTENT_CHARS: usize = 12_000;

/// Temperature for extraction calls; near-deterministic.
const EXTRACTION_TEMPERATURE: f32 = 0.1;

/// JSON-mode chat abstraction, mockable in tests.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Run a system+user prompt pair in JSON mode and return the raw
    /// completion text.
    async fn chat_json(&self, system: &str, user: &str, temperature: f32) -> Result<String>;
}

#[async_trait]
impl ChatClient for OpenRouterClient {
    async fn chat_json(&self, system: &str, user: &str, temperature: f32) -> Result<String> {
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];
        let completion = self.chat_completion(&messages, true, temperature, None).await?;
        Ok(completion.content)
    }
}

/// Intermediate deserialization target; tolerant of missing fields.
#[derive(Debug, Deserialize)]
struct RawExtraction {
    impact_score: Option<f64>,
    impact_tier: Option<String>,
    #[serde(default)]
    events: Vec<RawEvent>,
    #[serde(default)]
    instruments: Vec<RawInstrument>,
    #[serde(default)]
    companies: Vec<String>,
    #[serde(default)]
    themes: Vec<String>,
    #[serde(default)]
    regions: Vec<String>,
    #[serde(default)]
    sectors: Vec<String>,
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    event_type: String,
    confidence: Option<f64>,
    details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInstrument {
    ticker: String,
    name: Option<String>,
    direction: Option<String>,
    magnitude: Option<f64>,
}

/// Turns news text into structured impact and entity data.
pub struct ExtractionService {
    chat: Arc<dyn ChatClient>,
    event_codes: Vec<String>,
    system_prompt: String,
}

impl ExtractionService {
    /// Service over a chat client, recognizing the given event type
    /// codes.
    pub fn new(chat: Arc<dyn ChatClient>, event_codes: Vec<String>) -> Self {
        let system_prompt = build_system_prompt(&event_codes);
        Self { chat, event_codes, system_prompt }
    }

    /// Run extraction for one document.
    pub async fn extract(
        &self,
        title: &str,
        content: &str,
        source_name: Option<&str>,
        published_at: Option<&str>,
    ) -> Result<ExtractionResult> {
        let user = build_user_prompt(title, content, source_name, published_at);
        let raw = self.chat.chat_json(&self.system_prompt, &user, EXTRACTION_TEMPERATURE).await?;
        let mut result = parse_extraction(&raw)?;

        // Unknown event codes degrade to no event rather than polluting
        // the graph with unseeded nodes.
        result
            .events
            .retain(|e| self.event_codes.iter().any(|c| c.eq_ignore_ascii_case(&e.event_type)));
        Ok(result)
    }
}

/// Build the extraction system prompt.
fn build_system_prompt(event_codes: &[String]) -> String {
    format!(
        "You are a financial news analyst for a brokerage. Analyze the article and \
         respond with a single JSON object, nothing else.\n\
         \n\
         Fields:\n\
         - impact_score: number 0-100, market impact of the story\n\
         - impact_tier: one of PLATINUM (>=90), GOLD (>=75), SILVER (>=55), \
           BRONZE (>=35), STANDARD (otherwise)\n\
         - events: array of {{event_type, confidence (0-1), details}} using only \
           these event_type codes: {events}\n\
         - instruments: array of {{ticker, name, direction (positive|negative|neutral), \
           magnitude (0-1)}} for directly affected listed instruments\n\
         - companies: array of company names mentioned\n\
         - themes: array drawn only from this vocabulary: {themes}\n\
         - regions: array of region codes (APAC, AMER, EMEA, GLOBAL)\n\
         - sectors: array of sector names\n\
         - summary: one sentence\n\
         \n\
         Use empty arrays when nothing applies. Never invent tickers.",
        events = event_codes.join(", "),
        themes = VALID_THEMES.join(", "),
    )
}

/// Build the user prompt carrying the document.
fn build_user_prompt(
    title: &str,
    content: &str,
    source_name: Option<&str>,
    published_at: Option<&str>,
) -> String {
    let truncated: String = content.chars().take(MAX_CONTENT_CHARS).collect();
    let mut prompt = format!("Title: {title}\n");
    if let Some(source) = source_name {
        prompt.push_str(&format!("Source: {source}\n"));
    }
    if let Some(published) = published_at {
        prompt.push_str(&format!("Published: {published}\n"));
    }
    prompt.push_str(&format!("\nArticle:\n{truncated}"));
    prompt
}

/// Parse and validate a raw model response.
pub fn parse_extraction(raw: &str) -> Result<ExtractionResult> {
    let stripped = crate::client::strip_code_fences(raw);
    let value: Value = serde_json::from_str(stripped)
        .map_err(|e| Error::ExtractionParse(format!("invalid JSON: {e}")))?;
    let parsed: RawExtraction = serde_json::from_value(value)
        .map_err(|e| Error::ExtractionParse(format!("unexpected shape: {e}")))?;

    let impact_score = parsed
        .impact_score
        .ok_or_else(|| Error::ExtractionParse("missing impact_score".to_string()))?
        .clamp(0.0, 100.0);
    let impact_tier = parsed
        .impact_tier
        .as_deref()
        .and_then(ImpactTier::parse)
        .unwrap_or_else(|| ImpactTier::from_score(impact_score));

    let events = parsed
        .events
        .into_iter()
        .map(|e| EventDetection {
            event_type: e.event_type.trim().to_uppercase(),
            confidence: e.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            details: e.details,
        })
        .collect();

    let instruments = parsed
        .instruments
        .into_iter()
        .filter(|i| !i.ticker.trim().is_empty())
        .map(|i| InstrumentMention {
            ticker: i.ticker.trim().to_uppercase(),
            name: i.name,
            direction: i
                .direction
                .as_deref()
                .and_then(Direction::parse)
                .unwrap_or(Direction::Neutral),
            magnitude: i.magnitude.unwrap_or(0.5).clamp(0.0, 1.0),
        })
        .collect();

    Ok(ExtractionResult {
        impact_score,
        impact_tier: Some(impact_tier),
        events,
        instruments,
        companies: parsed.companies,
        themes: filter_themes(parsed.themes),
        regions: parsed.regions,
        sectors: parsed.sectors,
        summary: parsed.summary.unwrap_or_default(),
        raw: raw.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn codes() -> Vec<String> {
        vec!["EARNINGS".to_string(), "STRIKE_LABOR".to_string()]
    }

    struct CannedChat(String);

    #[async_trait]
    impl ChatClient for CannedChat {
        async fn chat_json(&self, _system: &str, _user: &str, _temperature: f32) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    // ============================================================
    // Parsing
    // ============================================================

    #[test]
    fn test_parse_full_response() {
        let raw = r#"{
            "impact_score": 72,
            "impact_tier": "GOLD",
            "events": [{"event_type": "earnings", "confidence": 0.9, "details": "Q2 beat"}],
            "instruments": [{"ticker": "aapl", "direction": "positive", "magnitude": 0.6}],
            "companies": ["Apple Inc"],
            "themes": ["semiconductor", "not_a_theme"],
            "regions": ["AMER"],
            "sectors": ["TECH"],
            "summary": "Apple beat expectations."
        }"#;
        let result = parse_extraction(raw).unwrap();
        assert!((result.impact_score - 72.0).abs() < 1e-9);
        assert_eq!(result.impact_tier, Some(ImpactTier::Gold));
        assert_eq!(result.events[0].event_type, "EARNINGS");
        assert_eq!(result.instruments[0].ticker, "AAPL");
        assert_eq!(result.instruments[0].direction, Direction::Positive);
        assert_eq!(result.themes, vec!["semiconductor".to_string()]);
        assert_eq!(result.summary, "Apple beat expectations.");
    }

    #[test]
    fn test_parse_strips_fences() {
        let raw = "```json\n{\"impact_score\": 10}\n```";
        let result = parse_extraction(raw).unwrap();
        assert_eq!(result.impact_tier, Some(ImpactTier::Standard));
    }

    #[test]
    fn test_parse_missing_impact_fails() {
        let err = parse_extraction("{\"themes\": []}").unwrap_err();
        assert!(matches!(err, Error::ExtractionParse(_)));
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_extraction("the market went up").is_err());
    }

    #[test]
    fn test_parse_clamps_ranges() {
        let raw = r#"{
            "impact_score": 250,
            "instruments": [{"ticker": "X", "magnitude": 7.0}],
            "events": [{"event_type": "EARNINGS", "confidence": -2}]
        }"#;
        let result = parse_extraction(raw).unwrap();
        assert!((result.impact_score - 100.0).abs() < 1e-9);
        assert!((result.instruments[0].magnitude - 1.0).abs() < 1e-9);
        assert!((result.events[0].confidence).abs() < 1e-9);
    }

    #[test]
    fn test_parse_derives_tier_from_score() {
        let result = parse_extraction("{\"impact_score\": 80}").unwrap();
        assert_eq!(result.impact_tier, Some(ImpactTier::Gold));
    }

    #[test]
    fn test_parse_blank_tickers_dropped() {
        let raw = r#"{"impact_score": 50, "instruments": [{"ticker": "  "}]}"#;
        let result = parse_extraction(raw).unwrap();
        assert!(result.instruments.is_empty());
    }

    // ============================================================
    // Service
    // ============================================================

    #[tokio::test]
    async fn test_extract_filters_unknown_event_codes() {
        let canned = r#"{
            "impact_score": 60,
            "events": [
                {"event_type": "EARNINGS", "confidence": 0.8},
                {"event_type": "ALIEN_INVASION", "confidence": 0.9}
            ]
        }"#;
        let service = ExtractionService::new(Arc::new(CannedChat(canned.to_string())), codes());
        let result = service.extract("Title", "Body", None, None).await.unwrap();
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].event_type, "EARNINGS");
    }

    #[tokio::test]
    async fn test_extract_propagates_parse_error() {
        let service =
            ExtractionService::new(Arc::new(CannedChat("not json".to_string())), codes());
        let err = service.extract("Title", "Body", None, None).await.unwrap_err();
        assert!(matches!(err, Error::ExtractionParse(_)));
    }

    // ============================================================
    // Prompts
    // ============================================================

    #[test]
    fn test_system_prompt_lists_codes_and_themes() {
        let prompt = build_system_prompt(&codes());
        assert!(prompt.contains("EARNINGS, STRIKE_LABOR"));
        assert!(prompt.contains("blockchain"));
        assert!(prompt.contains("Never invent tickers"));
    }

    #[test]
    fn test_user_prompt_truncates_content() {
        let content = "x".repeat(MAX_CONTENT_CHARS + 500);
        let prompt = build_user_prompt("T", &content, Some("Reuters"), Some("2026-07-01"));
        assert!(prompt.chars().count() < MAX_CONTENT_CHARS + 200);
        assert!(prompt.contains("Source: Reuters"));
        assert!(prompt.contains("Published: 2026-07-01"));
    }
}
