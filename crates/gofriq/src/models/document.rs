//! The immutable, versioned document model.
//!
//! Documents are append-only: an update creates a new record with
//! `version + 1` and a `previous_version_guid` link back to its
//! predecessor, and a duplicate flagging produces a copy with the
//! duplicate fields populated. Nothing mutates a stored document in place.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Hard ceiling on document length.
pub const MAX_WORD_COUNT: usize = 20_000;

/// Maximum title length in characters.
pub const MAX_TITLE_LEN: usize = 500;

/// Count whitespace-separated words.
#[must_use]
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Validate content length, returning the word count alongside the verdict.
#[must_use]
pub fn validate_word_count(content: &str) -> (bool, usize) {
    let words = count_words(content);
    (words <= MAX_WORD_COUNT, words)
}

/// Discrete classification of a document's impact score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImpactTier {
    Platinum,
    Gold,
    Silver,
    Bronze,
    Standard,
}

impl ImpactTier {
    /// Band an impact score into a tier. The bands match the guidance given
    /// to the extraction model so locally-derived tiers agree with
    /// extracted ones.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            ImpactTier::Platinum
        } else if score >= 75.0 {
            ImpactTier::Gold
        } else if score >= 55.0 {
            ImpactTier::Silver
        } else if score >= 35.0 {
            ImpactTier::Bronze
        } else {
            ImpactTier::Standard
        }
    }

    /// Canonical uppercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactTier::Platinum => "PLATINUM",
            ImpactTier::Gold => "GOLD",
            ImpactTier::Silver => "SILVER",
            ImpactTier::Bronze => "BRONZE",
            ImpactTier::Standard => "STANDARD",
        }
    }

    /// Parse a tier name, case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "PLATINUM" => Some(ImpactTier::Platinum),
            "GOLD" => Some(ImpactTier::Gold),
            "SILVER" => Some(ImpactTier::Silver),
            "BRONZE" => Some(ImpactTier::Bronze),
            "STANDARD" => Some(ImpactTier::Standard),
            _ => None,
        }
    }
}

impl std::fmt::Display for ImpactTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, versioned news document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub guid: Uuid,
    pub version: u32,
    #[serde(default)]
    pub previous_version_guid: Option<Uuid>,
    pub source_guid: Uuid,
    pub group_guid: Uuid,
    pub created_at: DateTime<Utc>,
    pub language: String,
    #[serde(default)]
    pub language_detected: bool,
    pub title: String,
    pub content: String,
    pub word_count: usize,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub story_fingerprint: Option<String>,
    #[serde(default)]
    pub duplicate_of: Option<Uuid>,
    #[serde(default)]
    pub duplicate_score: f64,
    #[serde(default)]
    pub impact_score: Option<f64>,
    #[serde(default)]
    pub impact_tier: Option<ImpactTier>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Document {
    /// Start building a version-1 document.
    pub fn builder(
        title: impl Into<String>,
        content: impl Into<String>,
        source_guid: Uuid,
        group_guid: Uuid,
    ) -> DocumentBuilder {
        DocumentBuilder {
            guid: Uuid::new_v4(),
            version: 1,
            previous_version_guid: None,
            source_guid,
            group_guid,
            created_at: Utc::now(),
            language: "en".to_string(),
            language_detected: false,
            title: title.into(),
            content: content.into(),
            content_hash: None,
            story_fingerprint: None,
            duplicate_of: None,
            duplicate_score: 0.0,
            impact_score: None,
            impact_tier: None,
            themes: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Whether this record has been flagged as a duplicate.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        self.duplicate_of.is_some()
    }

    /// Whether this is an original (non-duplicate) version-1 record.
    #[must_use]
    pub fn is_original(&self) -> bool {
        self.version == 1 && !self.is_duplicate()
    }

    /// Create the next version of this document. Metadata is merged over
    /// the existing bag; title/content default to the current values.
    pub fn create_new_version(
        &self,
        title: Option<String>,
        content: Option<String>,
        metadata: Option<BTreeMap<String, Value>>,
    ) -> Result<Document> {
        let mut merged = self.metadata.clone();
        if let Some(extra) = metadata {
            merged.extend(extra);
        }

        let mut builder = Document::builder(
            title.unwrap_or_else(|| self.title.clone()),
            content.unwrap_or_else(|| self.content.clone()),
            self.source_guid,
            self.group_guid,
        )
        .with_language(&self.language, self.language_detected)
        .with_metadata(merged);
        builder.version = self.version + 1;
        builder.previous_version_guid = Some(self.guid);
        builder.build()
    }

    /// Return a copy of this document flagged as a duplicate of
    /// `original_guid`. Documents are immutable, so this is a new value
    /// with the same guid.
    pub fn mark_as_duplicate(&self, original_guid: Uuid, score: f64) -> Result<Document> {
        if score <= 0.0 || score > 1.0 {
            return Err(Error::validation(format!(
                "duplicate score must be in (0, 1], got {score}"
            )));
        }
        let mut doc = self.clone();
        doc.duplicate_of = Some(original_guid);
        doc.duplicate_score = score;
        Ok(doc)
    }
}

/// Builder that validates on `build()`. Field access is crate-internal so
/// version links can only be created through
/// [`Document::create_new_version`] or the builder's explicit setters.
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    pub(crate) guid: Uuid,
    pub(crate) version: u32,
    pub(crate) previous_version_guid: Option<Uuid>,
    source_guid: Uuid,
    group_guid: Uuid,
    created_at: DateTime<Utc>,
    language: String,
    language_detected: bool,
    title: String,
    content: String,
    content_hash: Option<String>,
    story_fingerprint: Option<String>,
    duplicate_of: Option<Uuid>,
    duplicate_score: f64,
    impact_score: Option<f64>,
    impact_tier: Option<ImpactTier>,
    themes: Vec<String>,
    metadata: BTreeMap<String, Value>,
}

impl DocumentBuilder {
    /// Set an explicit guid (used when replaying stored records).
    #[must_use]
    pub fn with_guid(mut self, guid: Uuid) -> Self {
        self.guid = guid;
        self
    }

    /// Set the creation timestamp.
    #[must_use]
    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    /// Set the language code and whether it was auto-detected.
    #[must_use]
    pub fn with_language(mut self, language: &str, detected: bool) -> Self {
        self.language = language.to_string();
        self.language_detected = detected;
        self
    }

    /// Set version and predecessor link together.
    #[must_use]
    pub fn with_version(mut self, version: u32, previous: Option<Uuid>) -> Self {
        self.version = version;
        self.previous_version_guid = previous;
        self
    }

    /// Attach the exact-duplicate content hash.
    #[must_use]
    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    /// Attach the near-duplicate story fingerprint.
    #[must_use]
    pub fn with_story_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.story_fingerprint = Some(fingerprint.into());
        self
    }

    /// Flag as a duplicate of an earlier document.
    #[must_use]
    pub fn with_duplicate_of(mut self, original: Uuid, score: f64) -> Self {
        self.duplicate_of = Some(original);
        self.duplicate_score = score;
        self
    }

    /// Attach extraction-derived impact scoring.
    #[must_use]
    pub fn with_impact(mut self, score: f64, tier: ImpactTier) -> Self {
        self.impact_score = Some(score);
        self.impact_tier = Some(tier);
        self
    }

    /// Attach controlled-vocabulary themes. Callers are expected to have
    /// filtered against the vocabulary already.
    #[must_use]
    pub fn with_themes(mut self, themes: Vec<String>) -> Self {
        self.themes = themes;
        self
    }

    /// Attach the free-form metadata bag.
    #[must_use]
    pub fn with_metadata(mut self, metadata: BTreeMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Validate and produce the document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty or over-long title, empty
    /// content, an inconsistent version chain or duplicate marking, or an
    /// out-of-range impact score. Returns [`Error::WordCountExceeded`] when
    /// the content is over [`MAX_WORD_COUNT`].
    pub fn build(self) -> Result<Document> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(Error::validation("title must not be empty"));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(Error::validation(format!(
                "title exceeds {MAX_TITLE_LEN} characters"
            )));
        }
        if self.content.trim().is_empty() {
            return Err(Error::validation("content must not be empty"));
        }

        let (ok, word_count) = validate_word_count(&self.content);
        if !ok {
            return Err(Error::WordCountExceeded { count: word_count, max: MAX_WORD_COUNT });
        }

        if self.version < 1 {
            return Err(Error::validation("version must be >= 1"));
        }
        if self.version == 1 && self.previous_version_guid.is_some() {
            return Err(Error::validation(
                "version 1 documents cannot have a previous_version_guid",
            ));
        }
        if self.version > 1 && self.previous_version_guid.is_none() {
            return Err(Error::validation(
                "versions beyond 1 must link a previous_version_guid",
            ));
        }

        if self.duplicate_of.is_some() && self.duplicate_score <= 0.0 {
            return Err(Error::validation(
                "duplicate_score must be > 0 when duplicate_of is set",
            ));
        }
        if self.duplicate_of.is_none() && self.duplicate_score > 0.0 {
            return Err(Error::validation(
                "duplicate_of must be set when duplicate_score > 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.duplicate_score) {
            return Err(Error::validation("duplicate_score must be within [0, 1]"));
        }

        if let Some(score) = self.impact_score {
            if !(0.0..=100.0).contains(&score) {
                return Err(Error::validation("impact_score must be within [0, 100]"));
            }
        }

        // Language codes are stored as lowercase ISO-639-1.
        let language = {
            let lang = self.language.trim().to_lowercase();
            if lang.is_empty() {
                "en".to_string()
            } else {
                lang.chars().take(2).collect()
            }
        };

        Ok(Document {
            guid: self.guid,
            version: self.version,
            previous_version_guid: self.previous_version_guid,
            source_guid: self.source_guid,
            group_guid: self.group_guid,
            created_at: self.created_at,
            language,
            language_detected: self.language_detected,
            title,
            content: self.content,
            word_count,
            content_hash: self.content_hash,
            story_fingerprint: self.story_fingerprint,
            duplicate_of: self.duplicate_of,
            duplicate_score: self.duplicate_score,
            impact_score: self.impact_score,
            impact_tier: self.impact_tier,
            themes: self.themes,
            metadata: self.metadata,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn src() -> Uuid {
        Uuid::new_v4()
    }

    // ============================================================
    // Word count
    // ============================================================

    #[test]
    fn test_count_words_basic() {
        assert_eq!(count_words("one two three"), 3);
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("  spaced   out  "), 2);
    }

    #[test]
    fn test_validate_word_count_limit() {
        let long = "word ".repeat(MAX_WORD_COUNT + 1);
        let (ok, count) = validate_word_count(&long);
        assert!(!ok);
        assert_eq!(count, MAX_WORD_COUNT + 1);
    }

    // ============================================================
    // Impact tier
    // ============================================================

    #[test]
    fn test_tier_banding() {
        assert_eq!(ImpactTier::from_score(95.0), ImpactTier::Platinum);
        assert_eq!(ImpactTier::from_score(90.0), ImpactTier::Platinum);
        assert_eq!(ImpactTier::from_score(80.0), ImpactTier::Gold);
        assert_eq!(ImpactTier::from_score(60.0), ImpactTier::Silver);
        assert_eq!(ImpactTier::from_score(40.0), ImpactTier::Bronze);
        assert_eq!(ImpactTier::from_score(10.0), ImpactTier::Standard);
    }

    #[test]
    fn test_tier_parse_roundtrip() {
        for tier in [
            ImpactTier::Platinum,
            ImpactTier::Gold,
            ImpactTier::Silver,
            ImpactTier::Bronze,
            ImpactTier::Standard,
        ] {
            assert_eq!(ImpactTier::parse(tier.as_str()), Some(tier));
        }
        assert_eq!(ImpactTier::parse("gold"), Some(ImpactTier::Gold));
        assert_eq!(ImpactTier::parse("diamond"), None);
    }

    #[test]
    fn test_tier_serde_uppercase() {
        let json = serde_json::to_string(&ImpactTier::Gold).unwrap();
        assert_eq!(json, "\"GOLD\"");
    }

    // ============================================================
    // Builder validation
    // ============================================================

    #[test]
    fn test_build_minimal() {
        let doc = Document::builder("Title", "Some content here.", src(), src())
            .build()
            .unwrap();
        assert_eq!(doc.version, 1);
        assert_eq!(doc.word_count, 3);
        assert_eq!(doc.language, "en");
        assert!(doc.is_original());
        assert!(!doc.is_duplicate());
    }

    #[test]
    fn test_empty_title_rejected() {
        let err = Document::builder("   ", "content", src(), src()).build();
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[test]
    fn test_long_title_rejected() {
        let title = "x".repeat(MAX_TITLE_LEN + 1);
        let err = Document::builder(title, "content", src(), src()).build();
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[test]
    fn test_empty_content_rejected() {
        let err = Document::builder("Title", "  ", src(), src()).build();
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[test]
    fn test_over_long_content_rejected() {
        let content = "word ".repeat(MAX_WORD_COUNT + 5);
        let err = Document::builder("Title", content, src(), src()).build();
        assert!(matches!(err, Err(Error::WordCountExceeded { .. })));
    }

    #[test]
    fn test_version_one_cannot_link_previous() {
        let err = Document::builder("Title", "content", src(), src())
            .with_version(1, Some(Uuid::new_v4()))
            .build();
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[test]
    fn test_later_version_requires_previous() {
        let err = Document::builder("Title", "content", src(), src())
            .with_version(2, None)
            .build();
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[test]
    fn test_duplicate_requires_positive_score() {
        let err = Document::builder("Title", "content", src(), src())
            .with_duplicate_of(Uuid::new_v4(), 0.0)
            .build();
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[test]
    fn test_impact_score_range() {
        let err = Document::builder("Title", "content", src(), src())
            .with_impact(140.0, ImpactTier::Platinum)
            .build();
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[test]
    fn test_language_normalized() {
        let doc = Document::builder("Title", "content", src(), src())
            .with_language(" ZH-CN ", true)
            .build()
            .unwrap();
        assert_eq!(doc.language, "zh");
        assert!(doc.language_detected);
    }

    // ============================================================
    // Versioning and duplicates
    // ============================================================

    #[test]
    fn test_create_new_version_links_back() {
        let v1 = Document::builder("Title", "original content", src(), src())
            .build()
            .unwrap();
        let v2 = v1
            .create_new_version(None, Some("updated content".to_string()), None)
            .unwrap();
        assert_eq!(v2.version, 2);
        assert_eq!(v2.previous_version_guid, Some(v1.guid));
        assert_ne!(v2.guid, v1.guid);
        assert_eq!(v2.title, v1.title);
        assert_eq!(v2.content, "updated content");
        assert!(!v2.is_original());
    }

    #[test]
    fn test_new_version_merges_metadata() {
        let mut meta = BTreeMap::new();
        meta.insert("desk".to_string(), Value::from("apac"));
        let v1 = Document::builder("Title", "content", src(), src())
            .with_metadata(meta)
            .build()
            .unwrap();

        let mut extra = BTreeMap::new();
        extra.insert("reviewed".to_string(), Value::from(true));
        let v2 = v1.create_new_version(None, None, Some(extra)).unwrap();
        assert_eq!(v2.metadata.get("desk"), Some(&Value::from("apac")));
        assert_eq!(v2.metadata.get("reviewed"), Some(&Value::from(true)));
    }

    #[test]
    fn test_mark_as_duplicate() {
        let doc = Document::builder("Title", "content", src(), src()).build().unwrap();
        let original = Uuid::new_v4();
        let dup = doc.mark_as_duplicate(original, 1.0).unwrap();
        assert_eq!(dup.guid, doc.guid);
        assert_eq!(dup.duplicate_of, Some(original));
        assert!((dup.duplicate_score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mark_as_duplicate_rejects_bad_score() {
        let doc = Document::builder("Title", "content", src(), src()).build().unwrap();
        assert!(doc.mark_as_duplicate(Uuid::new_v4(), 0.0).is_err());
        assert!(doc.mark_as_duplicate(Uuid::new_v4(), 1.5).is_err());
    }

    // ============================================================
    // Serde round-trip
    // ============================================================

    #[test]
    fn test_document_json_roundtrip() {
        let mut meta = BTreeMap::new();
        meta.insert("tags".to_string(), serde_json::json!(["rates", "fed"]));
        let doc = Document::builder("Fed Decision", "The committee voted.", src(), src())
            .with_impact(72.0, ImpactTier::Gold)
            .with_themes(vec!["banking".to_string()])
            .with_content_hash("abc123")
            .with_metadata(meta)
            .build()
            .unwrap();

        let json = serde_json::to_string(&doc).unwrap();
        let back: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(doc, back);
    }
}
