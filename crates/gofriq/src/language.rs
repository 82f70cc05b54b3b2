//! Language detection.
//!
//! Wraps `whatlang` with canonicalization to lowercase ISO-639-1 codes and
//! an APAC-focus flag. Texts shorter than the minimum length, and texts the
//! detector cannot classify, fall back to the default language with zero
//! confidence.

use serde::{Deserialize, Serialize};
use whatlang::Lang;

/// Default language when detection fails or text is too short.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Minimum text length for reliable detection.
pub const MIN_TEXT_LENGTH: usize = 20;

/// APAC-focus languages.
pub const APAC_LANGUAGES: &[&str] = &["en", "id", "ja", "ko", "ms", "th", "vi", "zh"];

/// Result of a detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageResult {
    /// Canonical ISO-639-1 code.
    pub language: String,
    /// Detector confidence in [0, 1].
    pub confidence: f64,
    /// The raw code the detector produced (may differ from `language`).
    pub detected_code: String,
    /// Whether the language is in the APAC focus set.
    pub is_apac: bool,
}

/// Map a detector code (or a caller-supplied variant like `zh-cn`) to the
/// canonical ISO-639-1 form.
#[must_use]
pub fn canonical_code(code: &str) -> String {
    let lower = code.trim().to_lowercase();
    match lower.as_str() {
        "zh-cn" | "zh-tw" | "zh-hans" | "zh-hant" => "zh".to_string(),
        other => other.chars().take(2).collect(),
    }
}

/// ISO-639-1 code for the whatlang languages this system recognizes.
fn iso639_1(lang: Lang) -> Option<&'static str> {
    match lang {
        Lang::Eng => Some("en"),
        Lang::Cmn => Some("zh"),
        Lang::Jpn => Some("ja"),
        Lang::Kor => Some("ko"),
        Lang::Ind => Some("id"),
        Lang::Tha => Some("th"),
        Lang::Vie => Some("vi"),
        Lang::Deu => Some("de"),
        Lang::Fra => Some("fr"),
        Lang::Spa => Some("es"),
        Lang::Por => Some("pt"),
        Lang::Rus => Some("ru"),
        Lang::Ara => Some("ar"),
        Lang::Hin => Some("hi"),
        _ => None,
    }
}

/// Detects document language.
#[derive(Debug, Clone)]
pub struct LanguageDetector {
    default_language: String,
    min_text_length: usize,
}

impl Default for LanguageDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageDetector {
    /// Detector with the standard default language and minimum length.
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_language: DEFAULT_LANGUAGE.to_string(),
            min_text_length: MIN_TEXT_LENGTH,
        }
    }

    /// Override the fallback language.
    #[must_use]
    pub fn with_default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    fn default_result(&self) -> LanguageResult {
        LanguageResult {
            language: self.default_language.clone(),
            confidence: 0.0,
            detected_code: self.default_language.clone(),
            is_apac: APAC_LANGUAGES.contains(&self.default_language.as_str()),
        }
    }

    /// Detect the language of `text`.
    #[must_use]
    pub fn detect(&self, text: &str) -> LanguageResult {
        if text.trim().chars().count() < self.min_text_length {
            return self.default_result();
        }

        let Some(info) = whatlang::detect(text) else {
            return self.default_result();
        };

        let detected_code = info.lang().code().to_string();
        let Some(language) = iso639_1(info.lang()) else {
            // Outside the supported set; keep the raw code for diagnostics
            // but fall back to the default for storage.
            return LanguageResult {
                language: self.default_language.clone(),
                confidence: 0.0,
                detected_code,
                is_apac: APAC_LANGUAGES.contains(&self.default_language.as_str()),
            };
        };

        LanguageResult {
            language: language.to_string(),
            confidence: info.confidence(),
            detected_code,
            is_apac: APAC_LANGUAGES.contains(&language),
        }
    }

    /// Detect language from title and content together.
    ///
    /// Content is preferred when its confidence is at least 0.8; otherwise
    /// whichever of the two scored higher wins.
    #[must_use]
    pub fn detect_from_title_and_content(&self, title: &str, content: &str) -> LanguageResult {
        let content_result = self.detect(content);
        if content_result.confidence >= 0.8 {
            return content_result;
        }
        let title_result = self.detect(title);
        if title_result.confidence > content_result.confidence {
            title_result
        } else {
            content_result
        }
    }

    /// Quick heuristic: does `text` contain CJK characters?
    #[must_use]
    pub fn is_cjk(&self, text: &str) -> bool {
        text.chars().any(|c| {
            let code = c as u32;
            // CJK Unified Ideographs, Hiragana, Katakana, Hangul syllables.
            (0x4E00..=0x9FFF).contains(&code)
                || (0x3040..=0x309F).contains(&code)
                || (0x30A0..=0x30FF).contains(&code)
                || (0xAC00..=0xD7AF).contains(&code)
        })
    }
}
