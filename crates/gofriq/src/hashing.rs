//! Content hashing and story fingerprinting.
//!
//! Two duplicate keys are derived here:
//!
//! - the content hash, a sha256 over normalized `title + " " + content`,
//!   catching byte-identical republications, and
//! - the story fingerprint, a sha256 over `(sorted tickers, event type,
//!   year-quarter bucket)`, catching re-writes of the same event. The date
//!   component is bucketed per quarter so a republication within the same
//!   reporting period clusters, while the next quarter's recurrence of the
//!   same event (e.g. earnings) does not.

use chrono::{DateTime, Datelike, Utc};
use sha2::{Digest, Sha256};

/// Normalize text for hashing: lowercase, collapse whitespace runs, strip
/// leading/trailing space.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Compute the exact-duplicate content hash for a document.
#[must_use]
pub fn compute_content_hash(title: &str, content: &str) -> String {
    let normalized = normalize_text(&format!("{title} {content}"));
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)
}

/// The quarter bucket used by the story fingerprint, e.g. `2026-Q3`.
#[must_use]
pub fn quarter_bucket(at: DateTime<Utc>) -> String {
    let quarter = (at.month() - 1) / 3 + 1;
    format!("{}-Q{}", at.year(), quarter)
}

/// Compute the near-duplicate story fingerprint.
///
/// Tickers are uppercased and sorted so the fingerprint is independent of
/// extraction order.
#[must_use]
pub fn compute_story_fingerprint(
    tickers: &[String],
    event_type: &str,
    created_at: DateTime<Utc>,
) -> String {
    let mut sorted: Vec<String> = tickers.iter().map(|t| t.trim().to_uppercase()).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let material = format!(
        "{}|{}|{}",
        sorted.join(","),
        event_type.trim().to_uppercase(),
        quarter_bucket(created_at)
    );
    hex::encode(Sha256::digest(material.as_bytes()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_text("  Hello   World \n"), "hello world");
    }

    #[test]
    fn test_content_hash_case_insensitive() {
        let a = compute_content_hash("Fed Raises Rates", "Markets reacted sharply.");
        let b = compute_content_hash("FED RAISES RATES", "Markets  reacted sharply.");
        assert_eq!(a, b);
    }

    #[test]
    fn test_content_hash_differs_on_content() {
        let a = compute_content_hash("Fed Raises Rates", "Markets reacted sharply.");
        let b = compute_content_hash("Fed Raises Rates", "Markets shrugged.");
        assert_ne!(a, b);
    }

    #[test]
    fn test_quarter_bucket() {
        let jan = Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap();
        let jun = Utc.with_ymd_and_hms(2026, 6, 30, 0, 0, 0).unwrap();
        let dec = Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap();
        assert_eq!(quarter_bucket(jan), "2026-Q1");
        assert_eq!(quarter_bucket(jun), "2026-Q2");
        assert_eq!(quarter_bucket(dec), "2026-Q4");
    }

    #[test]
    fn test_fingerprint_ticker_order_independent() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let a = compute_story_fingerprint(&["AAPL".into(), "msft".into()], "EARNINGS", at);
        let b = compute_story_fingerprint(&["MSFT".into(), "aapl".into()], "earnings", at);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_changes_across_quarters() {
        // Same story 95 days later lands in a different quarter and must not
        // collide.
        let q1 = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let q2 = q1 + chrono::Duration::days(95);
        let a = compute_story_fingerprint(&["AAPL".into()], "EARNINGS", q1);
        let b = compute_story_fingerprint(&["AAPL".into()], "EARNINGS", q2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_same_quarter_collides() {
        let a_at = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        let b_at = Utc.with_ymd_and_hms(2026, 3, 20, 17, 0, 0).unwrap();
        let a = compute_story_fingerprint(&["TRUCK".into()], "STRIKE_LABOR", a_at);
        let b = compute_story_fingerprint(&["TRUCK".into()], "STRIKE_LABOR", b_at);
        assert_eq!(a, b);
    }
}
