//! Application services of the gofr-iq core.
//!
//! These orchestrate the three backends behind the capability seams:
//!
//! - [`IngestService`] — validate → detect language → dedupe → persist →
//!   extract → index, with compensating rollback on partial failure.
//! - [`QueryService`] — hybrid retrieval blending semantic similarity,
//!   source trust, recency and graph expansion.
//! - [`AvatarFeedService`] — the two-channel (MAINTENANCE / OPPORTUNITY)
//!   personalized feed with the opportunity-bias dial.
//! - [`ClientService`] — client/portfolio/watchlist/profile management
//!   and the profile completeness score.
//! - [`GroupService`] — bearer tokens to permitted groups; write-group
//!   selection; admin gating.
//! - [`DuplicateDetector`] — hash, fingerprint and embedding duplicate
//!   checks.
//! - [`HealthService`] — backend liveness probing.

pub mod avatar_feed;
pub mod client;
pub mod duplicate;
pub mod group;
pub mod health;
pub mod ingest;
pub mod query;

pub use avatar_feed::{AvatarFeed, AvatarFeedService, FeedChannel, FeedItem};
pub use client::{ClientService, ProfileCompleteness};
pub use duplicate::{DuplicateCheck, DuplicateDetector, DuplicateMethod};
pub use group::GroupService;
pub use health::{HealthReport, HealthService, ServiceState};
pub use ingest::{IngestRequest, IngestResult, IngestService, IngestStatus, ValidationReport};
pub use query::QueryService;
