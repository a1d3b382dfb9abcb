//! Centralized default constants for lorekeeper.
//!
//! **This module is the single source of truth** for all shared default
//! values. All crates should reference these constants instead of defining
//! their own magic numbers.

// =============================================================================
// CONFIDENCE THRESHOLDS
// =============================================================================

/// Classifications/relationships at or above this confidence are counted as
/// high-confidence and do not require review.
pub const CONFIDENCE_HIGH: f32 = 0.80;

/// Below this confidence, a pending classification or relationship surfaces
/// in the needs-review queue. The open band between the two thresholds is
/// "medium" confidence.
pub const CONFIDENCE_REVIEW: f32 = 0.65;

// =============================================================================
// AI CACHE
// =============================================================================

/// Current classification algorithm version. Bump when the classification
/// prompt or heuristics change; existing cache entries for older versions
/// stop matching and can be bulk-invalidated.
pub const CLASSIFICATION_ALGORITHM_VERSION: &str = "v2";

/// Current relationship-extraction algorithm version.
pub const RELATIONSHIP_ALGORITHM_VERSION: &str = "v1";

/// Cache entry time-to-live in days.
pub const CACHE_TTL_DAYS: i64 = 30;

/// Entries expiring within this many days count as "expiring soon" in
/// cache statistics.
pub const CACHE_EXPIRY_SOON_DAYS: i64 = 7;

// =============================================================================
// ENRICHMENT WORKER
// =============================================================================

/// Timeout for a single provider call (classification or relationship
/// extraction). Elapsing fails the enrichment run instead of wedging the
/// queue behind a hung provider.
pub const PROVIDER_TIMEOUT_SECS: u64 = 120;

/// Capacity of the worker event broadcast channel.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// EXPORT PARSER
// =============================================================================

/// Minimum number of links for a page to qualify as a collection page.
pub const MIN_COLLECTION_LINKS: usize = 3;

/// A page is a collection page only if its non-link text is shorter than
/// this multiple of the average link-text length.
pub const COLLECTION_TEXT_RATIO: f32 = 3.0;

/// Source system identifier recorded on imported notes and runs.
pub const SOURCE_SYSTEM_NUCLINO: &str = "nuclino";
