//! Structured logging schema and field name constants for lorekeeper.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized field names across
//! every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, run completions |
//! | DEBUG | Decision points, intermediate values |
//! | TRACE | Per-item iteration (pages, cache keys) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "import", "cache", "inference", "enrich", "store"
pub const SUBSYSTEM: &str = "subsystem";

/// Logical operation name.
/// Examples: "parse_export", "classify_notes", "cache_get_batch"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Note UUID being operated on.
pub const NOTE_ID: &str = "note_id";

/// Team UUID scoping the operation.
pub const TEAM_ID: &str = "team_id";

/// Import run UUID.
pub const IMPORT_RUN_ID: &str = "import_run_id";

/// Enrichment run UUID.
pub const ENRICHMENT_RUN_ID: &str = "enrichment_run_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of pages or notes processed.
pub const NOTE_COUNT: &str = "note_count";

/// Number of cache hits in a batch lookup.
pub const CACHE_HITS: &str = "cache_hits";

/// Number of cache misses in a batch lookup.
pub const CACHE_MISSES: &str = "cache_misses";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
