//! # lore-enrich
//!
//! AI enrichment pipeline for lorekeeper: a FIFO background worker that
//! classifies imported notes and extracts relationships through a pluggable
//! provider, and a review layer that keeps every AI suggestion pending
//! until a user approves it.

pub mod review;
pub mod worker;

pub use review::{NeedsReview, ReviewService};
pub use worker::{EnrichmentJob, EnrichmentWorker, WorkerEvent, WorkerHandle};
