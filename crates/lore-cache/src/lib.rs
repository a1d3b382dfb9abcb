//! # lore-cache
//!
//! Content-addressed AI result caching for lorekeeper.
//!
//! Key generation ([`keys`]) hashes normalized note content and context
//! inputs so cosmetically-different but semantically-identical inputs reuse
//! the same cached AI result. The [`AiCache`] service fronts an
//! `AiCacheRepository` with hit accounting, TTL stamping, and note-ID
//! remapping on hits.

pub mod cache;
pub mod keys;

pub use cache::AiCache;
pub use keys::{
    classification_cache_key, content_hash, context_hash, normalize_content,
    relationship_cache_key, relationship_pair_hash,
};
