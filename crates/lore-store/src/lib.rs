//! # lore-store
//!
//! In-memory storage adapter for lorekeeper.
//!
//! [`MemoryStore`] implements every repository trait from `lore-core` over
//! `tokio::sync::RwLock` maps. Services and the enrichment worker are
//! written against the traits, so swapping in a persistent adapter is a
//! wiring change only.

pub mod memory;

pub use memory::MemoryStore;
