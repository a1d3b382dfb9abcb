//! # lore-core
//!
//! Core types, traits, and abstractions for the lorekeeper import and
//! enrichment pipeline.
//!
//! This crate provides the foundational data structures and trait
//! definitions that other lorekeeper crates depend on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod provider;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use provider::*;
pub use traits::*;
