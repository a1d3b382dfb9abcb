//! # lore-import
//!
//! Nuclino export parsing, heuristic page classification, and the import
//! service for lorekeeper.
//!
//! This crate provides:
//! - The export parser: filename/page-ID parsing with deterministic
//!   fallbacks, HTML entity decoding, cross-page link extraction,
//!   tree-art stripping, and collection-page detection
//! - The heuristic classifier: baseline note types from collection
//!   membership and title patterns, plus link resolution
//! - The import service: import runs, note creation/update with
//!   pre-update snapshots, and import statistics

pub mod classifier;
pub mod importer;
pub mod parser;

pub use classifier::{
    classify_page, classify_pages, generate_import_summary, resolve_links, ClassifiedPage,
    ImportSummary, PartyRoster, ResolvedContent,
};
pub use importer::{ImportRequest, ImportService};
pub use parser::{
    decode_entities, detect_collection_type, detect_collections, extract_links,
    is_collection_page, is_session_log_title, parse_export, parse_filename, strip_tree_art,
    CollectionInfo, CollectionType, ExportEntry, Page, PageLink, ParsedFilename,
};
