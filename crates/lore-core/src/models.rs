//! Core data models for lorekeeper.
//!
//! These types are shared across all lorekeeper crates and represent the
//! domain entities of the import and enrichment pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

// =============================================================================
// NOTE TYPES
// =============================================================================

/// Domain type of a campaign note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    Area,
    Character,
    Npc,
    Poi,
    Quest,
    SessionLog,
    Note,
}

impl NoteType {
    /// Types considered settled by earlier classification; the enrichment
    /// worker skips them unless `override_existing` is set.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            NoteType::Character | NoteType::Npc | NoteType::Poi | NoteType::Quest
        )
    }
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NoteType::Area => "area",
            NoteType::Character => "character",
            NoteType::Npc => "npc",
            NoteType::Poi => "poi",
            NoteType::Quest => "quest",
            NoteType::SessionLog => "session_log",
            NoteType::Note => "note",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for NoteType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "area" => Ok(NoteType::Area),
            "character" => Ok(NoteType::Character),
            "npc" => Ok(NoteType::Npc),
            "poi" => Ok(NoteType::Poi),
            "quest" => Ok(NoteType::Quest),
            "session_log" => Ok(NoteType::SessionLog),
            "note" => Ok(NoteType::Note),
            other => Err(Error::InvalidInput(format!("unknown note type: {}", other))),
        }
    }
}

/// Status of a quest note. Only meaningful when `note_type` is `Quest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    Active,
    Done,
}

/// Enforce the invariant that `quest_status` is null for non-quest notes.
pub fn normalize_quest_status(
    note_type: NoteType,
    quest_status: Option<QuestStatus>,
) -> Option<QuestStatus> {
    if note_type == NoteType::Quest {
        quest_status
    } else {
        None
    }
}

/// A campaign note. Created by import or manually; mutated by updates,
/// enrichment-driven reclassification, or snapshot restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub team_id: Uuid,
    pub title: String,
    pub content: String,
    pub note_type: NoteType,
    pub quest_status: Option<QuestStatus>,
    pub is_private: bool,
    pub linked_note_ids: Vec<Uuid>,
    // Import provenance
    pub source_system: Option<String>,
    pub source_page_id: Option<String>,
    pub content_markdown: Option<String>,
    pub content_markdown_resolved: Option<String>,
    pub import_run_id: Option<Uuid>,
    pub created_by_user_id: Option<Uuid>,
    pub updated_by_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// IMPORT RUNS
// =============================================================================

/// Status of an import run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportRunStatus {
    Completed,
    Failed,
    Deleted,
}

/// Default visibility applied to imported notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    Team,
}

/// Options controlling an import run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Whether pages whose cleaned content is empty are still imported.
    pub import_empty_pages: bool,
    pub default_visibility: Visibility,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            import_empty_pages: false,
            default_visibility: Visibility::Team,
        }
    }
}

/// Aggregate statistics for an import run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportStats {
    pub total_pages_detected: i64,
    pub notes_created: i64,
    pub notes_updated: i64,
    pub notes_skipped: i64,
    pub empty_pages_imported: i64,
    pub links_resolved: i64,
    pub warnings_count: i64,
}

/// One import run groups all notes it created or updated (via
/// `note.import_run_id`), enabling bulk rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRun {
    pub id: Uuid,
    pub team_id: Uuid,
    pub source_system: String,
    pub status: ImportRunStatus,
    pub options: ImportOptions,
    pub stats: ImportStats,
    pub created_by_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Pre-update field values of a note touched by an import run. Exists only
/// for notes *updated* (not created) by an import; restoring reverts those
/// fields and clears `import_run_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteImportSnapshot {
    pub id: Uuid,
    pub note_id: Uuid,
    pub import_run_id: Uuid,
    pub previous_title: String,
    pub previous_content: String,
    pub previous_note_type: NoteType,
    pub previous_quest_status: Option<QuestStatus>,
    pub previous_content_markdown: Option<String>,
    pub previous_content_markdown_resolved: Option<String>,
    pub previous_is_private: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// ENRICHMENT RUNS
// =============================================================================

/// State machine status of an enrichment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Running totals for an enrichment run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentTotals {
    pub notes_processed: i64,
    pub classifications_created: i64,
    pub relationships_found: i64,
    pub high_confidence_count: i64,
    pub low_confidence_count: i64,
    pub user_review_required: i64,
}

/// One execution of the AI classification + relationship pipeline over an
/// import run's notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentRun {
    pub id: Uuid,
    pub import_run_id: Uuid,
    pub team_id: Uuid,
    pub status: EnrichmentRunStatus,
    pub totals: EnrichmentTotals,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

// =============================================================================
// CLASSIFICATIONS & RELATIONSHIPS
// =============================================================================

/// Entity type vocabulary of the AI classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InferredEntityType {
    Character,
    #[serde(rename = "NPC")]
    Npc,
    Area,
    Quest,
    SessionLog,
    Note,
}

impl fmt::Display for InferredEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InferredEntityType::Character => "Character",
            InferredEntityType::Npc => "NPC",
            InferredEntityType::Area => "Area",
            InferredEntityType::Quest => "Quest",
            InferredEntityType::SessionLog => "SessionLog",
            InferredEntityType::Note => "Note",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for InferredEntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Character" => Ok(InferredEntityType::Character),
            "NPC" => Ok(InferredEntityType::Npc),
            "Area" => Ok(InferredEntityType::Area),
            "Quest" => Ok(InferredEntityType::Quest),
            "SessionLog" => Ok(InferredEntityType::SessionLog),
            "Note" => Ok(InferredEntityType::Note),
            other => Err(Error::InvalidInput(format!(
                "unknown inferred entity type: {}",
                other
            ))),
        }
    }
}

/// Map a stored note type into the classifier's vocabulary.
///
/// Both `poi` and `area` collapse to `Area`; the inverse mapping always
/// produces `poi` (the canonical representation going forward).
pub fn map_note_type_to_inferred(note_type: NoteType) -> InferredEntityType {
    match note_type {
        NoteType::Area | NoteType::Poi => InferredEntityType::Area,
        NoteType::Character => InferredEntityType::Character,
        NoteType::Npc => InferredEntityType::Npc,
        NoteType::Quest => InferredEntityType::Quest,
        NoteType::SessionLog => InferredEntityType::SessionLog,
        NoteType::Note => InferredEntityType::Note,
    }
}

/// Map an inferred entity type back into a stored note type.
pub fn map_inferred_to_note_type(inferred: InferredEntityType) -> NoteType {
    match inferred {
        InferredEntityType::Area => NoteType::Poi,
        InferredEntityType::Character => NoteType::Character,
        InferredEntityType::Npc => NoteType::Npc,
        InferredEntityType::Quest => NoteType::Quest,
        InferredEntityType::SessionLog => NoteType::SessionLog,
        InferredEntityType::Note => NoteType::Note,
    }
}

/// Review status of a classification or relationship record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

/// An AI classification of a note. Many may exist per note over time; the
/// most recently created one is current.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteClassification {
    pub id: Uuid,
    pub note_id: Uuid,
    pub enrichment_run_id: Uuid,
    pub inferred_type: InferredEntityType,
    pub confidence: f32,
    pub explanation: String,
    pub extracted_entities: Vec<String>,
    pub status: ReviewStatus,
    /// Set only while `status` is approved; cleared on any other transition.
    pub approved_by_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Relationship type vocabulary of the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    QuestHasNpc,
    QuestAtPlace,
    NpcInPlace,
    Related,
}

/// How a relationship was evidenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    Link,
    Mention,
    Heuristic,
}

/// An AI-extracted relationship between two classified notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteRelationship {
    pub id: Uuid,
    pub enrichment_run_id: Uuid,
    pub from_note_id: Uuid,
    pub to_note_id: Uuid,
    pub relationship_type: RelationshipType,
    pub confidence: f32,
    pub evidence_snippet: Option<String>,
    pub evidence_type: EvidenceType,
    pub status: ReviewStatus,
    pub approved_by_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// AI CACHE
// =============================================================================

/// Kind of cached AI result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    Classification,
    Relationship,
}

/// The lookup key of the AI cache. The full tuple, `team_id` included,
/// resolves to at most one live entry; team isolation is structural because
/// the key cannot be built without a team.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AiCacheKey {
    pub cache_type: CacheType,
    pub content_hash: String,
    pub algorithm_version: String,
    pub context_hash: String,
    pub team_id: Uuid,
}

/// A content-addressed cached AI result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiCacheEntry {
    pub id: Uuid,
    pub cache_type: CacheType,
    pub content_hash: String,
    pub algorithm_version: String,
    pub context_hash: String,
    pub team_id: Uuid,
    /// Opaque classification/relationship payload.
    pub result: JsonValue,
    pub model_id: Option<String>,
    pub tokens_saved: i64,
    pub hit_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_hit_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiCacheStats {
    pub total_entries: i64,
    pub classification_entries: i64,
    pub relationship_entries: i64,
    pub total_hits: i64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
    pub entries_expiring_soon: i64,
}

// =============================================================================
// REVIEW VIEWS
// =============================================================================

/// A pending, low-confidence classification awaiting review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeedsReviewItem {
    pub classification_id: Uuid,
    pub note_id: Uuid,
    pub note_title: String,
    pub inferred_type: InferredEntityType,
    pub confidence: f32,
    pub explanation: String,
}

/// A pending, low-confidence relationship awaiting review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipReviewItem {
    pub relationship_id: Uuid,
    pub from_note_id: Uuid,
    pub to_note_id: Uuid,
    pub relationship_type: RelationshipType,
    pub confidence: f32,
    pub evidence_snippet: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_type_round_trip_strings() {
        for t in [
            NoteType::Area,
            NoteType::Character,
            NoteType::Npc,
            NoteType::Poi,
            NoteType::Quest,
            NoteType::SessionLog,
            NoteType::Note,
        ] {
            let parsed: NoteType = t.to_string().parse().unwrap();
            assert_eq!(parsed, t);
        }
    }

    #[test]
    fn test_note_type_from_str_invalid_is_hard_error() {
        let err = "dragon".parse::<NoteType>().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_inferred_type_round_trip_except_area() {
        // Every inferred type except Area round-trips through the stored
        // vocabulary; Area -> poi -> Area also round-trips.
        for t in [
            InferredEntityType::Character,
            InferredEntityType::Npc,
            InferredEntityType::Area,
            InferredEntityType::Quest,
            InferredEntityType::SessionLog,
            InferredEntityType::Note,
        ] {
            assert_eq!(map_note_type_to_inferred(map_inferred_to_note_type(t)), t);
        }
    }

    #[test]
    fn test_area_note_type_mapping_is_lossy() {
        // The documented asymmetry: `area` maps into `Area` but comes back
        // as `poi`, the canonical representation.
        let inferred = map_note_type_to_inferred(NoteType::Area);
        assert_eq!(inferred, InferredEntityType::Area);
        assert_eq!(map_inferred_to_note_type(inferred), NoteType::Poi);
    }

    #[test]
    fn test_normalize_quest_status_clears_for_non_quest() {
        assert_eq!(
            normalize_quest_status(NoteType::Npc, Some(QuestStatus::Active)),
            None
        );
        assert_eq!(
            normalize_quest_status(NoteType::Quest, Some(QuestStatus::Done)),
            Some(QuestStatus::Done)
        );
        assert_eq!(normalize_quest_status(NoteType::Quest, None), None);
    }

    #[test]
    fn test_settled_note_types() {
        assert!(NoteType::Npc.is_settled());
        assert!(NoteType::Character.is_settled());
        assert!(NoteType::Poi.is_settled());
        assert!(NoteType::Quest.is_settled());
        assert!(!NoteType::Note.is_settled());
        assert!(!NoteType::SessionLog.is_settled());
        assert!(!NoteType::Area.is_settled());
    }

    #[test]
    fn test_inferred_type_serde_npc_rename() {
        let json = serde_json::to_string(&InferredEntityType::Npc).unwrap();
        assert_eq!(json, "\"NPC\"");
        let back: InferredEntityType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, InferredEntityType::Npc);
    }
}
