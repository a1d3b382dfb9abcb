//! Core traits for lorekeeper abstractions.
//!
//! These traits define the storage interfaces that concrete adapters must
//! satisfy. The import service, the AI cache, the enrichment worker, and the
//! review layer are written entirely against them, so an in-memory adapter
//! and a production datastore adapter are interchangeable.
//!
//! All operations are assumed atomic per call; callers do not coordinate
//! transactions across them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// NOTE REPOSITORY
// =============================================================================

/// Request for creating a new note.
#[derive(Debug, Clone)]
pub struct CreateNoteRequest {
    pub team_id: Uuid,
    pub title: String,
    pub content: String,
    pub note_type: NoteType,
    pub quest_status: Option<QuestStatus>,
    pub is_private: bool,
    pub linked_note_ids: Vec<Uuid>,
    pub source_system: Option<String>,
    pub source_page_id: Option<String>,
    pub content_markdown: Option<String>,
    pub import_run_id: Option<Uuid>,
    pub created_by_user_id: Option<Uuid>,
}

/// Partial update of a note. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateNoteRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub note_type: Option<NoteType>,
    pub quest_status: Option<Option<QuestStatus>>,
    pub is_private: Option<bool>,
    pub linked_note_ids: Option<Vec<Uuid>>,
    pub content_markdown: Option<Option<String>>,
    pub content_markdown_resolved: Option<Option<String>>,
    pub import_run_id: Option<Option<Uuid>>,
    pub updated_by_user_id: Option<Uuid>,
}

/// Repository for note CRUD operations.
///
/// Implementations enforce the quest-status invariant: `quest_status` is
/// persisted as `None` whenever the effective note type is not `Quest`.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Insert a new note.
    async fn create(&self, req: CreateNoteRequest) -> Result<Note>;

    /// Apply a partial update and return the updated note.
    async fn update(&self, id: Uuid, req: UpdateNoteRequest) -> Result<Note>;

    /// Fetch a note by ID.
    async fn get(&self, id: Uuid) -> Result<Option<Note>>;

    /// Look up a note by its import provenance within a team.
    async fn get_by_source_page(
        &self,
        team_id: Uuid,
        source_system: &str,
        source_page_id: &str,
    ) -> Result<Option<Note>>;

    /// All notes created or updated by an import run.
    async fn get_by_import_run(&self, import_run_id: Uuid) -> Result<Vec<Note>>;

    /// Create a session log unless one with the same title already exists
    /// for the team. Atomic: concurrent duplicate creation attempts resolve
    /// to a single persisted record.
    async fn find_or_create_session_log(&self, req: CreateNoteRequest) -> Result<Note>;
}

// =============================================================================
// IMPORT RUN REPOSITORY
// =============================================================================

/// Repository for import runs.
#[async_trait]
pub trait ImportRunRepository: Send + Sync {
    /// Create a new import run (initial status `completed` is set by the
    /// caller via `update_status` once the run finishes).
    async fn create(
        &self,
        team_id: Uuid,
        source_system: &str,
        options: ImportOptions,
        created_by_user_id: Option<Uuid>,
    ) -> Result<ImportRun>;

    /// Fetch an import run by ID.
    async fn get(&self, id: Uuid) -> Result<Option<ImportRun>>;

    /// Transition the run's status.
    async fn update_status(&self, id: Uuid, status: ImportRunStatus) -> Result<()>;

    /// Persist final run statistics.
    async fn update_stats(&self, id: Uuid, stats: ImportStats) -> Result<()>;
}

// =============================================================================
// ENRICHMENT RUN REPOSITORY
// =============================================================================

/// Detail update for an enrichment run.
#[derive(Debug, Clone, Default)]
pub struct UpdateEnrichmentRunRequest {
    pub totals: Option<EnrichmentTotals>,
    pub error_message: Option<String>,
}

/// Repository for enrichment runs.
#[async_trait]
pub trait EnrichmentRunRepository: Send + Sync {
    /// Create a new run in `pending` state.
    async fn create(&self, import_run_id: Uuid, team_id: Uuid) -> Result<EnrichmentRun>;

    /// Fetch a run by ID.
    async fn get(&self, id: Uuid) -> Result<Option<EnrichmentRun>>;

    /// Transition the run's status. Transition to `running` stamps
    /// `started_at`; transition to `completed`/`failed` stamps `completed_at`.
    async fn update_status(&self, id: Uuid, status: EnrichmentRunStatus) -> Result<()>;

    /// Persist totals and/or an error message.
    async fn update(&self, id: Uuid, req: UpdateEnrichmentRunRequest) -> Result<()>;
}

// =============================================================================
// CLASSIFICATION REPOSITORY
// =============================================================================

/// Request for persisting a classification.
#[derive(Debug, Clone)]
pub struct CreateClassificationRequest {
    pub note_id: Uuid,
    pub enrichment_run_id: Uuid,
    pub inferred_type: InferredEntityType,
    pub confidence: f32,
    pub explanation: String,
    pub extracted_entities: Vec<String>,
}

/// Repository for note classifications.
#[async_trait]
pub trait ClassificationRepository: Send + Sync {
    /// Persist a classification with `status = pending`.
    async fn create(&self, req: CreateClassificationRequest) -> Result<NoteClassification>;

    /// All classifications for an enrichment run.
    async fn get_by_enrichment_run(&self, enrichment_run_id: Uuid)
        -> Result<Vec<NoteClassification>>;

    /// Transition a classification's review status. `approved_by_user_id`
    /// is stamped only on approval and cleared on any other transition.
    async fn update_status(
        &self,
        id: Uuid,
        status: ReviewStatus,
        approved_by_user_id: Option<Uuid>,
    ) -> Result<NoteClassification>;

    /// Apply the same status transition to each ID; returns the count
    /// actually updated.
    async fn bulk_update_status(
        &self,
        ids: &[Uuid],
        status: ReviewStatus,
        approved_by_user_id: Option<Uuid>,
    ) -> Result<u64>;

    /// Delete all classifications for an enrichment run; returns the count
    /// deleted. Idempotent: a second call deletes zero.
    async fn delete_by_enrichment_run(&self, enrichment_run_id: Uuid) -> Result<u64>;

    /// Pending classifications below the confidence threshold, scoped to
    /// the team's notes, sorted ascending by confidence.
    async fn list_needs_review(
        &self,
        team_id: Uuid,
        confidence_below: f32,
    ) -> Result<Vec<NeedsReviewItem>>;
}

// =============================================================================
// RELATIONSHIP REPOSITORY
// =============================================================================

/// Request for persisting a relationship.
#[derive(Debug, Clone)]
pub struct CreateRelationshipRequest {
    pub enrichment_run_id: Uuid,
    pub from_note_id: Uuid,
    pub to_note_id: Uuid,
    pub relationship_type: RelationshipType,
    pub confidence: f32,
    pub evidence_snippet: Option<String>,
    pub evidence_type: EvidenceType,
}

/// Repository for note relationships.
#[async_trait]
pub trait RelationshipRepository: Send + Sync {
    /// Persist a relationship with `status = pending`.
    async fn create(&self, req: CreateRelationshipRequest) -> Result<NoteRelationship>;

    /// All relationships for an enrichment run.
    async fn get_by_enrichment_run(&self, enrichment_run_id: Uuid)
        -> Result<Vec<NoteRelationship>>;

    /// Transition a relationship's review status (same attribution rules as
    /// classifications).
    async fn update_status(
        &self,
        id: Uuid,
        status: ReviewStatus,
        approved_by_user_id: Option<Uuid>,
    ) -> Result<NoteRelationship>;

    /// Bulk status transition; returns the count actually updated.
    async fn bulk_update_status(
        &self,
        ids: &[Uuid],
        status: ReviewStatus,
        approved_by_user_id: Option<Uuid>,
    ) -> Result<u64>;

    /// Delete all relationships for an enrichment run; idempotent.
    async fn delete_by_enrichment_run(&self, enrichment_run_id: Uuid) -> Result<u64>;

    /// Pending relationships below the confidence threshold, team scoped,
    /// ascending by confidence.
    async fn list_needs_review(
        &self,
        team_id: Uuid,
        confidence_below: f32,
    ) -> Result<Vec<RelationshipReviewItem>>;
}

// =============================================================================
// SNAPSHOT REPOSITORY
// =============================================================================

/// Request for capturing a note's pre-import state.
#[derive(Debug, Clone)]
pub struct CreateSnapshotRequest {
    pub note_id: Uuid,
    pub import_run_id: Uuid,
    pub previous_title: String,
    pub previous_content: String,
    pub previous_note_type: NoteType,
    pub previous_quest_status: Option<QuestStatus>,
    pub previous_content_markdown: Option<String>,
    pub previous_content_markdown_resolved: Option<String>,
    pub previous_is_private: bool,
}

/// Repository for note import snapshots.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Capture a snapshot.
    async fn create(&self, req: CreateSnapshotRequest) -> Result<NoteImportSnapshot>;

    /// All snapshots for an import run.
    async fn get_by_import_run(&self, import_run_id: Uuid) -> Result<Vec<NoteImportSnapshot>>;

    /// Revert the snapshotted fields on the note and clear its
    /// `import_run_id`. Returns the restored note.
    async fn restore(&self, snapshot_id: Uuid) -> Result<Note>;
}

// =============================================================================
// AI CACHE REPOSITORY
// =============================================================================

/// Insert-or-update payload for the AI cache. Upserts on an identical key.
#[derive(Debug, Clone)]
pub struct UpsertCacheEntryRequest {
    pub key: AiCacheKey,
    pub result: serde_json::Value,
    pub model_id: Option<String>,
    pub tokens_saved: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Storage primitives behind the AI cache service.
///
/// Every lookup carries the full [`AiCacheKey`] including `team_id`, so a
/// cross-team read is unrepresentable.
#[async_trait]
pub trait AiCacheRepository: Send + Sync {
    /// Find the live entry for a key, if any.
    async fn find(&self, key: &AiCacheKey) -> Result<Option<AiCacheEntry>>;

    /// Insert or replace the entry for the request's key.
    async fn upsert(&self, req: UpsertCacheEntryRequest) -> Result<AiCacheEntry>;

    /// Bump hit counters and `last_hit_at` for an entry.
    async fn record_hit(&self, id: Uuid, tokens_saved: i64) -> Result<()>;

    /// Remove entries of a cache type with the given algorithm version;
    /// returns the count removed.
    async fn invalidate_by_version(
        &self,
        cache_type: CacheType,
        algorithm_version: &str,
    ) -> Result<u64>;

    /// Remove all entries for a team; returns the count removed.
    async fn invalidate_by_team(&self, team_id: Uuid) -> Result<u64>;

    /// Remove entries whose `expires_at` has passed; returns the count.
    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Aggregate cache statistics.
    async fn stats(&self, now: DateTime<Utc>) -> Result<AiCacheStats>;
}

// =============================================================================
// STORAGE BUNDLE
// =============================================================================

/// Combined storage context with all repositories, mirroring how adapters
/// are wired into services and the enrichment worker.
#[derive(Clone)]
pub struct Storage {
    pub notes: Arc<dyn NoteRepository>,
    pub import_runs: Arc<dyn ImportRunRepository>,
    pub enrichment_runs: Arc<dyn EnrichmentRunRepository>,
    pub classifications: Arc<dyn ClassificationRepository>,
    pub relationships: Arc<dyn RelationshipRepository>,
    pub snapshots: Arc<dyn SnapshotRepository>,
    pub ai_cache: Arc<dyn AiCacheRepository>,
}
