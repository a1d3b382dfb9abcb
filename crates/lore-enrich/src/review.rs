//! Review layer over enrichment results.
//!
//! Classifications and relationships are persisted `pending`; nothing
//! touches a note until a user approves it. Approving a classification
//! applies the inferred type to the note. Rejection keeps the record for
//! audit but clears any approval attribution.

use tracing::{debug, info};
use uuid::Uuid;

use lore_core::{
    defaults, map_inferred_to_note_type, ClassificationRepository, Error, ImportRunRepository,
    ImportRunStatus, NeedsReviewItem, Note, NoteClassification, NoteRelationship, NoteRepository,
    RelationshipRepository, RelationshipReviewItem, Result, ReviewStatus, SnapshotRepository,
    Storage, UpdateNoteRequest,
};

/// Pending low-confidence results awaiting a user decision.
#[derive(Debug, Clone)]
pub struct NeedsReview {
    pub classifications: Vec<NeedsReviewItem>,
    pub relationships: Vec<RelationshipReviewItem>,
}

/// User-facing approval operations for enrichment output.
pub struct ReviewService {
    storage: Storage,
}

impl ReviewService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Everything pending below the review confidence threshold for a team,
    /// lowest confidence first.
    pub async fn list_needs_review(&self, team_id: Uuid) -> Result<NeedsReview> {
        let classifications = self
            .storage
            .classifications
            .list_needs_review(team_id, defaults::CONFIDENCE_REVIEW)
            .await?;
        let relationships = self
            .storage
            .relationships
            .list_needs_review(team_id, defaults::CONFIDENCE_REVIEW)
            .await?;
        Ok(NeedsReview {
            classifications,
            relationships,
        })
    }

    /// Approve a classification and apply its inferred type to the note.
    /// Returns the updated note.
    pub async fn approve_classification(
        &self,
        classification_id: Uuid,
        user_id: Uuid,
    ) -> Result<Note> {
        let classification = self
            .storage
            .classifications
            .update_status(classification_id, ReviewStatus::Approved, Some(user_id))
            .await?;

        let note_type = map_inferred_to_note_type(classification.inferred_type);
        let note = self
            .storage
            .notes
            .update(
                classification.note_id,
                UpdateNoteRequest {
                    note_type: Some(note_type),
                    updated_by_user_id: Some(user_id),
                    ..Default::default()
                },
            )
            .await?;

        info!(
            classification_id = %classification_id,
            note_id = %note.id,
            note_type = %note.note_type,
            "Classification approved"
        );
        Ok(note)
    }

    /// Reject a classification. The note is untouched; the record stays for
    /// audit with its approval attribution cleared.
    pub async fn reject_classification(&self, classification_id: Uuid) -> Result<NoteClassification> {
        self.storage
            .classifications
            .update_status(classification_id, ReviewStatus::Rejected, None)
            .await
    }

    /// Approve a batch of classifications; returns the count applied.
    /// Unknown IDs are skipped.
    pub async fn approve_classifications(&self, ids: &[Uuid], user_id: Uuid) -> Result<u64> {
        let mut approved = 0;
        for id in ids {
            match self.approve_classification(*id, user_id).await {
                Ok(_) => approved += 1,
                Err(Error::NotFound(_)) | Err(Error::NoteNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(approved)
    }

    /// Reject a batch of classifications; returns the count updated.
    pub async fn reject_classifications(&self, ids: &[Uuid]) -> Result<u64> {
        self.storage
            .classifications
            .bulk_update_status(ids, ReviewStatus::Rejected, None)
            .await
    }

    /// Approve a relationship.
    pub async fn approve_relationship(
        &self,
        relationship_id: Uuid,
        user_id: Uuid,
    ) -> Result<NoteRelationship> {
        self.storage
            .relationships
            .update_status(relationship_id, ReviewStatus::Approved, Some(user_id))
            .await
    }

    /// Reject a relationship.
    pub async fn reject_relationship(&self, relationship_id: Uuid) -> Result<NoteRelationship> {
        self.storage
            .relationships
            .update_status(relationship_id, ReviewStatus::Rejected, None)
            .await
    }

    /// Approve a batch of relationships; returns the count updated.
    pub async fn approve_relationships(&self, ids: &[Uuid], user_id: Uuid) -> Result<u64> {
        self.storage
            .relationships
            .bulk_update_status(ids, ReviewStatus::Approved, Some(user_id))
            .await
    }

    /// Reject a batch of relationships; returns the count updated.
    pub async fn reject_relationships(&self, ids: &[Uuid]) -> Result<u64> {
        self.storage
            .relationships
            .bulk_update_status(ids, ReviewStatus::Rejected, None)
            .await
    }

    /// Delete everything an enrichment run produced. Notes themselves are
    /// untouched (approved type changes are a deliberate user action and
    /// survive the undo). Idempotent: a second call deletes nothing.
    pub async fn undo_enrichment_run(&self, enrichment_run_id: Uuid) -> Result<(u64, u64)> {
        let classifications = self
            .storage
            .classifications
            .delete_by_enrichment_run(enrichment_run_id)
            .await?;
        let relationships = self
            .storage
            .relationships
            .delete_by_enrichment_run(enrichment_run_id)
            .await?;
        debug!(
            enrichment_run_id = %enrichment_run_id,
            classifications,
            relationships,
            "Enrichment run undone"
        );
        Ok((classifications, relationships))
    }

    /// Roll back an import run: restore every snapshotted note to its
    /// pre-import state and mark the run deleted. Returns the count of
    /// notes restored.
    pub async fn rollback_import_run(&self, import_run_id: Uuid) -> Result<u64> {
        let snapshots = self
            .storage
            .snapshots
            .get_by_import_run(import_run_id)
            .await?;

        let mut restored = 0;
        for snapshot in &snapshots {
            self.storage.snapshots.restore(snapshot.id).await?;
            restored += 1;
        }

        self.storage
            .import_runs
            .update_status(import_run_id, ImportRunStatus::Deleted)
            .await?;

        info!(
            import_run_id = %import_run_id,
            restored,
            "Import run rolled back"
        );
        Ok(restored)
    }
}
