//! AI provider abstraction.
//!
//! The enrichment worker talks to an [`AiProvider`] for note classification
//! and relationship extraction. A real implementation calls an external AI
//! service; a deterministic heuristic implementation exists for tests. Both
//! are selected by dependency injection at construction, so worker logic
//! never changes with the provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{EvidenceType, InferredEntityType, NoteType, RelationshipType};

/// Input view of a note for classification.
#[derive(Debug, Clone)]
pub struct NoteForClassification {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub current_type: NoteType,
}

/// One classification produced by a provider (or replayed from the cache).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub note_id: Uuid,
    pub inferred_type: InferredEntityType,
    pub confidence: f32,
    pub explanation: String,
    pub extracted_entities: Vec<String>,
    pub model_id: Option<String>,
    /// Tokens consumed producing this result; credited as savings on a
    /// cache hit.
    pub tokens_used: i64,
}

/// A classified note, input to relationship extraction.
#[derive(Debug, Clone)]
pub struct ClassifiedNote {
    pub note_id: Uuid,
    pub title: String,
    pub inferred_type: InferredEntityType,
    /// Internal link targets: markdown `/notes/{id}` references plus the
    /// note's persisted links, de-duplicated.
    pub linked_note_ids: Vec<Uuid>,
}

/// One relationship produced by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipResult {
    pub from_note_id: Uuid,
    pub to_note_id: Uuid,
    pub relationship_type: RelationshipType,
    pub confidence: f32,
    pub evidence_snippet: Option<String>,
    pub evidence_type: EvidenceType,
}

/// Pluggable AI provider.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Identifier of the underlying model, recorded on cache entries.
    fn model_id(&self) -> &str;

    /// Classify a batch of notes. Implementations return one result per
    /// input note, in input order.
    async fn classify_notes(
        &self,
        notes: &[NoteForClassification],
    ) -> Result<Vec<ClassificationResult>>;

    /// Extract relationships between classified notes.
    async fn extract_relationships(
        &self,
        notes: &[ClassifiedNote],
    ) -> Result<Vec<RelationshipResult>>;
}
