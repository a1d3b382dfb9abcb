//! Content-addressed, versioned, team-scoped cache in front of the AI
//! provider.
//!
//! Cached payloads were computed against possibly-different note IDs from a
//! previous run of regenerated content, so every hit remaps the stored
//! result's identifying IDs to the current lookup notes. Team isolation is
//! structural: the lookup key cannot be built without a `team_id`.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use lore_core::{
    defaults, AiCacheRepository, AiCacheStats, CacheType, ClassificationResult,
    NoteForClassification, RelationshipResult, Result, UpsertCacheEntryRequest,
};

use crate::keys::{
    classification_cache_key, content_hash, relationship_cache_key,
};

/// Per-pair cached relationship payload. Endpoints are identified by their
/// content hashes rather than note IDs so results survive note-ID
/// regeneration across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedRelationship {
    from_content_hash: String,
    to_content_hash: String,
    relationship_type: lore_core::RelationshipType,
    confidence: f32,
    evidence_snippet: Option<String>,
    evidence_type: lore_core::EvidenceType,
}

/// AI result cache service over an [`AiCacheRepository`].
#[derive(Clone)]
pub struct AiCache {
    store: Arc<dyn AiCacheRepository>,
    classification_version: String,
    relationship_version: String,
    ttl: Duration,
}

impl AiCache {
    /// Create a cache using the current process-wide algorithm versions and
    /// the default TTL.
    pub fn new(store: Arc<dyn AiCacheRepository>) -> Self {
        Self {
            store,
            classification_version: defaults::CLASSIFICATION_ALGORITHM_VERSION.to_string(),
            relationship_version: defaults::RELATIONSHIP_ALGORITHM_VERSION.to_string(),
            ttl: Duration::days(defaults::CACHE_TTL_DAYS),
        }
    }

    /// Override algorithm versions (tests, migration tooling).
    pub fn with_versions(
        mut self,
        classification_version: impl Into<String>,
        relationship_version: impl Into<String>,
    ) -> Self {
        self.classification_version = classification_version.into();
        self.relationship_version = relationship_version.into();
        self
    }

    // -------------------------------------------------------------------------
    // Classification entries
    // -------------------------------------------------------------------------

    /// Look up a cached classification for a note. A hit remaps the stored
    /// result's `note_id` to the lookup note's ID and bumps hit counters.
    pub async fn get_classification(
        &self,
        note: &NoteForClassification,
        pc_names: &[String],
        team_id: Uuid,
    ) -> Result<Option<ClassificationResult>> {
        let key = classification_cache_key(
            &note.title,
            &note.content,
            pc_names,
            team_id,
            &self.classification_version,
        );

        let Some(entry) = self.store.find(&key).await? else {
            return Ok(None);
        };

        let mut result: ClassificationResult = serde_json::from_value(entry.result.clone())?;
        result.note_id = note.id;

        self.store.record_hit(entry.id, result.tokens_used).await?;
        Ok(Some(result))
    }

    /// Store a classification result. Upserts on an identical key.
    pub async fn set_classification(
        &self,
        note: &NoteForClassification,
        pc_names: &[String],
        result: &ClassificationResult,
        team_id: Uuid,
    ) -> Result<()> {
        let key = classification_cache_key(
            &note.title,
            &note.content,
            pc_names,
            team_id,
            &self.classification_version,
        );

        self.store
            .upsert(UpsertCacheEntryRequest {
                key,
                result: serde_json::to_value(result)?,
                model_id: result.model_id.clone(),
                tokens_saved: result.tokens_used,
                expires_at: Some(Utc::now() + self.ttl),
            })
            .await?;
        Ok(())
    }

    /// Batch lookup. Misses are simply absent from the returned map; a miss
    /// is never an error.
    pub async fn get_classification_batch(
        &self,
        notes: &[NoteForClassification],
        pc_names: &[String],
        team_id: Uuid,
    ) -> Result<HashMap<Uuid, ClassificationResult>> {
        let mut hits = HashMap::new();
        for note in notes {
            if let Some(result) = self.get_classification(note, pc_names, team_id).await? {
                hits.insert(note.id, result);
            }
        }

        debug!(
            cache_hits = hits.len(),
            cache_misses = notes.len() - hits.len(),
            "Classification cache batch lookup"
        );
        Ok(hits)
    }

    // -------------------------------------------------------------------------
    // Relationship entries
    // -------------------------------------------------------------------------

    /// Look up cached relationships for an unordered pair of notes. A hit
    /// remaps endpoint content hashes back to the lookup notes' IDs.
    pub async fn get_relationships_for_pair(
        &self,
        a: &NoteForClassification,
        b: &NoteForClassification,
        team_id: Uuid,
    ) -> Result<Option<Vec<RelationshipResult>>> {
        let hash_a = content_hash(&a.title, &a.content);
        let hash_b = content_hash(&b.title, &b.content);
        let key =
            relationship_cache_key(&hash_a, &hash_b, team_id, &self.relationship_version);

        let Some(entry) = self.store.find(&key).await? else {
            return Ok(None);
        };

        let cached: Vec<CachedRelationship> = serde_json::from_value(entry.result.clone())?;
        let resolve = |hash: &str| {
            if hash == hash_a {
                Some(a.id)
            } else if hash == hash_b {
                Some(b.id)
            } else {
                None
            }
        };

        let mut results = Vec::with_capacity(cached.len());
        for rel in cached {
            match (resolve(&rel.from_content_hash), resolve(&rel.to_content_hash)) {
                (Some(from), Some(to)) => results.push(RelationshipResult {
                    from_note_id: from,
                    to_note_id: to,
                    relationship_type: rel.relationship_type,
                    confidence: rel.confidence,
                    evidence_snippet: rel.evidence_snippet,
                    evidence_type: rel.evidence_type,
                }),
                _ => {
                    warn!("Cached relationship endpoint hash matches neither lookup note; dropping");
                }
            }
        }

        self.store.record_hit(entry.id, 0).await?;
        Ok(Some(results))
    }

    /// Store the relationships found for an unordered pair of notes. An
    /// empty slice is a valid (negative) result and prevents re-asking the
    /// provider about the pair.
    pub async fn set_relationships_for_pair(
        &self,
        a: &NoteForClassification,
        b: &NoteForClassification,
        results: &[RelationshipResult],
        model_id: Option<String>,
        team_id: Uuid,
    ) -> Result<()> {
        let hash_a = content_hash(&a.title, &a.content);
        let hash_b = content_hash(&b.title, &b.content);
        let key =
            relationship_cache_key(&hash_a, &hash_b, team_id, &self.relationship_version);

        let hash_for = |id: Uuid| {
            if id == a.id {
                Some(hash_a.clone())
            } else if id == b.id {
                Some(hash_b.clone())
            } else {
                None
            }
        };

        let mut cached = Vec::with_capacity(results.len());
        for rel in results {
            match (hash_for(rel.from_note_id), hash_for(rel.to_note_id)) {
                (Some(from), Some(to)) => cached.push(CachedRelationship {
                    from_content_hash: from,
                    to_content_hash: to,
                    relationship_type: rel.relationship_type,
                    confidence: rel.confidence,
                    evidence_snippet: rel.evidence_snippet.clone(),
                    evidence_type: rel.evidence_type,
                }),
                _ => {
                    warn!("Relationship endpoint is outside the pair being cached; skipping");
                }
            }
        }

        self.store
            .upsert(UpsertCacheEntryRequest {
                key,
                result: serde_json::to_value(&cached)?,
                model_id,
                tokens_saved: 0,
                expires_at: Some(Utc::now() + self.ttl),
            })
            .await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Maintenance
    // -------------------------------------------------------------------------

    /// Remove entries of a cache type with the given algorithm version.
    pub async fn invalidate_by_version(
        &self,
        cache_type: CacheType,
        algorithm_version: &str,
    ) -> Result<u64> {
        let count = self
            .store
            .invalidate_by_version(cache_type, algorithm_version)
            .await?;
        debug!(?cache_type, algorithm_version, count, "Invalidated cache entries by version");
        Ok(count)
    }

    /// Remove all entries for a team.
    pub async fn invalidate_by_team(&self, team_id: Uuid) -> Result<u64> {
        let count = self.store.invalidate_by_team(team_id).await?;
        debug!(%team_id, count, "Invalidated cache entries by team");
        Ok(count)
    }

    /// Remove entries whose `expires_at` has passed.
    pub async fn prune_expired(&self) -> Result<u64> {
        self.store.prune_expired(Utc::now()).await
    }

    /// Aggregate cache statistics.
    pub async fn stats(&self) -> Result<AiCacheStats> {
        self.store.stats(Utc::now()).await
    }
}
