//! In-memory implementation of the lorekeeper storage traits.
//!
//! One [`MemoryStore`] holds all tables behind `tokio::sync::RwLock` maps
//! and implements every repository trait, so a single `Arc<MemoryStore>`
//! can back the whole [`Storage`] bundle. Locks are never held across
//! awaits; each trait method is atomic with respect to the others.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use lore_core::{
    defaults, normalize_quest_status, AiCacheEntry, AiCacheKey, AiCacheRepository, AiCacheStats,
    CacheType, ClassificationRepository, CreateClassificationRequest, CreateNoteRequest,
    CreateRelationshipRequest, CreateSnapshotRequest, EnrichmentRun, EnrichmentRunRepository,
    EnrichmentRunStatus, Error, ImportOptions, ImportRun, ImportRunRepository, ImportRunStatus,
    ImportStats, NeedsReviewItem, Note, NoteClassification, NoteImportSnapshot, NoteRelationship,
    NoteRepository, NoteType, RelationshipRepository, RelationshipReviewItem, Result,
    ReviewStatus, SnapshotRepository, Storage, UpdateEnrichmentRunRequest,
    UpdateNoteRequest, UpsertCacheEntryRequest,
};

/// In-memory storage adapter. Interchangeable with a production datastore
/// adapter behind the repository traits.
#[derive(Default)]
pub struct MemoryStore {
    notes: RwLock<HashMap<Uuid, Note>>,
    import_runs: RwLock<HashMap<Uuid, ImportRun>>,
    enrichment_runs: RwLock<HashMap<Uuid, EnrichmentRun>>,
    classifications: RwLock<HashMap<Uuid, NoteClassification>>,
    relationships: RwLock<HashMap<Uuid, NoteRelationship>>,
    snapshots: RwLock<HashMap<Uuid, NoteImportSnapshot>>,
    cache: RwLock<HashMap<AiCacheKey, AiCacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Build the full [`Storage`] bundle backed by one shared store.
    pub fn storage() -> Storage {
        Self::new().into_storage()
    }

    /// Wire this store into every repository slot of a [`Storage`] bundle.
    pub fn into_storage(self: Arc<Self>) -> Storage {
        Storage {
            notes: self.clone(),
            import_runs: self.clone(),
            enrichment_runs: self.clone(),
            classifications: self.clone(),
            relationships: self.clone(),
            snapshots: self.clone(),
            ai_cache: self,
        }
    }
}

fn build_note(req: CreateNoteRequest, now: DateTime<Utc>) -> Note {
    Note {
        id: Uuid::new_v4(),
        team_id: req.team_id,
        title: req.title,
        content: req.content,
        note_type: req.note_type,
        quest_status: normalize_quest_status(req.note_type, req.quest_status),
        is_private: req.is_private,
        linked_note_ids: req.linked_note_ids,
        source_system: req.source_system,
        source_page_id: req.source_page_id,
        content_markdown: req.content_markdown,
        content_markdown_resolved: None,
        import_run_id: req.import_run_id,
        created_by_user_id: req.created_by_user_id,
        updated_by_user_id: None,
        created_at: now,
        updated_at: now,
    }
}

fn apply_note_update(note: &mut Note, req: UpdateNoteRequest, now: DateTime<Utc>) {
    if let Some(title) = req.title {
        note.title = title;
    }
    if let Some(content) = req.content {
        note.content = content;
    }
    if let Some(note_type) = req.note_type {
        note.note_type = note_type;
    }
    if let Some(quest_status) = req.quest_status {
        note.quest_status = quest_status;
    }
    // Re-normalize after any type or status change.
    note.quest_status = normalize_quest_status(note.note_type, note.quest_status);
    if let Some(is_private) = req.is_private {
        note.is_private = is_private;
    }
    if let Some(linked) = req.linked_note_ids {
        note.linked_note_ids = linked;
    }
    if let Some(md) = req.content_markdown {
        note.content_markdown = md;
    }
    if let Some(resolved) = req.content_markdown_resolved {
        note.content_markdown_resolved = resolved;
    }
    if let Some(run_id) = req.import_run_id {
        note.import_run_id = run_id;
    }
    if let Some(user) = req.updated_by_user_id {
        note.updated_by_user_id = Some(user);
    }
    note.updated_at = now;
}

#[async_trait]
impl NoteRepository for MemoryStore {
    async fn create(&self, req: CreateNoteRequest) -> Result<Note> {
        let note = build_note(req, Utc::now());
        self.notes.write().await.insert(note.id, note.clone());
        Ok(note)
    }

    async fn update(&self, id: Uuid, req: UpdateNoteRequest) -> Result<Note> {
        let mut notes = self.notes.write().await;
        let note = notes.get_mut(&id).ok_or(Error::NoteNotFound(id))?;
        apply_note_update(note, req, Utc::now());
        Ok(note.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Note>> {
        Ok(self.notes.read().await.get(&id).cloned())
    }

    async fn get_by_source_page(
        &self,
        team_id: Uuid,
        source_system: &str,
        source_page_id: &str,
    ) -> Result<Option<Note>> {
        Ok(self
            .notes
            .read()
            .await
            .values()
            .find(|n| {
                n.team_id == team_id
                    && n.source_system.as_deref() == Some(source_system)
                    && n.source_page_id.as_deref() == Some(source_page_id)
            })
            .cloned())
    }

    async fn get_by_import_run(&self, import_run_id: Uuid) -> Result<Vec<Note>> {
        let mut notes: Vec<Note> = self
            .notes
            .read()
            .await
            .values()
            .filter(|n| n.import_run_id == Some(import_run_id))
            .cloned()
            .collect();
        notes.sort_by_key(|n| n.created_at);
        Ok(notes)
    }

    async fn find_or_create_session_log(&self, req: CreateNoteRequest) -> Result<Note> {
        // Single write lock covers lookup and insert, so concurrent calls
        // with the same title resolve to one record.
        let mut notes = self.notes.write().await;
        if let Some(existing) = notes
            .values()
            .find(|n| {
                n.team_id == req.team_id
                    && n.note_type == NoteType::SessionLog
                    && n.title == req.title
            })
            .cloned()
        {
            return Ok(existing);
        }
        let note = build_note(req, Utc::now());
        notes.insert(note.id, note.clone());
        Ok(note)
    }
}

#[async_trait]
impl ImportRunRepository for MemoryStore {
    async fn create(
        &self,
        team_id: Uuid,
        source_system: &str,
        options: ImportOptions,
        created_by_user_id: Option<Uuid>,
    ) -> Result<ImportRun> {
        let run = ImportRun {
            id: Uuid::new_v4(),
            team_id,
            source_system: source_system.to_string(),
            status: ImportRunStatus::Completed,
            options,
            stats: ImportStats::default(),
            created_by_user_id,
            created_at: Utc::now(),
        };
        self.import_runs.write().await.insert(run.id, run.clone());
        Ok(run)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ImportRun>> {
        Ok(self.import_runs.read().await.get(&id).cloned())
    }

    async fn update_status(&self, id: Uuid, status: ImportRunStatus) -> Result<()> {
        let mut runs = self.import_runs.write().await;
        let run = runs
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("import run {}", id)))?;
        run.status = status;
        Ok(())
    }

    async fn update_stats(&self, id: Uuid, stats: ImportStats) -> Result<()> {
        let mut runs = self.import_runs.write().await;
        let run = runs
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("import run {}", id)))?;
        run.stats = stats;
        Ok(())
    }
}

#[async_trait]
impl EnrichmentRunRepository for MemoryStore {
    async fn create(&self, import_run_id: Uuid, team_id: Uuid) -> Result<EnrichmentRun> {
        let run = EnrichmentRun {
            id: Uuid::new_v4(),
            import_run_id,
            team_id,
            status: EnrichmentRunStatus::Pending,
            totals: Default::default(),
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.enrichment_runs
            .write()
            .await
            .insert(run.id, run.clone());
        Ok(run)
    }

    async fn get(&self, id: Uuid) -> Result<Option<EnrichmentRun>> {
        Ok(self.enrichment_runs.read().await.get(&id).cloned())
    }

    async fn update_status(&self, id: Uuid, status: EnrichmentRunStatus) -> Result<()> {
        let mut runs = self.enrichment_runs.write().await;
        let run = runs.get_mut(&id).ok_or(Error::EnrichmentRunNotFound(id))?;
        run.status = status;
        match status {
            EnrichmentRunStatus::Running => run.started_at = Some(Utc::now()),
            EnrichmentRunStatus::Completed | EnrichmentRunStatus::Failed => {
                run.completed_at = Some(Utc::now())
            }
            EnrichmentRunStatus::Pending => {}
        }
        Ok(())
    }

    async fn update(&self, id: Uuid, req: UpdateEnrichmentRunRequest) -> Result<()> {
        let mut runs = self.enrichment_runs.write().await;
        let run = runs.get_mut(&id).ok_or(Error::EnrichmentRunNotFound(id))?;
        if let Some(totals) = req.totals {
            run.totals = totals;
        }
        if let Some(msg) = req.error_message {
            run.error_message = Some(msg);
        }
        Ok(())
    }
}

fn reviewed_by(status: ReviewStatus, approver: Option<Uuid>) -> Option<Uuid> {
    // Approval attribution holds only while the record is approved.
    if status == ReviewStatus::Approved {
        approver
    } else {
        None
    }
}

#[async_trait]
impl ClassificationRepository for MemoryStore {
    async fn create(&self, req: CreateClassificationRequest) -> Result<NoteClassification> {
        let classification = NoteClassification {
            id: Uuid::new_v4(),
            note_id: req.note_id,
            enrichment_run_id: req.enrichment_run_id,
            inferred_type: req.inferred_type,
            confidence: req.confidence,
            explanation: req.explanation,
            extracted_entities: req.extracted_entities,
            status: ReviewStatus::Pending,
            approved_by_user_id: None,
            created_at: Utc::now(),
        };
        self.classifications
            .write()
            .await
            .insert(classification.id, classification.clone());
        Ok(classification)
    }

    async fn get_by_enrichment_run(
        &self,
        enrichment_run_id: Uuid,
    ) -> Result<Vec<NoteClassification>> {
        let mut items: Vec<NoteClassification> = self
            .classifications
            .read()
            .await
            .values()
            .filter(|c| c.enrichment_run_id == enrichment_run_id)
            .cloned()
            .collect();
        items.sort_by_key(|c| c.created_at);
        Ok(items)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ReviewStatus,
        approved_by_user_id: Option<Uuid>,
    ) -> Result<NoteClassification> {
        let mut items = self.classifications.write().await;
        let item = items
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("classification {}", id)))?;
        item.status = status;
        item.approved_by_user_id = reviewed_by(status, approved_by_user_id);
        Ok(item.clone())
    }

    async fn bulk_update_status(
        &self,
        ids: &[Uuid],
        status: ReviewStatus,
        approved_by_user_id: Option<Uuid>,
    ) -> Result<u64> {
        let mut items = self.classifications.write().await;
        let mut updated = 0;
        for id in ids {
            if let Some(item) = items.get_mut(id) {
                item.status = status;
                item.approved_by_user_id = reviewed_by(status, approved_by_user_id);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_by_enrichment_run(&self, enrichment_run_id: Uuid) -> Result<u64> {
        let mut items = self.classifications.write().await;
        let before = items.len();
        items.retain(|_, c| c.enrichment_run_id != enrichment_run_id);
        Ok((before - items.len()) as u64)
    }

    async fn list_needs_review(
        &self,
        team_id: Uuid,
        confidence_below: f32,
    ) -> Result<Vec<NeedsReviewItem>> {
        let notes = self.notes.read().await;
        let mut items: Vec<NeedsReviewItem> = self
            .classifications
            .read()
            .await
            .values()
            .filter(|c| c.status == ReviewStatus::Pending && c.confidence < confidence_below)
            .filter_map(|c| {
                let note = notes.get(&c.note_id)?;
                (note.team_id == team_id).then(|| NeedsReviewItem {
                    classification_id: c.id,
                    note_id: c.note_id,
                    note_title: note.title.clone(),
                    inferred_type: c.inferred_type,
                    confidence: c.confidence,
                    explanation: c.explanation.clone(),
                })
            })
            .collect();
        items.sort_by(|a, b| a.confidence.total_cmp(&b.confidence));
        Ok(items)
    }
}

#[async_trait]
impl RelationshipRepository for MemoryStore {
    async fn create(&self, req: CreateRelationshipRequest) -> Result<NoteRelationship> {
        let relationship = NoteRelationship {
            id: Uuid::new_v4(),
            enrichment_run_id: req.enrichment_run_id,
            from_note_id: req.from_note_id,
            to_note_id: req.to_note_id,
            relationship_type: req.relationship_type,
            confidence: req.confidence,
            evidence_snippet: req.evidence_snippet,
            evidence_type: req.evidence_type,
            status: ReviewStatus::Pending,
            approved_by_user_id: None,
            created_at: Utc::now(),
        };
        self.relationships
            .write()
            .await
            .insert(relationship.id, relationship.clone());
        Ok(relationship)
    }

    async fn get_by_enrichment_run(
        &self,
        enrichment_run_id: Uuid,
    ) -> Result<Vec<NoteRelationship>> {
        let mut items: Vec<NoteRelationship> = self
            .relationships
            .read()
            .await
            .values()
            .filter(|r| r.enrichment_run_id == enrichment_run_id)
            .cloned()
            .collect();
        items.sort_by_key(|r| r.created_at);
        Ok(items)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ReviewStatus,
        approved_by_user_id: Option<Uuid>,
    ) -> Result<NoteRelationship> {
        let mut items = self.relationships.write().await;
        let item = items
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("relationship {}", id)))?;
        item.status = status;
        item.approved_by_user_id = reviewed_by(status, approved_by_user_id);
        Ok(item.clone())
    }

    async fn bulk_update_status(
        &self,
        ids: &[Uuid],
        status: ReviewStatus,
        approved_by_user_id: Option<Uuid>,
    ) -> Result<u64> {
        let mut items = self.relationships.write().await;
        let mut updated = 0;
        for id in ids {
            if let Some(item) = items.get_mut(id) {
                item.status = status;
                item.approved_by_user_id = reviewed_by(status, approved_by_user_id);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_by_enrichment_run(&self, enrichment_run_id: Uuid) -> Result<u64> {
        let mut items = self.relationships.write().await;
        let before = items.len();
        items.retain(|_, r| r.enrichment_run_id != enrichment_run_id);
        Ok((before - items.len()) as u64)
    }

    async fn list_needs_review(
        &self,
        team_id: Uuid,
        confidence_below: f32,
    ) -> Result<Vec<RelationshipReviewItem>> {
        let notes = self.notes.read().await;
        let mut items: Vec<RelationshipReviewItem> = self
            .relationships
            .read()
            .await
            .values()
            .filter(|r| r.status == ReviewStatus::Pending && r.confidence < confidence_below)
            .filter_map(|r| {
                let note = notes.get(&r.from_note_id)?;
                (note.team_id == team_id).then(|| RelationshipReviewItem {
                    relationship_id: r.id,
                    from_note_id: r.from_note_id,
                    to_note_id: r.to_note_id,
                    relationship_type: r.relationship_type,
                    confidence: r.confidence,
                    evidence_snippet: r.evidence_snippet.clone(),
                })
            })
            .collect();
        items.sort_by(|a, b| a.confidence.total_cmp(&b.confidence));
        Ok(items)
    }
}

#[async_trait]
impl SnapshotRepository for MemoryStore {
    async fn create(&self, req: CreateSnapshotRequest) -> Result<NoteImportSnapshot> {
        let snapshot = NoteImportSnapshot {
            id: Uuid::new_v4(),
            note_id: req.note_id,
            import_run_id: req.import_run_id,
            previous_title: req.previous_title,
            previous_content: req.previous_content,
            previous_note_type: req.previous_note_type,
            previous_quest_status: req.previous_quest_status,
            previous_content_markdown: req.previous_content_markdown,
            previous_content_markdown_resolved: req.previous_content_markdown_resolved,
            previous_is_private: req.previous_is_private,
            created_at: Utc::now(),
        };
        self.snapshots
            .write()
            .await
            .insert(snapshot.id, snapshot.clone());
        Ok(snapshot)
    }

    async fn get_by_import_run(&self, import_run_id: Uuid) -> Result<Vec<NoteImportSnapshot>> {
        let mut items: Vec<NoteImportSnapshot> = self
            .snapshots
            .read()
            .await
            .values()
            .filter(|s| s.import_run_id == import_run_id)
            .cloned()
            .collect();
        items.sort_by_key(|s| s.created_at);
        Ok(items)
    }

    async fn restore(&self, snapshot_id: Uuid) -> Result<Note> {
        let snapshot = self
            .snapshots
            .read()
            .await
            .get(&snapshot_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("snapshot {}", snapshot_id)))?;

        let mut notes = self.notes.write().await;
        let note = notes
            .get_mut(&snapshot.note_id)
            .ok_or(Error::NoteNotFound(snapshot.note_id))?;

        note.title = snapshot.previous_title;
        note.content = snapshot.previous_content;
        note.note_type = snapshot.previous_note_type;
        note.quest_status =
            normalize_quest_status(snapshot.previous_note_type, snapshot.previous_quest_status);
        note.content_markdown = snapshot.previous_content_markdown;
        note.content_markdown_resolved = snapshot.previous_content_markdown_resolved;
        note.is_private = snapshot.previous_is_private;
        note.import_run_id = None;
        note.updated_at = Utc::now();
        Ok(note.clone())
    }
}

#[async_trait]
impl AiCacheRepository for MemoryStore {
    async fn find(&self, key: &AiCacheKey) -> Result<Option<AiCacheEntry>> {
        let now = Utc::now();
        Ok(self
            .cache
            .read()
            .await
            .get(key)
            .filter(|e| e.expires_at.map(|t| t > now).unwrap_or(true))
            .cloned())
    }

    async fn upsert(&self, req: UpsertCacheEntryRequest) -> Result<AiCacheEntry> {
        let mut cache = self.cache.write().await;
        let entry = match cache.get_mut(&req.key) {
            Some(existing) => {
                existing.result = req.result;
                existing.model_id = req.model_id;
                existing.tokens_saved = req.tokens_saved;
                existing.expires_at = req.expires_at;
                existing.clone()
            }
            None => {
                let entry = AiCacheEntry {
                    id: Uuid::new_v4(),
                    cache_type: req.key.cache_type,
                    content_hash: req.key.content_hash.clone(),
                    algorithm_version: req.key.algorithm_version.clone(),
                    context_hash: req.key.context_hash.clone(),
                    team_id: req.key.team_id,
                    result: req.result,
                    model_id: req.model_id,
                    tokens_saved: req.tokens_saved,
                    hit_count: 0,
                    created_at: Utc::now(),
                    last_hit_at: None,
                    expires_at: req.expires_at,
                };
                cache.insert(req.key, entry.clone());
                entry
            }
        };
        Ok(entry)
    }

    async fn record_hit(&self, id: Uuid, tokens_saved: i64) -> Result<()> {
        let mut cache = self.cache.write().await;
        let entry = cache
            .values_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::Cache(format!("no cache entry with id {}", id)))?;
        entry.hit_count += 1;
        entry.tokens_saved += tokens_saved;
        entry.last_hit_at = Some(Utc::now());
        Ok(())
    }

    async fn invalidate_by_version(
        &self,
        cache_type: CacheType,
        algorithm_version: &str,
    ) -> Result<u64> {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|k, _| {
            !(k.cache_type == cache_type && k.algorithm_version == algorithm_version)
        });
        Ok((before - cache.len()) as u64)
    }

    async fn invalidate_by_team(&self, team_id: Uuid) -> Result<u64> {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|k, _| k.team_id != team_id);
        Ok((before - cache.len()) as u64)
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|_, e| e.expires_at.map(|t| t > now).unwrap_or(true));
        Ok((before - cache.len()) as u64)
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<AiCacheStats> {
        let cache = self.cache.read().await;
        let soon = now + Duration::days(defaults::CACHE_EXPIRY_SOON_DAYS);
        let mut stats = AiCacheStats::default();
        for entry in cache.values() {
            stats.total_entries += 1;
            match entry.cache_type {
                CacheType::Classification => stats.classification_entries += 1,
                CacheType::Relationship => stats.relationship_entries += 1,
            }
            stats.total_hits += entry.hit_count;
            stats.oldest_entry = Some(match stats.oldest_entry {
                Some(t) if t <= entry.created_at => t,
                _ => entry.created_at,
            });
            stats.newest_entry = Some(match stats.newest_entry {
                Some(t) if t >= entry.created_at => t,
                _ => entry.created_at,
            });
            if let Some(expires) = entry.expires_at {
                if expires > now && expires <= soon {
                    stats.entries_expiring_soon += 1;
                }
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lore_core::{InferredEntityType, QuestStatus, RelationshipType, EvidenceType};

    fn note_request(team_id: Uuid, title: &str, note_type: NoteType) -> CreateNoteRequest {
        CreateNoteRequest {
            team_id,
            title: title.to_string(),
            content: "content".to_string(),
            note_type,
            quest_status: None,
            is_private: false,
            linked_note_ids: vec![],
            source_system: None,
            source_page_id: None,
            content_markdown: None,
            import_run_id: None,
            created_by_user_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_note_normalizes_quest_status() {
        let store = MemoryStore::new();
        let mut req = note_request(Uuid::new_v4(), "Old Wren", NoteType::Npc);
        req.quest_status = Some(QuestStatus::Active);
        let note = NoteRepository::create(&*store, req).await.unwrap();
        assert_eq!(note.quest_status, None);
    }

    #[tokio::test]
    async fn test_update_to_non_quest_clears_quest_status() {
        let store = MemoryStore::new();
        let mut req = note_request(Uuid::new_v4(), "Find the ledger", NoteType::Quest);
        req.quest_status = Some(QuestStatus::Active);
        let note = NoteRepository::create(&*store, req).await.unwrap();
        assert_eq!(note.quest_status, Some(QuestStatus::Active));

        let updated = NoteRepository::update(
            &*store,
            note.id,
            UpdateNoteRequest {
                note_type: Some(NoteType::Note),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.quest_status, None);
    }

    #[tokio::test]
    async fn test_find_or_create_session_log_deduplicates_by_title() {
        let store = MemoryStore::new();
        let team = Uuid::new_v4();
        let a = store
            .find_or_create_session_log(note_request(team, "Session 3", NoteType::SessionLog))
            .await
            .unwrap();
        let b = store
            .find_or_create_session_log(note_request(team, "Session 3", NoteType::SessionLog))
            .await
            .unwrap();
        assert_eq!(a.id, b.id);

        // Different team, same title: separate record.
        let c = store
            .find_or_create_session_log(note_request(
                Uuid::new_v4(),
                "Session 3",
                NoteType::SessionLog,
            ))
            .await
            .unwrap();
        assert_ne!(a.id, c.id);
    }

    #[tokio::test]
    async fn test_enrichment_run_status_stamps_timestamps() {
        let store = MemoryStore::new();
        let run = EnrichmentRunRepository::create(&*store, Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        assert!(run.started_at.is_none());

        EnrichmentRunRepository::update_status(&*store, run.id, EnrichmentRunStatus::Running)
            .await
            .unwrap();
        let run = EnrichmentRunRepository::get(&*store, run.id)
            .await
            .unwrap()
            .unwrap();
        assert!(run.started_at.is_some());
        assert!(run.completed_at.is_none());

        EnrichmentRunRepository::update_status(&*store, run.id, EnrichmentRunStatus::Completed)
            .await
            .unwrap();
        let run = EnrichmentRunRepository::get(&*store, run.id)
            .await
            .unwrap()
            .unwrap();
        assert!(run.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_reject_clears_approver_attribution() {
        let store = MemoryStore::new();
        let classification = ClassificationRepository::create(
            &*store,
            CreateClassificationRequest {
                note_id: Uuid::new_v4(),
                enrichment_run_id: Uuid::new_v4(),
                inferred_type: InferredEntityType::Npc,
                confidence: 0.9,
                explanation: "test".to_string(),
                extracted_entities: vec![],
            },
        )
        .await
        .unwrap();

        let user = Uuid::new_v4();
        let approved = ClassificationRepository::update_status(
            &*store,
            classification.id,
            ReviewStatus::Approved,
            Some(user),
        )
        .await
        .unwrap();
        assert_eq!(approved.approved_by_user_id, Some(user));

        let rejected = ClassificationRepository::update_status(
            &*store,
            classification.id,
            ReviewStatus::Rejected,
            Some(user),
        )
        .await
        .unwrap();
        assert_eq!(rejected.approved_by_user_id, None);
    }

    #[tokio::test]
    async fn test_delete_by_enrichment_run_is_idempotent() {
        let store = MemoryStore::new();
        let run_id = Uuid::new_v4();
        for _ in 0..3 {
            ClassificationRepository::create(
                &*store,
                CreateClassificationRequest {
                    note_id: Uuid::new_v4(),
                    enrichment_run_id: run_id,
                    inferred_type: InferredEntityType::Note,
                    confidence: 0.5,
                    explanation: "test".to_string(),
                    extracted_entities: vec![],
                },
            )
            .await
            .unwrap();
        }
        assert_eq!(
            ClassificationRepository::delete_by_enrichment_run(&*store, run_id)
                .await
                .unwrap(),
            3
        );
        assert_eq!(
            ClassificationRepository::delete_by_enrichment_run(&*store, run_id)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_needs_review_is_team_scoped_and_sorted_ascending() {
        let store = MemoryStore::new();
        let team = Uuid::new_v4();
        let other_team = Uuid::new_v4();
        let run_id = Uuid::new_v4();

        let mut make = |team_id: Uuid, title: &str| {
            let store = store.clone();
            let title = title.to_string();
            async move {
                NoteRepository::create(&*store, note_request(team_id, &title, NoteType::Note))
                    .await
                    .unwrap()
            }
        };
        let low = make(team, "low").await;
        let lower = make(team, "lower").await;
        let foreign = make(other_team, "foreign").await;

        for (note, confidence) in [(&low, 0.6), (&lower, 0.3), (&foreign, 0.2)] {
            ClassificationRepository::create(
                &*store,
                CreateClassificationRequest {
                    note_id: note.id,
                    enrichment_run_id: run_id,
                    inferred_type: InferredEntityType::Note,
                    confidence,
                    explanation: "test".to_string(),
                    extracted_entities: vec![],
                },
            )
            .await
            .unwrap();
        }

        let items = ClassificationRepository::list_needs_review(&*store, team, 0.65)
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].note_title, "lower");
        assert_eq!(items[1].note_title, "low");
    }

    #[tokio::test]
    async fn test_snapshot_restore_reverts_fields_and_clears_run_id() {
        let store = MemoryStore::new();
        let team = Uuid::new_v4();
        let run_id = Uuid::new_v4();
        let note = NoteRepository::create(&*store, note_request(team, "Before", NoteType::Npc))
            .await
            .unwrap();

        let snapshot = SnapshotRepository::create(
            &*store,
            CreateSnapshotRequest {
                note_id: note.id,
                import_run_id: run_id,
                previous_title: note.title.clone(),
                previous_content: note.content.clone(),
                previous_note_type: note.note_type,
                previous_quest_status: note.quest_status,
                previous_content_markdown: None,
                previous_content_markdown_resolved: None,
                previous_is_private: false,
            },
        )
        .await
        .unwrap();

        NoteRepository::update(
            &*store,
            note.id,
            UpdateNoteRequest {
                title: Some("After".to_string()),
                note_type: Some(NoteType::Quest),
                quest_status: Some(Some(QuestStatus::Active)),
                import_run_id: Some(Some(run_id)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let restored = SnapshotRepository::restore(&*store, snapshot.id).await.unwrap();
        assert_eq!(restored.title, "Before");
        assert_eq!(restored.note_type, NoteType::Npc);
        assert_eq!(restored.quest_status, None);
        assert_eq!(restored.import_run_id, None);
    }

    #[tokio::test]
    async fn test_cache_upsert_find_and_hit_accounting() {
        let store = MemoryStore::new();
        let key = AiCacheKey {
            cache_type: CacheType::Classification,
            content_hash: "abc".to_string(),
            algorithm_version: "v2".to_string(),
            context_hash: "ctx".to_string(),
            team_id: Uuid::new_v4(),
        };
        assert!(AiCacheRepository::find(&*store, &key).await.unwrap().is_none());

        let entry = AiCacheRepository::upsert(
            &*store,
            UpsertCacheEntryRequest {
                key: key.clone(),
                result: serde_json::json!({"x": 1}),
                model_id: Some("m".to_string()),
                tokens_saved: 100,
                expires_at: Some(Utc::now() + Duration::days(30)),
            },
        )
        .await
        .unwrap();

        AiCacheRepository::record_hit(&*store, entry.id, 100).await.unwrap();
        let found = AiCacheRepository::find(&*store, &key).await.unwrap().unwrap();
        assert_eq!(found.hit_count, 1);
        assert_eq!(found.tokens_saved, 200);
        assert!(found.last_hit_at.is_some());
    }

    #[tokio::test]
    async fn test_cache_expired_entries_are_missed_and_pruned() {
        let store = MemoryStore::new();
        let key = AiCacheKey {
            cache_type: CacheType::Relationship,
            content_hash: "abc".to_string(),
            algorithm_version: "v1".to_string(),
            context_hash: "ctx".to_string(),
            team_id: Uuid::new_v4(),
        };
        AiCacheRepository::upsert(
            &*store,
            UpsertCacheEntryRequest {
                key: key.clone(),
                result: serde_json::json!([]),
                model_id: None,
                tokens_saved: 0,
                expires_at: Some(Utc::now() - Duration::hours(1)),
            },
        )
        .await
        .unwrap();

        assert!(AiCacheRepository::find(&*store, &key).await.unwrap().is_none());
        assert_eq!(AiCacheRepository::prune_expired(&*store, Utc::now()).await.unwrap(), 1);
        assert_eq!(AiCacheRepository::prune_expired(&*store, Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cache_invalidation_by_version_and_team() {
        let store = MemoryStore::new();
        let team_a = Uuid::new_v4();
        let team_b = Uuid::new_v4();
        for (team, version) in [(team_a, "v1"), (team_a, "v2"), (team_b, "v2")] {
            AiCacheRepository::upsert(
                &*store,
                UpsertCacheEntryRequest {
                    key: AiCacheKey {
                        cache_type: CacheType::Classification,
                        content_hash: format!("{}-{}", team, version),
                        algorithm_version: version.to_string(),
                        context_hash: String::new(),
                        team_id: team,
                    },
                    result: serde_json::json!({}),
                    model_id: None,
                    tokens_saved: 0,
                    expires_at: None,
                },
            )
            .await
            .unwrap();
        }

        assert_eq!(
            AiCacheRepository::invalidate_by_version(&*store, CacheType::Classification, "v1")
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            AiCacheRepository::invalidate_by_team(&*store, team_b).await.unwrap(),
            1
        );
        let stats = AiCacheRepository::stats(&*store, Utc::now()).await.unwrap();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.classification_entries, 1);
    }

    #[tokio::test]
    async fn test_relationship_review_listing() {
        let store = MemoryStore::new();
        let team = Uuid::new_v4();
        let from = NoteRepository::create(&*store, note_request(team, "Quest", NoteType::Quest))
            .await
            .unwrap();
        let to = NoteRepository::create(&*store, note_request(team, "NPC", NoteType::Npc))
            .await
            .unwrap();

        RelationshipRepository::create(
            &*store,
            CreateRelationshipRequest {
                enrichment_run_id: Uuid::new_v4(),
                from_note_id: from.id,
                to_note_id: to.id,
                relationship_type: RelationshipType::QuestHasNpc,
                confidence: 0.4,
                evidence_snippet: None,
                evidence_type: EvidenceType::Link,
            },
        )
        .await
        .unwrap();

        let items = RelationshipRepository::list_needs_review(&*store, team, 0.65)
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].relationship_type, RelationshipType::QuestHasNpc);
    }
}
