//! Enrichment worker: drives the AI classification and relationship
//! pipeline over an import run's notes.
//!
//! Jobs are processed strictly one at a time, in submission order, off an
//! in-memory queue. The queue is not durable: jobs waiting at process exit
//! are lost and their runs stay `pending`. A failure inside one job marks
//! that run `failed` and never stops the worker; the next job is picked up
//! as if nothing happened.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use lore_cache::AiCache;
use lore_core::{
    defaults, map_note_type_to_inferred, AiProvider, ClassificationRepository,
    ClassificationResult, ClassifiedNote, CreateClassificationRequest, CreateRelationshipRequest,
    EnrichmentRunRepository, EnrichmentRunStatus, EnrichmentTotals, Error, InferredEntityType,
    Note, NoteForClassification, NoteRepository, RelationshipRepository, RelationshipResult,
    Result, Storage, UpdateEnrichmentRunRequest,
};

/// Internal note references written by the import link resolver.
static NOTE_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/notes/([0-9a-fA-F-]{36})").unwrap());

/// One unit of enrichment work: classify and relate all notes of an import
/// run, recording results under an enrichment run.
#[derive(Debug, Clone)]
pub struct EnrichmentJob {
    pub enrichment_run_id: Uuid,
    pub import_run_id: Uuid,
    pub team_id: Uuid,
    /// Re-classify notes whose type is already settled.
    pub override_existing: bool,
    /// Player-character roster; part of the classification cache context.
    pub pc_names: Vec<String>,
}

/// Event emitted by the enrichment worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    WorkerStarted,
    WorkerStopped,
    JobStarted { enrichment_run_id: Uuid },
    JobCompleted { enrichment_run_id: Uuid },
    JobFailed { enrichment_run_id: Uuid, error: String },
}

/// Handle for submitting jobs to a running worker.
pub struct WorkerHandle {
    job_tx: mpsc::UnboundedSender<EnrichmentJob>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Queue a job. Jobs run in submission order.
    pub fn enqueue(&self, job: EnrichmentJob) -> Result<()> {
        self.job_tx
            .send(job)
            .map_err(|_| Error::Job("enrichment worker is not running".to_string()))
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }

    /// Stop accepting jobs. Already-queued jobs still drain before the
    /// worker task exits.
    pub fn shutdown(self) {}
}

/// Worker that executes enrichment jobs against a provider and storage.
pub struct EnrichmentWorker {
    storage: Storage,
    provider: Arc<dyn AiProvider>,
    cache: AiCache,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl EnrichmentWorker {
    pub fn new(storage: Storage, provider: Arc<dyn AiProvider>) -> Self {
        let cache = AiCache::new(storage.ai_cache.clone());
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            storage,
            provider,
            cache,
            event_tx,
        }
    }

    /// Start the worker and return a handle for submitting jobs.
    pub fn start(self) -> WorkerHandle {
        let (job_tx, mut job_rx) = mpsc::unbounded_channel::<EnrichmentJob>();
        let event_rx = self.event_tx.subscribe();
        let worker = Arc::new(self);

        tokio::spawn(async move {
            info!("Enrichment worker started");
            let _ = worker.event_tx.send(WorkerEvent::WorkerStarted);
            while let Some(job) = job_rx.recv().await {
                worker.process(job).await;
            }
            info!("Enrichment worker stopped");
            let _ = worker.event_tx.send(WorkerEvent::WorkerStopped);
        });

        WorkerHandle { job_tx, event_rx }
    }

    /// Execute one job end to end. Errors are absorbed here: the run is
    /// marked failed and the worker stays alive for the next job.
    async fn process(&self, job: EnrichmentJob) {
        let run_id = job.enrichment_run_id;
        let _ = self.event_tx.send(WorkerEvent::JobStarted {
            enrichment_run_id: run_id,
        });

        match self.run_job(&job).await {
            Ok(()) => {
                let _ = self.event_tx.send(WorkerEvent::JobCompleted {
                    enrichment_run_id: run_id,
                });
            }
            Err(e) => {
                warn!(
                    enrichment_run_id = %run_id,
                    error = %e,
                    "Enrichment job failed"
                );
                if let Err(update_err) = self
                    .storage
                    .enrichment_runs
                    .update(
                        run_id,
                        UpdateEnrichmentRunRequest {
                            totals: None,
                            error_message: Some(e.to_string()),
                        },
                    )
                    .await
                {
                    warn!(
                        enrichment_run_id = %run_id,
                        error = %update_err,
                        "Failed to record enrichment error message"
                    );
                }
                if let Err(status_err) = self
                    .storage
                    .enrichment_runs
                    .update_status(run_id, EnrichmentRunStatus::Failed)
                    .await
                {
                    warn!(
                        enrichment_run_id = %run_id,
                        error = %status_err,
                        "Failed to mark enrichment run failed"
                    );
                }
                let _ = self.event_tx.send(WorkerEvent::JobFailed {
                    enrichment_run_id: run_id,
                    error: e.to_string(),
                });
            }
        }
    }

    async fn run_job(&self, job: &EnrichmentJob) -> Result<()> {
        self.storage
            .enrichment_runs
            .update_status(job.enrichment_run_id, EnrichmentRunStatus::Running)
            .await?;

        let totals = self.run_pipeline(job).await?;

        self.storage
            .enrichment_runs
            .update(
                job.enrichment_run_id,
                UpdateEnrichmentRunRequest {
                    totals: Some(totals),
                    error_message: None,
                },
            )
            .await?;
        self.storage
            .enrichment_runs
            .update_status(job.enrichment_run_id, EnrichmentRunStatus::Completed)
            .await?;
        Ok(())
    }

    async fn run_pipeline(&self, job: &EnrichmentJob) -> Result<EnrichmentTotals> {
        let notes = self
            .storage
            .notes
            .get_by_import_run(job.import_run_id)
            .await?;

        if notes.is_empty() {
            debug!(
                import_run_id = %job.import_run_id,
                "Import run has no notes; completing with zero totals"
            );
            return Ok(EnrichmentTotals::default());
        }

        let views: HashMap<Uuid, NoteForClassification> = notes
            .iter()
            .map(|n| {
                (
                    n.id,
                    NoteForClassification {
                        id: n.id,
                        title: n.title.clone(),
                        content: n.content.clone(),
                        current_type: n.note_type,
                    },
                )
            })
            .collect();

        let mut totals = EnrichmentTotals::default();
        let final_types = self
            .classification_phase(job, &notes, &views, &mut totals)
            .await?;
        self.relationship_phase(job, &notes, &views, &final_types, &mut totals)
            .await?;
        Ok(totals)
    }

    /// Classify unsettled notes (or all of them with `override_existing`),
    /// replaying cached results and asking the provider only for misses.
    /// Returns the inferred type recorded for each classified note.
    async fn classification_phase(
        &self,
        job: &EnrichmentJob,
        notes: &[Note],
        views: &HashMap<Uuid, NoteForClassification>,
        totals: &mut EnrichmentTotals,
    ) -> Result<HashMap<Uuid, InferredEntityType>> {
        let candidates: Vec<NoteForClassification> = notes
            .iter()
            .filter(|n| job.override_existing || !n.note_type.is_settled())
            .filter_map(|n| views.get(&n.id).cloned())
            .collect();

        totals.notes_processed = candidates.len() as i64;
        if candidates.is_empty() {
            return Ok(HashMap::new());
        }

        let mut results = self
            .cache
            .get_classification_batch(&candidates, &job.pc_names, job.team_id)
            .await?;

        let misses: Vec<NoteForClassification> = candidates
            .iter()
            .filter(|v| !results.contains_key(&v.id))
            .cloned()
            .collect();

        debug!(
            enrichment_run_id = %job.enrichment_run_id,
            cache_hits = results.len(),
            cache_misses = misses.len(),
            "Classification phase"
        );

        if !misses.is_empty() {
            let fresh = self
                .with_provider_timeout(self.provider.classify_notes(&misses))
                .await?;

            // Cache writes are best-effort: a failed write costs tokens on
            // the next run, nothing else.
            for result in &fresh {
                if let Some(view) = views.get(&result.note_id) {
                    if let Err(e) = self
                        .cache
                        .set_classification(view, &job.pc_names, result, job.team_id)
                        .await
                    {
                        warn!(note_id = %result.note_id, error = %e, "Classification cache write failed");
                    }
                }
            }
            for result in fresh {
                results.insert(result.note_id, result);
            }
        }

        let mut final_types = HashMap::new();
        for view in &candidates {
            let result = results.remove(&view.id).unwrap_or_else(|| {
                warn!(note_id = %view.id, "No classification produced; recording fallback");
                ClassificationResult {
                    note_id: view.id,
                    inferred_type: InferredEntityType::Note,
                    confidence: 0.0,
                    explanation: "provider produced no classification for this note".to_string(),
                    extracted_entities: vec![],
                    model_id: None,
                    tokens_used: 0,
                }
            });

            final_types.insert(view.id, result.inferred_type);
            self.storage
                .classifications
                .create(CreateClassificationRequest {
                    note_id: view.id,
                    enrichment_run_id: job.enrichment_run_id,
                    inferred_type: result.inferred_type,
                    confidence: result.confidence,
                    explanation: result.explanation,
                    extracted_entities: result.extracted_entities,
                })
                .await?;

            totals.classifications_created += 1;
            if result.confidence >= defaults::CONFIDENCE_HIGH {
                totals.high_confidence_count += 1;
            }
            if result.confidence < defaults::CONFIDENCE_REVIEW {
                totals.low_confidence_count += 1;
                totals.user_review_required += 1;
            }
        }
        Ok(final_types)
    }

    /// Extract relationships, replaying per-pair cached results along note
    /// links and asking the provider when some linked pair is uncovered or
    /// the run has no links at all. Provider relationships between run notes
    /// the links never connected are persisted too; only linked pairs get
    /// cache entries.
    async fn relationship_phase(
        &self,
        job: &EnrichmentJob,
        notes: &[Note],
        views: &HashMap<Uuid, NoteForClassification>,
        final_types: &HashMap<Uuid, InferredEntityType>,
        totals: &mut EnrichmentTotals,
    ) -> Result<()> {
        let known: HashSet<Uuid> = notes.iter().map(|n| n.id).collect();

        let classified: Vec<ClassifiedNote> = notes
            .iter()
            .map(|n| {
                let inferred = final_types
                    .get(&n.id)
                    .copied()
                    .unwrap_or_else(|| map_note_type_to_inferred(n.note_type));

                let mut seen = HashSet::new();
                let mut linked: Vec<Uuid> = Vec::new();
                for id in n
                    .linked_note_ids
                    .iter()
                    .copied()
                    .chain(extract_note_links(&n.content))
                {
                    // Endpoints must exist in this run's note set.
                    if id != n.id && known.contains(&id) && seen.insert(id) {
                        linked.push(id);
                    }
                }

                ClassifiedNote {
                    note_id: n.id,
                    title: n.title.clone(),
                    inferred_type: inferred,
                    linked_note_ids: linked,
                }
            })
            .collect();

        let mut pairs: Vec<(Uuid, Uuid)> = Vec::new();
        let mut seen_pairs = HashSet::new();
        for note in &classified {
            for target in &note.linked_note_ids {
                let key = order_pair(note.note_id, *target);
                if seen_pairs.insert(key) {
                    pairs.push(key);
                }
            }
        }

        let mut relationships: Vec<RelationshipResult> = Vec::new();
        let mut miss_pairs: Vec<(Uuid, Uuid)> = Vec::new();
        for (a, b) in &pairs {
            let (Some(va), Some(vb)) = (views.get(a), views.get(b)) else {
                continue;
            };
            match self
                .cache
                .get_relationships_for_pair(va, vb, job.team_id)
                .await?
            {
                Some(cached) => relationships.extend(cached),
                None => miss_pairs.push((*a, *b)),
            }
        }

        debug!(
            enrichment_run_id = %job.enrichment_run_id,
            linked_pairs = pairs.len(),
            uncovered_pairs = miss_pairs.len(),
            "Relationship phase"
        );

        let replayed: HashSet<(Uuid, Uuid)> = {
            let misses: HashSet<(Uuid, Uuid)> = miss_pairs.iter().copied().collect();
            pairs
                .iter()
                .copied()
                .filter(|p| !misses.contains(p))
                .collect()
        };

        if !miss_pairs.is_empty() || pairs.is_empty() {
            let fresh = self
                .with_provider_timeout(self.provider.extract_relationships(&classified))
                .await?;

            // Buckets decide what gets written back to the per-pair cache.
            let mut by_pair: HashMap<(Uuid, Uuid), Vec<RelationshipResult>> =
                miss_pairs.iter().map(|p| (*p, Vec::new())).collect();
            for result in fresh {
                if !known.contains(&result.from_note_id) || !known.contains(&result.to_note_id) {
                    warn!("Provider related a note outside the run; dropping");
                    continue;
                }
                let key = order_pair(result.from_note_id, result.to_note_id);
                // Results for already-cached pairs are dropped to avoid
                // duplicating replayed relationships.
                if replayed.contains(&key) {
                    continue;
                }
                match by_pair.get_mut(&key) {
                    Some(bucket) => bucket.push(result),
                    // A relationship between notes the links never
                    // connected. Persisted, but not cached.
                    None => relationships.push(result),
                }
            }

            for ((a, b), found) in by_pair {
                let (Some(va), Some(vb)) = (views.get(&a), views.get(&b)) else {
                    continue;
                };
                if let Err(e) = self
                    .cache
                    .set_relationships_for_pair(
                        va,
                        vb,
                        &found,
                        Some(self.provider.model_id().to_string()),
                        job.team_id,
                    )
                    .await
                {
                    warn!(error = %e, "Relationship cache write failed");
                }
                relationships.extend(found);
            }
        }

        for relationship in &relationships {
            self.storage
                .relationships
                .create(CreateRelationshipRequest {
                    enrichment_run_id: job.enrichment_run_id,
                    from_note_id: relationship.from_note_id,
                    to_note_id: relationship.to_note_id,
                    relationship_type: relationship.relationship_type,
                    confidence: relationship.confidence,
                    evidence_snippet: relationship.evidence_snippet.clone(),
                    evidence_type: relationship.evidence_type,
                })
                .await?;
            totals.relationships_found += 1;
            if relationship.confidence < defaults::CONFIDENCE_REVIEW {
                totals.user_review_required += 1;
            }
        }
        Ok(())
    }

    async fn with_provider_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(
            Duration::from_secs(defaults::PROVIDER_TIMEOUT_SECS),
            fut,
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Inference(format!(
                "provider call timed out after {}s",
                defaults::PROVIDER_TIMEOUT_SECS
            ))),
        }
    }
}

fn order_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Parse `/notes/{uuid}` references out of resolved note content.
fn extract_note_links(content: &str) -> impl Iterator<Item = Uuid> + '_ {
    NOTE_LINK_RE
        .captures_iter(content)
        .filter_map(|caps| caps[1].parse().ok())
}
