//! Import service: drives the parser and heuristic classifier end to end
//! for a team, creating notes, snapshots, and the import run record.

use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use lore_core::{
    defaults, normalize_quest_status, CreateNoteRequest, CreateSnapshotRequest, ImportOptions,
    ImportRun, ImportRunRepository, ImportRunStatus, ImportStats, Note, NoteRepository, Result,
    SnapshotRepository, Storage, UpdateNoteRequest, Visibility,
};

use crate::classifier::{classify_pages, resolve_links, ClassifiedPage, PartyRoster};
use crate::parser::{detect_collections, parse_export, ExportEntry};

/// Request for an import run.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub team_id: Uuid,
    pub entries: Vec<ExportEntry>,
    pub options: ImportOptions,
    /// Party member names; pages in the notable-people collection matching
    /// one of these become `character` instead of `npc`.
    pub party_names: Vec<String>,
    pub user_id: Option<Uuid>,
}

/// Imports a wiki export into a team's notes.
pub struct ImportService {
    storage: Storage,
}

impl ImportService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Run a full import: parse, classify, create/update notes (snapshotting
    /// updated notes first), resolve cross-page links, and persist run stats.
    ///
    /// Parser-level problems never fail the run (fallbacks apply);
    /// unresolved links are counted into `warnings_count`. A storage failure
    /// marks the run `failed` and propagates.
    pub async fn run_import(&self, req: ImportRequest) -> Result<ImportRun> {
        let run = self
            .storage
            .import_runs
            .create(
                req.team_id,
                defaults::SOURCE_SYSTEM_NUCLINO,
                req.options.clone(),
                req.user_id,
            )
            .await?;

        info!(
            import_run_id = %run.id,
            team_id = %req.team_id,
            entry_count = req.entries.len(),
            "Starting import run"
        );

        match self.execute(run.id, &req).await {
            Ok(stats) => {
                self.storage.import_runs.update_stats(run.id, stats).await?;
                self.storage
                    .import_runs
                    .update_status(run.id, ImportRunStatus::Completed)
                    .await?;
                self.storage
                    .import_runs
                    .get(run.id)
                    .await?
                    .ok_or_else(|| lore_core::Error::NotFound(format!("import run {}", run.id)))
            }
            Err(e) => {
                warn!(import_run_id = %run.id, error = %e, "Import run failed");
                let _ = self
                    .storage
                    .import_runs
                    .update_status(run.id, ImportRunStatus::Failed)
                    .await;
                Err(e)
            }
        }
    }

    async fn execute(&self, run_id: Uuid, req: &ImportRequest) -> Result<ImportStats> {
        let pages = parse_export(&req.entries);
        let (collections, memberships) = detect_collections(&pages);
        let collection_ids: HashSet<String> = collections
            .iter()
            .map(|c| c.source_page_id.clone())
            .collect();
        let party = PartyRoster::new(req.party_names.iter());
        let classified = classify_pages(pages, &collection_ids, &memberships, &party);

        let mut stats = ImportStats {
            total_pages_detected: classified.len() as i64,
            ..Default::default()
        };

        let is_private = matches!(req.options.default_visibility, Visibility::Private);
        let mut page_to_note: HashMap<String, Uuid> = HashMap::new();
        let mut imported: Vec<(Uuid, String)> = Vec::new();

        for item in &classified {
            if item.page.is_empty && !req.options.import_empty_pages {
                stats.notes_skipped += 1;
                continue;
            }

            let note = match self
                .storage
                .notes
                .get_by_source_page(
                    req.team_id,
                    defaults::SOURCE_SYSTEM_NUCLINO,
                    &item.page.source_page_id,
                )
                .await?
            {
                Some(existing) => {
                    self.snapshot_then_update(run_id, req, &existing, item).await?
                }
                None => {
                    let note = self.create_note(run_id, req, item, is_private).await?;
                    stats.notes_created += 1;
                    note
                }
            };

            if item.page.is_empty {
                stats.empty_pages_imported += 1;
            }

            page_to_note.insert(item.page.source_page_id.clone(), note.id);
            imported.push((note.id, item.page.content.clone()));
        }

        // Count updates: imported minus created.
        stats.notes_updated = imported.len() as i64 - stats.notes_created;

        // Second pass: rewrite cross-page links now that all note IDs exist.
        for (note_id, content) in &imported {
            let resolved = resolve_links(content, &page_to_note);
            stats.links_resolved += resolved.resolved_count as i64;
            stats.warnings_count += resolved.unresolved.len() as i64;

            self.storage
                .notes
                .update(
                    *note_id,
                    UpdateNoteRequest {
                        content: Some(resolved.content.clone()),
                        content_markdown_resolved: Some(Some(resolved.content)),
                        linked_note_ids: Some(resolved.resolved_note_ids),
                        ..Default::default()
                    },
                )
                .await?;
        }

        debug!(
            import_run_id = %run_id,
            created = stats.notes_created,
            updated = stats.notes_updated,
            skipped = stats.notes_skipped,
            warnings = stats.warnings_count,
            "Import run finished"
        );

        Ok(stats)
    }

    async fn create_note(
        &self,
        run_id: Uuid,
        req: &ImportRequest,
        item: &ClassifiedPage,
        is_private: bool,
    ) -> Result<Note> {
        self.storage
            .notes
            .create(CreateNoteRequest {
                team_id: req.team_id,
                title: item.page.title.clone(),
                content: item.page.content.clone(),
                note_type: item.note_type,
                quest_status: normalize_quest_status(item.note_type, item.quest_status),
                is_private,
                linked_note_ids: Vec::new(),
                source_system: Some(defaults::SOURCE_SYSTEM_NUCLINO.to_string()),
                source_page_id: Some(item.page.source_page_id.clone()),
                content_markdown: Some(item.page.content.clone()),
                import_run_id: Some(run_id),
                created_by_user_id: req.user_id,
            })
            .await
    }

    /// Capture the pre-update state of an existing note, then apply the
    /// re-imported page to it.
    async fn snapshot_then_update(
        &self,
        run_id: Uuid,
        req: &ImportRequest,
        existing: &Note,
        item: &ClassifiedPage,
    ) -> Result<Note> {
        self.storage
            .snapshots
            .create(CreateSnapshotRequest {
                note_id: existing.id,
                import_run_id: run_id,
                previous_title: existing.title.clone(),
                previous_content: existing.content.clone(),
                previous_note_type: existing.note_type,
                previous_quest_status: existing.quest_status,
                previous_content_markdown: existing.content_markdown.clone(),
                previous_content_markdown_resolved: existing.content_markdown_resolved.clone(),
                previous_is_private: existing.is_private,
            })
            .await?;

        self.storage
            .notes
            .update(
                existing.id,
                UpdateNoteRequest {
                    title: Some(item.page.title.clone()),
                    content: Some(item.page.content.clone()),
                    note_type: Some(item.note_type),
                    quest_status: Some(normalize_quest_status(item.note_type, item.quest_status)),
                    content_markdown: Some(Some(item.page.content.clone())),
                    import_run_id: Some(Some(run_id)),
                    updated_by_user_id: req.user_id,
                    ..Default::default()
                },
            )
            .await
    }
}
