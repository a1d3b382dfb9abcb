//! Heuristic (non-AI) page classifier.
//!
//! Assigns each parsed page a baseline note type from collection membership
//! and title patterns, with a fixed priority order. Also resolves cross-page
//! links into internal note references once target note IDs are known.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use lore_core::{NoteType, QuestStatus};

use crate::parser::{is_session_log_title, CollectionType, Page, LINK_RE};

/// Party member names, normalized for title matching.
#[derive(Debug, Clone, Default)]
pub struct PartyRoster {
    names: HashSet<String>,
}

impl PartyRoster {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| normalize_title(n.as_ref()))
                .collect(),
        }
    }

    fn contains(&self, title: &str) -> bool {
        self.names.contains(&normalize_title(title))
    }
}

fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// A page with its baseline classification.
#[derive(Debug, Clone)]
pub struct ClassifiedPage {
    pub page: Page,
    pub note_type: NoteType,
    pub quest_status: Option<QuestStatus>,
}

/// Classify one page. Deterministic and pure: the same page with the same
/// collection membership always yields the same result.
///
/// Priority, first match wins:
/// 1. the page itself is a collection → `note` (collections are not
///    imported as standalone entity notes)
/// 2. member of notable-people → `npc`, unless the title matches a party
///    member name → `character`
/// 3. member of places → `poi`
/// 4. member of done → `quest` (done)
/// 5. member of todo → `quest` (active)
/// 6. session-log title → `session_log`
/// 7. default → `note`
pub fn classify_page(
    page: &Page,
    collection_ids: &HashSet<String>,
    memberships: &HashMap<String, Vec<CollectionType>>,
    party: &PartyRoster,
) -> (NoteType, Option<QuestStatus>) {
    if collection_ids.contains(&page.source_page_id) {
        return (NoteType::Note, None);
    }

    let member_of = |t: CollectionType| {
        memberships
            .get(&page.source_page_id)
            .is_some_and(|m| m.contains(&t))
    };

    if member_of(CollectionType::NotablePeople) {
        if party.contains(&page.title) {
            return (NoteType::Character, None);
        }
        return (NoteType::Npc, None);
    }
    if member_of(CollectionType::Places) {
        return (NoteType::Poi, None);
    }
    if member_of(CollectionType::Done) {
        return (NoteType::Quest, Some(QuestStatus::Done));
    }
    if member_of(CollectionType::Todo) {
        return (NoteType::Quest, Some(QuestStatus::Active));
    }
    if is_session_log_title(&page.title) {
        return (NoteType::SessionLog, None);
    }

    (NoteType::Note, None)
}

/// Classify every page of an export.
pub fn classify_pages(
    pages: Vec<Page>,
    collection_ids: &HashSet<String>,
    memberships: &HashMap<String, Vec<CollectionType>>,
    party: &PartyRoster,
) -> Vec<ClassifiedPage> {
    pages
        .into_iter()
        .map(|page| {
            let (note_type, quest_status) =
                classify_page(&page, collection_ids, memberships, party);
            ClassifiedPage {
                page,
                note_type,
                quest_status,
            }
        })
        .collect()
}

/// Result of rewriting a page's cross-page links.
#[derive(Debug, Clone)]
pub struct ResolvedContent {
    pub content: String,
    /// Note IDs of successfully resolved targets, in order of appearance,
    /// de-duplicated.
    pub resolved_note_ids: Vec<Uuid>,
    /// Number of link spans rewritten to internal references.
    pub resolved_count: usize,
    /// Link texts whose targets are not in the map. Reported to the caller,
    /// not a hard failure.
    pub unresolved: Vec<String>,
}

/// Rewrite every `[text](<file.md?n>)` span to `[text](/notes/{note_id})`
/// given a completed page-ID → note-ID map. Links with unknown targets
/// become `[text](#unresolved)`.
pub fn resolve_links(content: &str, page_to_note: &HashMap<String, Uuid>) -> ResolvedContent {
    let mut resolved_note_ids = Vec::new();
    let mut resolved_count = 0usize;
    let mut unresolved = Vec::new();

    let content = LINK_RE
        .replace_all(content, |caps: &regex::Captures<'_>| {
            let text = &caps[1];
            let target_page_id = crate::parser::parse_filename(&caps[2]).source_page_id;
            match page_to_note.get(&target_page_id) {
                Some(note_id) => {
                    resolved_count += 1;
                    if !resolved_note_ids.contains(note_id) {
                        resolved_note_ids.push(*note_id);
                    }
                    format!("[{}](/notes/{})", text, note_id)
                }
                None => {
                    unresolved.push(text.to_string());
                    format!("[{}](#unresolved)", text)
                }
            }
        })
        .into_owned();

    ResolvedContent {
        content,
        resolved_note_ids,
        resolved_count,
        unresolved,
    }
}

/// Per-type totals of a classified export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub total_pages: usize,
    pub empty_pages: usize,
    pub areas: usize,
    pub characters: usize,
    pub npcs: usize,
    pub pois: usize,
    pub quests: usize,
    pub session_logs: usize,
    pub notes: usize,
}

/// Summarize a classified export. Collection pages count as `notes`.
pub fn generate_import_summary(classified: &[ClassifiedPage]) -> ImportSummary {
    let mut summary = ImportSummary {
        total_pages: classified.len(),
        ..Default::default()
    };

    for item in classified {
        if item.page.is_empty {
            summary.empty_pages += 1;
        }
        match item.note_type {
            NoteType::Area => summary.areas += 1,
            NoteType::Character => summary.characters += 1,
            NoteType::Npc => summary.npcs += 1,
            NoteType::Poi => summary.pois += 1,
            NoteType::Quest => summary.quests += 1,
            NoteType::SessionLog => summary.session_logs += 1,
            NoteType::Note => summary.notes += 1,
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{detect_collections, parse_export, ExportEntry};

    fn entry(filename: &str, content: &str) -> ExportEntry {
        ExportEntry {
            filename: filename.to_string(),
            content: content.to_string(),
            last_modified: None,
        }
    }

    fn classify_export(
        entries: Vec<ExportEntry>,
        party: &PartyRoster,
    ) -> Vec<ClassifiedPage> {
        let pages = parse_export(&entries);
        let (collections, memberships) = detect_collections(&pages);
        let collection_ids: HashSet<String> = collections
            .iter()
            .map(|c| c.source_page_id.clone())
            .collect();
        classify_pages(pages, &collection_ids, &memberships, party)
    }

    fn npc_collection() -> ExportEntry {
        entry(
            "Notable People 0000aaaa.md",
            "- [Mayor Hobbs](<Mayor Hobbs 0a000001.md?n>)\n\
             - [Old Wren](<Old Wren 0a000002.md?n>)\n\
             - [Sister Maeve](<Sister Maeve 0a000003.md?n>)",
        )
    }

    #[test]
    fn test_collection_page_classified_as_note() {
        let classified = classify_export(vec![npc_collection()], &PartyRoster::default());
        assert_eq!(classified[0].note_type, NoteType::Note);
    }

    #[test]
    fn test_notable_people_member_is_npc() {
        let classified = classify_export(
            vec![npc_collection(), entry("Mayor Hobbs 0a000001.md", "The mayor.")],
            &PartyRoster::default(),
        );
        let mayor = classified.iter().find(|c| c.page.title == "Mayor Hobbs").unwrap();
        assert_eq!(mayor.note_type, NoteType::Npc);
    }

    #[test]
    fn test_party_member_overrides_npc() {
        let party = PartyRoster::new(["mayor  hobbs"]);
        let classified = classify_export(
            vec![npc_collection(), entry("Mayor Hobbs 0a000001.md", "The mayor.")],
            &party,
        );
        let mayor = classified.iter().find(|c| c.page.title == "Mayor Hobbs").unwrap();
        assert_eq!(mayor.note_type, NoteType::Character);
    }

    #[test]
    fn test_done_member_is_completed_quest() {
        let classified = classify_export(
            vec![
                entry(
                    "Done 0000bbbb.md",
                    "- [Find the Mill Key](<Find the Mill Key 0b000001.md?n>)\n\
                     - [Pay the Debt](<Pay the Debt 0b000002.md?n>)\n\
                     - [Clear the Road](<Clear the Road 0b000003.md?n>)",
                ),
                entry("Find the Mill Key 0b000001.md", "A rusty key."),
            ],
            &PartyRoster::default(),
        );
        let quest = classified
            .iter()
            .find(|c| c.page.title == "Find the Mill Key")
            .unwrap();
        assert_eq!(quest.note_type, NoteType::Quest);
        assert_eq!(quest.quest_status, Some(QuestStatus::Done));
    }

    #[test]
    fn test_notable_people_outranks_done() {
        // A page in both Notable People and Done stays an NPC.
        let classified = classify_export(
            vec![
                npc_collection(),
                entry(
                    "Done 0000bbbb.md",
                    "- [Mayor Hobbs](<Mayor Hobbs 0a000001.md?n>)\n\
                     - [x](<x 0b000002.md?n>)\n\
                     - [y](<y 0b000003.md?n>)",
                ),
                entry("Mayor Hobbs 0a000001.md", "The mayor."),
            ],
            &PartyRoster::default(),
        );
        let mayor = classified.iter().find(|c| c.page.title == "Mayor Hobbs").unwrap();
        assert_eq!(mayor.note_type, NoteType::Npc);
    }

    #[test]
    fn test_session_log_title_fallthrough() {
        let classified = classify_export(
            vec![entry("Session 4 _ Ashes 0c000001.md", "We burned it down.")],
            &PartyRoster::default(),
        );
        assert_eq!(classified[0].note_type, NoteType::SessionLog);
        assert_eq!(classified[0].page.title, "Session 4 / Ashes");
    }

    #[test]
    fn test_default_is_note() {
        let classified = classify_export(
            vec![entry("The Meander 0d000001.md", "A slow river.")],
            &PartyRoster::default(),
        );
        assert_eq!(classified[0].note_type, NoteType::Note);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let make = || {
            classify_export(
                vec![npc_collection(), entry("Old Wren 0a000002.md", "A hermit.")],
                &PartyRoster::default(),
            )
        };
        let a = make();
        let b = make();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.note_type, y.note_type);
            assert_eq!(x.quest_status, y.quest_status);
        }
    }

    #[test]
    fn test_resolve_links_rewrites_known_targets() {
        let note_id = Uuid::new_v4();
        let map = HashMap::from([("0a000001".to_string(), note_id)]);
        let resolved = resolve_links(
            "Ask [the mayor](<Mayor Hobbs 0a000001.md?n>) about [the mill](<The Mill 0e000001.md?n>).",
            &map,
        );
        assert_eq!(
            resolved.content,
            format!("Ask [the mayor](/notes/{}) about [the mill](#unresolved).", note_id)
        );
        assert_eq!(resolved.resolved_note_ids, vec![note_id]);
        assert_eq!(resolved.unresolved, vec!["the mill".to_string()]);
    }

    #[test]
    fn test_resolve_links_deduplicates_targets() {
        let note_id = Uuid::new_v4();
        let map = HashMap::from([("0a000001".to_string(), note_id)]);
        let resolved = resolve_links(
            "[a](<P 0a000001.md?n>) and [b](<P 0a000001.md?n>)",
            &map,
        );
        assert_eq!(resolved.resolved_note_ids, vec![note_id]);
    }

    #[test]
    fn test_end_to_end_summary_scenario() {
        // One Notable People collection linking 3 children, plus one
        // standalone session page: 3 npcs, 1 session log, 1 collection-as-note.
        let classified = classify_export(
            vec![
                npc_collection(),
                entry("Mayor Hobbs 0a000001.md", "The mayor."),
                entry("Old Wren 0a000002.md", "A hermit."),
                entry("Sister Maeve 0a000003.md", "A priest."),
                entry("We find the body 0c000001.md", "It was under the mill."),
            ],
            &PartyRoster::default(),
        );

        let summary = generate_import_summary(&classified);
        assert_eq!(summary.total_pages, 5);
        assert_eq!(summary.empty_pages, 0);
        assert_eq!(summary.npcs, 3);
        assert_eq!(summary.session_logs, 1);
        assert_eq!(summary.notes, 1);
        assert_eq!(summary.quests, 0);
    }
}
