//! Deterministic heuristic provider for testing and offline use.
//!
//! Classifies notes with keyword heuristics over title and content, and
//! derives relationships from explicit note links. Results are fully
//! deterministic for a given input, which makes the provider suitable for
//! integration tests that assert on pipeline behavior rather than model
//! output.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use lore_core::{
    AiProvider, ClassificationResult, ClassifiedNote, Error, EvidenceType, InferredEntityType,
    NoteForClassification, RelationshipResult, RelationshipType, Result,
};

static SESSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(session|scene|journey)\b|^we\b|\d{4}-\d{2}-\d{2}").unwrap()
});

static PLACE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(inn|tavern|city|town|village|temple|keep|castle|forest|cave|ruins|harbor|district|mountain|swamp)\b").unwrap()
});

static NPC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(merchant|guard|mayor|captain|priest|innkeeper|smith|wizard|noble|baron|duchess|king|queen)\b").unwrap()
});

static QUEST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(quest|reward|bounty|task|retrieve|rescue|investigate|deliver)\b").unwrap()
});

/// Capitalized word runs, used as a cheap entity extractor.
static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-z]+(?: [A-Z][a-z]+)*\b").unwrap());

/// A recorded provider invocation, for test assertions.
#[derive(Debug, Clone)]
pub struct ProviderCall {
    pub operation: String,
    pub note_count: usize,
}

/// Deterministic keyword-heuristic [`AiProvider`].
#[derive(Clone)]
pub struct HeuristicProvider {
    model_id: String,
    failure_rate: f64,
    fail_next: Arc<Mutex<u32>>,
    call_log: Arc<Mutex<Vec<ProviderCall>>>,
}

impl Default for HeuristicProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl HeuristicProvider {
    pub fn new() -> Self {
        Self {
            model_id: "heuristic-v1".to_string(),
            failure_rate: 0.0,
            fail_next: Arc::new(Mutex::new(0)),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set a random failure rate (0.0 - 1.0) for testing error handling.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Fail the next `n` provider calls with a scripted error. Deterministic
    /// counterpart to `with_failure_rate`.
    pub fn fail_next(&self, n: u32) {
        *self.fail_next.lock().unwrap() = n;
    }

    /// All recorded calls.
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Number of `classify_notes` invocations.
    pub fn classify_call_count(&self) -> usize {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == "classify_notes")
            .count()
    }

    /// Number of `extract_relationships` invocations.
    pub fn relationship_call_count(&self) -> usize {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == "extract_relationships")
            .count()
    }

    fn log_call(&self, operation: &str, note_count: usize) {
        self.call_log.lock().unwrap().push(ProviderCall {
            operation: operation.to_string(),
            note_count,
        });
    }

    fn check_failure(&self) -> Result<()> {
        {
            let mut scripted = self.fail_next.lock().unwrap();
            if *scripted > 0 {
                *scripted -= 1;
                return Err(Error::Inference("scripted provider failure".to_string()));
            }
        }
        if self.failure_rate > 0.0 {
            use rand::Rng;
            if rand::thread_rng().gen::<f64>() < self.failure_rate {
                return Err(Error::Inference("simulated provider failure".to_string()));
            }
        }
        Ok(())
    }

    fn classify_one(&self, note: &NoteForClassification) -> ClassificationResult {
        let (inferred_type, confidence, explanation) = infer_type(&note.title, &note.content);
        ClassificationResult {
            note_id: note.id,
            inferred_type,
            confidence,
            explanation,
            extracted_entities: extract_entities(&note.content),
            model_id: Some(self.model_id.clone()),
            tokens_used: estimate_tokens(&note.title, &note.content),
        }
    }
}

fn infer_type(title: &str, content: &str) -> (InferredEntityType, f32, String) {
    if SESSION_RE.is_match(title) {
        return (
            InferredEntityType::SessionLog,
            0.9,
            "title matches session log patterns".to_string(),
        );
    }
    if QUEST_RE.is_match(title) || QUEST_RE.is_match(content) {
        return (
            InferredEntityType::Quest,
            0.85,
            "quest vocabulary in title or content".to_string(),
        );
    }
    if PLACE_RE.is_match(title) {
        return (
            InferredEntityType::Area,
            0.8,
            "title names a place".to_string(),
        );
    }
    if NPC_RE.is_match(title) || NPC_RE.is_match(content) {
        return (
            InferredEntityType::Npc,
            0.75,
            "occupation vocabulary suggests a person".to_string(),
        );
    }
    (
        InferredEntityType::Note,
        0.5,
        "no heuristic matched".to_string(),
    )
}

fn extract_entities(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut entities = Vec::new();
    for m in ENTITY_RE.find_iter(content).take(32) {
        let name = m.as_str().to_string();
        if name.split(' ').count() >= 2 && seen.insert(name.clone()) {
            entities.push(name);
        }
    }
    entities
}

fn estimate_tokens(title: &str, content: &str) -> i64 {
    ((title.len() + content.len()) / 4) as i64
}

/// Relationship type for a directed pair of inferred entity types.
fn relate(from: InferredEntityType, to: InferredEntityType) -> RelationshipType {
    use InferredEntityType::*;
    match (from, to) {
        (Quest, Npc) | (Quest, Character) => RelationshipType::QuestHasNpc,
        (Quest, Area) => RelationshipType::QuestAtPlace,
        (Npc, Area) | (Character, Area) => RelationshipType::NpcInPlace,
        _ => RelationshipType::Related,
    }
}

#[async_trait]
impl AiProvider for HeuristicProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn classify_notes(
        &self,
        notes: &[NoteForClassification],
    ) -> Result<Vec<ClassificationResult>> {
        self.log_call("classify_notes", notes.len());
        self.check_failure()?;
        Ok(notes.iter().map(|n| self.classify_one(n)).collect())
    }

    async fn extract_relationships(
        &self,
        notes: &[ClassifiedNote],
    ) -> Result<Vec<RelationshipResult>> {
        self.log_call("extract_relationships", notes.len());
        self.check_failure()?;

        let by_id: std::collections::HashMap<Uuid, &ClassifiedNote> =
            notes.iter().map(|n| (n.note_id, n)).collect();

        let mut results = Vec::new();
        for note in notes {
            for linked_id in &note.linked_note_ids {
                let Some(target) = by_id.get(linked_id) else {
                    continue;
                };
                results.push(RelationshipResult {
                    from_note_id: note.note_id,
                    to_note_id: target.note_id,
                    relationship_type: relate(note.inferred_type, target.inferred_type),
                    confidence: 0.85,
                    evidence_snippet: Some(format!(
                        "\"{}\" links to \"{}\"",
                        note.title, target.title
                    )),
                    evidence_type: EvidenceType::Link,
                });
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lore_core::NoteType;

    fn note(title: &str, content: &str) -> NoteForClassification {
        NoteForClassification {
            id: Uuid::new_v4(),
            title: title.to_string(),
            content: content.to_string(),
            current_type: NoteType::Note,
        }
    }

    #[tokio::test]
    async fn test_classifies_session_log_from_title() {
        let provider = HeuristicProvider::new();
        let results = provider
            .classify_notes(&[note("Session 12", "We fought the hag.")])
            .await
            .unwrap();
        assert_eq!(results[0].inferred_type, InferredEntityType::SessionLog);
        assert!(results[0].confidence >= 0.8);
    }

    #[tokio::test]
    async fn test_classifies_npc_from_occupation() {
        let provider = HeuristicProvider::new();
        let results = provider
            .classify_notes(&[note("Old Wren", "The innkeeper of Thistle Hollow.")])
            .await
            .unwrap();
        assert_eq!(results[0].inferred_type, InferredEntityType::Npc);
    }

    #[tokio::test]
    async fn test_unmatched_note_gets_low_confidence_note() {
        let provider = HeuristicProvider::new();
        let results = provider
            .classify_notes(&[note("Shopping list", "rope, torches, rations")])
            .await
            .unwrap();
        assert_eq!(results[0].inferred_type, InferredEntityType::Note);
        assert!(results[0].confidence < 0.65);
    }

    #[tokio::test]
    async fn test_results_are_deterministic() {
        let provider = HeuristicProvider::new();
        let input = [note("The Rusty Anchor Inn", "A tavern by the harbor.")];
        let a = provider.classify_notes(&input).await.unwrap();
        let b = provider.classify_notes(&input).await.unwrap();
        assert_eq!(a[0].inferred_type, b[0].inferred_type);
        assert_eq!(a[0].confidence, b[0].confidence);
        assert_eq!(a[0].extracted_entities, b[0].extracted_entities);
    }

    #[tokio::test]
    async fn test_fail_next_is_scripted_and_bounded() {
        let provider = HeuristicProvider::new();
        provider.fail_next(1);
        assert!(provider.classify_notes(&[note("A", "b")]).await.is_err());
        assert!(provider.classify_notes(&[note("A", "b")]).await.is_ok());
    }

    #[tokio::test]
    async fn test_relationships_follow_links_and_type_pairs() {
        let provider = HeuristicProvider::new();
        let quest_id = Uuid::new_v4();
        let npc_id = Uuid::new_v4();
        let area_id = Uuid::new_v4();
        let notes = [
            ClassifiedNote {
                note_id: quest_id,
                title: "Find the stolen ledger".to_string(),
                inferred_type: InferredEntityType::Quest,
                linked_note_ids: vec![npc_id, area_id],
            },
            ClassifiedNote {
                note_id: npc_id,
                title: "Mayor Hobbs".to_string(),
                inferred_type: InferredEntityType::Npc,
                linked_note_ids: vec![],
            },
            ClassifiedNote {
                note_id: area_id,
                title: "Thistle Hollow".to_string(),
                inferred_type: InferredEntityType::Area,
                linked_note_ids: vec![],
            },
        ];
        let results = provider.extract_relationships(&notes).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.evidence_type == EvidenceType::Link));
        assert!(results
            .iter()
            .any(|r| r.relationship_type == RelationshipType::QuestHasNpc
                && r.to_note_id == npc_id));
        assert!(results
            .iter()
            .any(|r| r.relationship_type == RelationshipType::QuestAtPlace
                && r.to_note_id == area_id));
    }

    #[tokio::test]
    async fn test_call_log_counts_operations() {
        let provider = HeuristicProvider::new();
        provider.classify_notes(&[note("A", "b")]).await.unwrap();
        provider.classify_notes(&[note("C", "d")]).await.unwrap();
        provider.extract_relationships(&[]).await.unwrap();
        assert_eq!(provider.classify_call_count(), 2);
        assert_eq!(provider.relationship_call_count(), 1);
    }

    #[test]
    fn test_entity_extraction_requires_multi_word_names() {
        let entities = extract_entities("Mayor Hobbs rules Thistle Hollow. The rain fell.");
        assert!(entities.contains(&"Mayor Hobbs".to_string()));
        assert!(entities.contains(&"Thistle Hollow".to_string()));
        assert!(!entities.contains(&"The".to_string()));
    }
}
