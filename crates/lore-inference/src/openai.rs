//! OpenAI-compatible [`AiProvider`] implementation.
//!
//! Talks to any chat-completions endpoint that speaks the OpenAI wire
//! format. Prompts ask for strict JSON and responses are parsed into the
//! provider result types.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use lore_core::{
    AiProvider, ClassificationResult, ClassifiedNote, Error, EvidenceType, InferredEntityType,
    NoteForClassification, RelationshipResult, RelationshipType, Result,
};

/// Default OpenAI API endpoint.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Default chat model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default HTTP timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for the OpenAI-compatible provider.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key for authentication (optional for local endpoints).
    pub api_key: Option<String>,
    /// Chat model to use.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// OpenAI-compatible AI provider.
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    /// Create a new provider with the given configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Inference(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            "Initializing OpenAI provider: url={}, model={}",
            config.base_url, config.model
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        let config = OpenAiConfig {
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_URL.to_string()),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            timeout_seconds: std::env::var("OPENAI_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        };
        Self::new(config)
    }

    /// Get the current configuration.
    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    /// Build a POST request with authentication if configured.
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        req.header("Content-Type", "application/json")
    }

    /// Send a chat request and return the assistant's content plus the total
    /// token usage.
    async fn chat(&self, system: &str, user: String) -> Result<(String, i64)> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user,
                },
            ],
            temperature: 0.0,
            response_format: Some(ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        let response = self
            .build_request("/chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "Chat request failed with status {}: {}",
                status, body
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Invalid response body: {}", e)))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Inference("Response contained no choices".to_string()))?;

        let tokens = chat.usage.map(|u| u.total_tokens).unwrap_or(0);
        Ok((content, tokens))
    }
}

const CLASSIFY_SYSTEM_PROMPT: &str = "You classify tabletop RPG campaign notes. \
For each note, decide its entity type: Character (a player character), NPC, Area \
(any place), Quest, SessionLog, or Note. Respond with JSON: \
{\"classifications\": [{\"note_id\": \"...\", \"inferred_type\": \"...\", \
\"confidence\": 0.0, \"explanation\": \"...\", \"extracted_entities\": [\"...\"]}]}. \
Return exactly one entry per input note.";

const RELATIONSHIP_SYSTEM_PROMPT: &str = "You extract relationships between \
classified tabletop RPG campaign notes. Allowed relationship types: QuestHasNpc, \
QuestAtPlace, NpcInPlace, Related. Respond with JSON: {\"relationships\": \
[{\"from_note_id\": \"...\", \"to_note_id\": \"...\", \"relationship_type\": \
\"...\", \"confidence\": 0.0, \"evidence_snippet\": \"...\"}]}. Only relate \
notes that are actually connected.";

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn model_id(&self) -> &str {
        &self.config.model
    }

    async fn classify_notes(
        &self,
        notes: &[NoteForClassification],
    ) -> Result<Vec<ClassificationResult>> {
        if notes.is_empty() {
            return Ok(vec![]);
        }

        debug!(
            "Classifying {} notes with model {}",
            notes.len(),
            self.config.model
        );

        let payload: Vec<_> = notes
            .iter()
            .map(|n| {
                serde_json::json!({
                    "note_id": n.id,
                    "title": n.title,
                    "content": n.content,
                    "current_type": n.current_type.to_string(),
                })
            })
            .collect();

        let (content, total_tokens) = self
            .chat(
                CLASSIFY_SYSTEM_PROMPT,
                serde_json::to_string(&serde_json::json!({ "notes": payload }))?,
            )
            .await?;

        let parsed: ClassificationPayload = serde_json::from_str(&content)
            .map_err(|e| Error::Inference(format!("Unparseable classification output: {}", e)))?;

        let tokens_each = total_tokens / notes.len() as i64;
        let mut by_id: HashMap<Uuid, ModelClassification> = parsed
            .classifications
            .into_iter()
            .map(|c| (c.note_id, c))
            .collect();

        // One result per input note, in input order. A note the model skipped
        // gets a zero-confidence fallback so downstream review catches it.
        let results = notes
            .iter()
            .map(|note| match by_id.remove(&note.id) {
                Some(c) => ClassificationResult {
                    note_id: note.id,
                    inferred_type: c.inferred_type,
                    confidence: c.confidence.clamp(0.0, 1.0),
                    explanation: c.explanation,
                    extracted_entities: c.extracted_entities,
                    model_id: Some(self.config.model.clone()),
                    tokens_used: tokens_each,
                },
                None => {
                    warn!(note_id = %note.id, "Model omitted a note from classification output");
                    ClassificationResult {
                        note_id: note.id,
                        inferred_type: InferredEntityType::Note,
                        confidence: 0.0,
                        explanation: "model returned no classification for this note".to_string(),
                        extracted_entities: vec![],
                        model_id: Some(self.config.model.clone()),
                        tokens_used: 0,
                    }
                }
            })
            .collect();

        Ok(results)
    }

    async fn extract_relationships(
        &self,
        notes: &[ClassifiedNote],
    ) -> Result<Vec<RelationshipResult>> {
        if notes.len() < 2 {
            return Ok(vec![]);
        }

        debug!(
            "Extracting relationships across {} notes with model {}",
            notes.len(),
            self.config.model
        );

        let payload: Vec<_> = notes
            .iter()
            .map(|n| {
                serde_json::json!({
                    "note_id": n.note_id,
                    "title": n.title,
                    "inferred_type": n.inferred_type,
                    "linked_note_ids": n.linked_note_ids,
                })
            })
            .collect();

        let (content, _tokens) = self
            .chat(
                RELATIONSHIP_SYSTEM_PROMPT,
                serde_json::to_string(&serde_json::json!({ "notes": payload }))?,
            )
            .await?;

        let parsed: RelationshipPayload = serde_json::from_str(&content)
            .map_err(|e| Error::Inference(format!("Unparseable relationship output: {}", e)))?;

        let known: std::collections::HashSet<Uuid> = notes.iter().map(|n| n.note_id).collect();
        let results = parsed
            .relationships
            .into_iter()
            .filter(|r| {
                let ok = known.contains(&r.from_note_id) && known.contains(&r.to_note_id);
                if !ok {
                    warn!("Model related a note outside the input set; dropping");
                }
                ok
            })
            .map(|r| RelationshipResult {
                from_note_id: r.from_note_id,
                to_note_id: r.to_note_id,
                relationship_type: r.relationship_type,
                confidence: r.confidence.clamp(0.0, 1.0),
                evidence_snippet: r.evidence_snippet,
                evidence_type: EvidenceType::Mention,
            })
            .collect();

        Ok(results)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct ClassificationPayload {
    classifications: Vec<ModelClassification>,
}

#[derive(Debug, Deserialize)]
struct ModelClassification {
    note_id: Uuid,
    inferred_type: InferredEntityType,
    confidence: f32,
    explanation: String,
    #[serde(default)]
    extracted_entities: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RelationshipPayload {
    relationships: Vec<ModelRelationship>,
}

#[derive(Debug, Deserialize)]
struct ModelRelationship {
    from_note_id: Uuid,
    to_note_id: Uuid,
    relationship_type: RelationshipType,
    confidence: f32,
    evidence_snippet: Option<String>,
}
