use crate::error::StoreError;
use crate::models::{EntityKind, ExtractedEntity};
use crate::traits::{EmbeddingProvider, LanguageModel};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";

const REQUEST_TIMEOUT_SECS: u64 = 120;

const ENTITY_PROMPT: &str = "Extract the named entities from the text below. \
Respond with only a JSON array, no prose. Each element must be an object with \
\"name\" (string), \"type\" (one of: person, organization, concept, topic, location) \
and \"relevance\" (number from 0 to 10).";

/// Ollama REST client covering both roles the pipeline needs from a
/// model server: entity extraction / free-form completion via
/// `/api/generate`, and embeddings via `/api/embeddings`.
pub struct OllamaClient {
    endpoint: String,
    model: String,
    embedding_model: String,
    embedding_dimensions: usize,
    client: Client,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct RawEntity {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    relevance: f64,
}

impl OllamaClient {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        embedding_model: impl Into<String>,
        embedding_dimensions: usize,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            embedding_model: embedding_model.into(),
            embedding_dimensions,
            client,
        }
    }

    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, StoreError> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
                "options": { "temperature": temperature },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::BackendResponse {
                backend: "ollama".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        Ok(parsed.response)
    }
}

/// Pulls the first JSON array out of a model reply. Models often wrap
/// the payload in prose or markdown fences, so the array is located by
/// bracket positions rather than parsing the whole reply.
fn parse_entity_reply(reply: &str) -> Vec<ExtractedEntity> {
    let Some(start) = reply.find('[') else {
        return Vec::new();
    };
    let Some(end) = reply.rfind(']') else {
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }

    let raw: Vec<RawEntity> = match serde_json::from_str(&reply[start..=end]) {
        Ok(parsed) => parsed,
        Err(error) => {
            warn!(%error, "entity reply was not valid JSON, treating as empty");
            return Vec::new();
        }
    };

    raw.into_iter()
        .filter_map(|entity| {
            let name = entity.name.trim().to_string();
            if name.is_empty() {
                return None;
            }
            let kind = EntityKind::parse(&entity.kind)?;
            Some(ExtractedEntity {
                name,
                kind,
                relevance: entity.relevance.clamp(0.0, 10.0),
            })
        })
        .collect()
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>, StoreError> {
        let prompt = format!("{ENTITY_PROMPT}\n\nText:\n{text}");
        let reply = self.generate(&prompt, 0.1).await?;
        Ok(parse_entity_reply(&reply))
    }

    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, StoreError> {
        self.generate(prompt, temperature).await
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    fn dimensions(&self) -> usize {
        self.embedding_dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.endpoint))
            .json(&json!({
                "model": self.embedding_model,
                "prompt": text,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::BackendResponse {
                backend: "ollama".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        if parsed.embedding.len() != self.embedding_dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.embedding_dimensions,
                actual: parsed.embedding.len(),
            });
        }

        Ok(parsed.embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_reply_parses_through_prose() {
        let reply = "Here are the entities:\n```json\n[\
            {\"name\": \"Ada Lovelace\", \"type\": \"person\", \"relevance\": 9},\
            {\"name\": \"Analytical Engine\", \"type\": \"concept\", \"relevance\": 8}\
        ]\n```";
        let entities = parse_entity_reply(reply);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].name, "Ada Lovelace");
        assert_eq!(entities[0].kind, EntityKind::Person);
        assert_eq!(entities[1].relevance, 8.0);
    }

    #[test]
    fn unknown_kinds_and_blank_names_are_dropped() {
        let reply = r#"[
            {"name": "Widget", "type": "gadget", "relevance": 5},
            {"name": "  ", "type": "person", "relevance": 5},
            {"name": "Paris", "type": "location", "relevance": 12}
        ]"#;
        let entities = parse_entity_reply(reply);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "Paris");
        assert_eq!(entities[0].relevance, 10.0);
    }

    #[test]
    fn reply_without_array_is_empty() {
        assert!(parse_entity_reply("no entities found").is_empty());
        assert!(parse_entity_reply("] backwards [").is_empty());
    }
}
