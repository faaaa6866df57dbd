use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An uploaded document before extraction. Owned by exactly one pipeline
/// run and dropped once text has been extracted.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl RawDocument {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn extension(&self) -> Option<String> {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    TextPdf,
    OcrProcessed,
    Partial,
    NeedsConversion,
    PlainText,
    Markdown,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub method: String,
    pub page_count: usize,
    pub char_count: usize,
    pub quality: Quality,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ExtractionMetadata {
    pub fn new(method: impl Into<String>, page_count: usize, quality: Quality) -> Self {
        Self {
            method: method.into(),
            page_count,
            char_count: 0,
            quality,
            extra: serde_json::Map::new(),
        }
    }
}

/// Outcome of one extraction strategy. A structurally unreadable input is
/// reported as `Err(IngestError)` by the extractor instead of a variant
/// here, so downstream code always has text to work with.
#[derive(Debug, Clone)]
pub enum Extraction {
    Success {
        text: String,
        metadata: ExtractionMetadata,
    },
    Degraded {
        text: String,
        metadata: ExtractionMetadata,
        warning: String,
    },
}

impl Extraction {
    pub fn text(&self) -> &str {
        match self {
            Self::Success { text, .. } | Self::Degraded { text, .. } => text,
        }
    }

    pub fn metadata(&self) -> &ExtractionMetadata {
        match self {
            Self::Success { metadata, .. } | Self::Degraded { metadata, .. } => metadata,
        }
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Degraded { warning, .. } => Some(warning.as_str()),
        }
    }
}

/// One window of cleaned text. `start` and `end` are character offsets
/// into the cleaned document text; `content` is the trimmed slice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub start: usize,
    pub end: usize,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Person,
    Organization,
    Concept,
    Topic,
    Location,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Concept => "concept",
            Self::Topic => "topic",
            Self::Location => "location",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "person" => Some(Self::Person),
            "organization" => Some(Self::Organization),
            "concept" => Some(Self::Concept),
            "topic" => Some(Self::Topic),
            "location" => Some(Self::Location),
            _ => None,
        }
    }
}

/// An entity aggregated across all chunks of one document, deduplicated
/// by lowercased name and kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
    pub relevance: f64,
    pub count: usize,
    pub source_chunks: BTreeSet<usize>,
}

/// A single extraction observation for one chunk, before deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    pub kind: EntityKind,
    pub relevance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub node_id: String,
    pub document_id: String,
    pub name: String,
    pub kind: EntityKind,
    pub relevance: f64,
    pub size: f64,
    pub color: String,
    pub source_chunks: BTreeSet<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub edge_id: String,
    pub document_id: String,
    pub source: String,
    pub target: String,
    pub relationship: String,
    pub weight: f64,
    pub ai_generated: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub file_name: String,
    pub source_url: String,
    pub status: DocumentStatus,
    pub status_message: Option<String>,
    pub checksum: String,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub content: String,
    pub start: usize,
    pub end: usize,
    pub vector_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub document_id: String,
    pub step: usize,
    pub total_steps: usize,
    pub percent: u8,
    pub message: String,
}
