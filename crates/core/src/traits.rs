use crate::error::StoreError;
use crate::models::{
    ChunkRecord, DocumentRecord, DocumentStatus, ExtractedEntity, GraphEdge, GraphNode,
    ProgressEvent,
};
use async_trait::async_trait;
use serde_json::Value;

/// Blob storage for the raw uploaded bytes.
#[async_trait]
pub trait ObjectStore {
    async fn put(&self, bytes: &[u8], path: &str) -> Result<String, StoreError>;
    async fn delete(&self, path: &str) -> Result<(), StoreError>;
}

/// Record store for documents, chunks, and the derived graph. Records
/// are appended, never upserted; reprocessing a document requires
/// deleting its artifacts first.
#[async_trait]
pub trait DocumentStore {
    async fn create_document(&self, record: &DocumentRecord) -> Result<(), StoreError>;

    async fn update_document_status(
        &self,
        document_id: &str,
        status: DocumentStatus,
        message: Option<&str>,
        chunk_count: usize,
    ) -> Result<(), StoreError>;

    async fn insert_chunks(&self, records: &[ChunkRecord]) -> Result<(), StoreError>;

    /// Chunks for one document ordered by `chunk_index`.
    async fn chunks_by_document(&self, document_id: &str) -> Result<Vec<ChunkRecord>, StoreError>;

    async fn chunk_by_vector_id(&self, vector_id: &str) -> Result<ChunkRecord, StoreError>;

    async fn create_graph_node(&self, node: &GraphNode) -> Result<(), StoreError>;

    async fn create_graph_edge(&self, edge: &GraphEdge) -> Result<(), StoreError>;

    /// Deletes chunks, nodes, and edges belonging to a document as a
    /// unit. The document record itself survives.
    async fn delete_document_artifacts(&self, document_id: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub vector_id: String,
    pub score: f64,
    pub metadata: Value,
}

/// External vector index. The embedding dimension is a construction-time
/// contract; mismatches fail before any point is written.
#[async_trait]
pub trait VectorIndex {
    async fn upsert(&self, vector_id: &str, vector: &[f32], metadata: Value)
        -> Result<(), StoreError>;

    async fn upsert_batch(&self, points: &[(String, Vec<f32>, Value)]) -> Result<(), StoreError>;

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<Value>,
    ) -> Result<Vec<VectorMatch>, StoreError>;

    async fn delete_by_id(&self, vector_id: &str) -> Result<(), StoreError>;

    async fn delete_by_filter(&self, filter: Value) -> Result<(), StoreError>;
}

#[async_trait]
pub trait EmbeddingProvider {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError>;
}

/// Text-understanding collaborator used for entity extraction and for
/// inferring semantic edges when co-occurrence alone is too sparse.
#[async_trait]
pub trait LanguageModel {
    async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>, StoreError>;

    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, StoreError>;
}

/// OCR engine with an explicit lifecycle: initialize once per document,
/// recognize per page, shut down on every exit path.
#[async_trait]
pub trait OcrEngine {
    async fn initialize(&self) -> Result<(), StoreError>;

    async fn recognize(&self, image_bytes: &[u8]) -> Result<String, StoreError>;

    async fn shutdown(&self) -> Result<(), StoreError>;
}

/// Rasterizes PDF pages into images for OCR.
#[async_trait]
pub trait PageRenderer {
    async fn render_pages(&self, pdf_bytes: &[u8], dpi: u32) -> Result<Vec<Vec<u8>>, StoreError>;
}

/// Fire-and-forget progress relay. Emission failures are ignored by
/// callers; the persisted document status is the source of truth.
#[async_trait]
pub trait ProgressSink {
    async fn emit(&self, event: &ProgressEvent);
}
