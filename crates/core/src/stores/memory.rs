use crate::error::StoreError;
use crate::models::{
    ChunkRecord, DocumentRecord, DocumentStatus, GraphEdge, GraphNode, ProgressEvent,
};
use crate::traits::{DocumentStore, ObjectStore, ProgressSink, VectorIndex, VectorMatch};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-process document/chunk/graph store. Backs the CLI's local mode and
/// the test suite; it mimics the append-only behavior of the managed
/// store (reprocessing without deleting artifacts duplicates records).
#[derive(Default)]
pub struct InMemoryDocumentStore {
    inner: Mutex<DocumentStoreInner>,
}

#[derive(Default)]
struct DocumentStoreInner {
    documents: HashMap<String, DocumentRecord>,
    chunks: Vec<ChunkRecord>,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

impl InMemoryDocumentStore {
    pub fn document(&self, document_id: &str) -> Option<DocumentRecord> {
        self.locked().documents.get(document_id).cloned()
    }

    pub fn document_count(&self) -> usize {
        self.locked().documents.len()
    }

    pub fn node_count(&self) -> usize {
        self.locked().nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.locked().edges.len()
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, DocumentStoreInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create_document(&self, record: &DocumentRecord) -> Result<(), StoreError> {
        self.locked()
            .documents
            .insert(record.document_id.clone(), record.clone());
        Ok(())
    }

    async fn update_document_status(
        &self,
        document_id: &str,
        status: DocumentStatus,
        message: Option<&str>,
        chunk_count: usize,
    ) -> Result<(), StoreError> {
        let mut inner = self.locked();
        let record = inner
            .documents
            .get_mut(document_id)
            .ok_or_else(|| StoreError::NotFound(format!("document {document_id}")))?;

        record.status = status;
        record.status_message = message.map(str::to_string);
        record.chunk_count = chunk_count;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_chunks(&self, records: &[ChunkRecord]) -> Result<(), StoreError> {
        self.locked().chunks.extend_from_slice(records);
        Ok(())
    }

    async fn chunks_by_document(&self, document_id: &str) -> Result<Vec<ChunkRecord>, StoreError> {
        let mut chunks: Vec<ChunkRecord> = self
            .locked()
            .chunks
            .iter()
            .filter(|chunk| chunk.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|chunk| chunk.chunk_index);
        Ok(chunks)
    }

    async fn chunk_by_vector_id(&self, vector_id: &str) -> Result<ChunkRecord, StoreError> {
        self.locked()
            .chunks
            .iter()
            .find(|chunk| chunk.vector_id == vector_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("chunk for vector {vector_id}")))
    }

    async fn create_graph_node(&self, node: &GraphNode) -> Result<(), StoreError> {
        self.locked().nodes.push(node.clone());
        Ok(())
    }

    async fn create_graph_edge(&self, edge: &GraphEdge) -> Result<(), StoreError> {
        self.locked().edges.push(edge.clone());
        Ok(())
    }

    async fn delete_document_artifacts(&self, document_id: &str) -> Result<(), StoreError> {
        let mut inner = self.locked();
        inner.chunks.retain(|chunk| chunk.document_id != document_id);
        inner.nodes.retain(|node| node.document_id != document_id);
        inner.edges.retain(|edge| edge.document_id != document_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryObjectStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn len(&self) -> usize {
        match self.blobs.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, bytes: &[u8], path: &str) -> Result<String, StoreError> {
        match self.blobs.lock() {
            Ok(mut guard) => {
                guard.insert(path.to_string(), bytes.to_vec());
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(path.to_string(), bytes.to_vec());
            }
        }
        Ok(format!("memory://{path}"))
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        match self.blobs.lock() {
            Ok(mut guard) => {
                guard.remove(path);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(path);
            }
        }
        Ok(())
    }
}

/// Brute-force cosine-similarity index with the same dimension contract
/// as the real backend: vectors of the wrong width are rejected.
pub struct InMemoryVectorIndex {
    dimensions: usize,
    points: Mutex<HashMap<String, (Vec<f32>, Value)>>,
}

impl InMemoryVectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            points: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.locked().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Vec<f32>, Value)>> {
        match self.points.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), StoreError> {
        if vector.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(
        &self,
        vector_id: &str,
        vector: &[f32],
        metadata: Value,
    ) -> Result<(), StoreError> {
        self.check_dimensions(vector)?;
        self.locked()
            .insert(vector_id.to_string(), (vector.to_vec(), metadata));
        Ok(())
    }

    async fn upsert_batch(&self, points: &[(String, Vec<f32>, Value)]) -> Result<(), StoreError> {
        for (vector_id, vector, metadata) in points {
            self.upsert(vector_id, vector, metadata.clone()).await?;
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<Value>,
    ) -> Result<Vec<VectorMatch>, StoreError> {
        self.check_dimensions(vector)?;

        let mut matches: Vec<VectorMatch> = self
            .locked()
            .iter()
            .filter(|(_, (_, metadata))| match &filter {
                Some(Value::Object(wanted)) => wanted.iter().all(|(key, value)| {
                    metadata.get(key).is_some_and(|candidate| candidate == value)
                }),
                _ => true,
            })
            .map(|(vector_id, (stored, metadata))| VectorMatch {
                vector_id: vector_id.clone(),
                score: cosine(vector, stored),
                metadata: metadata.clone(),
            })
            .collect();

        matches.sort_by(|left, right| right.score.total_cmp(&left.score));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete_by_id(&self, vector_id: &str) -> Result<(), StoreError> {
        self.locked().remove(vector_id);
        Ok(())
    }

    async fn delete_by_filter(&self, filter: Value) -> Result<(), StoreError> {
        if let Value::Object(wanted) = filter {
            self.locked().retain(|_, (_, metadata)| {
                !wanted.iter().all(|(key, value)| {
                    metadata.get(key).is_some_and(|candidate| candidate == value)
                })
            });
        }
        Ok(())
    }
}

fn cosine(left: &[f32], right: &[f32]) -> f64 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm: f32 = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm: f32 = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    (dot / (left_norm * right_norm)) as f64
}

/// Captures progress events for inspection instead of relaying them.
#[derive(Default)]
pub struct RecordingProgressSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgressSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl ProgressSink for RecordingProgressSink {
    async fn emit(&self, event: &ProgressEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn vector_index_enforces_dimensions() {
        let index = InMemoryVectorIndex::new(4);
        let result = index.upsert("v1", &[1.0, 2.0], Value::Null).await;
        assert!(matches!(result, Err(StoreError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn vector_query_ranks_by_similarity() {
        let index = InMemoryVectorIndex::new(2);
        index
            .upsert("aligned", &[1.0, 0.0], json!({"doc": "a"}))
            .await
            .unwrap();
        index
            .upsert("orthogonal", &[0.0, 1.0], json!({"doc": "b"}))
            .await
            .unwrap();

        let matches = index.query(&[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(matches[0].vector_id, "aligned");
        assert!(matches[0].score > matches[1].score);
    }

    #[tokio::test]
    async fn vector_filter_restricts_results() {
        let index = InMemoryVectorIndex::new(2);
        index
            .upsert("one", &[1.0, 0.0], json!({"document_id": "a"}))
            .await
            .unwrap();
        index
            .upsert("two", &[1.0, 0.0], json!({"document_id": "b"}))
            .await
            .unwrap();

        let matches = index
            .query(&[1.0, 0.0], 10, Some(json!({"document_id": "a"})))
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].vector_id, "one");

        index
            .delete_by_filter(json!({"document_id": "a"}))
            .await
            .unwrap();
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn artifacts_delete_as_a_unit() {
        use crate::models::EntityKind;
        use std::collections::BTreeSet;

        let store = InMemoryDocumentStore::default();
        store
            .insert_chunks(&[ChunkRecord {
                chunk_id: "c1".to_string(),
                document_id: "doc-1".to_string(),
                chunk_index: 0,
                content: "text".to_string(),
                start: 0,
                end: 4,
                vector_id: "v1".to_string(),
            }])
            .await
            .unwrap();
        store
            .create_graph_node(&GraphNode {
                node_id: "n1".to_string(),
                document_id: "doc-1".to_string(),
                name: "Alpha".to_string(),
                kind: EntityKind::Concept,
                relevance: 7.0,
                size: 24.0,
                color: "#8e6fc1".to_string(),
                source_chunks: BTreeSet::new(),
            })
            .await
            .unwrap();

        store.delete_document_artifacts("doc-1").await.unwrap();
        assert!(store.chunks_by_document("doc-1").await.unwrap().is_empty());
        assert_eq!(store.node_count(), 0);
    }
}
