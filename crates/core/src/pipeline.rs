use crate::chunking::{create_chunks, ChunkingConfig};
use crate::error::IngestError;
use crate::extractor::DocumentExtractor;
use crate::graph::{GraphBuilder, GraphConfig, GraphSummary};
use crate::models::{
    ChunkRecord, DocumentRecord, DocumentStatus, ProgressEvent, Quality, RawDocument,
};
use crate::traits::{
    DocumentStore, EmbeddingProvider, LanguageModel, ObjectStore, OcrEngine, PageRenderer,
    ProgressSink, VectorIndex,
};
use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const TOTAL_STEPS: usize = 6;
const MIN_TEXT_CHARS: usize = 10;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunking: ChunkingConfig,
    pub graph: GraphConfig,
    /// Chunks embedded per request to the embedding collaborator.
    pub embed_batch_size: usize,
    /// Pause between embedding batches, same discipline as the graph
    /// extraction batches.
    pub embed_batch_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            graph: GraphConfig::default(),
            embed_batch_size: 10,
            embed_batch_delay: Duration::from_millis(1_000),
        }
    }
}

/// What one pipeline run produced. The graph portion reports through
/// `graph_error` instead of failing the run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub document_id: String,
    pub file_name: String,
    pub chunk_count: usize,
    pub quality: Quality,
    pub warning: Option<String>,
    pub graph: GraphSummary,
    pub graph_error: Option<String>,
}

/// Runs the full ingestion sequence for one document: upload, record
/// creation, extraction, chunking, embedding, indexing, graph build,
/// terminal status. Re-running the same document appends new artifacts;
/// callers that want a clean slate delete the old ones first via
/// `DocumentStore::delete_document_artifacts`.
pub struct DocumentProcessor<R, O, B, D, V, E, L, P>
where
    R: PageRenderer + Send + Sync,
    O: OcrEngine + Send + Sync,
    B: ObjectStore + Send + Sync,
    D: DocumentStore + Send + Sync,
    V: VectorIndex + Send + Sync,
    E: EmbeddingProvider + Send + Sync,
    L: LanguageModel + Send + Sync,
    P: ProgressSink + Send + Sync,
{
    extractor: DocumentExtractor<R, O>,
    objects: B,
    store: D,
    vectors: V,
    embedder: E,
    llm: L,
    progress: P,
    config: PipelineConfig,
}

impl<R, O, B, D, V, E, L, P> DocumentProcessor<R, O, B, D, V, E, L, P>
where
    R: PageRenderer + Send + Sync,
    O: OcrEngine + Send + Sync,
    B: ObjectStore + Send + Sync,
    D: DocumentStore + Send + Sync,
    V: VectorIndex + Send + Sync,
    E: EmbeddingProvider + Send + Sync,
    L: LanguageModel + Send + Sync,
    P: ProgressSink + Send + Sync,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        extractor: DocumentExtractor<R, O>,
        objects: B,
        store: D,
        vectors: V,
        embedder: E,
        llm: L,
        progress: P,
        config: PipelineConfig,
    ) -> Self {
        Self {
            extractor,
            objects,
            store,
            vectors,
            embedder,
            llm,
            progress,
            config,
        }
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    pub async fn process(&self, document: RawDocument) -> Result<PipelineReport, IngestError> {
        // Reject bad input before anything is uploaded or recorded.
        if document.file_name.trim().is_empty() {
            return Err(IngestError::MissingFileName(document.file_name));
        }
        if document.bytes.is_empty() {
            return Err(IngestError::EmptyBuffer(document.file_name));
        }

        let document_id = Uuid::new_v4().to_string();
        let file_name = document.file_name.clone();

        match self.run(&document_id, document).await {
            Ok(report) => {
                info!(
                    document_id,
                    file_name,
                    chunks = report.chunk_count,
                    "document ingested"
                );
                Ok(report)
            }
            Err(error) => {
                let message = error.to_string();
                if let Err(store_error) = self
                    .store
                    .update_document_status(&document_id, DocumentStatus::Failed, Some(&message), 0)
                    .await
                {
                    warn!(document_id, %store_error, "failed to persist failure status");
                }
                self.emit(&document_id, TOTAL_STEPS, &format!("failed: {message}"))
                    .await;
                Err(error)
            }
        }
    }

    async fn run(
        &self,
        document_id: &str,
        document: RawDocument,
    ) -> Result<PipelineReport, IngestError> {
        let file_name = document.file_name.clone();
        let checksum = hex_digest(&document.bytes);

        let source_url = self
            .objects
            .put(&document.bytes, &format!("{document_id}/{file_name}"))
            .await
            .map_err(IngestError::Store)?;
        self.emit(document_id, 1, "uploaded raw document").await;

        let now = Utc::now();
        self.store
            .create_document(&DocumentRecord {
                document_id: document_id.to_string(),
                file_name: file_name.clone(),
                source_url,
                status: DocumentStatus::Processing,
                status_message: None,
                checksum,
                chunk_count: 0,
                created_at: now,
                updated_at: now,
            })
            .await
            .map_err(IngestError::Store)?;
        self.emit(document_id, 2, "created document record").await;

        let extraction = self.extractor.extract(&document).await?;
        let text_chars = extraction.text().chars().count();
        if text_chars < MIN_TEXT_CHARS {
            return Err(IngestError::TextTooShort {
                length: text_chars,
                minimum: MIN_TEXT_CHARS,
            });
        }
        self.emit(document_id, 3, "extracted text").await;

        let chunks = create_chunks(extraction.text(), &self.config.chunking)?;
        if chunks.is_empty() {
            return Err(IngestError::NoChunks(file_name));
        }
        self.emit(document_id, 4, "chunked text").await;

        let mut records = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.config.embed_batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
            let vectors = self
                .embedder
                .embed_batch(&texts)
                .await
                .map_err(IngestError::Store)?;

            let mut points = Vec::with_capacity(batch.len());
            for (chunk, vector) in batch.iter().zip(vectors) {
                let vector_id = Uuid::new_v4().to_string();
                points.push((
                    vector_id.clone(),
                    vector,
                    json!({
                        "document_id": document_id,
                        "chunk_index": chunk.index,
                        "file_name": file_name,
                    }),
                ));
                records.push(ChunkRecord {
                    chunk_id: Uuid::new_v4().to_string(),
                    document_id: document_id.to_string(),
                    chunk_index: chunk.index,
                    content: chunk.content.clone(),
                    start: chunk.start,
                    end: chunk.end,
                    vector_id,
                });
            }

            self.vectors
                .upsert_batch(&points)
                .await
                .map_err(IngestError::Store)?;

            if records.len() < chunks.len() {
                tokio::time::sleep(self.config.embed_batch_delay).await;
            }
        }

        self.store
            .insert_chunks(&records)
            .await
            .map_err(IngestError::Store)?;
        self.emit(document_id, 5, "embedded and indexed chunks").await;

        let builder = GraphBuilder::new(self.config.graph.clone());
        let outcome = builder
            .build(&self.llm, &self.store, &chunks, document_id)
            .await;

        self.store
            .update_document_status(document_id, DocumentStatus::Completed, None, records.len())
            .await
            .map_err(IngestError::Store)?;
        self.emit(document_id, 6, "completed").await;

        Ok(PipelineReport {
            document_id: document_id.to_string(),
            file_name,
            chunk_count: records.len(),
            quality: extraction.metadata().quality,
            warning: extraction.warning().map(str::to_string),
            graph: outcome.summary,
            graph_error: outcome.error,
        })
    }

    async fn emit(&self, document_id: &str, step: usize, message: &str) {
        let event = ProgressEvent {
            document_id: document_id.to_string(),
            step,
            total_steps: TOTAL_STEPS,
            percent: ((step * 100) / TOTAL_STEPS) as u8,
            message: message.to_string(),
        };
        self.progress.emit(&event).await;
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaning::CleanOptions;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::StoreError;
    use crate::models::ExtractedEntity;
    use crate::stores::memory::{
        InMemoryDocumentStore, InMemoryObjectStore, InMemoryVectorIndex, RecordingProgressSink,
    };
    use crate::stores::ocr::{HttpOcrEngine, HttpPageRenderer};
    use async_trait::async_trait;

    struct SilentModel;

    #[async_trait]
    impl LanguageModel for SilentModel {
        async fn extract_entities(&self, _text: &str) -> Result<Vec<ExtractedEntity>, StoreError> {
            Ok(Vec::new())
        }

        async fn complete(&self, _prompt: &str, _temperature: f32) -> Result<String, StoreError> {
            Ok("[]".to_string())
        }
    }

    fn processor() -> DocumentProcessor<
        HttpPageRenderer,
        HttpOcrEngine,
        InMemoryObjectStore,
        InMemoryDocumentStore,
        InMemoryVectorIndex,
        CharacterNgramEmbedder,
        SilentModel,
        RecordingProgressSink,
    > {
        let embedder = CharacterNgramEmbedder::default();
        let extractor =
            DocumentExtractor::<HttpPageRenderer, HttpOcrEngine>::new(
                None,
                None,
                CleanOptions::default(),
            );
        DocumentProcessor::new(
            extractor,
            InMemoryObjectStore::default(),
            InMemoryDocumentStore::default(),
            InMemoryVectorIndex::new(embedder.dimensions),
            embedder,
            SilentModel,
            RecordingProgressSink::default(),
            PipelineConfig {
                embed_batch_delay: Duration::from_millis(0),
                graph: GraphConfig {
                    batch_delay: Duration::from_millis(0),
                    ..GraphConfig::default()
                },
                ..PipelineConfig::default()
            },
        )
    }

    fn long_text() -> String {
        "The turbine manual covers inspection intervals, lubrication schedules, \
         and shutdown procedures for the plant floor. "
            .repeat(12)
    }

    #[tokio::test]
    async fn plain_text_round_trip() {
        let processor = processor();
        let document = RawDocument::new("manual.txt", long_text().into_bytes());

        let report = processor.process(document).await.unwrap();
        assert!(report.chunk_count > 1);
        assert_eq!(report.quality, Quality::PlainText);

        let record = processor.store.document(&report.document_id).unwrap();
        assert_eq!(record.status, DocumentStatus::Completed);
        assert_eq!(record.chunk_count, report.chunk_count);

        let chunks = processor
            .store
            .chunks_by_document(&report.document_id)
            .await
            .unwrap();
        assert_eq!(chunks.len(), report.chunk_count);

        // Every chunk resolves back from its vector id.
        let resolved = processor
            .store
            .chunk_by_vector_id(&chunks[0].vector_id)
            .await
            .unwrap();
        assert_eq!(resolved.chunk_index, 0);
        assert_eq!(processor.vectors.len(), report.chunk_count);
    }

    #[tokio::test]
    async fn progress_events_cover_every_step() {
        let processor = processor();
        let document = RawDocument::new("manual.txt", long_text().into_bytes());

        processor.process(document).await.unwrap();
        let events = processor.progress.events();
        let steps: Vec<usize> = events.iter().map(|event| event.step).collect();
        assert_eq!(steps, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(events.last().unwrap().percent, 100);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_any_writes() {
        let processor = processor();

        let error = processor
            .process(RawDocument::new("empty.pdf", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(error, IngestError::EmptyBuffer(_)));

        let error = processor
            .process(RawDocument::new("  ", b"content".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(error, IngestError::MissingFileName(_)));

        assert!(processor.objects.is_empty());
        assert_eq!(processor.store.document_count(), 0);
        assert!(processor.progress.events().is_empty());
    }

    #[tokio::test]
    async fn short_text_fails_and_persists_status() {
        let processor = processor();
        let document = RawDocument::new("stub.txt", b"hi".to_vec());

        let error = processor.process(document).await.unwrap_err();
        assert!(matches!(error, IngestError::TextTooShort { .. }));

        let events = processor.progress.events();
        let failed_id = &events[0].document_id;
        let record = processor.store.document(failed_id).unwrap();
        assert_eq!(record.status, DocumentStatus::Failed);
        assert!(record.status_message.is_some());
        assert!(events.last().unwrap().message.starts_with("failed:"));
    }

    #[test]
    fn checksum_is_stable_hex() {
        let first = hex_digest(b"same bytes");
        let second = hex_digest(b"same bytes");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert_ne!(first, hex_digest(b"other bytes"));
    }
}
