pub mod chunking;
pub mod cleaning;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod formats;
pub mod graph;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod stores;
pub mod traits;

pub use chunking::{create_chunks, ChunkingConfig, MAX_CHUNKS, MIN_CHUNK_CHARS};
pub use cleaning::{clean, detect_ocr_issues, CleanOptions};
pub use embeddings::{CharacterNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, Result, StoreError};
pub use extractor::{DirectTextExtractor, DocumentExtractor, LopdfExtractor, PageText};
pub use formats::{flatten_json, strip_markdown, MarkdownOutline};
pub use graph::{GraphBuilder, GraphConfig, GraphOutcome, GraphSummary};
pub use ingest::{
    digest_file, discover_document_files, load_document, load_folder_best_effort, DiscoveryReport,
    SkippedFile,
};
pub use models::{
    Chunk, ChunkRecord, DocumentRecord, DocumentStatus, Entity, EntityKind, ExtractedEntity,
    Extraction, ExtractionMetadata, GraphEdge, GraphNode, ProgressEvent, Quality, RawDocument,
};
pub use pipeline::{DocumentProcessor, PipelineConfig, PipelineReport};
pub use stores::{
    HttpOcrEngine, HttpPageRenderer, InMemoryDocumentStore, InMemoryObjectStore,
    InMemoryVectorIndex, OcrEndpointConfig, OllamaClient, QdrantIndex, RecordingProgressSink,
};
pub use traits::{
    DocumentStore, EmbeddingProvider, LanguageModel, ObjectStore, OcrEngine, PageRenderer,
    ProgressSink, VectorIndex, VectorMatch,
};
