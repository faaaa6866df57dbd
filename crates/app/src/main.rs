use async_trait::async_trait;
use chrono::Utc;
use clap::{Parser, Subcommand};
use doc_ingest_core::{
    load_document, load_folder_best_effort, CharacterNgramEmbedder, ChunkingConfig, CleanOptions,
    DocumentExtractor, DocumentProcessor, EmbeddingProvider, ExtractedEntity, HttpOcrEngine,
    HttpPageRenderer, InMemoryDocumentStore, InMemoryObjectStore, InMemoryVectorIndex,
    LanguageModel, OcrEndpointConfig, OllamaClient, PipelineConfig, ProgressEvent, ProgressSink,
    QdrantIndex, RawDocument, StoreError, VectorIndex, VectorMatch,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "doc-ingest", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL; omit to keep vectors in memory for the run.
    #[arg(long)]
    qdrant_url: Option<String>,

    /// Qdrant collection
    #[arg(long, default_value = "doc_chunks")]
    qdrant_collection: String,

    /// Ollama base URL; omit to use the offline hashing embedder and
    /// skip entity extraction.
    #[arg(long)]
    ollama_url: Option<String>,

    /// Ollama completion model
    #[arg(long, default_value = "llama3")]
    ollama_model: String,

    /// Ollama embedding model
    #[arg(long, default_value = "nomic-embed-text")]
    ollama_embedding_model: String,

    /// Embedding width; must match the configured embedding model.
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,

    /// OCR service base URL; omit to disable the OCR fallback stage.
    #[arg(long)]
    ocr_url: Option<String>,

    /// OCR service bearer token
    #[arg(long, env = "OCR_API_KEY")]
    ocr_api_key: Option<String>,

    /// Chunk window size in characters
    #[arg(long, default_value = "500")]
    chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    #[arg(long, default_value = "50")]
    chunk_overlap: usize,

    /// Strip page numbers and page-n-of-m lines during cleaning.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    remove_page_numbers: bool,

    /// Strip URLs during cleaning.
    #[arg(long, default_value_t = false)]
    remove_urls: bool,

    /// Strip email addresses during cleaning.
    #[arg(long, default_value_t = false)]
    remove_emails: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a file or folder: extract, chunk, embed, index, and build
    /// the entity graph per document.
    Ingest {
        /// File or folder to ingest (folders are walked recursively).
        #[arg(long)]
        path: String,
    },
    /// Extract and clean a single document, printing text and metadata.
    Extract {
        /// File to extract.
        #[arg(long)]
        file: String,
    },
}

enum VectorBackend {
    Memory(InMemoryVectorIndex),
    Qdrant(QdrantIndex),
}

#[async_trait]
impl VectorIndex for VectorBackend {
    async fn upsert(
        &self,
        vector_id: &str,
        vector: &[f32],
        metadata: serde_json::Value,
    ) -> Result<(), StoreError> {
        match self {
            Self::Memory(index) => index.upsert(vector_id, vector, metadata).await,
            Self::Qdrant(index) => index.upsert(vector_id, vector, metadata).await,
        }
    }

    async fn upsert_batch(
        &self,
        points: &[(String, Vec<f32>, serde_json::Value)],
    ) -> Result<(), StoreError> {
        match self {
            Self::Memory(index) => index.upsert_batch(points).await,
            Self::Qdrant(index) => index.upsert_batch(points).await,
        }
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<serde_json::Value>,
    ) -> Result<Vec<VectorMatch>, StoreError> {
        match self {
            Self::Memory(index) => index.query(vector, top_k, filter).await,
            Self::Qdrant(index) => index.query(vector, top_k, filter).await,
        }
    }

    async fn delete_by_id(&self, vector_id: &str) -> Result<(), StoreError> {
        match self {
            Self::Memory(index) => index.delete_by_id(vector_id).await,
            Self::Qdrant(index) => index.delete_by_id(vector_id).await,
        }
    }

    async fn delete_by_filter(&self, filter: serde_json::Value) -> Result<(), StoreError> {
        match self {
            Self::Memory(index) => index.delete_by_filter(filter).await,
            Self::Qdrant(index) => index.delete_by_filter(filter).await,
        }
    }
}

enum EmbedderBackend {
    Ngram(CharacterNgramEmbedder),
    Ollama(OllamaClient),
}

#[async_trait]
impl EmbeddingProvider for EmbedderBackend {
    fn dimensions(&self) -> usize {
        match self {
            Self::Ngram(embedder) => embedder.dimensions(),
            Self::Ollama(client) => client.dimensions(),
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        match self {
            Self::Ngram(embedder) => embedder.embed(text).await,
            Self::Ollama(client) => client.embed(text).await,
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        match self {
            Self::Ngram(embedder) => embedder.embed_batch(texts).await,
            Self::Ollama(client) => client.embed_batch(texts).await,
        }
    }
}

/// Without a model endpoint the graph stage degrades to an empty graph
/// instead of failing ingestion.
enum ModelBackend {
    Disabled,
    Ollama(OllamaClient),
}

#[async_trait]
impl LanguageModel for ModelBackend {
    async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>, StoreError> {
        match self {
            Self::Disabled => Ok(Vec::new()),
            Self::Ollama(client) => client.extract_entities(text).await,
        }
    }

    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, StoreError> {
        match self {
            Self::Disabled => Ok("[]".to_string()),
            Self::Ollama(client) => client.complete(prompt, temperature).await,
        }
    }
}

/// Relays pipeline progress to the log.
struct LogProgressSink;

#[async_trait]
impl ProgressSink for LogProgressSink {
    async fn emit(&self, event: &ProgressEvent) {
        info!(
            document_id = %event.document_id,
            step = event.step,
            total = event.total_steps,
            percent = event.percent,
            "{}",
            event.message
        );
    }
}

fn clean_options(cli: &Cli) -> CleanOptions {
    CleanOptions {
        remove_page_numbers: cli.remove_page_numbers,
        remove_urls: cli.remove_urls,
        remove_emails: cli.remove_emails,
        ..CleanOptions::default()
    }
}

fn build_extractor(cli: &Cli) -> anyhow::Result<DocumentExtractor<HttpPageRenderer, HttpOcrEngine>> {
    let (renderer, ocr) = match &cli.ocr_url {
        Some(url) => {
            let config = OcrEndpointConfig::new(url.clone(), cli.ocr_api_key.clone())?;
            (
                Some(HttpPageRenderer::new(config.clone())),
                Some(HttpOcrEngine::new(config)),
            )
        }
        None => (None, None),
    };

    Ok(DocumentExtractor::new(renderer, ocr, clean_options(cli)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let app_version = env!("CARGO_PKG_VERSION");
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "doc-ingest boot"
    );

    match &cli.command {
        Command::Ingest { path } => ingest(&cli, path).await,
        Command::Extract { file } => extract(&cli, file).await,
    }
}

async fn ingest(cli: &Cli, path: &str) -> anyhow::Result<()> {
    let target = Path::new(path);

    let (documents, skipped) = if target.is_dir() {
        let report = load_folder_best_effort(target)?;
        (report.documents, report.skipped_files)
    } else {
        (vec![load_document(target)?], Vec::new())
    };

    for skip in &skipped {
        warn!(path = %skip.path.display(), reason = %skip.reason, "skipped file");
    }

    let embedder = match &cli.ollama_url {
        Some(url) => EmbedderBackend::Ollama(OllamaClient::new(
            url.clone(),
            cli.ollama_model.clone(),
            cli.ollama_embedding_model.clone(),
            cli.embedding_dimensions,
        )),
        None => EmbedderBackend::Ngram(CharacterNgramEmbedder {
            dimensions: cli.embedding_dimensions,
        }),
    };

    let vectors = match &cli.qdrant_url {
        Some(url) => {
            let index = QdrantIndex::new(url.clone(), cli.qdrant_collection.clone(), embedder.dimensions());
            index.ensure_collection().await?;
            VectorBackend::Qdrant(index)
        }
        None => VectorBackend::Memory(InMemoryVectorIndex::new(embedder.dimensions())),
    };

    let llm = match &cli.ollama_url {
        Some(url) => ModelBackend::Ollama(OllamaClient::new(
            url.clone(),
            cli.ollama_model.clone(),
            cli.ollama_embedding_model.clone(),
            cli.embedding_dimensions,
        )),
        None => ModelBackend::Disabled,
    };

    let config = PipelineConfig {
        chunking: ChunkingConfig {
            chunk_size: cli.chunk_size,
            overlap: cli.chunk_overlap,
        },
        ..PipelineConfig::default()
    };

    let processor = DocumentProcessor::new(
        build_extractor(cli)?,
        InMemoryObjectStore::default(),
        InMemoryDocumentStore::default(),
        vectors,
        embedder,
        llm,
        LogProgressSink,
        config,
    );

    let mut ingested = 0usize;
    let mut failed = 0usize;
    for document in documents {
        let file_name = document.file_name.clone();
        match processor.process(document).await {
            Ok(report) => {
                ingested += 1;
                println!(
                    "{}: {} chunks, quality={:?}, entities={}, edges={} ({} ai)",
                    report.file_name,
                    report.chunk_count,
                    report.quality,
                    report.graph.entity_count,
                    report.graph.edge_count,
                    report.graph.ai_edge_count,
                );
                if let Some(warning) = report.warning {
                    println!("  warning: {warning}");
                }
                if let Some(graph_error) = report.graph_error {
                    println!("  graph error: {graph_error}");
                }
            }
            Err(error) => {
                failed += 1;
                warn!(file = %file_name, %error, "ingestion failed");
            }
        }
    }

    println!(
        "{ingested} documents ingested, {failed} failed at {}",
        Utc::now().to_rfc3339()
    );
    Ok(())
}

async fn extract(cli: &Cli, file: &str) -> anyhow::Result<()> {
    let document: RawDocument = load_document(Path::new(file))?;
    let extractor = build_extractor(cli)?;

    let extraction = extractor.extract(&document).await?;

    let metadata = extraction.metadata();
    println!(
        "method={} pages={} chars={} quality={:?}",
        metadata.method, metadata.page_count, metadata.char_count, metadata.quality
    );
    if let Some(warning) = extraction.warning() {
        println!("warning: {warning}");
    }
    println!("{}", extraction.text());
    Ok(())
}
