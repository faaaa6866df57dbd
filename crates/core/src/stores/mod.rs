pub mod llm;
pub mod memory;
pub mod ocr;
pub mod qdrant;

pub use llm::OllamaClient;
pub use memory::{
    InMemoryDocumentStore, InMemoryObjectStore, InMemoryVectorIndex, RecordingProgressSink,
};
pub use ocr::{HttpOcrEngine, HttpPageRenderer, OcrEndpointConfig};
pub use qdrant::QdrantIndex;
