use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("empty document buffer: {0}")]
    EmptyBuffer(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("extracted text too short ({length} chars, minimum {minimum})")]
    TextTooShort { length: usize, minimum: usize },

    #[error("document produced no chunks: {0}")]
    NoChunks(String),

    #[error("ocr failed: {0}")]
    OcrFailed(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Request(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("embedding dimension {actual} does not match configured {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
