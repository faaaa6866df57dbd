use crate::cleaning::{clean, CleanOptions};
use crate::error::{IngestError, StoreError};
use crate::formats::{flatten_json, strip_markdown};
use crate::models::{Extraction, ExtractionMetadata, Quality, RawDocument};
use crate::traits::{OcrEngine, PageRenderer};
use lopdf::Document;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Direct extraction is accepted when it yields more than this many chars.
const DIRECT_MIN_CHARS: usize = 200;

/// OCR output is accepted above this aggregate length.
const OCR_MIN_CHARS: usize = 100;

/// Byte-scrape output is accepted above this length.
const SCRAPE_MIN_CHARS: usize = 100;

/// Only the head of the buffer is scanned during byte scraping.
const SCRAPE_WINDOW_BYTES: usize = 200 * 1024;

/// Byte-scrape output is capped at this many characters.
const SCRAPE_MAX_CHARS: usize = 10_000;

/// Pages recognized below this length are flagged low quality.
const LOW_QUALITY_PAGE_CHARS: usize = 50;

/// Successful extractions below this length are downgraded with a warning.
const MIN_TEXT_CHARS: usize = 10;

pub const OCR_DPI: u32 = 150;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Structural (non-OCR) PDF text extraction. Seam for tests and for
/// swapping the parsing library.
pub trait DirectTextExtractor: Send + Sync {
    fn extract(&self, pdf_bytes: &[u8]) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl DirectTextExtractor for LopdfExtractor {
    fn extract(&self, pdf_bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
        let document = Document::load_mem(pdf_bytes)
            .map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        Ok(pages)
    }
}

/// Extracts document text by extension, escalating PDF inputs through a
/// fixed strategy chain: direct parsing, OCR, raw byte scraping, and a
/// human-readable guidance fallback. Every strategy's output passes
/// through the cleaner before it is returned.
pub struct DocumentExtractor<R, O>
where
    R: PageRenderer,
    O: OcrEngine,
{
    direct: Box<dyn DirectTextExtractor>,
    renderer: Option<R>,
    ocr: Option<O>,
    clean_options: CleanOptions,
}

impl<R, O> DocumentExtractor<R, O>
where
    R: PageRenderer + Send + Sync,
    O: OcrEngine + Send + Sync,
{
    pub fn new(renderer: Option<R>, ocr: Option<O>, clean_options: CleanOptions) -> Self {
        Self {
            direct: Box::new(LopdfExtractor),
            renderer,
            ocr,
            clean_options,
        }
    }

    pub fn with_direct_extractor(mut self, direct: Box<dyn DirectTextExtractor>) -> Self {
        self.direct = direct;
        self
    }

    pub async fn extract(&self, document: &RawDocument) -> Result<Extraction, IngestError> {
        if document.bytes.is_empty() {
            return Err(IngestError::EmptyBuffer(document.file_name.clone()));
        }
        if document.file_name.trim().is_empty() {
            return Err(IngestError::MissingFileName(
                "uploaded document has no file name".to_string(),
            ));
        }

        match document.extension().as_deref() {
            Some("pdf") => self.extract_pdf(document).await,
            Some("json") => self.extract_json(document),
            Some("md") | Some("markdown") => self.extract_markdown(document),
            _ => self.extract_plain(document),
        }
    }

    async fn extract_pdf(&self, document: &RawDocument) -> Result<Extraction, IngestError> {
        let mut last_error: Option<String> = None;

        match self.try_direct(&document.bytes) {
            Ok(Some(extraction)) => return Ok(extraction),
            Ok(None) => debug!(file = %document.file_name, "direct extraction insufficient"),
            Err(error) => {
                warn!(file = %document.file_name, %error, "direct extraction failed");
                last_error = Some(error.to_string());
            }
        }

        match self.try_ocr(&document.bytes).await {
            Ok(Some(extraction)) => return Ok(extraction),
            Ok(None) => debug!(file = %document.file_name, "ocr extraction insufficient"),
            Err(error) => {
                warn!(file = %document.file_name, %error, "ocr extraction failed");
                last_error = Some(error.to_string());
            }
        }

        match self.try_scrape(&document.bytes) {
            Ok(Some(extraction)) => return Ok(extraction),
            Ok(None) => debug!(file = %document.file_name, "byte scrape insufficient"),
            Err(error) => {
                warn!(file = %document.file_name, %error, "byte scrape failed");
                last_error = Some(error.to_string());
            }
        }

        Ok(self.guidance_fallback(last_error))
    }

    /// Stage 1: structural text. Primary page-wise parsing, then a raw
    /// content-stream scan as a second attempt within the same stage.
    fn try_direct(&self, pdf_bytes: &[u8]) -> Result<Option<Extraction>, IngestError> {
        let mut primary_error = None;

        let (text, page_count) = match self.direct.extract(pdf_bytes) {
            Ok(pages) => {
                let count = pages.len();
                let text = pages
                    .into_iter()
                    .map(|page| page.text)
                    .collect::<Vec<_>>()
                    .join("\n\n");
                (text, count)
            }
            Err(error) => {
                debug!(%error, "primary pdf parser failed, trying content-stream scan");
                primary_error = Some(error);
                (String::new(), 0)
            }
        };

        if text.chars().count() > DIRECT_MIN_CHARS {
            let metadata = ExtractionMetadata::new("pdf_text", page_count, Quality::TextPdf);
            return Ok(Some(self.finalize(&text, metadata, None)));
        }

        let scanned = match scan_content_streams(pdf_bytes) {
            Ok(scanned) => scanned,
            Err(error) => return Err(primary_error.unwrap_or(error)),
        };
        if scanned.text.chars().count() > DIRECT_MIN_CHARS {
            let metadata =
                ExtractionMetadata::new("pdf_content_stream", scanned.page_count, Quality::TextPdf);
            return Ok(Some(self.finalize(&scanned.text, metadata, None)));
        }

        match primary_error {
            Some(error) => Err(error),
            None => Ok(None),
        }
    }

    /// Stage 2: rasterize pages and recognize each one. The engine is
    /// shut down on every exit path, including recognition errors.
    async fn try_ocr(&self, pdf_bytes: &[u8]) -> Result<Option<Extraction>, IngestError> {
        let (renderer, ocr) = match (&self.renderer, &self.ocr) {
            (Some(renderer), Some(ocr)) => (renderer, ocr),
            _ => return Ok(None),
        };

        let page_images = renderer
            .render_pages(pdf_bytes, OCR_DPI)
            .await
            .map_err(|error| IngestError::OcrFailed(error.to_string()))?;

        if page_images.is_empty() {
            return Ok(None);
        }

        ocr.initialize()
            .await
            .map_err(|error| IngestError::OcrFailed(error.to_string()))?;

        let recognized = self.recognize_pages(ocr, &page_images).await;

        // Release engine resources regardless of how recognition went.
        if let Err(error) = ocr.shutdown().await {
            warn!(%error, "ocr engine shutdown failed");
        }

        let (text, low_quality_pages) =
            recognized.map_err(|error| IngestError::OcrFailed(error.to_string()))?;

        if text.chars().count() <= OCR_MIN_CHARS {
            return Ok(None);
        }

        // OCR output always goes through the repair sub-pipeline.
        let repaired = clean(
            &text,
            &CleanOptions {
                fix_ocr: true,
                ..self.clean_options
            },
        );

        let mut metadata =
            ExtractionMetadata::new("pdf_ocr", page_images.len(), Quality::OcrProcessed);
        metadata.extra.insert(
            "low_quality_pages".to_string(),
            serde_json::Value::from(low_quality_pages),
        );
        metadata.char_count = repaired.chars().count();

        let warning = (low_quality_pages > 0)
            .then(|| format!("{low_quality_pages} page(s) yielded little recognizable text"));

        Ok(Some(match warning {
            Some(warning) => Extraction::Degraded {
                text: repaired,
                metadata,
                warning,
            },
            None => Extraction::Success {
                text: repaired,
                metadata,
            },
        }))
    }

    async fn recognize_pages(
        &self,
        ocr: &O,
        page_images: &[Vec<u8>],
    ) -> Result<(String, usize), StoreError> {
        let mut parts = Vec::new();
        let mut low_quality_pages = 0usize;

        for (page_index, image) in page_images.iter().enumerate() {
            let page_text = ocr.recognize(image).await?;
            let trimmed = page_text.trim();

            if trimmed.chars().count() < LOW_QUALITY_PAGE_CHARS {
                low_quality_pages += 1;
                parts.push(format!("[page {}: low quality]", page_index + 1));
            }
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        }

        Ok((parts.join("\n\n"), low_quality_pages))
    }

    /// Stage 3: scrape readable fragments out of the raw bytes.
    fn try_scrape(&self, pdf_bytes: &[u8]) -> Result<Option<Extraction>, IngestError> {
        let window = &pdf_bytes[..pdf_bytes.len().min(SCRAPE_WINDOW_BYTES)];
        let haystack = String::from_utf8_lossy(window);

        let patterns = match scrape_patterns() {
            Some(patterns) => patterns,
            None => return Ok(None),
        };

        let mut seen = HashSet::new();
        let mut fragments = Vec::new();
        let mut total_chars = 0usize;

        'outer: for pattern in patterns {
            for found in pattern.find_iter(&haystack) {
                let fragment = found.as_str().trim();
                if fragment.len() < 4 || !seen.insert(fragment.to_string()) {
                    continue;
                }
                total_chars += fragment.chars().count();
                fragments.push(fragment.to_string());
                if total_chars >= SCRAPE_MAX_CHARS {
                    break 'outer;
                }
            }
        }

        let mut text = fragments.join("\n");
        if text.chars().count() > SCRAPE_MAX_CHARS {
            text = text.chars().take(SCRAPE_MAX_CHARS).collect();
        }

        if text.chars().count() <= SCRAPE_MIN_CHARS {
            return Ok(None);
        }

        let mut metadata = ExtractionMetadata::new("byte_scrape", 0, Quality::Partial);
        metadata.extra.insert(
            "scanned_bytes".to_string(),
            serde_json::Value::from(window.len()),
        );

        Ok(Some(self.finalize(
            &text,
            metadata,
            Some("text recovered by raw byte scraping; structure and ordering may be lost".to_string()),
        )))
    }

    /// Stage 4: nothing worked. Return guidance instead of failing so the
    /// document still reaches a terminal state with an explanation.
    fn guidance_fallback(&self, last_error: Option<String>) -> Extraction {
        let text = "This document could not be converted to text. It is likely a scanned \
                    image, password protected, or corrupted. Try re-exporting it from its \
                    source application, printing it to a fresh PDF, or running it through a \
                    dedicated OCR tool before uploading again."
            .to_string();

        let mut metadata = ExtractionMetadata::new("guidance", 0, Quality::NeedsConversion);
        metadata.char_count = text.chars().count();
        if let Some(error) = &last_error {
            metadata
                .extra
                .insert("error".to_string(), serde_json::Value::from(error.clone()));
        }

        Extraction::Degraded {
            text,
            metadata,
            warning: "document needs conversion before its content can be ingested".to_string(),
        }
    }

    fn extract_plain(&self, document: &RawDocument) -> Result<Extraction, IngestError> {
        let (text, invalid_utf8) = match std::str::from_utf8(&document.bytes) {
            Ok(text) => (text.to_string(), false),
            Err(_) => (String::from_utf8_lossy(&document.bytes).to_string(), true),
        };

        let metadata = ExtractionMetadata::new("plain_text", 1, Quality::PlainText);
        let warning = invalid_utf8.then(|| "invalid utf-8 sequences were replaced".to_string());
        Ok(self.finalize(&text, metadata, warning))
    }

    fn extract_markdown(&self, document: &RawDocument) -> Result<Extraction, IngestError> {
        let source = String::from_utf8_lossy(&document.bytes);
        let (stripped, outline) = strip_markdown(&source);

        let mut metadata = ExtractionMetadata::new("markdown", 1, Quality::Markdown);
        metadata.extra.insert(
            "outline".to_string(),
            serde_json::to_value(&outline).unwrap_or(serde_json::Value::Null),
        );

        Ok(self.finalize(&stripped, metadata, None))
    }

    fn extract_json(&self, document: &RawDocument) -> Result<Extraction, IngestError> {
        match serde_json::from_slice::<serde_json::Value>(&document.bytes) {
            Ok(value) => {
                let flattened = flatten_json(&value);
                let metadata = ExtractionMetadata::new("json", 1, Quality::Json);
                Ok(self.finalize(&flattened, metadata, None))
            }
            Err(error) => {
                debug!(%error, "json parse failed, treating buffer as plain text");
                let text = String::from_utf8_lossy(&document.bytes).to_string();
                let metadata = ExtractionMetadata::new("json_as_text", 1, Quality::PlainText);
                Ok(self.finalize(
                    &text,
                    metadata,
                    Some(format!("invalid json, ingested as plain text: {error}")),
                ))
            }
        }
    }

    fn finalize(
        &self,
        text: &str,
        mut metadata: ExtractionMetadata,
        warning: Option<String>,
    ) -> Extraction {
        let cleaned = clean(text, &self.clean_options);
        metadata.char_count = cleaned.chars().count();

        let warning = warning.or_else(|| {
            (cleaned.chars().count() < MIN_TEXT_CHARS)
                .then(|| "extracted text is shorter than expected".to_string())
        });

        match warning {
            Some(warning) => Extraction::Degraded {
                text: cleaned,
                metadata,
                warning,
            },
            None => Extraction::Success {
                text: cleaned,
                metadata,
            },
        }
    }
}

struct ScannedStreams {
    text: String,
    page_count: usize,
}

/// Second attempt within the direct stage: walk page content streams and
/// pull the literal strings out of Tj/TJ show-text operators.
fn scan_content_streams(pdf_bytes: &[u8]) -> Result<ScannedStreams, IngestError> {
    let document =
        Document::load_mem(pdf_bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

    let literal = match literal_string_pattern() {
        Some(pattern) => pattern,
        None => {
            return Ok(ScannedStreams {
                text: String::new(),
                page_count: 0,
            })
        }
    };

    let pages = document.get_pages();
    let page_count = pages.len();
    let mut pieces = Vec::new();

    for (_page_no, page_id) in pages {
        let content = match document.get_page_content(page_id) {
            Ok(content) => content,
            Err(error) => {
                debug!(%error, "unreadable page content stream");
                continue;
            }
        };

        let stream = String::from_utf8_lossy(&content);
        for captures in literal.captures_iter(&stream) {
            let fragment = captures[1].replace("\\(", "(").replace("\\)", ")");
            if !fragment.trim().is_empty() {
                pieces.push(fragment);
            }
        }
    }

    Ok(ScannedStreams {
        text: pieces.join(" "),
        page_count,
    })
}

fn literal_string_pattern() -> Option<&'static Regex> {
    static CELL: OnceLock<Option<Regex>> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"\(((?:[^()\\]|\\.)+)\)\s*(?:Tj|TJ|')").ok())
        .as_ref()
}

fn scrape_patterns() -> Option<&'static Vec<Regex>> {
    static CELL: OnceLock<Option<Vec<Regex>>> = OnceLock::new();
    CELL.get_or_init(|| {
        let sources = [
            // Full sentences.
            r#"[A-Z][A-Za-z0-9 ,;:'"\-]{20,200}[.!?]"#,
            // Labeled fields such as "Name: value".
            r"[A-Z][a-z]{2,15}:\s*[A-Za-z0-9 .,\-]{3,80}",
            // Numbered list items.
            r"\d{1,2}[.)]\s+[A-Za-z][^\n\x00]{5,100}",
            // Generic multi-word readable runs.
            r"[A-Za-z]{3,}(?: [A-Za-z]{2,}){3,}",
        ];

        sources
            .iter()
            .map(|source| Regex::new(source))
            .collect::<Result<Vec<_>, _>>()
            .ok()
    })
    .as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedDirectExtractor {
        text: String,
    }

    impl DirectTextExtractor for FixedDirectExtractor {
        fn extract(&self, _pdf_bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
            Ok(vec![PageText {
                number: 1,
                text: self.text.clone(),
            }])
        }
    }

    struct FailingDirectExtractor;

    impl DirectTextExtractor for FailingDirectExtractor {
        fn extract(&self, _pdf_bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
            Err(IngestError::PdfParse("synthetic parse failure".to_string()))
        }
    }

    #[derive(Clone, Default)]
    struct CountingOcr {
        recognize_calls: Arc<AtomicUsize>,
        init_calls: Arc<AtomicUsize>,
        shutdown_calls: Arc<AtomicUsize>,
        page_text: String,
        fail_recognition: bool,
    }

    #[async_trait]
    impl OcrEngine for CountingOcr {
        async fn initialize(&self) -> Result<(), StoreError> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn recognize(&self, _image_bytes: &[u8]) -> Result<String, StoreError> {
            self.recognize_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_recognition {
                return Err(StoreError::Request("synthetic ocr failure".to_string()));
            }
            Ok(self.page_text.clone())
        }

        async fn shutdown(&self) -> Result<(), StoreError> {
            self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Clone)]
    struct FixedRenderer {
        pages: usize,
    }

    #[async_trait]
    impl PageRenderer for FixedRenderer {
        async fn render_pages(
            &self,
            _pdf_bytes: &[u8],
            _dpi: u32,
        ) -> Result<Vec<Vec<u8>>, StoreError> {
            Ok(vec![vec![0u8; 16]; self.pages])
        }
    }

    fn long_page_text() -> String {
        "The annual maintenance review covers hydraulic systems, inspection \
         intervals, and the replacement schedule for worn components across \
         every facility in the northern region. Each section lists the parts \
         affected and the expected service life."
            .to_string()
    }

    fn pdf_document(name: &str) -> RawDocument {
        RawDocument::new(name, b"%PDF-1.4 synthetic test bytes".to_vec())
    }

    #[tokio::test]
    async fn empty_buffer_is_rejected() {
        let extractor: DocumentExtractor<FixedRenderer, CountingOcr> =
            DocumentExtractor::new(None, None, CleanOptions::default());
        let document = RawDocument::new("empty.pdf", Vec::new());
        assert!(matches!(
            extractor.extract(&document).await,
            Err(IngestError::EmptyBuffer(_))
        ));
    }

    #[tokio::test]
    async fn missing_file_name_is_rejected() {
        let extractor: DocumentExtractor<FixedRenderer, CountingOcr> =
            DocumentExtractor::new(None, None, CleanOptions::default());
        let document = RawDocument::new("  ", b"content".to_vec());
        assert!(matches!(
            extractor.extract(&document).await,
            Err(IngestError::MissingFileName(_))
        ));
    }

    #[tokio::test]
    async fn text_bearing_pdf_never_reaches_ocr() {
        let ocr = CountingOcr {
            page_text: "irrelevant".to_string(),
            ..Default::default()
        };
        let recognize_calls = ocr.recognize_calls.clone();

        let extractor = DocumentExtractor::new(
            Some(FixedRenderer { pages: 3 }),
            Some(ocr),
            CleanOptions::default(),
        )
        .with_direct_extractor(Box::new(FixedDirectExtractor {
            text: long_page_text(),
        }));

        let extraction = extractor.extract(&pdf_document("manual.pdf")).await.unwrap();

        assert_eq!(recognize_calls.load(Ordering::SeqCst), 0);
        assert_eq!(extraction.metadata().quality, Quality::TextPdf);
        assert!(extraction.text().contains("hydraulic"));
    }

    #[tokio::test]
    async fn ocr_runs_when_direct_extraction_fails() {
        let ocr = CountingOcr {
            page_text: long_page_text(),
            ..Default::default()
        };
        let recognize_calls = ocr.recognize_calls.clone();
        let shutdown_calls = ocr.shutdown_calls.clone();

        let extractor = DocumentExtractor::new(
            Some(FixedRenderer { pages: 2 }),
            Some(ocr),
            CleanOptions::default(),
        )
        .with_direct_extractor(Box::new(FailingDirectExtractor));

        let extraction = extractor.extract(&pdf_document("scan.pdf")).await.unwrap();

        assert_eq!(recognize_calls.load(Ordering::SeqCst), 2);
        assert_eq!(shutdown_calls.load(Ordering::SeqCst), 1);
        assert_eq!(extraction.metadata().quality, Quality::OcrProcessed);
    }

    #[tokio::test]
    async fn ocr_engine_shuts_down_after_recognition_error() {
        let ocr = CountingOcr {
            fail_recognition: true,
            ..Default::default()
        };
        let shutdown_calls = ocr.shutdown_calls.clone();

        let extractor = DocumentExtractor::new(
            Some(FixedRenderer { pages: 2 }),
            Some(ocr),
            CleanOptions::default(),
        )
        .with_direct_extractor(Box::new(FailingDirectExtractor));

        let extraction = extractor.extract(&pdf_document("broken.pdf")).await.unwrap();

        assert_eq!(shutdown_calls.load(Ordering::SeqCst), 1);
        // OCR failed and the buffer has no scrapeable text, so the chain
        // lands on the guidance fallback.
        assert_eq!(extraction.metadata().quality, Quality::NeedsConversion);
        assert!(extraction.warning().is_some());
    }

    #[tokio::test]
    async fn low_quality_pages_are_flagged_not_dropped() {
        let ocr = CountingOcr {
            page_text: "tiny".to_string(),
            ..Default::default()
        };

        let renderer = FixedRenderer { pages: 40 };
        let extractor = DocumentExtractor::new(Some(renderer), Some(ocr), CleanOptions::default())
            .with_direct_extractor(Box::new(FailingDirectExtractor));

        let extraction = extractor.extract(&pdf_document("faint.pdf")).await.unwrap();

        assert_eq!(extraction.metadata().quality, Quality::OcrProcessed);
        assert!(extraction.warning().is_some());
        assert_eq!(
            extraction.metadata().extra.get("low_quality_pages"),
            Some(&serde_json::Value::from(40))
        );
    }

    #[tokio::test]
    async fn byte_scrape_recovers_readable_fragments() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&[0u8, 1, 2, 3, 254, 255]);
        bytes.extend_from_slice(
            b"Name: Industrial Compressor Unit\n\
              The compressor must be inspected before every cold season begins.\n\
              1. Drain the condensate tank completely\n\
              2. Replace the intake filter element promptly\n",
        );
        bytes.extend_from_slice(&[7u8, 8, 9]);

        let extractor: DocumentExtractor<FixedRenderer, CountingOcr> =
            DocumentExtractor::new(None, None, CleanOptions::default())
                .with_direct_extractor(Box::new(FailingDirectExtractor));

        let document = RawDocument::new("binary.pdf", bytes);
        let extraction = extractor.extract(&document).await.unwrap();

        assert_eq!(extraction.metadata().quality, Quality::Partial);
        assert!(extraction.text().contains("compressor must be inspected"));
        assert!(extraction.warning().is_some());
    }

    #[tokio::test]
    async fn guidance_fallback_reports_underlying_error() {
        let extractor: DocumentExtractor<FixedRenderer, CountingOcr> =
            DocumentExtractor::new(None, None, CleanOptions::default())
                .with_direct_extractor(Box::new(FailingDirectExtractor));

        let extraction = extractor.extract(&pdf_document("opaque.pdf")).await.unwrap();

        assert_eq!(extraction.metadata().quality, Quality::NeedsConversion);
        assert!(extraction.text().contains("could not be converted"));
        assert!(extraction
            .metadata()
            .extra
            .get("error")
            .and_then(|value| value.as_str())
            .is_some_and(|message| message.contains("synthetic parse failure")));
    }

    #[tokio::test]
    async fn plain_text_passes_through_cleaner() {
        let extractor: DocumentExtractor<FixedRenderer, CountingOcr> =
            DocumentExtractor::new(None, None, CleanOptions::default());

        let document = RawDocument::new(
            "notes.txt",
            b"Line one with    extra   spacing\r\n\r\n\r\nLine two".to_vec(),
        );
        let extraction = extractor.extract(&document).await.unwrap();

        assert_eq!(extraction.metadata().quality, Quality::PlainText);
        assert_eq!(extraction.text(), "Line one with extra spacing\n\nLine two");
    }

    #[tokio::test]
    async fn json_is_flattened_into_sentences() {
        let extractor: DocumentExtractor<FixedRenderer, CountingOcr> =
            DocumentExtractor::new(None, None, CleanOptions::default());

        let document = RawDocument::new(
            "report.json",
            br#"{"title": "Safety audit", "findings": ["hose wear", "valve drift"]}"#.to_vec(),
        );
        let extraction = extractor.extract(&document).await.unwrap();

        assert_eq!(extraction.metadata().quality, Quality::Json);
        assert!(extraction.text().contains("title: Safety audit"));
        assert!(extraction.text().contains("hose wear. valve drift"));
    }

    #[tokio::test]
    async fn invalid_json_degrades_to_plain_text() {
        let extractor: DocumentExtractor<FixedRenderer, CountingOcr> =
            DocumentExtractor::new(None, None, CleanOptions::default());

        let document = RawDocument::new(
            "broken.json",
            b"{not json but still perfectly readable content about pumps}".to_vec(),
        );
        let extraction = extractor.extract(&document).await.unwrap();

        assert_eq!(extraction.metadata().quality, Quality::PlainText);
        assert!(extraction.warning().is_some());
        assert!(extraction.text().contains("readable content"));
    }

    #[tokio::test]
    async fn markdown_outline_lands_in_metadata_only() {
        let extractor: DocumentExtractor<FixedRenderer, CountingOcr> =
            DocumentExtractor::new(None, None, CleanOptions::default());

        let document = RawDocument::new(
            "guide.md",
            b"# Setup\n\nInstall the agent using the [instructions](https://example.com).\n".to_vec(),
        );
        let extraction = extractor.extract(&document).await.unwrap();

        assert_eq!(extraction.metadata().quality, Quality::Markdown);
        assert!(extraction.text().contains("instructions"));
        assert!(!extraction.text().contains("example.com"));
        assert!(extraction.metadata().extra.contains_key("outline"));
    }

    #[tokio::test]
    async fn unknown_extension_falls_back_to_plain_text() {
        let extractor: DocumentExtractor<FixedRenderer, CountingOcr> =
            DocumentExtractor::new(None, None, CleanOptions::default());

        let document = RawDocument::new("notes.log", b"Log line describing a warning".to_vec());
        let extraction = extractor.extract(&document).await.unwrap();
        assert_eq!(extraction.metadata().quality, Quality::PlainText);
    }
}
