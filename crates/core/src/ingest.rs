use crate::error::IngestError;
use crate::models::RawDocument;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const SUPPORTED_EXTENSIONS: [&str; 5] = ["pdf", "txt", "md", "markdown", "json"];

/// Recursively collects ingestable files under a folder, sorted for
/// reproducible runs.
pub fn discover_document_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let supported = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|candidate| ext.eq_ignore_ascii_case(candidate))
            });

        if supported {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Reads one file into the in-memory form the pipeline consumes.
pub fn load_document(path: &Path) -> Result<RawDocument, IngestError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })?;

    let bytes = fs::read(path)?;
    if bytes.is_empty() {
        return Err(IngestError::EmptyBuffer(path.display().to_string()));
    }

    Ok(RawDocument::new(name, bytes))
}

pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

pub struct DiscoveryReport {
    pub documents: Vec<RawDocument>,
    pub skipped_files: Vec<SkippedFile>,
}

/// Loads every supported file under `folder`, recording unreadable ones
/// instead of aborting the batch. Errors only when nothing ingestable
/// exists at all.
pub fn load_folder_best_effort(folder: &Path) -> Result<DiscoveryReport, IngestError> {
    let files = discover_document_files(folder);

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no ingestable files found in {}",
            folder.display()
        )));
    }

    let mut documents = Vec::new();
    let mut skipped_files = Vec::new();

    for path in files {
        match load_document(&path) {
            Ok(document) => documents.push(document),
            Err(error) => skipped_files.push(SkippedFile {
                path,
                reason: error.to_string(),
            }),
        }
    }

    Ok(DiscoveryReport {
        documents,
        skipped_files,
    })
}
