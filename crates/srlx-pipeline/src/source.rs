//! Data sources feeding the pipeline
//!
//! A source yields batches of raw text items. Two sources are provided:
//! [`VecSource`] for in-memory batches and [`FileSource`] for a file or a
//! directory of files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use srlx_core::{Result, SrlxError};

/// Trait for sources of raw text batches
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    /// Stream of batches; each batch is a list of text items
    fn batches(&self) -> BoxStream<'static, Vec<String>>;
}

// ============================================================================
// In-memory source
// ============================================================================

/// Source over batches held in memory
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    batches: Vec<Vec<String>>,
}

impl VecSource {
    pub fn new(batches: Vec<Vec<String>>) -> Self {
        Self { batches }
    }

    /// Split a flat item list into batches of `batch_size`
    pub fn from_items<I, S>(items: I, batch_size: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items: Vec<String> = items.into_iter().map(Into::into).collect();
        let batches = items
            .chunks(batch_size.max(1))
            .map(<[String]>::to_vec)
            .collect();
        Self { batches }
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

#[async_trait]
impl DataSource for VecSource {
    fn batches(&self) -> BoxStream<'static, Vec<String>> {
        stream::iter(self.batches.clone()).boxed()
    }
}

// ============================================================================
// File source
// ============================================================================

/// Source reading a file or every file of a directory
///
/// `.jsonl` files yield one batch per line, each line a JSON array of
/// strings. Any other file yields one batch of its blank-line separated
/// paragraphs.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    files: Mutex<Vec<PathBuf>>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            files: Mutex::new(Vec::new()),
        }
    }

    /// Files resolved by `start`
    pub fn files(&self) -> Vec<PathBuf> {
        self.files.lock().clone()
    }
}

#[async_trait]
impl DataSource for FileSource {
    async fn start(&self) -> Result<()> {
        let metadata = tokio::fs::metadata(&self.path).await.map_err(|e| {
            SrlxError::SourceError(format!("Cannot open {}: {e}", self.path.display()))
        })?;

        let files = if metadata.is_dir() {
            list_files(&self.path).await?
        } else {
            vec![self.path.clone()]
        };

        info!(path = %self.path.display(), files = files.len(), "file source started");
        *self.files.lock() = files;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.files.lock().clear();
        Ok(())
    }

    fn batches(&self) -> BoxStream<'static, Vec<String>> {
        let files = self.files();

        stream::iter(files)
            .then(|path| async move {
                match tokio::fs::read_to_string(&path).await {
                    Ok(content) => file_batches(&path, &content),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to read source file");
                        Vec::new()
                    }
                }
            })
            .flat_map(stream::iter)
            .boxed()
    }
}

async fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| SrlxError::SourceError(format!("Cannot list {}: {e}", dir.display())))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SrlxError::SourceError(format!("Cannot list {}: {e}", dir.display())))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| SrlxError::SourceError(format!("Cannot stat {}: {e}", dir.display())))?;
        if file_type.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn file_batches(path: &Path, content: &str) -> Vec<Vec<String>> {
    let is_jsonl = path.extension().is_some_and(|ext| ext == "jsonl");
    if !is_jsonl {
        let batch = paragraphs(content);
        return if batch.is_empty() { Vec::new() } else { vec![batch] };
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str::<Vec<String>>(line) {
            Ok(batch) => Some(batch),
            Err(e) => {
                warn!(path = %path.display(), line = n + 1, error = %e, "skipping malformed batch");
                None
            }
        })
        .inspect(|batch| debug!(items = batch.len(), "read batch"))
        .collect()
}

/// Blank-line separated paragraphs, whitespace collapsed
fn paragraphs(content: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
        } else {
            current.extend(line.split_whitespace());
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }
    paragraphs
}
