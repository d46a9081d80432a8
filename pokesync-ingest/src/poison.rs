//! Poison Store
//!
//! Newline-delimited JSON file of documents the handler rejected. The
//! consumer loop appends; the reprocessor retries and rewrites. Both go
//! through one [`PoisonStore`] whose mutex guards every file access.

use crate::handler::DocumentHandler;
use pokesync_core::{parse_document, Document, PoisonError};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Counts from one reprocessing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReprocessReport {
    /// Non-blank lines read from the snapshot
    pub attempted: usize,
    /// Lines the handler applied; removed from the file
    pub succeeded: usize,
    /// Lines kept because they still fail or are not valid documents
    pub failed: usize,
    /// Lines appended while the pass was running
    pub appended: usize,
    /// Lines left in the file afterwards
    pub remaining: usize,
}

/// Append-only store of poisoned documents.
#[derive(Debug)]
pub struct PoisonStore {
    path: PathBuf,
    file_lock: Mutex<()>,
    pass_lock: Mutex<()>,
}

fn io_error(path: &Path, e: std::io::Error) -> PoisonError {
    PoisonError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

impl PoisonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file_lock: Mutex::new(()),
            pass_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name: OsString = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Append one document as a JSON line.
    pub async fn append(&self, document: &Document) -> Result<(), PoisonError> {
        let mut line = serde_json::to_string(document).map_err(|e| PoisonError::Encode {
            reason: e.to_string(),
        })?;
        line.push('\n');

        let _guard = self.file_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| io_error(&self.path, e))?;
        file.flush().await.map_err(|e| io_error(&self.path, e))?;
        Ok(())
    }

    /// Current non-blank lines.
    pub async fn lines(&self) -> Result<Vec<String>, PoisonError> {
        let _guard = self.file_lock.lock().await;
        let content = self.read_locked().await?;
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn read_locked(&self) -> Result<String, PoisonError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(io_error(&self.path, e)),
        }
    }

    /// Retry every stored document against `handler`.
    ///
    /// The file is snapshotted under the lock, retried without it, and then
    /// rewritten under the lock as the still-failing lines followed by any
    /// lines appended meanwhile. An empty result removes the file.
    pub async fn reprocess<H>(&self, handler: &H) -> Result<ReprocessReport, PoisonError>
    where
        H: DocumentHandler + ?Sized,
    {
        let _pass = self.pass_lock.lock().await;

        let snapshot = {
            let _guard = self.file_lock.lock().await;
            self.read_locked().await?
        };

        let mut report = ReprocessReport::default();
        let mut retained: Vec<&str> = Vec::new();

        for line in snapshot.lines() {
            if line.trim().is_empty() {
                continue;
            }
            report.attempted += 1;

            let document = match parse_document(line.as_bytes()) {
                Ok(document) => document,
                Err(e) => {
                    tracing::warn!(error = %e, "Poisoned line is not a document, keeping it");
                    report.failed += 1;
                    retained.push(line);
                    continue;
                }
            };

            match handler.handle(&document).await {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    tracing::debug!(error = %e, "Poisoned document still failing");
                    report.failed += 1;
                    retained.push(line);
                }
            }
        }

        let _guard = self.file_lock.lock().await;
        let current = self.read_locked().await?;
        let Some(tail) = current.strip_prefix(snapshot.as_str()) else {
            tracing::error!(
                path = %self.path.display(),
                "Poison file changed outside append during reprocessing, leaving it untouched"
            );
            report.remaining = current.lines().filter(|l| !l.trim().is_empty()).count();
            return Ok(report);
        };

        let appended: Vec<&str> = tail.lines().filter(|l| !l.trim().is_empty()).collect();
        report.appended = appended.len();

        let mut output = String::new();
        for line in retained.iter().chain(appended.iter()) {
            output.push_str(line);
            output.push('\n');
        }
        report.remaining = retained.len() + appended.len();

        if output.is_empty() {
            match fs::remove_file(&self.path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(io_error(&self.path, e)),
            }
            return Ok(report);
        }

        let temp = self.temp_path();
        fs::write(&temp, output.as_bytes())
            .await
            .map_err(|e| io_error(&temp, e))?;
        fs::rename(&temp, &self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;

        Ok(report)
    }
}
