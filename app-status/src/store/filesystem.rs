use super::{StatusHistoryStore, StoreError};
use crate::model::{Platform, StatusRecord};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Status history kept as an append-only file with one JSON record per line.
///
/// Every query reads and parses the whole file, so query cost grows with the
/// total history rather than with the history of the requested pair.
pub struct FilesystemStatusStore {
    path: PathBuf,
    // Serializes appends. Queries do not take it.
    file: Mutex<File>,
}

impl FilesystemStatusStore {
    /// Opens the history file, creating it and its parent directory if missing.
    ///
    /// A trailing line without a newline is the remains of an interrupted
    /// append and is truncated away before any new record is written.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let contents = fs::read(&path).await?;
        let complete = complete_len(&contents);
        if complete < contents.len() {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = contents.len() - complete,
                "Truncating incomplete record at the end of the status history"
            );
            file.set_len(complete as u64).await?;
        }

        tracing::info!(path = %path.display(), "Opened status history file");

        Ok(FilesystemStatusStore {
            path,
            file: Mutex::new(file),
        })
    }
}

/// Length of `contents` up to and including its last newline.
fn complete_len(contents: &[u8]) -> usize {
    contents
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |idx| idx + 1)
}

async fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await
}

#[async_trait]
impl StatusHistoryStore for FilesystemStatusStore {
    async fn append(&self, record: StatusRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        let len = file.metadata().await?.len();
        if let Err(e) = write_line(&mut file, &line).await {
            // Drop whatever part of the line made it to disk.
            if let Err(truncate_err) = file.set_len(len).await {
                tracing::error!(
                    path = %self.path.display(),
                    error = %truncate_err,
                    "Failed to roll back partial status record"
                );
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn query_history(
        &self,
        version: &str,
        platform: Platform,
    ) -> Result<Vec<StatusRecord>, StoreError> {
        let contents = fs::read(&self.path).await?;
        // An append still in flight shows up as a line without its newline.
        let contents = String::from_utf8_lossy(&contents[..complete_len(&contents)]);

        let mut history = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            let record: StatusRecord = serde_json::from_str(line)
                .map_err(|source| StoreError::Corrupt {
                    line: idx + 1,
                    source,
                })?;

            if record.version == version && record.platform == platform {
                history.push(record);
            }
        }

        Ok(history)
    }
}
