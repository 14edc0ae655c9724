//! Append-only JSONL journal with advisory file locking.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs as tokio_fs;
use tracing::{debug, warn};

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use crate::error::LedgerResult;

pub struct Journal<T> {
    path: PathBuf,
    _entry: PhantomData<fn() -> T>,
}

impl<T> Journal<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _entry: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Existing lines are never rewritten.
    pub async fn append(&self, entry: &T) -> LedgerResult<()> {
        tokio_fs::create_dir_all(super::parent_dir(&self.path)).await?;

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        options.mode(0o600);

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut file = options.open(&path)?;
            super::lock_exclusive(&file)?;
            file.seek(SeekFrom::End(0))?;
            file.write_all(line.as_bytes())?;
            file.flush()?;
            fs2::FileExt::unlock(&file)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)??;

        debug!("Appended entry to {}", self.path.display());
        Ok(())
    }

    /// Read every record. A missing file is an empty journal; lines that fail
    /// to parse (for example a torn final line after a crash) are skipped.
    pub async fn load(&self) -> LedgerResult<Vec<T>> {
        if !tokio_fs::try_exists(&self.path).await? {
            return Ok(Vec::new());
        }

        let content = tokio_fs::read_to_string(&self.path).await?;
        let mut entries = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    "Skipping malformed line {} in {}: {}",
                    lineno + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(entries)
    }

    /// Like [`Journal::load`], but an unreadable file yields an empty list.
    pub async fn load_or_empty(&self) -> Vec<T> {
        match self.load().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not read journal {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }
}
