//! Whole-file JSON documents
//!
//! A document is read fully at startup and replaced on every save. Saves go
//! through a temporary file in the same directory followed by a rename, so a
//! reader sees either the old document or the new one.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::LedgerResult;

pub struct JsonDocument<T> {
    path: PathBuf,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when the file does not exist yet.
    pub async fn load(&self) -> LedgerResult<Option<T>> {
        if !fs::try_exists(&self.path).await? {
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path).await?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// Load the document, substituting the default when it is missing or
    /// cannot be parsed.
    pub async fn load_or_default(&self) -> T {
        match self.load().await {
            Ok(Some(doc)) => doc,
            Ok(None) => T::default(),
            Err(e) => {
                warn!(
                    "Could not load {}, starting from defaults: {}",
                    self.path.display(),
                    e
                );
                T::default()
            }
        }
    }

    pub async fn save(&self, doc: &T) -> LedgerResult<()> {
        let json = serde_json::to_string_pretty(doc)?;
        let dir = super::parent_dir(&self.path);
        fs::create_dir_all(&dir).await?;

        let path = self.path.clone();
        let lock_path = lock_path_for(&path);
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let lock = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?;
            super::lock_exclusive(&lock)?;

            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(json.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;

            fs2::FileExt::unlock(&lock)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)??;

        debug!("Saved {}", self.path.display());
        Ok(())
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}
