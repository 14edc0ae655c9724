//! File-backed persistence primitives
//!
//! Two shapes cover every store in the ledger:
//! - [`Journal`]: append-only JSONL, one record per line.
//! - [`JsonDocument`]: one JSON document replaced atomically on save.
//!
//! Both take an exclusive advisory lock (`fs2`) for the duration of a write,
//! so separate processes pointed at the same data directory never interleave.

pub mod document;
pub mod journal;

pub use document::JsonDocument;
pub use journal::Journal;

use fs2::FileExt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAX_RETRIES: usize = 10;
const RETRY_SLEEP: Duration = Duration::from_millis(100);

/// Blocking. Call from `spawn_blocking`.
pub(crate) fn lock_exclusive(file: &File) -> io::Result<()> {
    for _ in 0..MAX_RETRIES {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(()),
            Err(_) => std::thread::sleep(RETRY_SLEEP),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::WouldBlock,
        "could not acquire exclusive lock on store file",
    ))
}

/// Directory a store file lives in; `.` for bare file names.
pub(crate) fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
