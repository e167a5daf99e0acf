//! Persistence of the filesystem and session identity.
//!
//! State is written as one JSON blob after every filesystem mutation and
//! restored at boot, volatile tier first.

mod state;
mod store;

use thiserror::Error;

use crate::vfs::SnapshotError;

pub(crate) use state::Persister;
pub use state::{SHELL_STATE_VERSION, STATE_STORAGE_KEY, ShellState};
pub use store::{BlobStore, FileStore, MemoryStore, TieredStore};

/// Failures reading, writing or applying stored state.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The backing store failed.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The blob is not valid JSON or could not be encoded.
    #[error("invalid state JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The blob carries an unsupported version.
    #[error("unsupported state version {0}")]
    Version(u64),
    /// The envelope is structurally wrong.
    #[error("rejected state: {0}")]
    Rejected(String),
    /// The filesystem snapshot failed validation.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
