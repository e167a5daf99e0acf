//! The persisted shell state and the listener that keeps it current.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::PersistError;
use super::store::{BlobStore, TieredStore};
use crate::vfs::{MutationListener, VirtualFs};

/// Store key holding the serialized [`ShellState`].
pub const STATE_STORAGE_KEY: &str = "whelk:shell-state:v1";

/// Current state format version.
pub const SHELL_STATE_VERSION: u32 = 1;

/// `{version, activeUsername, fs}` as stored.
///
/// `fs` stays untyped JSON so the filesystem can validate it leniently on
/// import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellState {
    /// Always [`SHELL_STATE_VERSION`].
    pub version: u32,
    /// User owning the session when the state was written.
    pub active_username: String,
    /// Filesystem snapshot.
    pub fs: Value,
}

impl ShellState {
    /// Snapshot `fs` for `active_username`.
    pub fn capture(fs: &VirtualFs, active_username: &str) -> Result<Self, PersistError> {
        Ok(Self {
            version: SHELL_STATE_VERSION,
            active_username: active_username.to_string(),
            fs: serde_json::to_value(fs.export_state())?,
        })
    }

    /// Parse and check the envelope of a stored blob.
    pub fn parse(raw: &str) -> Result<Self, PersistError> {
        let value: Value = serde_json::from_str(raw)?;
        let object = value
            .as_object()
            .ok_or_else(|| PersistError::Rejected("state is not an object".to_string()))?;
        match object.get("version").and_then(Value::as_u64) {
            Some(v) if v == u64::from(SHELL_STATE_VERSION) => {}
            other => return Err(PersistError::Version(other.unwrap_or(0))),
        }
        let active_username = object
            .get("activeUsername")
            .and_then(Value::as_str)
            .ok_or_else(|| PersistError::Rejected("activeUsername is not a string".to_string()))?;
        let fs = object
            .get("fs")
            .filter(|fs| fs.is_object())
            .ok_or_else(|| PersistError::Rejected("fs snapshot missing".to_string()))?;
        Ok(Self {
            version: SHELL_STATE_VERSION,
            active_username: active_username.to_string(),
            fs: fs.clone(),
        })
    }

    /// Serialize for storage.
    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Writes the shell state to both tiers after every filesystem mutation.
///
/// Installed as the filesystem's [`MutationListener`]. Writes are skipped
/// while suspended (during boot and restore).
pub(crate) struct Persister {
    store: TieredStore,
    active_username: Mutex<String>,
    suspended: AtomicBool,
}

impl fmt::Debug for Persister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persister")
            .field("suspended", &self.suspended.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Persister {
    pub(crate) fn new(store: TieredStore, active_username: &str) -> Self {
        Self {
            store,
            active_username: Mutex::new(active_username.to_string()),
            suspended: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_active_username(&self, username: &str) {
        let mut active = self
            .active_username
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *active = username.to_string();
    }

    fn active_username(&self) -> String {
        self.active_username
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::SeqCst);
    }

    /// Write the current state. Failures are logged, never raised.
    pub(crate) fn persist(&self, fs: &VirtualFs) {
        if self.suspended.load(Ordering::SeqCst) {
            return;
        }
        let encoded =
            ShellState::capture(fs, &self.active_username()).and_then(|state| state.to_json());
        let result = encoded.and_then(|raw| self.store.set(STATE_STORAGE_KEY, &raw));
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist shell state");
        }
    }

    /// Drop stored state from both tiers.
    pub(crate) fn clear(&self) {
        if let Err(e) = self.store.remove(STATE_STORAGE_KEY) {
            tracing::warn!(error = %e, "failed to clear stored shell state");
        }
    }

    /// Load state into `fs`, volatile tier first. Returns the stored active
    /// username on success.
    ///
    /// A rejected blob is removed from its tier. A durable-tier hit is
    /// mirrored into the volatile tier.
    pub(crate) fn restore(&self, fs: &mut VirtualFs) -> Option<String> {
        if let Some((username, _)) = restore_from(self.store.volatile(), "volatile", fs) {
            return Some(username);
        }
        let (username, raw) = restore_from(self.store.durable(), "durable", fs)?;
        if let Err(e) = self.store.volatile().set(STATE_STORAGE_KEY, &raw) {
            tracing::warn!(error = %e, "failed to mirror restored state into the volatile tier");
        }
        Some(username)
    }
}

fn restore_from(tier: &dyn BlobStore, label: &str, fs: &mut VirtualFs) -> Option<(String, String)> {
    let raw = match tier.get(STATE_STORAGE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(tier = label, error = %e, "failed to read stored shell state");
            return None;
        }
    };
    let applied = ShellState::parse(&raw).and_then(|state| {
        fs.import_state(&state.fs)?;
        Ok(state.active_username)
    });
    match applied {
        Ok(username) => Some((username, raw)),
        Err(e) => {
            tracing::warn!(tier = label, error = %e, "discarding stored shell state");
            if let Err(e) = tier.remove(STATE_STORAGE_KEY) {
                tracing::warn!(tier = label, error = %e, "failed to discard stored shell state");
            }
            None
        }
    }
}

impl MutationListener for Persister {
    fn on_mutation(&self, fs: &VirtualFs) {
        self.persist(fs);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn populated() -> VirtualFs {
        let mut fs = VirtualFs::new();
        fs.mkdir("/home/guest").unwrap();
        fs.write_file("/home/guest/a.txt", "alpha", Default::default())
            .unwrap();
        fs.cd("/home/guest").unwrap();
        fs
    }

    #[test]
    fn test_state_envelope() {
        let state = ShellState::capture(&populated(), "guest").unwrap();
        let raw = state.to_json().unwrap();
        assert!(raw.contains("\"activeUsername\":\"guest\""));
        assert_eq!(ShellState::parse(&raw).unwrap(), state);
    }

    #[test]
    fn test_parse_rejections() {
        assert!(matches!(
            ShellState::parse("not json"),
            Err(PersistError::Json(_))
        ));
        assert!(matches!(
            ShellState::parse(r#"{"version":2,"activeUsername":"guest","fs":{}}"#),
            Err(PersistError::Version(2))
        ));
        assert!(matches!(
            ShellState::parse(r#"{"version":1,"activeUsername":7,"fs":{}}"#),
            Err(PersistError::Rejected(_))
        ));
        assert!(matches!(
            ShellState::parse(r#"{"version":1,"activeUsername":"guest"}"#),
            Err(PersistError::Rejected(_))
        ));
    }

    #[test]
    fn test_restore_mirrors_durable_tier() {
        let store = TieredStore::in_memory();
        let raw = ShellState::capture(&populated(), "operator")
            .unwrap()
            .to_json()
            .unwrap();
        store.durable().set(STATE_STORAGE_KEY, &raw).unwrap();

        let persister = Persister::new(store.clone(), "guest");
        let mut fs = VirtualFs::new();
        assert_eq!(persister.restore(&mut fs).as_deref(), Some("operator"));
        assert_eq!(fs.read_file("/home/guest/a.txt").unwrap(), "alpha");
        assert_eq!(fs.pwd(), "/home/guest");
        assert_eq!(
            store.volatile().get(STATE_STORAGE_KEY).unwrap().as_deref(),
            Some(raw.as_str())
        );
    }

    #[test]
    fn test_restore_discards_bad_volatile_blob() {
        let store = TieredStore::in_memory();
        store
            .volatile()
            .set(STATE_STORAGE_KEY, r#"{"version":1,"activeUsername":"guest","fs":{"version":9}}"#)
            .unwrap();
        let good = ShellState::capture(&populated(), "guest")
            .unwrap()
            .to_json()
            .unwrap();
        store.durable().set(STATE_STORAGE_KEY, &good).unwrap();

        let persister = Persister::new(store.clone(), "guest");
        let mut fs = VirtualFs::new();
        assert_eq!(persister.restore(&mut fs).as_deref(), Some("guest"));
        assert!(fs.exists("/home/guest/a.txt"));
        assert_eq!(
            store.volatile().get(STATE_STORAGE_KEY).unwrap().as_deref(),
            Some(good.as_str())
        );
    }

    #[test]
    fn test_suspended_persister_skips_writes() {
        let store = TieredStore::in_memory();
        let persister = Persister::new(store.clone(), "guest");
        let fs = populated();

        persister.set_suspended(true);
        persister.persist(&fs);
        assert_eq!(store.get(STATE_STORAGE_KEY).unwrap(), None);

        persister.set_suspended(false);
        persister.persist(&fs);
        assert!(store.durable().get(STATE_STORAGE_KEY).unwrap().is_some());

        persister.clear();
        assert_eq!(store.get(STATE_STORAGE_KEY).unwrap(), None);
    }
}
