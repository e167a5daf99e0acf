//! Versioned export and validated import of filesystem state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::filesystem::{VirtualFs, walk};
use super::node::{
    Credentials, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, Directory, File, ROOT_GID, ROOT_UID, VNode,
};

/// Current snapshot format version.
pub const FS_STATE_VERSION: u32 = 1;

/// Serialized filesystem: `{version, root, cwd, currentUid, currentGid}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsSnapshot {
    /// Format version, always [`FS_STATE_VERSION`] on export.
    pub version: u32,
    /// The root directory (serialized with `"kind": "dir"`).
    pub root: VNode,
    /// Working directory segments.
    pub cwd: Vec<String>,
    /// Active uid.
    pub current_uid: u32,
    /// Active gid.
    pub current_gid: u32,
}

/// Reasons an imported snapshot is rejected. Rejection leaves the
/// filesystem untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// The blob is not a JSON object.
    #[error("snapshot is not an object")]
    NotAnObject,
    /// Version field missing or unsupported.
    #[error("unsupported snapshot version: {0}")]
    Version(String),
    /// The root is missing or not a directory.
    #[error("snapshot root is not a directory")]
    RootNotDirectory,
    /// A node is structurally malformed.
    #[error("malformed node at {0}")]
    MalformedNode(String),
    /// An entry name is empty, `.`, `..` or contains `/`.
    #[error("invalid entry name: {0:?}")]
    InvalidName(String),
    /// The cwd is malformed or does not name a directory in the new tree.
    #[error("invalid working directory")]
    InvalidCwd,
}

/// Whether `name` may appear as a directory entry.
pub fn is_valid_entry_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

impl VirtualFs {
    /// Deep-copy the tree, cwd and credentials.
    pub fn export_state(&self) -> FsSnapshot {
        FsSnapshot {
            version: FS_STATE_VERSION,
            root: self.root.clone(),
            cwd: self.cwd.clone(),
            current_uid: self.creds.uid,
            current_gid: self.creds.gid,
        }
    }

    /// Replace the whole state with a snapshot from untrusted JSON.
    ///
    /// Every node is re-validated: names must be valid, modes are masked to
    /// nine bits (falling back to defaults when absent), ids fall back to
    /// root when absent, negative or non-integral. The cwd must name a
    /// directory in the incoming tree. Any failure rejects the blob wholesale.
    pub fn import_state(&mut self, blob: &Value) -> Result<(), SnapshotError> {
        let object = blob.as_object().ok_or(SnapshotError::NotAnObject)?;
        match object.get("version").and_then(Value::as_u64) {
            Some(v) if v == u64::from(FS_STATE_VERSION) => {}
            _ => {
                let found = object
                    .get("version")
                    .map(Value::to_string)
                    .unwrap_or_else(|| "missing".to_string());
                return Err(SnapshotError::Version(found));
            }
        }

        let root = match object.get("root") {
            Some(raw) => parse_node(raw, "/")?,
            None => return Err(SnapshotError::RootNotDirectory),
        };
        if !root.is_dir() {
            return Err(SnapshotError::RootNotDirectory);
        }

        let cwd = parse_cwd(object.get("cwd"))?;
        if !matches!(walk(&root, &cwd), Some(VNode::Dir(_))) {
            return Err(SnapshotError::InvalidCwd);
        }

        self.root = root;
        self.cwd = cwd;
        self.creds = Credentials::new(
            parse_id(object.get("currentUid"), ROOT_UID),
            parse_id(object.get("currentGid"), ROOT_GID),
        );
        self.notify();
        Ok(())
    }

    /// Typed variant of [`VirtualFs::import_state`].
    pub fn import_snapshot(&mut self, snapshot: &FsSnapshot) -> Result<(), SnapshotError> {
        let blob = serde_json::to_value(snapshot).map_err(|_| SnapshotError::NotAnObject)?;
        self.import_state(&blob)
    }
}

fn parse_node(raw: &Value, at: &str) -> Result<VNode, SnapshotError> {
    let object = raw
        .as_object()
        .ok_or_else(|| SnapshotError::MalformedNode(at.to_string()))?;
    let owner = parse_id(object.get("owner"), ROOT_UID);
    let group = parse_id(object.get("group"), ROOT_GID);

    match object.get("kind").and_then(Value::as_str) {
        Some("file") => {
            let content = object
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| SnapshotError::MalformedNode(at.to_string()))?;
            let mut file = File::new(content, false, owner, group);
            file.set_mode(parse_mode(object.get("mode"), DEFAULT_FILE_MODE));
            Ok(VNode::File(file))
        }
        Some("dir") => {
            let raw_entries = object
                .get("entries")
                .and_then(Value::as_object)
                .ok_or_else(|| SnapshotError::MalformedNode(at.to_string()))?;
            let mut entries = BTreeMap::new();
            for (name, child) in raw_entries {
                if !is_valid_entry_name(name) {
                    return Err(SnapshotError::InvalidName(name.clone()));
                }
                let child_at = if at == "/" {
                    format!("/{name}")
                } else {
                    format!("{at}/{name}")
                };
                entries.insert(name.clone(), parse_node(child, &child_at)?);
            }
            let mut dir = Directory::new(
                owner,
                group,
                parse_mode(object.get("mode"), DEFAULT_DIR_MODE),
            );
            dir.entries = entries;
            Ok(VNode::Dir(dir))
        }
        _ => Err(SnapshotError::MalformedNode(at.to_string())),
    }
}

fn parse_cwd(raw: Option<&Value>) -> Result<Vec<String>, SnapshotError> {
    let items = raw
        .and_then(Value::as_array)
        .ok_or(SnapshotError::InvalidCwd)?;
    items
        .iter()
        .map(|item| {
            let segment = item.as_str().ok_or(SnapshotError::InvalidCwd)?.trim();
            if is_valid_entry_name(segment) {
                Ok(segment.to_string())
            } else {
                Err(SnapshotError::InvalidCwd)
            }
        })
        .collect()
}

fn parse_mode(raw: Option<&Value>, fallback: u32) -> u32 {
    raw.and_then(Value::as_u64)
        .map(|mode| (mode & 0o777) as u32)
        .unwrap_or(fallback & 0o777)
}

fn parse_id(raw: Option<&Value>, fallback: u32) -> u32 {
    raw.and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::vfs::WriteOptions;

    fn built_tree() -> VirtualFs {
        let mut fs = VirtualFs::new();
        fs.mkdir("/home/guest/projects").unwrap();
        fs.write_file("/home/guest/notes.txt", "hi\n", WriteOptions::default())
            .unwrap();
        fs.write_file("/bin/tool", "#!/bin/sh\necho", WriteOptions { executable: Some(true) })
            .unwrap();
        fs.chown("/home/guest", 1000, 1000).unwrap();
        fs.chmod_mode("/home/guest/notes.txt", 0o600).unwrap();
        fs.cd("/home/guest/projects").unwrap();
        fs.set_credentials(Credentials::new(1000, 1000));
        fs
    }

    #[test]
    fn test_round_trip_reproduces_tree() {
        let original = built_tree();
        let snapshot = original.export_state();

        let mut restored = VirtualFs::new();
        restored.import_snapshot(&snapshot).unwrap();

        assert_eq!(restored.export_state(), snapshot);
        assert_eq!(restored.pwd(), "/home/guest/projects");
        assert_eq!(restored.credentials(), Credentials::new(1000, 1000));
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(built_tree().export_state()).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["currentUid"], 1000);
        assert_eq!(json["root"]["kind"], "dir");
        assert_eq!(
            json["root"]["entries"]["bin"]["entries"]["tool"]["executable"],
            true
        );
        assert_eq!(json["cwd"], json!(["home", "guest", "projects"]));
    }

    #[test]
    fn test_rejects_version_mismatch() {
        let mut blob = serde_json::to_value(built_tree().export_state()).unwrap();
        blob["version"] = json!(2);
        let mut fs = VirtualFs::new();
        assert!(matches!(
            fs.import_state(&blob),
            Err(SnapshotError::Version(_))
        ));
    }

    #[test]
    fn test_rejects_bad_names_wholesale() {
        let mut fs = built_tree();
        let before = fs.export_state();
        let blob = json!({
            "version": 1,
            "root": {"kind": "dir", "owner": 0, "group": 0, "mode": 493, "entries": {
                "ok": {"kind": "dir", "entries": {}},
                "..": {"kind": "file", "content": ""}
            }},
            "cwd": [],
            "currentUid": 0,
            "currentGid": 0
        });
        assert_eq!(
            fs.import_state(&blob),
            Err(SnapshotError::InvalidName("..".to_string()))
        );
        assert_eq!(fs.export_state(), before);
    }

    #[test]
    fn test_rejects_cwd_outside_tree() {
        let blob = json!({
            "version": 1,
            "root": {"kind": "dir", "entries": {"f": {"kind": "file", "content": "x"}}},
            "cwd": ["f"],
            "currentUid": 0,
            "currentGid": 0
        });
        let mut fs = VirtualFs::new();
        assert_eq!(fs.import_state(&blob), Err(SnapshotError::InvalidCwd));
    }

    #[test]
    fn test_lenient_ids_and_modes() {
        let blob = json!({
            "version": 1,
            "root": {"kind": "dir", "owner": -3, "mode": 0o40755, "entries": {
                "f": {"kind": "file", "content": "x", "owner": 1.5, "group": 7, "mode": 0o100751}
            }},
            "cwd": [" "],
            "currentUid": "x",
            "currentGid": 4
        });
        let mut fs = VirtualFs::new();
        // A whitespace-only cwd segment is an invalid name.
        assert_eq!(fs.import_state(&blob), Err(SnapshotError::InvalidCwd));

        let mut blob = blob;
        blob["cwd"] = json!([]);
        fs.import_state(&blob).unwrap();
        let root = fs.stat("/").unwrap();
        assert_eq!((root.owner, root.mode), (0, 0o755));
        let file = fs.stat("/f").unwrap();
        assert_eq!((file.owner, file.group, file.mode), (0, 7, 0o751));
        assert_eq!(file.executable, Some(true));
        assert_eq!(fs.credentials(), Credentials::new(0, 4));
    }
}
