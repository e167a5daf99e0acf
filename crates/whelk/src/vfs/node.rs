//! Filesystem node types and the permission model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Uid of the superuser.
pub const ROOT_UID: u32 = 0;
/// Gid of the superuser's group.
pub const ROOT_GID: u32 = 0;
/// Mode given to directories created without an explicit mode.
pub const DEFAULT_DIR_MODE: u32 = 0o755;
/// Mode given to regular files created without an explicit mode.
pub const DEFAULT_FILE_MODE: u32 = 0o644;
/// Mode given to executable files created without an explicit mode.
pub const DEFAULT_EXEC_MODE: u32 = 0o755;

const EXEC_BITS: u32 = 0o111;

/// A node in the virtual filesystem tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VNode {
    /// A directory owning its children.
    Dir(Directory),
    /// A text file.
    File(File),
}

/// A directory: an owned mapping from child name to node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    /// Children keyed by name.
    pub entries: BTreeMap<String, VNode>,
    /// Owning uid.
    pub owner: u32,
    /// Owning gid.
    pub group: u32,
    /// Permission bits (`0o777` mask).
    pub mode: u32,
}

/// A text-oriented file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// File content.
    pub content: String,
    /// Mirrors `mode & 0o111 != 0`.
    pub executable: bool,
    /// Owning uid.
    pub owner: u32,
    /// Owning gid.
    pub group: u32,
    /// Permission bits (`0o777` mask).
    pub mode: u32,
}

/// Kind of a node, as reported by `stat` and listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A directory.
    Dir,
    /// A regular file.
    File,
}

/// The three permission classes checked against mode bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// `r`
    Read,
    /// `w`
    Write,
    /// `x` (search, for directories)
    Execute,
}

impl Access {
    /// Owner, group and other masks for this access class.
    fn masks(self) -> [u32; 3] {
        match self {
            Access::Read => [0o400, 0o040, 0o004],
            Access::Write => [0o200, 0o020, 0o002],
            Access::Execute => [0o100, 0o010, 0o001],
        }
    }
}

/// Uid/gid pair a permission check is evaluated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// User id.
    pub uid: u32,
    /// Group id.
    pub gid: u32,
}

impl Credentials {
    /// Superuser credentials.
    pub const ROOT: Credentials = Credentials {
        uid: ROOT_UID,
        gid: ROOT_GID,
    };

    /// Build a credential pair.
    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    /// Whether these are superuser credentials.
    pub fn is_root(&self) -> bool {
        self.uid == ROOT_UID
    }

    /// Check `access` on `node`. Root bypasses all checks; otherwise exactly
    /// one of the owner, group or other masks is consulted.
    pub fn permits(&self, node: &VNode, access: Access) -> bool {
        if self.is_root() {
            return true;
        }
        let [user, group, other] = access.masks();
        let mask = if self.uid == node.owner() {
            user
        } else if self.gid == node.group() {
            group
        } else {
            other
        };
        node.mode() & mask != 0
    }

    /// Whether these credentials may change the mode of `node`.
    pub fn can_admin(&self, node: &VNode) -> bool {
        self.is_root() || self.uid == node.owner()
    }
}

impl Directory {
    /// Empty directory with the given ownership and mode.
    pub fn new(owner: u32, group: u32, mode: u32) -> Self {
        Self {
            entries: BTreeMap::new(),
            owner,
            group,
            mode: mode & 0o777,
        }
    }
}

impl File {
    /// New file; the mode's execute bits are folded to match `executable`.
    pub fn new(content: impl Into<String>, executable: bool, owner: u32, group: u32) -> Self {
        let mode = if executable {
            DEFAULT_EXEC_MODE
        } else {
            DEFAULT_FILE_MODE
        };
        Self {
            content: content.into(),
            executable,
            owner,
            group,
            mode: fold_exec_bits(mode, executable),
        }
    }

    /// Replace the full mode and re-derive `executable`.
    pub fn set_mode(&mut self, mode: u32) {
        self.mode = mode & 0o777;
        self.executable = self.mode & EXEC_BITS != 0;
    }

    /// Toggle the execute trio.
    pub fn set_executable(&mut self, executable: bool) {
        self.mode = fold_exec_bits(self.mode, executable);
        self.executable = executable;
    }
}

/// Set or clear all three execute bits of `mode`.
pub fn fold_exec_bits(mode: u32, executable: bool) -> u32 {
    if executable {
        (mode | EXEC_BITS) & 0o777
    } else {
        mode & !EXEC_BITS & 0o777
    }
}

impl VNode {
    /// Owning uid.
    pub fn owner(&self) -> u32 {
        match self {
            VNode::Dir(d) => d.owner,
            VNode::File(f) => f.owner,
        }
    }

    /// Owning gid.
    pub fn group(&self) -> u32 {
        match self {
            VNode::Dir(d) => d.group,
            VNode::File(f) => f.group,
        }
    }

    /// Permission bits.
    pub fn mode(&self) -> u32 {
        match self {
            VNode::Dir(d) => d.mode,
            VNode::File(f) => f.mode,
        }
    }

    /// Node kind.
    pub fn kind(&self) -> NodeKind {
        match self {
            VNode::Dir(_) => NodeKind::Dir,
            VNode::File(_) => NodeKind::File,
        }
    }

    /// Whether this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, VNode::Dir(_))
    }

    /// Change ownership.
    pub fn set_owner(&mut self, owner: u32, group: u32) {
        match self {
            VNode::Dir(d) => {
                d.owner = owner;
                d.group = group;
            }
            VNode::File(f) => {
                f.owner = owner;
                f.group = group;
            }
        }
    }

    /// Replace the full mode; files re-derive their `executable` flag.
    pub fn set_mode(&mut self, mode: u32) {
        match self {
            VNode::Dir(d) => d.mode = mode & 0o777,
            VNode::File(f) => f.set_mode(mode),
        }
    }
}

/// Render a mode as `drwxr-xr-x`.
pub fn format_mode(kind: NodeKind, mode: u32) -> String {
    let mut out = String::with_capacity(10);
    out.push(match kind {
        NodeKind::Dir => 'd',
        NodeKind::File => '-',
    });
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_640() -> VNode {
        let mut file = File::new("secret", false, 1000, 1000);
        file.set_mode(0o640);
        VNode::File(file)
    }

    #[test]
    fn test_permission_matrix_owner() {
        let node = file_640();
        let owner = Credentials::new(1000, 1000);
        assert!(owner.permits(&node, Access::Read));
        assert!(owner.permits(&node, Access::Write));
        assert!(!owner.permits(&node, Access::Execute));
    }

    #[test]
    fn test_permission_matrix_group() {
        let node = file_640();
        let member = Credentials::new(2000, 1000);
        assert!(member.permits(&node, Access::Read));
        assert!(!member.permits(&node, Access::Write));
        assert!(!member.permits(&node, Access::Execute));
    }

    #[test]
    fn test_permission_matrix_other_and_root() {
        let node = file_640();
        let stranger = Credentials::new(2000, 2000);
        for access in [Access::Read, Access::Write, Access::Execute] {
            assert!(!stranger.permits(&node, access));
            assert!(Credentials::ROOT.permits(&node, access));
        }
    }

    #[test]
    fn test_owner_mask_is_exclusive() {
        // Owner with no owner bits is denied even when "other" would allow.
        let mut file = File::new("", false, 1000, 1000);
        file.set_mode(0o007);
        let node = VNode::File(file);
        assert!(!Credentials::new(1000, 1000).permits(&node, Access::Read));
        assert!(Credentials::new(3000, 3000).permits(&node, Access::Read));
    }

    #[test]
    fn test_executable_tracks_mode() {
        let mut file = File::new("", true, 0, 0);
        assert_eq!(file.mode, 0o755);
        assert!(file.executable);

        file.set_executable(false);
        assert_eq!(file.mode, 0o644);
        assert!(!file.executable);

        file.set_mode(0o1750);
        assert_eq!(file.mode, 0o750);
        assert!(file.executable);
    }

    #[test]
    fn test_node_serialization_is_tagged() {
        let node = VNode::Dir(Directory::new(0, 0, 0o755));
        let json = serde_json::to_value(&node).unwrap_or_default();
        assert_eq!(json["kind"], "dir");
        assert!(json["entries"].is_object());
    }

    #[test]
    fn test_format_mode() {
        assert_eq!(format_mode(NodeKind::Dir, 0o755), "drwxr-xr-x");
        assert_eq!(format_mode(NodeKind::File, 0o640), "-rw-r-----");
    }
}
