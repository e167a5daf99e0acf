//! The permission-checked in-memory filesystem.
//!
//! The tree is strictly owned: every directory owns its children by name and
//! the current working directory is kept as a list of path segments that is
//! re-walked from the root on demand. No node ever points back at its parent.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::node::{
    Access, Credentials, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, Directory, File, NodeKind, ROOT_GID,
    ROOT_UID, VNode, fold_exec_bits,
};

/// Category of a filesystem failure.
///
/// Callers branch on this; the rendered message alone does not always
/// distinguish the cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsErrorKind {
    /// A path component does not exist.
    NotFound,
    /// A mode bit check failed.
    PermissionDenied,
    /// A path component that must be a directory is a file.
    NotADirectory,
    /// The operation needs a file but found a directory.
    IsADirectory,
    /// The path cannot name the requested node (e.g. `/` for a file).
    InvalidPath,
    /// Ownership rules forbid the change (`chmod` by non-owner, `chown` by non-root).
    NotPermitted,
}

/// A filesystem failure carrying the operation-prefixed message shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FsError {
    kind: FsErrorKind,
    message: String,
}

impl FsError {
    fn new(kind: FsErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Failure category.
    pub fn kind(&self) -> FsErrorKind {
        self.kind
    }

    /// Rendered message, e.g. `cat: /x: No such file or directory`.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Why a permission-checked walk stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Miss {
    NotDir,
    Permission,
    NotFound,
}

/// Options for [`VirtualFs::write_file`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Force the execute trio on or off. `None` keeps an existing file's mode.
    pub executable: Option<bool>,
}

/// Options for [`VirtualFs::remove`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    /// Allow removing directories and everything below them.
    pub recursive: bool,
    /// Treat a missing target as success.
    pub force: bool,
}

/// Metadata for a single node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    /// Absolute, normalized path.
    pub path: String,
    /// Node kind.
    pub kind: NodeKind,
    /// Execute flag, files only.
    pub executable: Option<bool>,
    /// Owning uid.
    pub owner: u32,
    /// Owning gid.
    pub group: u32,
    /// Permission bits.
    pub mode: u32,
    /// Content length in bytes (0 for directories).
    pub size: usize,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Entry name (no slashes).
    pub name: String,
    /// Node kind.
    pub kind: NodeKind,
    /// Execute flag for files, `false` for directories.
    pub executable: bool,
    /// Owning uid.
    pub owner: u32,
    /// Owning gid.
    pub group: u32,
    /// Permission bits.
    pub mode: u32,
    /// Content length in bytes (0 for directories).
    pub size: usize,
}

/// Result of [`VirtualFs::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Entries sorted by name.
    pub entries: Vec<ListEntry>,
    /// Set when the listed path named a file rather than a directory.
    pub single_file: bool,
}

/// Receives a callback after every state-changing operation.
pub trait MutationListener: Send + Sync {
    /// Called with the filesystem in its post-mutation state.
    fn on_mutation(&self, fs: &VirtualFs);
}

/// A permission-checked virtual filesystem.
///
/// All permission checks are evaluated against the *current credentials*,
/// which the shell swaps per invocation via [`VirtualFs::as_user`].
pub struct VirtualFs {
    pub(super) root: VNode,
    pub(super) cwd: Vec<String>,
    pub(super) creds: Credentials,
    listener: Option<Arc<dyn MutationListener>>,
}

impl fmt::Debug for VirtualFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualFs")
            .field("cwd", &self.pwd())
            .field("creds", &self.creds)
            .field("has_listener", &self.listener.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for VirtualFs {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualFs {
    /// An empty tree: a root directory owned by root, mode `0755`, cwd `/`.
    pub fn new() -> Self {
        Self {
            root: VNode::Dir(Directory::new(ROOT_UID, ROOT_GID, DEFAULT_DIR_MODE)),
            cwd: Vec::new(),
            creds: Credentials::ROOT,
            listener: None,
        }
    }

    /// Install or clear the mutation listener.
    pub fn set_listener(&mut self, listener: Option<Arc<dyn MutationListener>>) {
        self.listener = listener;
    }

    /// Current credentials.
    pub fn credentials(&self) -> Credentials {
        self.creds
    }

    /// Replace the current credentials.
    pub fn set_credentials(&mut self, creds: Credentials) {
        self.creds = creds;
    }

    /// Adopt `creds` until the returned guard is dropped.
    pub fn as_user(&mut self, creds: Credentials) -> CredentialScope<'_> {
        let saved = std::mem::replace(&mut self.creds, creds);
        CredentialScope { fs: self, saved }
    }

    /// The current working directory as an absolute path.
    pub fn pwd(&self) -> String {
        to_path(&self.cwd)
    }

    /// Resolve `path` to an absolute, normalized path string.
    pub fn to_absolute(&self, path: &str) -> String {
        to_path(&self.resolve(path))
    }

    /// Lexically resolve `path` into segments.
    ///
    /// Relative paths start from the cwd; `~` expands to the current user's
    /// home; `.` and empty segments are dropped and `..` pops (a no-op at `/`).
    pub fn resolve(&self, path: &str) -> Vec<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return self.cwd.clone();
        }

        let expanded;
        let path = if trimmed == "~" {
            expanded = self.home_for_current_user();
            expanded.as_str()
        } else if let Some(rest) = trimmed.strip_prefix("~/") {
            expanded = format!("{}/{}", self.home_for_current_user(), rest);
            expanded.as_str()
        } else {
            trimmed
        };

        let mut resolved = if path.starts_with('/') {
            Vec::new()
        } else {
            self.cwd.clone()
        };
        for segment in path.split('/').map(str::trim) {
            match segment {
                "" | "." => {}
                ".." => {
                    resolved.pop();
                }
                name => resolved.push(name.to_string()),
            }
        }
        resolved
    }

    /// Home directory for the current uid: `/root` for root when it exists,
    /// else the first directory under `/home` owned by the uid.
    pub fn home_for_current_user(&self) -> String {
        if self.creds.is_root() && matches!(self.node_unchecked(&["root"]), Some(VNode::Dir(_))) {
            return "/root".to_string();
        }
        if let Some(VNode::Dir(home)) = self.node_unchecked(&["home"]) {
            for (name, node) in &home.entries {
                if node.is_dir() && node.owner() == self.creds.uid {
                    return format!("/home/{name}");
                }
            }
        }
        if self.creds.is_root() {
            "/root".to_string()
        } else {
            "/home/guest".to_string()
        }
    }

    /// Change the working directory.
    pub fn cd(&mut self, path: &str) -> Result<(), FsError> {
        let parts = self.resolve(path);
        match self.lookup(&parts) {
            Err(Miss::Permission) => {
                return Err(FsError::new(
                    FsErrorKind::PermissionDenied,
                    format!("cd: permission denied: {path}"),
                ));
            }
            Err(_) => {
                return Err(FsError::new(
                    FsErrorKind::NotFound,
                    format!("cd: no such file or directory: {path}"),
                ));
            }
            Ok(node) if !node.is_dir() => {
                return Err(FsError::new(
                    FsErrorKind::NotADirectory,
                    format!("cd: not a directory: {path}"),
                ));
            }
            Ok(node) if !self.creds.permits(node, Access::Execute) => {
                return Err(FsError::new(
                    FsErrorKind::PermissionDenied,
                    format!("cd: permission denied: {path}"),
                ));
            }
            Ok(_) => {}
        }
        self.cwd = parts;
        self.notify();
        Ok(())
    }

    /// Create `path` and any missing ancestors.
    ///
    /// Each traversed directory needs execute; each directory gaining a child
    /// also needs write. New directories belong to the current credentials.
    pub fn mkdir(&mut self, path: &str) -> Result<(), FsError> {
        let parts = self.resolve(path);
        let creds = self.creds;
        let denied = || {
            FsError::new(
                FsErrorKind::PermissionDenied,
                format!("mkdir: cannot create directory '{path}': Permission denied"),
            )
        };

        let mut changed = false;
        let mut current = &mut self.root;
        for part in &parts {
            if !creds.permits(current, Access::Execute) {
                return Err(denied());
            }
            let can_write = creds.permits(current, Access::Write);
            let VNode::Dir(dir) = current else {
                return Err(FsError::new(
                    FsErrorKind::NotADirectory,
                    format!("mkdir: cannot create directory '{path}': Not a directory"),
                ));
            };
            if !dir.entries.contains_key(part) {
                if !can_write {
                    return Err(denied());
                }
                dir.entries.insert(
                    part.clone(),
                    VNode::Dir(Directory::new(creds.uid, creds.gid, DEFAULT_DIR_MODE)),
                );
                changed = true;
            }
            let Some(next) = dir.entries.get_mut(part) else {
                return Err(denied());
            };
            if !next.is_dir() {
                return Err(FsError::new(
                    FsErrorKind::NotADirectory,
                    format!("mkdir: cannot create directory '{path}': Not a directory"),
                ));
            }
            current = next;
        }

        if changed {
            self.notify();
        }
        Ok(())
    }

    /// Create or overwrite a file.
    ///
    /// Overwrites keep the existing owner, group and mode unless
    /// `options.executable` is set, which folds into the execute bits.
    pub fn write_file(
        &mut self,
        path: &str,
        content: &str,
        options: WriteOptions,
    ) -> Result<(), FsError> {
        let parts = self.resolve(path);
        let Some((name, parent_parts)) = parts.split_last() else {
            return Err(FsError::new(
                FsErrorKind::InvalidPath,
                format!("write: invalid file path: {path}"),
            ));
        };
        let denied = || {
            FsError::new(
                FsErrorKind::PermissionDenied,
                format!("write: {path}: Permission denied"),
            )
        };

        let creds = self.creds;
        let parent_node = match self.lookup(parent_parts) {
            Ok(node) => node,
            Err(Miss::Permission) => return Err(denied()),
            Err(_) => {
                return Err(FsError::new(
                    FsErrorKind::NotFound,
                    format!("write: cannot create '{path}': No such file or directory"),
                ));
            }
        };
        let VNode::Dir(parent) = parent_node else {
            return Err(FsError::new(
                FsErrorKind::NotADirectory,
                format!("write: cannot create '{path}': Not a directory"),
            ));
        };
        if !creds.permits(parent_node, Access::Execute) {
            return Err(denied());
        }

        let file = match parent.entries.get(name) {
            Some(VNode::Dir(_)) => {
                return Err(FsError::new(
                    FsErrorKind::IsADirectory,
                    format!("write: {path}: Is a directory"),
                ));
            }
            Some(existing @ VNode::File(old)) => {
                if !creds.permits(existing, Access::Write) {
                    return Err(denied());
                }
                let executable = options.executable.unwrap_or(old.executable);
                let mode = match options.executable {
                    Some(exec) => fold_exec_bits(old.mode, exec),
                    None => old.mode,
                };
                File {
                    content: content.to_string(),
                    executable,
                    owner: old.owner,
                    group: old.group,
                    mode: fold_exec_bits(mode, executable),
                }
            }
            None => {
                if !creds.permits(parent_node, Access::Write) {
                    return Err(denied());
                }
                File::new(
                    content,
                    options.executable.unwrap_or(false),
                    creds.uid,
                    creds.gid,
                )
            }
        };

        if let Some(VNode::Dir(dir)) = self.node_unchecked_mut(parent_parts) {
            dir.entries.insert(name.clone(), VNode::File(file));
        }
        self.notify();
        Ok(())
    }

    /// Validate write access to an existing file, or create an empty one
    /// unless `no_create` is set.
    pub fn touch(&mut self, path: &str, no_create: bool) -> Result<(), FsError> {
        let parts = self.resolve(path);
        let fail = |kind: FsErrorKind, reason: &str| {
            FsError::new(kind, format!("touch: cannot touch '{path}': {reason}"))
        };
        let Some((name, parent_parts)) = parts.split_last() else {
            return Err(fail(FsErrorKind::InvalidPath, "Invalid path"));
        };

        let creds = self.creds;
        let parent = match self.lookup(parent_parts) {
            Ok(node @ VNode::Dir(_)) => node,
            Ok(VNode::File(_)) => return Err(fail(FsErrorKind::NotADirectory, "Not a directory")),
            Err(Miss::Permission) => {
                return Err(fail(FsErrorKind::PermissionDenied, "Permission denied"));
            }
            Err(_) => return Err(fail(FsErrorKind::NotFound, "No such file or directory")),
        };
        if !creds.permits(parent, Access::Execute) {
            return Err(fail(FsErrorKind::PermissionDenied, "Permission denied"));
        }

        let VNode::Dir(dir) = parent else {
            return Err(fail(FsErrorKind::NotADirectory, "Not a directory"));
        };
        match dir.entries.get(name) {
            Some(VNode::Dir(_)) => Err(fail(FsErrorKind::IsADirectory, "Is a directory")),
            Some(existing) => {
                if !creds.permits(existing, Access::Write) {
                    return Err(fail(FsErrorKind::PermissionDenied, "Permission denied"));
                }
                self.notify();
                Ok(())
            }
            None if no_create => Ok(()),
            None => {
                if !creds.permits(parent, Access::Write) {
                    return Err(fail(FsErrorKind::PermissionDenied, "Permission denied"));
                }
                if let Some(VNode::Dir(dir)) = self.node_unchecked_mut(parent_parts) {
                    let mut file = File::new("", false, creds.uid, creds.gid);
                    file.set_mode(DEFAULT_FILE_MODE);
                    dir.entries.insert(name.clone(), VNode::File(file));
                }
                self.notify();
                Ok(())
            }
        }
    }

    /// Toggle the execute trio of a file. Requires root or ownership.
    pub fn chmod(&mut self, path: &str, executable: bool) -> Result<(), FsError> {
        let parts = self.resolve(path);
        let node = self.lookup(&parts).map_err(|miss| chmod_miss(path, miss))?;
        if node.is_dir() {
            return Err(FsError::new(
                FsErrorKind::IsADirectory,
                format!("chmod: {path}: Is a directory"),
            ));
        }
        if !self.creds.can_admin(node) {
            return Err(chmod_not_permitted(path));
        }
        if let Some(VNode::File(file)) = self.node_unchecked_mut(&parts) {
            file.set_executable(executable);
        }
        self.notify();
        Ok(())
    }

    /// Set the full 9-bit mode of a file or directory. Requires root or ownership.
    pub fn chmod_mode(&mut self, path: &str, mode: u32) -> Result<(), FsError> {
        let parts = self.resolve(path);
        let node = self.lookup(&parts).map_err(|miss| chmod_miss(path, miss))?;
        if !self.creds.can_admin(node) {
            return Err(chmod_not_permitted(path));
        }
        if let Some(node) = self.node_unchecked_mut(&parts) {
            node.set_mode(mode);
        }
        self.notify();
        Ok(())
    }

    /// Change ownership. Root only.
    pub fn chown(&mut self, path: &str, owner: u32, group: u32) -> Result<(), FsError> {
        if !self.creds.is_root() {
            return Err(FsError::new(
                FsErrorKind::NotPermitted,
                format!("chown: changing ownership of '{path}': Operation not permitted"),
            ));
        }
        let parts = self.resolve(path);
        match self.lookup(&parts) {
            Ok(_) => {}
            Err(Miss::Permission) => {
                return Err(FsError::new(
                    FsErrorKind::PermissionDenied,
                    format!("chown: cannot access '{path}': Permission denied"),
                ));
            }
            Err(_) => {
                return Err(FsError::new(
                    FsErrorKind::NotFound,
                    format!("chown: cannot access '{path}': No such file or directory"),
                ));
            }
        }
        if let Some(node) = self.node_unchecked_mut(&parts) {
            node.set_owner(owner, group);
        }
        self.notify();
        Ok(())
    }

    /// Remove a file, or a directory tree when `recursive` is set.
    ///
    /// The parent needs write and execute. For trees, every directory being
    /// descended needs write and execute too; the whole subtree is checked
    /// before anything is detached.
    pub fn remove(&mut self, path: &str, options: RemoveOptions) -> Result<(), FsError> {
        let parts = self.resolve(path);
        let fail = |kind: FsErrorKind, target: &str, reason: &str| {
            FsError::new(kind, format!("rm: cannot remove '{target}': {reason}"))
        };
        let Some((name, parent_parts)) = parts.split_last() else {
            return Err(fail(FsErrorKind::IsADirectory, "/", "Is a directory"));
        };

        let creds = self.creds;
        let parent = match self.lookup(parent_parts) {
            Ok(node) => node,
            Err(Miss::Permission) => {
                return Err(fail(FsErrorKind::PermissionDenied, path, "Permission denied"));
            }
            Err(_) if options.force => return Ok(()),
            Err(_) => {
                return Err(fail(
                    FsErrorKind::NotFound,
                    path,
                    "No such file or directory",
                ));
            }
        };
        let VNode::Dir(dir) = parent else {
            return Err(fail(FsErrorKind::NotADirectory, path, "Not a directory"));
        };
        if !creds.permits(parent, Access::Execute) || !creds.permits(parent, Access::Write) {
            return Err(fail(FsErrorKind::PermissionDenied, path, "Permission denied"));
        }

        match dir.entries.get(name) {
            None if options.force => return Ok(()),
            None => {
                return Err(fail(
                    FsErrorKind::NotFound,
                    path,
                    "No such file or directory",
                ));
            }
            Some(target @ VNode::Dir(_)) => {
                if !options.recursive {
                    return Err(fail(FsErrorKind::IsADirectory, path, "Is a directory"));
                }
                check_prunable(creds, target, path)
                    .map_err(|denied| fail(FsErrorKind::PermissionDenied, &denied, "Permission denied"))?;
            }
            Some(VNode::File(_)) => {}
        }

        if let Some(VNode::Dir(dir)) = self.node_unchecked_mut(parent_parts) {
            dir.entries.remove(name);
        }
        self.notify();
        Ok(())
    }

    /// List a directory (default: the cwd). A file path yields a single entry
    /// with `single_file` set.
    pub fn list(&self, path: Option<&str>) -> Result<Listing, FsError> {
        let parts = match path {
            Some(p) => self.resolve(p),
            None => self.cwd.clone(),
        };
        let shown = path.unwrap_or("");
        let cannot_open = || {
            let label = path.map(str::to_string).unwrap_or_else(|| self.pwd());
            FsError::new(
                FsErrorKind::PermissionDenied,
                format!("ls: cannot open directory '{label}': Permission denied"),
            )
        };

        let node = match self.lookup(&parts) {
            Ok(node) => node,
            Err(Miss::Permission) => return Err(cannot_open()),
            Err(_) => {
                return Err(FsError::new(
                    FsErrorKind::NotFound,
                    format!("ls: cannot access '{shown}': no such file or directory"),
                ));
            }
        };

        match node {
            VNode::File(_) => {
                if !self.creds.permits(node, Access::Read) {
                    return Err(FsError::new(
                        FsErrorKind::PermissionDenied,
                        format!("ls: cannot access '{shown}': Permission denied"),
                    ));
                }
                let name = parts
                    .last()
                    .cloned()
                    .or_else(|| path.map(str::to_string))
                    .unwrap_or_else(|| "file".to_string());
                Ok(Listing {
                    entries: vec![list_entry(name, node)],
                    single_file: true,
                })
            }
            VNode::Dir(dir) => {
                if !self.creds.permits(node, Access::Read)
                    || !self.creds.permits(node, Access::Execute)
                {
                    return Err(cannot_open());
                }
                Ok(Listing {
                    entries: dir
                        .entries
                        .iter()
                        .map(|(name, child)| list_entry(name.clone(), child))
                        .collect(),
                    single_file: false,
                })
            }
        }
    }

    /// Read a file's content.
    pub fn read_file(&self, path: &str) -> Result<String, FsError> {
        let parts = self.resolve(path);
        let node = match self.lookup(&parts) {
            Ok(node) => node,
            Err(Miss::Permission) => {
                return Err(FsError::new(
                    FsErrorKind::PermissionDenied,
                    format!("cat: {path}: Permission denied"),
                ));
            }
            Err(_) => {
                return Err(FsError::new(
                    FsErrorKind::NotFound,
                    format!("cat: {path}: No such file or directory"),
                ));
            }
        };
        let VNode::File(file) = node else {
            return Err(FsError::new(
                FsErrorKind::IsADirectory,
                format!("cat: {path}: Is a directory"),
            ));
        };
        if !self.creds.permits(node, Access::Read) {
            return Err(FsError::new(
                FsErrorKind::PermissionDenied,
                format!("cat: {path}: Permission denied"),
            ));
        }
        Ok(file.content.clone())
    }

    /// Metadata for `path`, or `None` when it cannot be reached.
    pub fn stat(&self, path: &str) -> Option<Stat> {
        let parts = self.resolve(path);
        let node = self.lookup(&parts).ok()?;
        Some(Stat {
            path: to_path(&parts),
            kind: node.kind(),
            executable: match node {
                VNode::File(f) => Some(f.executable),
                VNode::Dir(_) => None,
            },
            owner: node.owner(),
            group: node.group(),
            mode: node.mode(),
            size: node_size(node),
        })
    }

    /// Whether `path` can be reached with the current credentials.
    pub fn exists(&self, path: &str) -> bool {
        self.lookup(&self.resolve(path)).is_ok()
    }

    /// Whether `path` is an executable file the current credentials may run.
    pub fn is_executable(&self, path: &str) -> bool {
        match self.lookup(&self.resolve(path)) {
            Ok(node @ VNode::File(file)) => {
                file.executable && self.creds.permits(node, Access::Execute)
            }
            _ => false,
        }
    }

    /// Walk `parts` from the root, requiring execute on every directory passed.
    fn lookup(&self, parts: &[String]) -> Result<&VNode, Miss> {
        let mut current = &self.root;
        for part in parts {
            let VNode::Dir(dir) = current else {
                return Err(Miss::NotDir);
            };
            if !self.creds.permits(current, Access::Execute) {
                return Err(Miss::Permission);
            }
            current = dir.entries.get(part).ok_or(Miss::NotFound)?;
        }
        Ok(current)
    }

    pub(super) fn node_unchecked<S: AsRef<str>>(&self, parts: &[S]) -> Option<&VNode> {
        walk(&self.root, parts)
    }

    fn node_unchecked_mut(&mut self, parts: &[String]) -> Option<&mut VNode> {
        let mut current = &mut self.root;
        for part in parts {
            let VNode::Dir(dir) = current else {
                return None;
            };
            current = dir.entries.get_mut(part)?;
        }
        Some(current)
    }

    pub(super) fn notify(&self) {
        if let Some(listener) = self.listener.clone() {
            listener.on_mutation(self);
        }
    }
}

/// Walk without permission checks, starting at `start`.
pub(super) fn walk<'a, S: AsRef<str>>(start: &'a VNode, parts: &[S]) -> Option<&'a VNode> {
    let mut current = start;
    for part in parts {
        let VNode::Dir(dir) = current else {
            return None;
        };
        current = dir.entries.get(part.as_ref())?;
    }
    Some(current)
}

/// Verify write+execute on every directory of a subtree; on failure return
/// the path of the offending directory.
fn check_prunable(creds: Credentials, node: &VNode, path: &str) -> Result<(), String> {
    let VNode::Dir(dir) = node else {
        return Ok(());
    };
    if !creds.permits(node, Access::Execute) || !creds.permits(node, Access::Write) {
        return Err(path.to_string());
    }
    for (name, child) in &dir.entries {
        let child_path = if path == "/" {
            format!("/{name}")
        } else {
            format!("{path}/{name}")
        };
        check_prunable(creds, child, &child_path)?;
    }
    Ok(())
}

fn chmod_miss(path: &str, miss: Miss) -> FsError {
    match miss {
        Miss::Permission => FsError::new(
            FsErrorKind::PermissionDenied,
            format!("chmod: cannot access '{path}': Permission denied"),
        ),
        Miss::NotFound | Miss::NotDir => FsError::new(
            FsErrorKind::NotFound,
            format!("chmod: cannot access '{path}': No such file"),
        ),
    }
}

fn chmod_not_permitted(path: &str) -> FsError {
    FsError::new(
        FsErrorKind::NotPermitted,
        format!("chmod: changing permissions of '{path}': Operation not permitted"),
    )
}

fn node_size(node: &VNode) -> usize {
    match node {
        VNode::File(f) => f.content.len(),
        VNode::Dir(_) => 0,
    }
}

fn list_entry(name: String, node: &VNode) -> ListEntry {
    ListEntry {
        name,
        kind: node.kind(),
        executable: matches!(node, VNode::File(f) if f.executable),
        owner: node.owner(),
        group: node.group(),
        mode: node.mode(),
        size: node_size(node),
    }
}

pub(super) fn to_path(parts: &[String]) -> String {
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Guard returned by [`VirtualFs::as_user`]; restores the previous
/// credentials when dropped, including during unwinding.
pub struct CredentialScope<'a> {
    fs: &'a mut VirtualFs,
    saved: Credentials,
}

impl fmt::Debug for CredentialScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialScope")
            .field("active", &self.fs.creds)
            .field("saved", &self.saved)
            .finish()
    }
}

impl Deref for CredentialScope<'_> {
    type Target = VirtualFs;

    fn deref(&self) -> &VirtualFs {
        self.fs
    }
}

impl DerefMut for CredentialScope<'_> {
    fn deref_mut(&mut self) -> &mut VirtualFs {
        self.fs
    }
}

impl Drop for CredentialScope<'_> {
    fn drop(&mut self) {
        self.fs.creds = self.saved;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const GUEST: Credentials = Credentials {
        uid: 1000,
        gid: 1000,
    };

    fn seeded() -> VirtualFs {
        let mut fs = VirtualFs::new();
        fs.mkdir("/home/guest").unwrap();
        fs.mkdir("/root").unwrap();
        fs.chown("/home/guest", 1000, 1000).unwrap();
        fs.chmod_mode("/root", 0o700).unwrap();
        fs
    }

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl MutationListener for Counter {
        fn on_mutation(&self, _fs: &VirtualFs) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    // ==================== Resolution ====================

    #[test]
    fn test_resolve_normalizes() {
        let fs = VirtualFs::new();
        assert_eq!(fs.resolve("/a/./b//c/../d"), vec!["a", "b", "d"]);
        assert_eq!(fs.resolve("/../.."), Vec::<String>::new());
        assert_eq!(fs.resolve("  "), Vec::<String>::new());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut fs = seeded();
        fs.cd("/home/guest").unwrap();
        for path in ["x/../y", "/usr//bin/", "..", "~", "a/b/./c"] {
            let once = fs.to_absolute(path);
            assert_eq!(fs.to_absolute(&once), once);
            assert_eq!(fs.resolve(&once), fs.resolve(path));
        }
    }

    #[test]
    fn test_resolve_relative_to_cwd() {
        let mut fs = seeded();
        fs.cd("/home/guest").unwrap();
        assert_eq!(fs.to_absolute("notes.txt"), "/home/guest/notes.txt");
        assert_eq!(fs.to_absolute("../.."), "/");
    }

    #[test]
    fn test_tilde_uses_current_credentials() {
        let mut fs = seeded();
        assert_eq!(fs.to_absolute("~"), "/root");
        let scope = fs.as_user(GUEST);
        assert_eq!(scope.to_absolute("~/notes"), "/home/guest/notes");
        drop(scope);
        let scope = fs.as_user(Credentials::new(4242, 4242));
        assert_eq!(scope.to_absolute("~"), "/home/guest");
    }

    // ==================== Mutation ====================

    #[test]
    fn test_mkdir_creates_intermediate_dirs() {
        let mut fs = VirtualFs::new();
        fs.mkdir("/a/b/c").unwrap();
        let stat = fs.stat("/a/b/c").unwrap();
        assert_eq!(stat.kind, NodeKind::Dir);
        assert_eq!(stat.mode, 0o755);
        fs.mkdir("/a/b/c").unwrap();
    }

    #[test]
    fn test_mkdir_through_file_fails() {
        let mut fs = VirtualFs::new();
        fs.write_file("/f", "x", WriteOptions::default()).unwrap();
        let err = fs.mkdir("/f/sub").unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::NotADirectory);
        assert_eq!(
            err.message(),
            "mkdir: cannot create directory '/f/sub': Not a directory"
        );
    }

    #[test]
    fn test_mkdir_needs_parent_write() {
        let mut fs = seeded();
        let mut scope = fs.as_user(GUEST);
        let err = scope.mkdir("/etc").unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::PermissionDenied);
        scope.mkdir("/home/guest/projects").unwrap();
        assert_eq!(scope.stat("/home/guest/projects").unwrap().owner, 1000);
    }

    #[test]
    fn test_write_file_preserves_metadata() {
        let mut fs = seeded();
        fs.write_file("/home/guest/run", "a", WriteOptions { executable: Some(true) })
            .unwrap();
        fs.chown("/home/guest/run", 1000, 1000).unwrap();
        fs.chmod_mode("/home/guest/run", 0o750).unwrap();

        fs.write_file("/home/guest/run", "b", WriteOptions::default())
            .unwrap();
        let stat = fs.stat("/home/guest/run").unwrap();
        assert_eq!((stat.owner, stat.group, stat.mode), (1000, 1000, 0o750));
        assert_eq!(stat.executable, Some(true));

        fs.write_file("/home/guest/run", "c", WriteOptions { executable: Some(false) })
            .unwrap();
        assert_eq!(fs.stat("/home/guest/run").unwrap().mode, 0o640);
        assert_eq!(fs.read_file("/home/guest/run").unwrap(), "c");
    }

    #[test]
    fn test_write_file_errors() {
        let mut fs = seeded();
        assert_eq!(
            fs.write_file("/", "x", WriteOptions::default())
                .unwrap_err()
                .message(),
            "write: invalid file path: /"
        );
        assert_eq!(
            fs.write_file("/home", "x", WriteOptions::default())
                .unwrap_err()
                .kind(),
            FsErrorKind::IsADirectory
        );
        assert_eq!(
            fs.write_file("/nope/x", "x", WriteOptions::default())
                .unwrap_err()
                .message(),
            "write: cannot create '/nope/x': No such file or directory"
        );
        let mut scope = fs.as_user(GUEST);
        assert_eq!(
            scope
                .write_file("/root/x", "x", WriteOptions::default())
                .unwrap_err()
                .message(),
            "write: /root/x: Permission denied"
        );
    }

    #[test]
    fn test_touch() {
        let mut fs = seeded();
        fs.touch("/home/guest/a", true).unwrap();
        assert!(!fs.exists("/home/guest/a"));
        fs.touch("/home/guest/a", false).unwrap();
        assert_eq!(fs.read_file("/home/guest/a").unwrap(), "");
        assert_eq!(
            fs.touch("/home", false).unwrap_err().message(),
            "touch: cannot touch '/home': Is a directory"
        );
    }

    #[test]
    fn test_chmod_rules() {
        let mut fs = seeded();
        fs.write_file("/home/guest/s", "", WriteOptions::default())
            .unwrap();
        fs.chown("/home/guest/s", 1000, 1000).unwrap();

        assert_eq!(
            fs.chmod("/home", true).unwrap_err().message(),
            "chmod: /home: Is a directory"
        );

        let mut scope = fs.as_user(Credentials::new(1001, 1001));
        assert_eq!(
            scope.chmod("/home/guest/s", true).unwrap_err().kind(),
            FsErrorKind::NotPermitted
        );
        drop(scope);

        let mut scope = fs.as_user(GUEST);
        scope.chmod("/home/guest/s", true).unwrap();
        assert!(scope.is_executable("/home/guest/s"));
        assert_eq!(
            scope.chown("/home/guest/s", 0, 0).unwrap_err().message(),
            "chown: changing ownership of '/home/guest/s': Operation not permitted"
        );
    }

    #[test]
    fn test_remove_requires_recursive_for_dirs() {
        let mut fs = VirtualFs::new();
        fs.mkdir("/a/b/c").unwrap();
        fs.write_file("/a/b/c/f", "x", WriteOptions::default())
            .unwrap();

        let err = fs.remove("/a", RemoveOptions::default()).unwrap_err();
        assert_eq!(err.message(), "rm: cannot remove '/a': Is a directory");

        fs.remove(
            "/a",
            RemoveOptions {
                recursive: true,
                force: false,
            },
        )
        .unwrap();
        assert!(!fs.exists("/a"));
        assert!(!fs.exists("/a/b/c/f"));
    }

    #[test]
    fn test_remove_recursive_checks_every_level() {
        let mut fs = seeded();
        fs.mkdir("/home/guest/tree/locked").unwrap();
        fs.write_file("/home/guest/tree/locked/f", "", WriteOptions::default())
            .unwrap();
        fs.chown("/home/guest/tree", 1000, 1000).unwrap();
        // `locked` stays root-owned with 0755: guest can descend but not write.

        let mut scope = fs.as_user(GUEST);
        let err = scope
            .remove(
                "/home/guest/tree",
                RemoveOptions {
                    recursive: true,
                    force: false,
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::PermissionDenied);
        assert_eq!(
            err.message(),
            "rm: cannot remove '/home/guest/tree/locked': Permission denied"
        );
        assert!(scope.exists("/home/guest/tree/locked/f"));
    }

    #[test]
    fn test_remove_force_and_root() {
        let mut fs = VirtualFs::new();
        let force = RemoveOptions {
            recursive: false,
            force: true,
        };
        fs.remove("/missing", force).unwrap();
        fs.remove("/missing/deeper", force).unwrap();
        assert_eq!(
            fs.remove("/missing", RemoveOptions::default())
                .unwrap_err()
                .kind(),
            FsErrorKind::NotFound
        );
        assert_eq!(
            fs.remove("/", force).unwrap_err().message(),
            "rm: cannot remove '/': Is a directory"
        );
    }

    // ==================== Queries ====================

    #[test]
    fn test_list_sorted_and_single_file() {
        let mut fs = VirtualFs::new();
        for name in ["/zeta", "/alpha", "/mid"] {
            fs.write_file(name, "", WriteOptions::default()).unwrap();
        }
        let listing = fs.list(Some("/")).unwrap();
        let names: Vec<_> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
        assert!(!listing.single_file);

        let single = fs.list(Some("/mid")).unwrap();
        assert!(single.single_file);
        assert_eq!(single.entries[0].name, "mid");
    }

    #[test]
    fn test_permission_and_not_found_are_distinct() {
        let mut fs = seeded();
        fs.write_file("/root/secret", "x", WriteOptions::default())
            .unwrap();
        let scope = fs.as_user(GUEST);
        assert_eq!(
            scope.read_file("/root/secret").unwrap_err().kind(),
            FsErrorKind::PermissionDenied
        );
        assert_eq!(
            scope.read_file("/nowhere").unwrap_err().kind(),
            FsErrorKind::NotFound
        );
        assert_eq!(
            scope.list(Some("/root")).unwrap_err().message(),
            "ls: cannot open directory '/root': Permission denied"
        );
        assert!(scope.stat("/root/secret").is_none());
    }

    #[test]
    fn test_cd_errors_and_success() {
        let mut fs = seeded();
        fs.write_file("/f", "", WriteOptions::default()).unwrap();
        assert_eq!(
            fs.cd("/f").unwrap_err().message(),
            "cd: not a directory: /f"
        );
        assert_eq!(
            fs.cd("/nope").unwrap_err().message(),
            "cd: no such file or directory: /nope"
        );
        let mut scope = fs.as_user(GUEST);
        assert_eq!(
            scope.cd("/root").unwrap_err().message(),
            "cd: permission denied: /root"
        );
        scope.cd("~").unwrap();
        assert_eq!(scope.pwd(), "/home/guest");
    }

    #[test]
    fn test_credential_scope_restores() {
        let mut fs = VirtualFs::new();
        {
            let scope = fs.as_user(GUEST);
            assert_eq!(scope.credentials(), GUEST);
        }
        assert_eq!(fs.credentials(), Credentials::ROOT);
    }

    #[test]
    fn test_listener_fires_on_mutation_only() {
        let counter = Arc::new(Counter::default());
        let mut fs = VirtualFs::new();
        fs.set_listener(Some(counter.clone()));

        fs.mkdir("/a").unwrap();
        fs.mkdir("/a").unwrap();
        fs.write_file("/a/f", "x", WriteOptions::default()).unwrap();
        let _ = fs.read_file("/a/f");
        let _ = fs.list(None);
        fs.cd("/a").unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
    }
}
