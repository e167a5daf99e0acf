//! Permission-checked virtual filesystem.
//!
//! [`VirtualFs`] owns a tree of [`VNode`]s with Unix-style owner/group/mode
//! bits. Every operation returns an explicit [`Result`]; failures carry an
//! [`FsErrorKind`] and a message already prefixed with the conventional
//! command name (`mkdir:`, `rm:`, ...).

mod expand;
mod filesystem;
mod node;
mod snapshot;

pub use expand::expand_wildcards;
pub use filesystem::{
    CredentialScope, FsError, FsErrorKind, ListEntry, Listing, MutationListener, RemoveOptions,
    Stat, VirtualFs, WriteOptions,
};
pub use node::{
    Access, Credentials, DEFAULT_DIR_MODE, DEFAULT_EXEC_MODE, DEFAULT_FILE_MODE, Directory, File,
    NodeKind, ROOT_GID, ROOT_UID, VNode, format_mode,
};
pub use snapshot::{FS_STATE_VERSION, FsSnapshot, SnapshotError, is_valid_entry_name};
