//! `$PATH` resolution, executable listing and tab completion.

use std::collections::BTreeMap;

use thiserror::Error;

use super::Shell;
use super::env::PATH_DIRS;
use crate::vfs::NodeKind;

/// Why a command name did not resolve to something runnable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Bare name with no match on the search path.
    #[error("{0}: command not found")]
    CommandNotFound(String),
    /// Direct path that does not exist.
    #[error("{0}: no such file or directory")]
    NoSuchFile(String),
    /// Direct path naming a directory.
    #[error("{0}: is a directory")]
    IsADirectory(String),
    /// Direct path to a file the caller may not execute.
    #[error("{0}: permission denied")]
    PermissionDenied(String),
}

impl ResolveError {
    /// 127 when nothing was found, 126 when it was found but is not runnable.
    pub fn exit_code(&self) -> i32 {
        match self {
            ResolveError::CommandNotFound(_) | ResolveError::NoSuchFile(_) => 127,
            ResolveError::IsADirectory(_) | ResolveError::PermissionDenied(_) => 126,
        }
    }
}

/// One runnable command on the search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableEntry {
    /// Command name.
    pub name: String,
    /// Absolute path of the winning executable.
    pub path: String,
    /// Description from the registry, or `executable`.
    pub description: String,
}

impl Shell {
    /// Every runnable match for `command`, in search order.
    pub fn resolve_all(&self, command: &str) -> Vec<String> {
        if command.is_empty() {
            return Vec::new();
        }
        if command.contains('/') {
            let absolute = self.fs.to_absolute(command);
            return if self.fs.is_executable(&absolute) {
                vec![absolute]
            } else {
                Vec::new()
            };
        }
        PATH_DIRS
            .iter()
            .map(|dir| format!("{dir}/{command}"))
            .filter(|path| self.fs.is_executable(path))
            .collect()
    }

    /// The first runnable match for `command`.
    pub fn resolve(&self, command: &str) -> Result<String, ResolveError> {
        if let Some(path) = self.resolve_all(command).into_iter().next() {
            tracing::debug!(command, path = %path, "resolved command");
            return Ok(path);
        }
        if !command.contains('/') {
            return Err(ResolveError::CommandNotFound(command.to_string()));
        }
        match self.fs.stat(&self.fs.to_absolute(command)) {
            None => Err(ResolveError::NoSuchFile(command.to_string())),
            Some(stat) if stat.kind == NodeKind::Dir => {
                Err(ResolveError::IsADirectory(command.to_string()))
            }
            Some(_) => Err(ResolveError::PermissionDenied(command.to_string())),
        }
    }

    /// Executables on the search path the current credentials can list,
    /// sorted by name. Earlier directories shadow later ones; programs
    /// hidden from help are skipped.
    pub fn list_executables(&self) -> Vec<ExecutableEntry> {
        let mut found: BTreeMap<String, ExecutableEntry> = BTreeMap::new();
        for dir in PATH_DIRS {
            let Ok(listing) = self.fs.list(Some(dir)) else {
                continue;
            };
            for entry in listing.entries {
                if entry.kind != NodeKind::File || !entry.executable {
                    continue;
                }
                if found.contains_key(&entry.name) {
                    continue;
                }
                let path = format!("{dir}/{}", entry.name);
                let description = match self.registry.get(&path) {
                    Some(program) if !program.show_in_help() => continue,
                    Some(program) => program.description().to_string(),
                    None => "executable".to_string(),
                };
                found.insert(
                    entry.name.clone(),
                    ExecutableEntry {
                        name: entry.name,
                        path,
                        description,
                    },
                );
            }
        }
        found.into_values().collect()
    }

    /// Command names starting with `prefix`.
    pub fn complete_command(&self, prefix: &str) -> Vec<String> {
        self.list_executables()
            .into_iter()
            .map(|e| e.name)
            .filter(|name| name.starts_with(prefix))
            .collect()
    }

    /// Paths completing `partial`; directories get a trailing `/`.
    pub fn complete_path(&self, partial: &str) -> Vec<String> {
        let (base, shown_dir, needle) = match partial.rfind('/') {
            Some(idx) => {
                let dir = &partial[..=idx];
                let base = if idx == 0 { "/" } else { &partial[..idx] };
                (base, dir, &partial[idx + 1..])
            }
            None => (".", "", partial),
        };
        let Ok(listing) = self.fs.list(Some(base)) else {
            return Vec::new();
        };
        if listing.single_file {
            return Vec::new();
        }
        let mut matches: Vec<String> = listing
            .entries
            .into_iter()
            .filter(|e| e.name.starts_with(needle))
            .map(|e| {
                let suffix = if e.kind == NodeKind::Dir { "/" } else { "" };
                format!("{shown_dir}{}{suffix}", e.name)
            })
            .collect();
        matches.sort();
        matches
    }
}
