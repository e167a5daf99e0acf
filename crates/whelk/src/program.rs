//! The program interface and the path-keyed registry.
//!
//! Every command the shell can run, built-in or compiled from a script file,
//! is a [`Program`]. Programs never touch shell state directly; they go
//! through the [`ProgramContext`](crate::ProgramContext) handed to
//! [`Program::run`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::shell::ProgramContext;
use crate::vfs::FsError;

/// Failure of a program body.
///
/// Returning `Err` aborts the rest of the pipeline. Ordinary command errors
/// (a missing file for `cat`, say) are written to the output and reported
/// through a non-zero exit code instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    /// The program gave up with a message.
    #[error("{0}")]
    Failed(String),
    /// A filesystem operation failed and the program chose not to recover.
    #[error(transparent)]
    Fs(#[from] FsError),
    /// The shell was interrupted while the program was waiting.
    #[error("interrupted")]
    Cancelled,
    /// The program body panicked.
    #[error("{0}")]
    Panicked(String),
}

impl ProgramError {
    /// Exit code recorded in the process table.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProgramError::Cancelled => 130,
            _ => 1,
        }
    }
}

/// A runnable command.
#[async_trait]
pub trait Program: Send + Sync {
    /// Command name, e.g. `cat`.
    fn name(&self) -> &str;

    /// One-line description shown by `help`.
    fn description(&self) -> &str;

    /// Whether `help` and command completion list this program.
    fn show_in_help(&self) -> bool {
        true
    }

    /// Run with the given context and return the exit code.
    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError>;
}

/// Registered programs keyed by the absolute path of their executable.
#[derive(Clone, Default)]
pub struct ProgramRegistry {
    programs: BTreeMap<String, Arc<dyn Program>>,
}

impl fmt::Debug for ProgramRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramRegistry")
            .field("paths", &self.programs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProgramRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `program` at `path`, replacing any previous registration.
    pub fn register(&mut self, path: impl Into<String>, program: Arc<dyn Program>) {
        self.programs.insert(path.into(), program);
    }

    /// The program registered at `path`.
    pub fn get(&self, path: &str) -> Option<Arc<dyn Program>> {
        self.programs.get(path).cloned()
    }

    /// Whether anything is registered at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.programs.contains_key(path)
    }

    /// `(path, program)` pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Program>)> {
        self.programs.iter().map(|(path, p)| (path.as_str(), p))
    }

    /// Number of registered programs.
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl Program for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn description(&self) -> &str {
            "does nothing"
        }

        async fn run(&self, _ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
            Ok(0)
        }
    }

    #[test]
    fn test_registry_replaces_by_path() {
        let mut registry = ProgramRegistry::new();
        assert!(registry.is_empty());
        registry.register("/bin/noop", Arc::new(Noop));
        registry.register("/bin/noop", Arc::new(Noop));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("/bin/noop"));
        assert_eq!(registry.get("/bin/noop").unwrap().name(), "noop");
        assert!(registry.get("/usr/bin/noop").is_none());
    }

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(ProgramError::Cancelled.exit_code(), 130);
        assert_eq!(ProgramError::Failed("x".into()).exit_code(), 1);
        assert_eq!(ProgramError::Panicked("boom".into()).to_string(), "boom");
    }
}
