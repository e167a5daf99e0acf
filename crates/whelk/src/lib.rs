//! Whelk: an in-process, multi-user POSIX-like shell emulator.
//!
//! Whelk runs a small Unix-flavoured machine entirely in memory: a
//! permission-checked virtual filesystem, a fixed set of accounts with
//! salted password hashes, a shell that parses pipelines and redirects,
//! a virtual process table and a stack of nested sessions (`bash`, `su`,
//! `sudo -s`). Commands are [`Program`]s resolved through `$PATH` like real
//! executables; script files with a shell shebang are compiled and cached.
//! Filesystem state survives restarts through a two-tier blob store.

pub mod auth;
pub mod builtins;
pub mod parser;
pub mod persist;
pub mod vfs;

mod bridge;
mod config;
mod program;
mod shell;


pub use bridge::{BufferedTerminal, TerminalBridge, TuiProgram};
pub use config::SystemConfig;
pub use program::{Program, ProgramError, ProgramRegistry};
pub use shell::{
    DEFAULT_USER, Environment, ExecutableEntry, FIRST_DYNAMIC_PID, INIT_PID, InterruptHandle,
    LOGIN_SHELL_PID, LoadError, OutputSink, PATH_DIRS, PROCESS_HISTORY_LIMIT, PROGRAM_MARKER,
    ProcessState, ProcessTable, ProgramContext, ResolveError, RunOptions, ScriptProgram,
    SessionFrame, Shell, ShellBuilder, ShellError, Signal, VirtualProcess, is_valid_name,
    stub_source,
};
