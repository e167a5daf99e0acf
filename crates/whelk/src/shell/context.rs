//! The syscall surface handed to running programs.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};

use super::Shell;
use super::pipeline::Invocation;
use super::resolve::{ExecutableEntry, ResolveError};
use crate::auth::VirtualUser;
use crate::bridge::{TerminalBridge, TuiProgram};
use crate::parser::ParsedCommand;
use crate::program::ProgramError;
use crate::vfs::{FsError, Listing, VirtualFs, expand_wildcards};

/// Where a program's output lines go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    /// Straight to the terminal bridge.
    Terminal,
    /// Collected for the next pipeline stage or a redirect.
    Capture(Vec<String>),
}

impl OutputSink {
    /// An empty capture buffer.
    pub fn capture() -> Self {
        OutputSink::Capture(Vec::new())
    }

    /// Whether output reaches the terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OutputSink::Terminal)
    }

    /// Captured lines joined with `\n`; empty for the terminal.
    pub fn into_text(self) -> String {
        match self {
            OutputSink::Terminal => String::new(),
            OutputSink::Capture(lines) => lines.join("\n"),
        }
    }

    pub(super) fn write(&mut self, bridge: &dyn TerminalBridge, text: &str) {
        match self {
            OutputSink::Terminal => bridge.println(text),
            OutputSink::Capture(lines) => lines.push(text.to_string()),
        }
    }

    /// Move captured lines into `target`.
    pub(super) fn drain_into(self, bridge: &dyn TerminalBridge, target: &mut OutputSink) {
        if let OutputSink::Capture(lines) = self {
            for line in lines {
                target.write(bridge, &line);
            }
        }
    }
}

/// Options for [`ProgramContext::run_argv`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stdin for the command; defaults to none.
    pub stdin: Option<String>,
    /// Run as this account instead of the session user.
    pub as_user: Option<VirtualUser>,
    /// Capture the output and return it instead of writing it through.
    pub capture: bool,
}

/// Everything a program may see and do while it runs.
pub struct ProgramContext<'a> {
    pub(super) shell: &'a mut Shell,
    pub(super) out: &'a mut OutputSink,
    pub(super) name: String,
    pub(super) args: Vec<String>,
    pub(super) stdin: String,
    pub(super) is_tty: bool,
    pub(super) actor: VirtualUser,
    pub(super) pid: u32,
}

impl fmt::Debug for ProgramContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramContext")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("user", &self.actor.username)
            .field("pid", &self.pid)
            .field("is_tty", &self.is_tty)
            .finish_non_exhaustive()
    }
}

impl ProgramContext<'_> {
    /// Name the program was invoked as (`argv[0]`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments after the name.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Text piped in by the previous stage.
    pub fn stdin(&self) -> &str {
        &self.stdin
    }

    /// Whether output goes straight to the terminal.
    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// The account the program runs as.
    pub fn user(&self) -> &VirtualUser {
        &self.actor
    }

    /// This invocation's pid.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Host name.
    pub fn host(&self) -> &str {
        self.shell.host_name()
    }

    /// Current working directory.
    pub fn cwd(&self) -> String {
        self.shell.fs.pwd()
    }

    /// Write one line of output.
    pub fn write(&mut self, text: impl AsRef<str>) {
        self.out.write(self.shell.bridge.as_ref(), text.as_ref());
    }

    /// Clear the terminal.
    pub fn clear(&self) {
        self.shell.bridge.clear();
    }

    /// Change directory.
    pub fn cd(&mut self, path: &str) -> Result<(), FsError> {
        self.shell.fs.cd(path)
    }

    /// List a directory, the cwd by default.
    pub fn ls(&self, path: Option<&str>) -> Result<Listing, FsError> {
        self.shell.fs.list(path)
    }

    /// Read a file.
    pub fn read_file(&self, path: &str) -> Result<String, FsError> {
        self.shell.fs.read_file(path)
    }

    /// The filesystem, under this program's credentials.
    pub fn fs(&self) -> &VirtualFs {
        &self.shell.fs
    }

    /// The filesystem, mutably, under this program's credentials.
    pub fn fs_mut(&mut self) -> &mut VirtualFs {
        &mut self.shell.fs
    }

    /// Expand `*` and `?` in operands against the filesystem.
    pub fn expand(&self, operands: &[String]) -> Vec<String> {
        expand_wildcards(&self.shell.fs, operands)
    }

    /// First runnable match for `command`.
    pub fn which(&self, command: &str) -> Result<String, ResolveError> {
        self.shell.resolve(command)
    }

    /// Every runnable match for `command`.
    pub fn resolve_all(&self, command: &str) -> Vec<String> {
        self.shell.resolve_all(command)
    }

    /// Runnable commands on the search path.
    pub fn list_executables(&self) -> Vec<ExecutableEntry> {
        self.shell.list_executables()
    }

    /// Local wall-clock time.
    pub fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    /// Wait for `duration`, or until the shell is interrupted.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ProgramError> {
        let cancel = self.shell.interrupt.token();
        tokio::select! {
            _ = cancel.cancelled() => Err(ProgramError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Prompt for a secret through the terminal.
    pub async fn read_secret(&self, prompt: &str) -> Option<String> {
        self.shell.bridge.read_secret(prompt).await
    }

    /// End the whole session.
    pub fn disconnect(&mut self, message: &str) {
        self.shell.disconnect(message);
    }

    /// Hand the screen to a full-screen program.
    pub async fn run_tui(&self, program: &mut dyn TuiProgram) {
        let cancel = self.shell.interrupt.token();
        self.shell.bridge.run_tui(program, cancel).await;
    }

    /// Run `argv` as a nested command. Output goes to this program's output
    /// unless `options.capture` is set, in which case it is returned.
    pub async fn run_argv(&mut self, argv: Vec<String>, options: RunOptions) -> (bool, String) {
        let invocation = Invocation {
            stdin: options.stdin.unwrap_or_default(),
            actor: options.as_user,
            is_tty: self.is_tty && !options.capture,
        };
        if options.capture {
            let mut captured = OutputSink::capture();
            let ok = self.shell.run_argv(argv, invocation, &mut captured).await;
            (ok, captured.into_text())
        } else {
            let ok = self.shell.run_argv(argv, invocation, self.out).await;
            (ok, String::new())
        }
    }

    /// Parse and run a command line as the session user, writing to this
    /// program's output.
    pub async fn run_line(&mut self, line: &str) -> bool {
        self.shell.run_line(line, self.out).await
    }

    /// Run pre-parsed stages as this program's user, feeding this
    /// program's stdin to the first stage.
    pub async fn run_stages(&mut self, stages: Vec<ParsedCommand>) -> bool {
        let stdin = self.stdin.clone();
        let actor = self.actor.clone();
        self.shell.run_stages(stages, stdin, Some(actor), self.out).await
    }

    /// The shell, for programs that manage sessions, users or processes.
    pub fn shell(&self) -> &Shell {
        &*self.shell
    }

    /// The shell, mutably.
    pub fn shell_mut(&mut self) -> &mut Shell {
        &mut *self.shell
    }
}
