//! Pipeline execution and per-command dispatch.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::future::BoxFuture;

use super::Shell;
use super::context::{OutputSink, ProgramContext};
use super::process::ProcessState;
use crate::auth::VirtualUser;
use crate::parser::{ParsedCommand, Redirect, RedirectMode, parse};
use crate::program::ProgramError;
use crate::vfs::{NodeKind, WriteOptions};

/// How one command is started.
#[derive(Debug)]
pub(super) struct Invocation {
    pub(super) stdin: String,
    /// `None` runs as the session user at dispatch time.
    pub(super) actor: Option<VirtualUser>,
    pub(super) is_tty: bool,
}

enum Outcome {
    Exited(i32),
    Failed(i32),
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked".to_string()
    }
}

impl Shell {
    /// Run one command line as typed at the prompt, writing to the
    /// terminal. Returns `false` if parsing or any stage failed.
    ///
    /// Every call starts from the active user's credentials. Dropping the
    /// future mid-command leaves the interrupted program's credentials on
    /// the filesystem until the next `execute`; use
    /// [`Shell::interrupt_handle`] to stop a command cleanly instead.
    pub async fn execute(&mut self, line: &str) -> bool {
        let mut out = OutputSink::Terminal;
        self.run_line(line, &mut out).await
    }

    /// Like [`Shell::execute`] but collects the output instead of printing
    /// it.
    pub async fn execute_captured(&mut self, line: &str) -> (bool, String) {
        let mut out = OutputSink::capture();
        let ok = self.run_line(line, &mut out).await;
        (ok, out.into_text())
    }

    pub(super) async fn run_line(&mut self, line: &str, out: &mut OutputSink) -> bool {
        if !self.connected {
            return false;
        }
        self.fs.set_credentials(self.active_credentials());
        let stages = match parse(line.trim()) {
            Ok(stages) => stages,
            Err(e) => {
                out.write(self.bridge.as_ref(), &e.to_string());
                return false;
            }
        };
        self.run_stages(stages, String::new(), None, out).await
    }

    /// Run stages left to right. Every stage but the last, and any stage
    /// with a redirect, is captured; the capture feeds the next stage unless
    /// it went to a file. The first failing stage stops the pipeline.
    pub(super) fn run_stages<'a>(
        &'a mut self,
        stages: Vec<ParsedCommand>,
        stdin: String,
        actor: Option<VirtualUser>,
        out: &'a mut OutputSink,
    ) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let count = stages.len();
            let mut stdin = stdin;
            for (i, stage) in stages.into_iter().enumerate() {
                if stage.argv.is_empty() {
                    continue;
                }
                let has_next = i + 1 < count;
                if !has_next && stage.redirect.is_none() {
                    let invocation = Invocation {
                        stdin: std::mem::take(&mut stdin),
                        actor: actor.clone(),
                        is_tty: out.is_terminal(),
                    };
                    return self.run_argv(stage.argv, invocation, out).await;
                }

                let mut captured = OutputSink::capture();
                let invocation = Invocation {
                    stdin: std::mem::take(&mut stdin),
                    actor: actor.clone(),
                    is_tty: false,
                };
                if !self.run_argv(stage.argv, invocation, &mut captured).await {
                    captured.drain_into(self.bridge.as_ref(), out);
                    return false;
                }
                let text = captured.into_text();

                match stage.redirect {
                    Some(redirect) => {
                        if let Err(message) = self.redirect_output(&redirect, &text) {
                            out.write(self.bridge.as_ref(), &message);
                            return false;
                        }
                    }
                    None => stdin = text,
                }
            }
            true
        })
    }

    fn redirect_output(&mut self, redirect: &Redirect, content: &str) -> Result<(), String> {
        let path = &redirect.path;
        if let Some(stat) = self.fs.stat(path) {
            if stat.kind == NodeKind::Dir {
                return Err(format!("{path}: is a directory"));
            }
        }
        let content = match redirect.mode {
            RedirectMode::Truncate => content.to_string(),
            RedirectMode::Append => {
                let existing = if self.fs.exists(path) {
                    self.fs.read_file(path).map_err(|e| e.to_string())?
                } else {
                    String::new()
                };
                let separator =
                    if !existing.is_empty() && !content.is_empty() && !existing.ends_with('\n') {
                        "\n"
                    } else {
                        ""
                    };
                format!("{existing}{separator}{content}")
            }
        };
        self.fs
            .write_file(path, &content, WriteOptions::default())
            .map_err(|e| e.to_string())
    }

    /// Run one command with a fresh process record, under the actor's
    /// credentials. Returns `false` when it could not be run or its body
    /// failed.
    pub(super) fn run_argv<'a>(
        &'a mut self,
        argv: Vec<String>,
        invocation: Invocation,
        out: &'a mut OutputSink,
    ) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let Some(name) = argv.first().cloned() else {
                return true;
            };
            let actor = invocation
                .actor
                .clone()
                .unwrap_or_else(|| self.active.clone());
            let pid = self.processes.spawn(
                self.shell_pid,
                &actor.username,
                &argv.join(" "),
                ProcessState::Running,
            );
            tracing::debug!(pid, command = %name, user = %actor.username, "dispatching");

            // Restored by hand: the program borrows the whole shell while it runs.
            // A dropped future skips this; run_line resets on the next command.
            let saved = self.fs.credentials();
            let frame_pid = self.shell_pid;
            self.fs.set_credentials(actor.credentials());
            let outcome = self.dispatch(name, argv, invocation, actor, pid, out).await;
            if self.shell_pid == frame_pid {
                self.fs.set_credentials(saved);
            } else {
                // The program opened or closed a session; its user now owns the fs.
                self.fs.set_credentials(self.active_credentials());
            }

            let (code, ok) = match outcome {
                Outcome::Exited(code) => (code, true),
                Outcome::Failed(code) => (code, false),
            };
            self.processes
                .finish(pid, ProcessState::Zombie, code, None);
            self.prune_processes();
            self.sync_frame();
            ok
        })
    }

    async fn dispatch(
        &mut self,
        name: String,
        argv: Vec<String>,
        invocation: Invocation,
        actor: VirtualUser,
        pid: u32,
        out: &mut OutputSink,
    ) -> Outcome {
        let path = match self.resolve(&name) {
            Ok(path) => path,
            Err(e) => {
                out.write(self.bridge.as_ref(), &e.to_string());
                return Outcome::Failed(e.exit_code());
            }
        };

        let program = match self.loader.load(&self.fs, &self.registry, &path) {
            Ok(Some(program)) => program,
            Ok(None) => match self.registry.get(&path) {
                Some(program) => program,
                None => {
                    let message = format!("{name}: executable has no runtime program");
                    out.write(self.bridge.as_ref(), &message);
                    return Outcome::Failed(126);
                }
            },
            Err(e) => {
                out.write(self.bridge.as_ref(), &format!("{name}: {e}"));
                return Outcome::Failed(1);
            }
        };

        let mut ctx = ProgramContext {
            shell: &mut *self,
            out: &mut *out,
            name: name.clone(),
            args: argv.into_iter().skip(1).collect(),
            stdin: invocation.stdin,
            is_tty: invocation.is_tty,
            actor,
            pid,
        };
        let result = AssertUnwindSafe(program.run(&mut ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(ProgramError::Panicked(panic_message(payload))));

        match result {
            Ok(code) => Outcome::Exited(code),
            Err(e) => {
                let message = format!("{name}: program failed: {e}");
                out.write(self.bridge.as_ref(), &message);
                Outcome::Failed(e.exit_code())
            }
        }
    }
}
