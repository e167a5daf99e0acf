//! The stack of nested interactive sessions (`bash`, `su`, `sudo -s`).

use super::env::Environment;
use super::process::{LOGIN_SHELL_PID, ProcessState, Signal};
use super::{Shell, ShellError};

/// Saved identity of one interactive shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFrame {
    /// The shell's pid.
    pub pid: u32,
    /// Account running the shell.
    pub username: String,
    /// Working directory when the frame was last synced.
    pub cwd: String,
    /// Environment when the frame was last synced.
    pub env: Environment,
}

impl Shell {
    /// Reset processes, environment and frames to a single login shell.
    pub(super) fn init_runtime(&mut self) {
        self.processes.boot(
            &self.system.init_path,
            &self.active.username,
            &self.system.shell_path,
        );
        self.frames.clear();
        self.shell_pid = LOGIN_SHELL_PID;
        self.env = Environment::initial();
        self.fs.set_credentials(self.active.credentials());
        self.persister.set_active_username(&self.active.username);
        self.sync_user_env();
        self.frames.push(SessionFrame {
            pid: LOGIN_SHELL_PID,
            username: self.active.username.clone(),
            cwd: self.fs.pwd(),
            env: self.env.clone(),
        });
    }

    fn sync_user_env(&mut self) {
        let user = &self.active;
        self.env.set("USER", user.username.clone());
        self.env.set("LOGNAME", user.username.clone());
        self.env.set("HOME", user.home.clone());
        self.env.set("SHELL", user.shell.clone());
        self.env.set("HOSTNAME", self.system.host_name.clone());
        self.env.set("PWD", self.fs.pwd());
    }

    /// Refresh derived variables and copy the live state into the top frame.
    pub(super) fn sync_frame(&mut self) {
        self.sync_user_env();
        self.env
            .set("SHLVL", self.frames.len().max(1).to_string());
        let cwd = self.fs.pwd();
        let (pid, username, env) = (self.shell_pid, self.active.username.clone(), self.env.clone());
        if let Some(top) = self.frames.last_mut() {
            top.pid = pid;
            top.username = username;
            top.cwd = cwd;
            top.env = env;
        }
    }

    /// Nesting depth; `SHLVL` mirrors it.
    pub fn session_depth(&self) -> usize {
        self.frames.len()
    }

    /// Frames from the login shell outwards.
    pub fn frames(&self) -> &[SessionFrame] {
        &self.frames
    }

    /// Replace the saved environment of the frame at `index`, counted from
    /// the login shell. Returns `false` when there is no such frame.
    ///
    /// The top frame's snapshot is rewritten from the live environment at
    /// the next command boundary; use [`Shell::replace_env`] for it.
    pub fn set_frame_env(&mut self, index: usize, env: Environment) -> bool {
        match self.frames.get_mut(index) {
            Some(frame) => {
                frame.env = env;
                true
            }
            None => false,
        }
    }

    /// Open a nested interactive shell as `username` and return its pid.
    ///
    /// A login shell starts in the user's home directory.
    pub fn enter_session(&mut self, username: &str, login: bool) -> Result<u32, ShellError> {
        let user = self
            .users
            .get(username)
            .cloned()
            .ok_or_else(|| ShellError::UnknownUser(username.to_string()))?;
        self.sync_frame();

        let pid = self.processes.spawn(
            self.shell_pid,
            &user.username,
            &self.system.shell_path,
            ProcessState::Sleeping,
        );
        let home = user.home.clone();
        self.set_active_user(user);
        if login {
            let entered = self.fs.mkdir(&home).and_then(|()| self.fs.cd(&home));
            if let Err(e) = entered {
                self.bridge.println(e.message());
            }
        }

        self.shell_pid = pid;
        self.frames.push(SessionFrame {
            pid,
            username: username.to_string(),
            cwd: self.fs.pwd(),
            env: self.env.clone(),
        });
        self.sync_frame();
        self.persist();
        tracing::debug!(pid, user = username, depth = self.frames.len(), "entered session");
        Ok(pid)
    }

    /// Close the innermost shell with `code` and restore its parent.
    pub fn exit_session(&mut self, code: i32) -> Result<(), ShellError> {
        if self.frames.len() <= 1 {
            return Err(ShellError::RootFrame);
        }
        let Some(frame) = self.frames.pop() else {
            return Err(ShellError::RootFrame);
        };
        self.processes
            .finish(frame.pid, ProcessState::Zombie, code, None);

        let Some(parent) = self.frames.last().cloned() else {
            return Err(ShellError::RootFrame);
        };
        let user = self
            .users
            .get(&parent.username)
            .cloned()
            .ok_or_else(|| ShellError::UnknownUser(parent.username.clone()))?;
        let home = user.home.clone();
        let username = user.username.clone();
        self.set_active_user(user);
        if self.fs.cd(&parent.cwd).is_err() {
            let _ = self.fs.mkdir(&home);
            let _ = self.fs.cd(&home);
        }

        self.shell_pid = parent.pid;
        if let Some(process) = self.processes.get_mut(parent.pid) {
            process.user = username;
            if process.state == ProcessState::Stopped {
                process.state = ProcessState::Sleeping;
            }
        }
        self.env = parent.env;
        self.sync_frame();
        self.prune_processes();
        self.persist();
        tracing::debug!(pid = frame.pid, code, depth = self.frames.len(), "exited session");
        Ok(())
    }

    /// End the whole session: every frame's shell is hung up and the bridge
    /// is told to close.
    pub fn disconnect(&mut self, message: &str) {
        let hangup = Signal::Hup;
        let code = hangup.exit_code().unwrap_or(129);
        for frame in &self.frames {
            self.processes
                .finish(frame.pid, ProcessState::Zombie, code, Some(hangup));
        }
        self.connected = false;
        self.interrupt.interrupt();
        self.persist();
        self.bridge.disconnect(message);
        tracing::debug!(frames = self.frames.len(), "session disconnected");
    }

    pub(super) fn prune_processes(&mut self) {
        let protected: Vec<u32> = self.frames.iter().map(|f| f.pid).collect();
        self.processes.prune(&protected);
    }
}
