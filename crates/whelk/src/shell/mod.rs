//! The shell engine: boot, pipelines, process table and session stack.
//!
//! A [`Shell`] owns every piece of runtime state (filesystem, users,
//! environment, processes and the session-frame stack) and is driven one
//! command line at a time through [`Shell::execute`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use whelk::{BufferedTerminal, Shell};
//!
//! let terminal = Arc::new(BufferedTerminal::new());
//! let mut shell = Shell::builder().bridge(terminal.clone()).build()?;
//! shell.execute("echo hello | cat").await;
//! assert_eq!(terminal.output(), "hello");
//! ```

mod boot;
mod context;
mod env;
mod loader;
mod pipeline;
mod process;
mod resolve;
mod session;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::auth::{UserDirectory, VirtualUser};
use crate::bridge::{BufferedTerminal, TerminalBridge};
use crate::builtins::register_builtins;
use crate::config::SystemConfig;
use crate::persist::{PersistError, Persister, TieredStore};
use crate::program::{Program, ProgramRegistry};
use crate::vfs::{Credentials, FsError, VirtualFs};

pub use context::{OutputSink, ProgramContext, RunOptions};
pub use env::{Environment, PATH_DIRS, is_valid_name};
pub use loader::{LoadError, PROGRAM_MARKER, ScriptProgram, stub_source};
pub use process::{
    FIRST_DYNAMIC_PID, INIT_PID, LOGIN_SHELL_PID, PROCESS_HISTORY_LIMIT, ProcessState,
    ProcessTable, Signal, VirtualProcess,
};
pub use resolve::{ExecutableEntry, ResolveError};
pub use session::SessionFrame;

use loader::ProgramLoader;

/// Account the session starts as, and the fallback for unknown names.
pub const DEFAULT_USER: &str = "guest";

/// Administrative failures of the shell itself.
#[derive(Debug, Error)]
pub enum ShellError {
    /// No account has this name.
    #[error("unknown user: {0}")]
    UnknownUser(String),
    /// A filesystem operation failed during boot or a session switch.
    #[error(transparent)]
    Fs(#[from] FsError),
    /// Stored state could not be handled.
    #[error(transparent)]
    Persist(#[from] PersistError),
    /// The login shell's frame cannot be popped; disconnect instead.
    #[error("cannot exit the login shell frame")]
    RootFrame,
}

/// Interrupts whatever the shell is currently waiting on.
///
/// Cloneable and usable from another task while a command runs.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    token: Arc<Mutex<CancellationToken>>,
}

impl InterruptHandle {
    /// Cancel pending waits and arm a fresh token for later commands.
    pub fn interrupt(&self) {
        let mut token = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        token.cancel();
        *token = CancellationToken::new();
    }

    /// The token current waits should observe.
    pub fn token(&self) -> CancellationToken {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// A running emulated machine.
pub struct Shell {
    fs: VirtualFs,
    users: UserDirectory,
    system: SystemConfig,
    bridge: Arc<dyn TerminalBridge>,
    registry: ProgramRegistry,
    loader: ProgramLoader,
    processes: ProcessTable,
    frames: Vec<SessionFrame>,
    shell_pid: u32,
    env: Environment,
    active: VirtualUser,
    persister: Arc<Persister>,
    interrupt: InterruptHandle,
    booted_at: DateTime<Utc>,
    restored: bool,
    connected: bool,
}

impl fmt::Debug for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shell")
            .field("user", &self.active.username)
            .field("cwd", &self.fs.pwd())
            .field("shell_pid", &self.shell_pid)
            .field("depth", &self.frames.len())
            .field("restored", &self.restored)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Shell`].
///
/// # Example
///
/// ```rust,ignore
/// let shell = Shell::builder()
///     .bridge(Arc::new(BufferedTerminal::new()))
///     .store(TieredStore::with_file_backing("/var/lib/whelk"))
///     .system(SystemConfig { host_name: "lab".into(), ..Default::default() })
///     .build()?;
/// ```
pub struct ShellBuilder {
    bridge: Option<Arc<dyn TerminalBridge>>,
    store: Option<TieredStore>,
    system: SystemConfig,
    reset_storage: bool,
    programs: Vec<Arc<dyn Program>>,
}

impl fmt::Debug for ShellBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellBuilder")
            .field("has_bridge", &self.bridge.is_some())
            .field("has_store", &self.store.is_some())
            .field("system", &self.system)
            .field("reset_storage", &self.reset_storage)
            .field("programs", &self.programs.len())
            .finish()
    }
}

impl Default for ShellBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellBuilder {
    /// A builder with an in-memory terminal and store.
    pub fn new() -> Self {
        Self {
            bridge: None,
            store: None,
            system: SystemConfig::default(),
            reset_storage: false,
            programs: Vec::new(),
        }
    }

    /// Where output goes and secrets come from.
    pub fn bridge(mut self, bridge: Arc<dyn TerminalBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Where state is persisted.
    pub fn store(mut self, store: TieredStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Machine identity.
    pub fn system(mut self, system: SystemConfig) -> Self {
        self.system = system;
        self
    }

    /// Discard stored state before booting.
    pub fn reset_storage(mut self, reset: bool) -> Self {
        self.reset_storage = reset;
        self
    }

    /// Register an extra program at `/usr/local/bin/<name>`.
    pub fn program(mut self, program: Arc<dyn Program>) -> Self {
        self.programs.push(program);
        self
    }

    /// Boot the machine.
    pub fn build(self) -> Result<Shell, ShellError> {
        let mut registry = ProgramRegistry::new();
        register_builtins(&mut registry);
        for program in self.programs {
            registry.register(format!("/usr/local/bin/{}", program.name()), program);
        }

        let bridge = self
            .bridge
            .unwrap_or_else(|| Arc::new(BufferedTerminal::new()));
        let persister = Arc::new(Persister::new(
            self.store.unwrap_or_default(),
            DEFAULT_USER,
        ));
        if self.reset_storage {
            persister.clear();
        }
        let users = UserDirectory::seeded(&self.system.shell_path);
        let active = users
            .get(DEFAULT_USER)
            .cloned()
            .ok_or_else(|| ShellError::UnknownUser(DEFAULT_USER.to_string()))?;

        let mut shell = Shell {
            fs: VirtualFs::new(),
            users,
            system: self.system,
            bridge,
            registry,
            loader: ProgramLoader::default(),
            processes: ProcessTable::new(),
            frames: Vec::new(),
            shell_pid: LOGIN_SHELL_PID,
            env: Environment::initial(),
            active,
            persister,
            interrupt: InterruptHandle::default(),
            booted_at: Utc::now(),
            restored: false,
            connected: true,
        };
        shell.boot()?;
        Ok(shell)
    }
}

impl Shell {
    /// Start configuring a shell.
    pub fn builder() -> ShellBuilder {
        ShellBuilder::new()
    }

    /// The filesystem.
    pub fn fs(&self) -> &VirtualFs {
        &self.fs
    }

    /// The filesystem, mutably.
    pub fn fs_mut(&mut self) -> &mut VirtualFs {
        &mut self.fs
    }

    /// Account roster.
    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    /// Machine identity.
    pub fn system(&self) -> &SystemConfig {
        &self.system
    }

    /// Host name.
    pub fn host_name(&self) -> &str {
        &self.system.host_name
    }

    /// The terminal bridge.
    pub fn bridge(&self) -> &Arc<dyn TerminalBridge> {
        &self.bridge
    }

    /// Rename the machine; `HOSTNAME` follows.
    pub fn set_host_name(&mut self, name: &str) {
        self.system.host_name = name.to_string();
        self.sync_frame();
    }

    /// Registered programs.
    pub fn registry(&self) -> &ProgramRegistry {
        &self.registry
    }

    /// Environment variables of the current frame.
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Environment variables of the current frame, mutably.
    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Replace the environment wholesale.
    pub fn replace_env(&mut self, env: Environment) -> Environment {
        std::mem::replace(&mut self.env, env)
    }

    /// The process table.
    pub fn processes(&self) -> &ProcessTable {
        &self.processes
    }

    /// The process table, mutably.
    pub fn processes_mut(&mut self) -> &mut ProcessTable {
        &mut self.processes
    }

    /// pid of the innermost interactive shell.
    pub fn shell_pid(&self) -> u32 {
        self.shell_pid
    }

    /// When the machine booted.
    pub fn booted_at(&self) -> DateTime<Utc> {
        self.booted_at
    }

    /// Whether boot restored stored state instead of seeding.
    pub fn was_restored(&self) -> bool {
        self.restored
    }

    /// False once the session has been disconnected.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The account owning the current session frame.
    pub fn active_user(&self) -> &VirtualUser {
        &self.active
    }

    fn set_active_user(&mut self, user: VirtualUser) {
        self.persister.set_active_username(&user.username);
        self.fs.set_credentials(user.credentials());
        self.active = user;
    }

    fn active_credentials(&self) -> Credentials {
        self.active_user().credentials()
    }

    /// Current working directory.
    pub fn cwd(&self) -> String {
        self.fs.pwd()
    }

    /// `user@host:~/sub$ `, with `#` for root.
    pub fn prompt(&self) -> String {
        let user = self.active_user();
        let cwd = self.fs.pwd();
        let shown = if cwd == user.home {
            "~".to_string()
        } else if let Some(rest) = cwd.strip_prefix(&format!("{}/", user.home)) {
            format!("~/{rest}")
        } else {
            cwd
        };
        let sigil = if user.is_root() { '#' } else { '$' };
        format!("{}@{}:{shown}{sigil} ", user.username, self.system.host_name)
    }

    /// Handle for interrupting running commands from elsewhere.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Cancel in-flight waits.
    pub fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    /// Write the current state to the store now.
    pub fn persist(&self) {
        self.persister.persist(&self.fs);
    }
}
