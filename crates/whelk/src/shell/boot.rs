//! Boot: restore or seed the filesystem, provision homes, install programs.

use std::sync::Arc;

use super::loader::{is_generated, stub_source};
use super::{Shell, ShellError};
use crate::vfs::{Credentials, DEFAULT_EXEC_MODE, MutationListener, NodeKind, WriteOptions};

const SEED_DIRS: [&str; 15] = [
    "/bin",
    "/etc",
    "/home",
    "/home/guest",
    "/home/operator",
    "/home/guest/projects",
    "/root",
    "/tmp",
    "/usr",
    "/usr/bin",
    "/usr/local",
    "/usr/local/bin",
    "/usr/share",
    "/var",
    "/var/log",
];

const GUEST_OWNED: [&str; 4] = [
    "/home/guest",
    "/home/guest/projects",
    "/home/guest/readme.txt",
    "/home/guest/projects/todo.md",
];

impl Shell {
    /// Runs once from [`ShellBuilder::build`](super::ShellBuilder::build).
    pub(super) fn boot(&mut self) -> Result<(), ShellError> {
        self.persister.set_suspended(true);
        let listener: Arc<dyn MutationListener> = self.persister.clone();
        self.fs.set_listener(Some(listener));

        let result = self.boot_suspended();
        self.persister.set_suspended(false);
        result?;

        self.init_runtime();
        self.persist();
        Ok(())
    }

    fn boot_suspended(&mut self) -> Result<(), ShellError> {
        let restored_user = self.persister.restore(&mut self.fs);
        self.restored = restored_user.is_some();
        self.fs.set_credentials(Credentials::ROOT);

        if self.restored {
            tracing::info!(cwd = %self.fs.pwd(), "restored shell state");
        } else {
            tracing::info!("seeding a fresh filesystem");
            self.seed_filesystem()?;
        }

        if let Some(user) = restored_user.and_then(|name| self.users.get(&name).cloned()) {
            self.active = user;
        }
        self.provision_homes()?;
        self.materialize_executables(!self.restored)?;
        Ok(())
    }

    fn seed_filesystem(&mut self) -> Result<(), ShellError> {
        for dir in SEED_DIRS {
            self.fs.mkdir(dir)?;
        }

        let system = &self.system;
        let files = [
            (
                "/home/guest/readme.txt".to_string(),
                [
                    format!("{} shell", system.distribution_name),
                    String::new(),
                    "Try these commands:".to_string(),
                    "- ls".to_string(),
                    "- cd projects".to_string(),
                    "- cat readme.txt".to_string(),
                    "- help".to_string(),
                ]
                .join("\n"),
            ),
            (
                "/home/guest/projects/todo.md".to_string(),
                [
                    "# project notes",
                    "- add command aliases",
                    "- add package manager simulation",
                    "- maybe build multiplayer shell",
                ]
                .join("\n"),
            ),
            (
                "/usr/share/about.txt".to_string(),
                format!("{} - in-process terminal distribution", system.pretty_name()),
            ),
            (
                "/var/log/boot.log".to_string(),
                [
                    format!("[    0.00] {} {} loaded", system.kernel_name, system.kernel_release),
                    "[    0.12] mounting virtual fs".to_string(),
                    "[    0.27] launching shell".to_string(),
                    "[    0.35] ready".to_string(),
                ]
                .join("\n"),
            ),
            ("/etc/hostname".to_string(), system.host_name.clone()),
            ("/etc/passwd".to_string(), self.passwd_table()),
        ];
        for (path, content) in &files {
            self.fs.write_file(path, content, WriteOptions::default())?;
        }

        for path in GUEST_OWNED {
            self.fs.chown(path, 1000, 1000)?;
        }
        self.fs.chown("/home/operator", 1001, 1001)?;
        self.fs.chmod_mode("/root", 0o700)?;
        self.fs.chmod_mode("/home/guest", 0o755)?;
        self.fs.chmod_mode("/home/operator", 0o755)?;
        self.fs.chmod_mode("/tmp", 0o777)?;
        self.fs.cd("/home/guest")?;
        Ok(())
    }

    /// `/etc/passwd` lines for the roster.
    fn passwd_table(&self) -> String {
        self.users
            .iter()
            .map(|u| {
                format!(
                    "{}:x:{}:{}:{}:{}:{}",
                    u.username, u.uid, u.gid, u.username, u.home, u.shell
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Every account gets its home. A restored tree keeps whatever owner and
    /// mode it already had.
    fn provision_homes(&mut self) -> Result<(), ShellError> {
        let users: Vec<_> = self.users.iter().cloned().collect();
        for user in users {
            if self.restored && self.fs.exists(&user.home) {
                continue;
            }
            self.fs.mkdir(&user.home)?;
            self.fs.chown(&user.home, user.uid, user.gid)?;
            let mode = if user.is_root() { 0o700 } else { 0o755 };
            self.fs.chmod_mode(&user.home, mode)?;
        }
        Ok(())
    }

    /// Write a stub for each registered program at its path.
    ///
    /// Existing user files are left alone; generated stubs are refreshed
    /// when `overwrite_generated` is set. Every stub ends up executable.
    fn materialize_executables(&mut self, overwrite_generated: bool) -> Result<(), ShellError> {
        let stubs: Vec<(String, String)> = self
            .registry
            .iter()
            .map(|(path, program)| (path.to_string(), stub_source(path, program.description())))
            .collect();

        for (path, stub) in stubs {
            match self.fs.stat(&path) {
                None => {
                    if let Some((parent, _)) = path.rsplit_once('/') {
                        if !parent.is_empty() {
                            self.fs.mkdir(parent)?;
                        }
                    }
                    self.fs.write_file(
                        &path,
                        &stub,
                        WriteOptions {
                            executable: Some(true),
                        },
                    )?;
                    self.fs.chmod_mode(&path, DEFAULT_EXEC_MODE)?;
                }
                Some(stat) if stat.kind == NodeKind::Dir => {
                    tracing::warn!(path = %path, "a directory shadows a registered program");
                }
                Some(stat) => {
                    if overwrite_generated {
                        let existing = self.fs.read_file(&path)?;
                        if is_generated(&existing) && existing != stub {
                            self.fs.write_file(&path, &stub, WriteOptions::default())?;
                        }
                    }
                    if stat.executable != Some(true) {
                        self.fs.chmod(&path, true)?;
                    }
                }
            }
        }
        Ok(())
    }
}
