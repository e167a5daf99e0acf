//! Built-in programs installed under `/bin`.
//!
//! Each command lives in its own module and talks to the machine only
//! through [`ProgramContext`]. Ordinary failures are written to the output
//! and reported with exit code 1; only broken invariants return `Err`.

mod bash;
mod cat;
mod cd;
mod chmod;
mod chown;
mod clear;
mod cp;
mod cpp;
mod date;
mod echo;
mod env;
mod exit;
mod export;
mod grep;
mod head;
mod help;
mod hostname;
mod id;
mod kill;
mod ls;
mod mkdir;
mod mv;
mod ps;
mod pwd;
mod rm;
mod sleep;
mod su;
mod sudo;
mod tail;
mod touch;
mod truth;
mod uname;
mod uptime;
mod wc;
mod which;
mod whoami;

pub use bash::BashCommand;
pub use cat::CatCommand;
pub use cd::CdCommand;
pub use chmod::ChmodCommand;
pub use chown::ChownCommand;
pub use clear::ClearCommand;
pub use cp::CpCommand;
pub use cpp::CppCommand;
pub use date::DateCommand;
pub use echo::EchoCommand;
pub use env::EnvCommand;
pub use exit::ExitCommand;
pub use export::ExportCommand;
pub use grep::GrepCommand;
pub use head::HeadCommand;
pub use help::HelpCommand;
pub use hostname::HostnameCommand;
pub use id::IdCommand;
pub use kill::KillCommand;
pub use ls::LsCommand;
pub use mkdir::MkdirCommand;
pub use mv::MvCommand;
pub use ps::PsCommand;
pub use pwd::PwdCommand;
pub use rm::RmCommand;
pub use sleep::SleepCommand;
pub use su::SuCommand;
pub use sudo::SudoCommand;
pub use tail::TailCommand;
pub use touch::TouchCommand;
pub use truth::{FalseCommand, TrueCommand};
pub use uname::UnameCommand;
pub use uptime::UptimeCommand;
pub use wc::WcCommand;
pub use which::WhichCommand;
pub use whoami::WhoamiCommand;

use std::sync::Arc;

use crate::auth::{VirtualUser, verify_password};
use crate::program::{Program, ProgramRegistry};
use crate::shell::ProgramContext;

/// Directory the built-ins are installed into.
pub const BUILTIN_DIR: &str = "/bin";

/// Register every built-in at `/bin/<name>`.
pub fn register_builtins(registry: &mut ProgramRegistry) {
    let programs: Vec<Arc<dyn Program>> = vec![
        Arc::new(BashCommand),
        Arc::new(CatCommand),
        Arc::new(CdCommand),
        Arc::new(ChmodCommand),
        Arc::new(ChownCommand),
        Arc::new(ClearCommand),
        Arc::new(CpCommand),
        Arc::new(CppCommand),
        Arc::new(DateCommand),
        Arc::new(EchoCommand),
        Arc::new(EnvCommand),
        Arc::new(ExitCommand),
        Arc::new(ExportCommand),
        Arc::new(FalseCommand),
        Arc::new(GrepCommand),
        Arc::new(HeadCommand),
        Arc::new(HelpCommand),
        Arc::new(HostnameCommand),
        Arc::new(IdCommand),
        Arc::new(KillCommand),
        Arc::new(LsCommand),
        Arc::new(MkdirCommand),
        Arc::new(MvCommand),
        Arc::new(PsCommand),
        Arc::new(PwdCommand),
        Arc::new(RmCommand),
        Arc::new(SleepCommand),
        Arc::new(SuCommand),
        Arc::new(SudoCommand),
        Arc::new(TailCommand),
        Arc::new(TouchCommand),
        Arc::new(TrueCommand),
        Arc::new(UnameCommand),
        Arc::new(UptimeCommand),
        Arc::new(WcCommand),
        Arc::new(WhichCommand),
        Arc::new(WhoamiCommand),
    ];
    for program in programs {
        registry.register(format!("{BUILTIN_DIR}/{}", program.name()), program);
    }
}

/// `-abc` style cluster, but not a lone `-`.
fn is_option(arg: &str) -> bool {
    arg.starts_with('-') && arg != "-"
}

/// Swap the command prefix of a filesystem message, e.g. `cat:` to `head:`.
fn reprefix(message: &str, from: &str, to: &str) -> String {
    match message.strip_prefix(from) {
        Some(rest) => format!("{to}{rest}"),
        None => message.to_string(),
    }
}

/// Read a file operand, or stdin for `-`. Errors are written with the
/// caller's prefix.
fn read_operand(ctx: &mut ProgramContext<'_>, operand: &str, command: &str) -> Option<String> {
    if operand == "-" {
        return Some(ctx.stdin().to_string());
    }
    match ctx.read_file(operand) {
        Ok(content) => Some(content),
        Err(e) => {
            ctx.write(reprefix(e.message(), "cat:", &format!("{command}:")));
            None
        }
    }
}

/// Split text into lines, treating CRLF as LF. Empty text has no lines.
fn text_lines(content: &str) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }
    content
        .replace("\r\n", "\n")
        .split('\n')
        .map(str::to_string)
        .collect()
}

/// Join a directory and an entry name.
fn join_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Last path segment.
fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// First line of stdin, trimmed, if any.
fn stdin_secret(ctx: &ProgramContext<'_>) -> Option<String> {
    let first = ctx.stdin().replace("\r\n", "\n");
    let line = first.split('\n').next().unwrap_or("").trim();
    (!line.is_empty()).then(|| line.to_string())
}

/// Check a password off the async runtime's worker; the hash is slow.
async fn verify_user_password(user: &VirtualUser, password: &str) -> bool {
    let hash = user.password_hash.clone();
    let password = password.to_string();
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .unwrap_or(false)
}

/// Create and enter `user`'s home with their credentials, as a login-style
/// `su` or `sudo -i` does.
fn enter_home(ctx: &mut ProgramContext<'_>, user: &VirtualUser) {
    let mut fs = ctx.fs_mut().as_user(user.credentials());
    let _ = fs.mkdir(&user.home);
    let _ = fs.cd(&user.home);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_every_builtin_under_bin() {
        let mut registry = ProgramRegistry::new();
        register_builtins(&mut registry);
        assert_eq!(registry.len(), 37);
        for name in ["bash", "cat", "su", "sudo", "true", "false", "wc", "cpp", "uptime"] {
            let program = registry.get(&format!("/bin/{name}")).unwrap();
            assert_eq!(program.name(), name);
            assert!(!program.description().is_empty());
        }
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(join_path("/", "etc"), "/etc");
        assert_eq!(join_path("/home/guest", "a"), "/home/guest/a");
        assert_eq!(basename("/home/guest/notes.txt"), "notes.txt");
        assert_eq!(basename("/tmp/dir/"), "dir");
        assert_eq!(reprefix("cat: /x: Is a directory", "cat:", "head:"), "head: /x: Is a directory");
        assert_eq!(text_lines("a\r\nb\n"), vec!["a", "b", ""]);
        assert!(text_lines("").is_empty());
        assert!(is_option("-n") && !is_option("-") && !is_option("file"));
    }
}
