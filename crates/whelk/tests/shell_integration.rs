//! Integration tests against the public API.
//!
//! These cover the host-facing surface:
//! - Custom programs registered through the builder
//! - Machine identity from configuration
//! - File-backed persistence across restarts
//! - Full-screen programs through the bridge
//! - Credential restore when nested programs fail

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use async_trait::async_trait;
use whelk::persist::TieredStore;
use whelk::{
    BufferedTerminal, Program, ProgramContext, ProgramError, RunOptions, Shell, SystemConfig,
    TuiProgram,
};

fn terminal() -> Arc<BufferedTerminal> {
    Arc::new(BufferedTerminal::new())
}

#[derive(Debug)]
struct ShoutCommand;

#[async_trait]
impl Program for ShoutCommand {
    fn name(&self) -> &str {
        "shout"
    }

    fn description(&self) -> &str {
        "upper-case stdin or arguments"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let text = if ctx.args().is_empty() {
            ctx.stdin().to_string()
        } else {
            ctx.args().join(" ")
        };
        ctx.write(text.to_uppercase());
        Ok(0)
    }
}

#[derive(Debug)]
struct AsRootCommand;

#[async_trait]
impl Program for AsRootCommand {
    fn name(&self) -> &str {
        "asroot"
    }

    fn description(&self) -> &str {
        "run a command as root without asking"
    }

    fn show_in_help(&self) -> bool {
        false
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let root = ctx
            .shell()
            .users()
            .get("root")
            .cloned()
            .ok_or_else(|| ProgramError::Failed("no root account".to_string()))?;
        let argv = ctx.args().to_vec();
        let (ok, output) = ctx
            .run_argv(
                argv,
                RunOptions {
                    as_user: Some(root),
                    capture: true,
                    ..RunOptions::default()
                },
            )
            .await;
        ctx.write(format!("[{output}]"));
        Ok(if ok { 0 } else { 1 })
    }
}

#[derive(Debug)]
struct Banner;

impl TuiProgram for Banner {
    fn title(&self) -> &str {
        "banner"
    }

    fn render(&mut self, width: u16, _height: u16) -> Vec<String> {
        vec![format!("banner {width}")]
    }

    fn handle_key(&mut self, _key: &str) -> bool {
        false
    }
}

#[derive(Debug)]
struct BannerCommand;

#[async_trait]
impl Program for BannerCommand {
    fn name(&self) -> &str {
        "banner"
    }

    fn description(&self) -> &str {
        "full-screen banner"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        ctx.run_tui(&mut Banner).await;
        Ok(0)
    }
}

#[derive(Debug)]
struct PanicCommand;

#[async_trait]
impl Program for PanicCommand {
    fn name(&self) -> &str {
        "boom"
    }

    fn description(&self) -> &str {
        "always panics"
    }

    async fn run(&self, _ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        panic!("kaboom")
    }
}

#[derive(Debug)]
struct FailCommand;

#[async_trait]
impl Program for FailCommand {
    fn name(&self) -> &str {
        "fail"
    }

    fn description(&self) -> &str {
        "always returns an error"
    }

    async fn run(&self, _ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        Err(ProgramError::Failed("refused".to_string()))
    }
}

/// Runs its arguments as root, then reports what the caller's
/// filesystem view looks like afterwards.
#[derive(Debug)]
struct RootThenCheckCommand;

#[async_trait]
impl Program for RootThenCheckCommand {
    fn name(&self) -> &str {
        "rootcheck"
    }

    fn description(&self) -> &str {
        "run as root, then check the caller's credentials"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let root = ctx
            .shell()
            .users()
            .get("root")
            .cloned()
            .ok_or_else(|| ProgramError::Failed("no root account".to_string()))?;
        let argv = ctx.args().to_vec();
        let options = RunOptions {
            as_user: Some(root),
            capture: true,
            ..RunOptions::default()
        };
        let (ok, _) = ctx.run_argv(argv, options).await;
        let restored = ctx.fs().credentials() == ctx.user().credentials();
        let root_readable = ctx.read_file("/root/secret").is_ok();
        ctx.write(format!(
            "nested_ok={ok} restored={restored} root_readable={root_readable}"
        ));
        Ok(0)
    }
}

// =============================================================================
// Custom programs
// =============================================================================

mod custom_programs {
    use super::*;

    #[tokio::test]
    async fn test_registered_program_is_installed_and_listed() {
        let term = terminal();
        let mut shell = Shell::builder()
            .bridge(term.clone())
            .program(Arc::new(ShoutCommand))
            .program(Arc::new(AsRootCommand))
            .build()
            .expect("boot");

        assert!(shell.fs().is_executable("/usr/local/bin/shout"));
        assert_eq!(shell.resolve("shout").unwrap(), "/usr/local/bin/shout");

        assert!(shell.execute("echo quiet | shout").await);
        assert!(shell.execute("shout loud words").await);
        assert_eq!(term.take_lines(), vec!["QUIET", "LOUD WORDS"]);

        let names: Vec<String> = shell
            .list_executables()
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert!(names.contains(&"shout".to_string()));
        assert!(!names.contains(&"asroot".to_string()));
        assert_eq!(shell.complete_command("sho"), vec!["shout"]);
    }

    #[tokio::test]
    async fn test_program_can_run_nested_command_as_another_user() {
        let term = terminal();
        let mut shell = Shell::builder()
            .bridge(term.clone())
            .program(Arc::new(AsRootCommand))
            .build()
            .expect("boot");

        assert!(shell.execute("asroot whoami").await);
        assert_eq!(term.take_lines(), vec!["[root]"]);
        assert_eq!(shell.active_user().username, "guest");

        assert!(shell.execute("asroot touch /root/made").await);
        assert!(!shell.fs().exists("/root/made"));
        shell.fs_mut().set_credentials(whelk::vfs::Credentials::ROOT);
        assert!(shell.fs().exists("/root/made"));
    }

    #[tokio::test]
    async fn test_panicking_program_is_contained() {
        let term = terminal();
        let mut shell = Shell::builder()
            .bridge(term.clone())
            .program(Arc::new(PanicCommand))
            .build()
            .expect("boot");

        assert!(!shell.execute("boom").await);
        assert_eq!(term.take_lines(), vec!["boom: program failed: kaboom"]);
        assert!(shell.execute("echo still alive").await);
        assert_eq!(term.take_lines(), vec!["still alive"]);
    }

    #[tokio::test]
    async fn test_credentials_restored_when_root_program_fails() {
        let term = terminal();
        let mut shell = Shell::builder()
            .bridge(term.clone())
            .program(Arc::new(PanicCommand))
            .program(Arc::new(FailCommand))
            .program(Arc::new(RootThenCheckCommand))
            .build()
            .expect("boot");
        let guest = shell.active_user().credentials();

        for line in ["rootcheck boom", "rootcheck fail", "rootcheck whoami"] {
            assert!(shell.execute(line).await, "{line}");
            assert_eq!(shell.fs().credentials(), guest, "{line}");
        }
        assert_eq!(
            term.take_lines(),
            vec![
                "nested_ok=false restored=true root_readable=false",
                "nested_ok=false restored=true root_readable=false",
                "nested_ok=true restored=true root_readable=false",
            ]
        );

        shell.execute("cat /root/secret").await;
        assert_eq!(
            term.take_lines(),
            vec!["cat: /root/secret: Permission denied"]
        );
    }

    #[tokio::test]
    async fn test_credentials_restored_when_sudo_target_panics() {
        let term = terminal();
        let mut shell = Shell::builder()
            .bridge(term.clone())
            .program(Arc::new(PanicCommand))
            .build()
            .expect("boot");
        let guest = shell.active_user().credentials();

        shell.execute("echo guest | sudo -S boom").await;
        assert!(
            term.take_lines()
                .contains(&"boom: program failed: kaboom".to_string())
        );
        assert_eq!(shell.fs().credentials(), guest);
        assert!(shell.fs().read_file("/root/secret").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_command_does_not_leak_credentials() {
        let term = terminal();
        let mut shell = Shell::builder()
            .bridge(term.clone())
            .program(Arc::new(AsRootCommand))
            .build()
            .expect("boot");

        let dropped = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            shell.execute("asroot sleep 60"),
        )
        .await;
        assert!(dropped.is_err());

        term.take_lines();
        shell.execute("cat /root/secret").await;
        assert_eq!(
            term.take_lines(),
            vec!["cat: /root/secret: Permission denied"]
        );
        assert_eq!(
            shell.fs().credentials(),
            shell.active_user().credentials()
        );
    }

    #[tokio::test]
    async fn test_tui_program_renders_through_bridge() {
        let term = terminal();
        let mut shell = Shell::builder()
            .bridge(term.clone())
            .program(Arc::new(BannerCommand))
            .build()
            .expect("boot");

        assert!(shell.execute("banner").await);
        assert_eq!(term.take_lines(), vec!["banner 80"]);
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod configuration {
    use super::*;

    #[tokio::test]
    async fn test_machine_identity_from_config() {
        let system: SystemConfig =
            serde_json::from_str(r#"{"hostName": "lab", "machine": "aarch64"}"#).unwrap();
        let term = terminal();
        let mut shell = Shell::builder()
            .bridge(term.clone())
            .system(system)
            .build()
            .expect("boot");

        assert_eq!(shell.prompt(), "guest@lab:~$ ");
        assert!(shell.execute("uname -n -m").await);
        assert!(shell.execute("cat /etc/hostname").await);
        assert_eq!(term.take_lines(), vec!["lab aarch64", "lab"]);
    }
}

// =============================================================================
// Persistence
// =============================================================================

mod persistence {
    use super::*;

    #[tokio::test]
    async fn test_file_backed_state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();

        let mut first = Shell::builder()
            .bridge(terminal())
            .store(TieredStore::with_file_backing(dir.path()))
            .build()
            .expect("boot");
        assert!(!first.was_restored());
        assert!(first.execute("mkdir /tmp/keep").await);
        assert!(first.execute("echo saved > /tmp/keep/note").await);
        assert!(first.execute("chmod 600 /tmp/keep/note").await);
        drop(first);

        // A fresh volatile tier forces the restore to come from disk.
        let mut second = Shell::builder()
            .bridge(terminal())
            .store(TieredStore::with_file_backing(dir.path()))
            .build()
            .expect("boot");
        assert!(second.was_restored());
        assert_eq!(second.fs().read_file("/tmp/keep/note").unwrap(), "saved");
        assert_eq!(second.fs().stat("/tmp/keep/note").unwrap().mode, 0o600);
        assert!(second.fs().is_executable("/bin/ls"));

        let (ok, out) = second.execute_captured("cat /tmp/keep/note").await;
        assert!(ok);
        assert_eq!(out, "saved");
    }

    #[tokio::test]
    async fn test_corrupt_state_falls_back_to_seed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("whelk_shell-state_v1.json"), "{not json").unwrap();

        let shell = Shell::builder()
            .bridge(terminal())
            .store(TieredStore::with_file_backing(dir.path()))
            .build()
            .expect("boot");
        assert!(!shell.was_restored());
        assert!(shell.fs().exists("/home/guest/readme.txt"));
    }
}
