//! Whelk CLI - run the shell emulator in a terminal
//!
//! Usage:
//!   whelk                     Interactive session on stdin/stdout
//!   whelk -c "ls -l /bin"     Run one command line and exit
//!   whelk --config sys.json   Boot with a custom machine identity

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use whelk::persist::TieredStore;
use whelk::{Shell, SystemConfig, TerminalBridge};

/// Whelk - an in-process multi-user shell emulator
#[derive(Parser, Debug)]
#[command(name = "whelk")]
#[command(about = "Multi-user POSIX-like shell running on a virtual filesystem")]
struct Args {
    /// Run a single command line and exit
    #[arg(short = 'c', long = "command")]
    command: Option<String>,

    /// JSON file overriding the machine identity
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the durable state
    #[arg(long, default_value = ".whelk")]
    state_dir: PathBuf,

    /// Discard stored state and seed a fresh machine
    #[arg(long)]
    reset: bool,

    /// Keep state in memory only
    #[arg(long)]
    no_persist: bool,
}

/// A line-oriented terminal on the process's stdin and stdout.
#[derive(Debug)]
struct StdioTerminal {
    input: Mutex<Lines<BufReader<Stdin>>>,
    closed: AtomicBool,
}

impl StdioTerminal {
    fn new() -> Self {
        Self {
            input: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
            closed: AtomicBool::new(false),
        }
    }

    async fn read_line(&self) -> Option<String> {
        match self.input.lock().await.next_line().await {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read stdin");
                None
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TerminalBridge for StdioTerminal {
    fn println(&self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{text}");
    }

    fn clear(&self) {
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "\x1b[2J\x1b[H");
        let _ = stdout.flush();
    }

    async fn read_secret(&self, prompt: &str) -> Option<String> {
        {
            let mut stdout = std::io::stdout().lock();
            let _ = write!(stdout, "{prompt}");
            let _ = stdout.flush();
        }
        self.read_line().await
    }

    fn disconnect(&self, message: &str) {
        self.closed.store(true, Ordering::SeqCst);
        eprintln!("{message}");
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<SystemConfig> {
    let Some(path) = path else {
        return Ok(SystemConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    let args = Args::parse();
    let system = load_config(args.config.as_ref())?;
    let store = if args.no_persist {
        TieredStore::in_memory()
    } else {
        TieredStore::with_file_backing(&args.state_dir)
    };

    let terminal = Arc::new(StdioTerminal::new());
    let mut shell = Shell::builder()
        .bridge(terminal.clone())
        .system(system)
        .store(store)
        .reset_storage(args.reset)
        .build()
        .context("failed to boot shell")?;

    if let Some(line) = args.command {
        let ok = shell.execute(&line).await;
        std::process::exit(if ok { 0 } else { 1 });
    }

    let interrupt = shell.interrupt_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            interrupt.interrupt();
        }
    });

    while shell.is_connected() && !terminal.is_closed() {
        {
            let mut stdout = std::io::stdout().lock();
            let _ = write!(stdout, "{}", shell.prompt());
            let _ = stdout.flush();
        }
        let Some(line) = terminal.read_line().await else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        shell.execute(&line).await;
    }
    shell.persist();
    Ok(())
}
