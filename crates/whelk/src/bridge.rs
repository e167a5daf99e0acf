//! The host terminal as seen from inside the engine.
//!
//! A [`TerminalBridge`] is whatever renders output and collects secrets:
//! a real terminal in the CLI, a browser widget elsewhere, or a
//! [`BufferedTerminal`] in tests.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A full-screen program driven by the host.
pub trait TuiProgram: Send {
    /// Window title.
    fn title(&self) -> &str;

    /// Render one frame as text rows.
    fn render(&mut self, width: u16, height: u16) -> Vec<String>;

    /// Feed one key; return `false` once the program is done.
    fn handle_key(&mut self, key: &str) -> bool;
}

/// Output, secret input and session control provided by the host.
#[async_trait]
pub trait TerminalBridge: Send + Sync {
    /// Write one line.
    fn println(&self, text: &str);

    /// Clear the screen.
    fn clear(&self);

    /// Prompt for input without echo. `None` means the prompt was aborted.
    async fn read_secret(&self, prompt: &str) -> Option<String>;

    /// End the whole session, e.g. after `logout`.
    fn disconnect(&self, message: &str);

    /// Hand the screen to `program` until it finishes or `cancel` fires.
    ///
    /// Line-oriented hosts have no key loop; the default renders a single
    /// 80x24 frame and returns.
    async fn run_tui(&self, program: &mut dyn TuiProgram, cancel: CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }
        for row in program.render(80, 24) {
            self.println(&row);
        }
    }
}

#[derive(Debug, Default)]
struct BufferedState {
    lines: Vec<String>,
    prompts: Vec<String>,
    secrets: VecDeque<String>,
    clears: usize,
    disconnected: Option<String>,
}

/// An in-memory terminal that records everything written to it and
/// answers secret prompts from a queue.
#[derive(Debug, Default)]
pub struct BufferedTerminal {
    state: Mutex<BufferedState>,
}

impl BufferedTerminal {
    /// An empty terminal with no queued secrets.
    pub fn new() -> Self {
        Self::default()
    }

    /// A terminal that answers the next prompts with `secrets`, in order.
    pub fn with_secrets<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let terminal = Self::new();
        for secret in secrets {
            terminal.push_secret(secret);
        }
        terminal
    }

    fn lock(&self) -> MutexGuard<'_, BufferedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an answer for the next secret prompt.
    pub fn push_secret(&self, secret: impl Into<String>) {
        self.lock().secrets.push_back(secret.into());
    }

    /// Every line written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lock().lines.clone()
    }

    /// Drain the written lines.
    pub fn take_lines(&self) -> Vec<String> {
        std::mem::take(&mut self.lock().lines)
    }

    /// Written lines joined with `\n`.
    pub fn output(&self) -> String {
        self.lock().lines.join("\n")
    }

    /// Prompts shown by `read_secret`.
    pub fn prompts(&self) -> Vec<String> {
        self.lock().prompts.clone()
    }

    /// How many times the screen was cleared.
    pub fn clear_count(&self) -> usize {
        self.lock().clears
    }

    /// The disconnect message, once the session has ended.
    pub fn disconnected(&self) -> Option<String> {
        self.lock().disconnected.clone()
    }
}

#[async_trait]
impl TerminalBridge for BufferedTerminal {
    fn println(&self, text: &str) {
        self.lock().lines.push(text.to_string());
    }

    fn clear(&self) {
        let mut state = self.lock();
        state.lines.clear();
        state.clears += 1;
    }

    async fn read_secret(&self, prompt: &str) -> Option<String> {
        let mut state = self.lock();
        state.prompts.push(prompt.to_string());
        state.secrets.pop_front()
    }

    fn disconnect(&self, message: &str) {
        self.lock().disconnected = Some(message.to_string());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Banner;

    impl TuiProgram for Banner {
        fn title(&self) -> &str {
            "banner"
        }

        fn render(&mut self, width: u16, height: u16) -> Vec<String> {
            vec![format!("{width}x{height}")]
        }

        fn handle_key(&mut self, _key: &str) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_buffered_terminal_records() {
        let terminal = BufferedTerminal::with_secrets(["s3cret"]);
        terminal.println("one");
        terminal.println("two");
        assert_eq!(terminal.output(), "one\ntwo");

        assert_eq!(terminal.read_secret("Password: ").await.as_deref(), Some("s3cret"));
        assert_eq!(terminal.read_secret("Password: ").await, None);
        assert_eq!(terminal.prompts(), vec!["Password: ", "Password: "]);

        terminal.clear();
        assert!(terminal.lines().is_empty());
        assert_eq!(terminal.clear_count(), 1);

        terminal.disconnect("bye");
        assert_eq!(terminal.disconnected().as_deref(), Some("bye"));
    }

    #[tokio::test]
    async fn test_default_tui_renders_one_frame() {
        let terminal = BufferedTerminal::new();
        let mut banner = Banner;
        terminal.run_tui(&mut banner, CancellationToken::new()).await;
        assert_eq!(terminal.take_lines(), vec!["80x24"]);

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        terminal.run_tui(&mut banner, cancelled).await;
        assert!(terminal.lines().is_empty());
    }
}
