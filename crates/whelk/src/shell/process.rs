//! The virtual process table.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// pid of `init`.
pub const INIT_PID: u32 = 1;
/// pid of the login shell.
pub const LOGIN_SHELL_PID: u32 = 2;
/// First pid handed out to commands and nested shells.
pub const FIRST_DYNAMIC_PID: u32 = 100;
/// Terminated dynamic processes kept for `ps`.
pub const PROCESS_HISTORY_LIMIT: usize = 64;

/// Scheduler state, rendered as the `ps` STAT letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessState {
    /// `R`
    Running,
    /// `S`
    Sleeping,
    /// `T`
    Stopped,
    /// `Z`
    Zombie,
}

impl ProcessState {
    /// The STAT letter.
    pub fn code(self) -> char {
        match self {
            ProcessState::Running => 'R',
            ProcessState::Sleeping => 'S',
            ProcessState::Stopped => 'T',
            ProcessState::Zombie => 'Z',
        }
    }
}

/// Signals understood by `kill`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Signal {
    /// 1
    Hup,
    /// 2
    Int,
    /// 3
    Quit,
    /// 9
    Kill,
    /// 10
    Usr1,
    /// 12
    Usr2,
    /// 15
    Term,
    /// 18
    Cont,
    /// 19
    Stop,
}

impl Signal {
    /// In `kill -l` order.
    pub const ALL: [Signal; 9] = [
        Signal::Hup,
        Signal::Int,
        Signal::Quit,
        Signal::Kill,
        Signal::Term,
        Signal::Stop,
        Signal::Cont,
        Signal::Usr1,
        Signal::Usr2,
    ];

    /// Signal number.
    pub fn number(self) -> i32 {
        match self {
            Signal::Hup => 1,
            Signal::Int => 2,
            Signal::Quit => 3,
            Signal::Kill => 9,
            Signal::Usr1 => 10,
            Signal::Usr2 => 12,
            Signal::Term => 15,
            Signal::Cont => 18,
            Signal::Stop => 19,
        }
    }

    /// Name without the `SIG` prefix.
    pub fn name(self) -> &'static str {
        match self {
            Signal::Hup => "HUP",
            Signal::Int => "INT",
            Signal::Quit => "QUIT",
            Signal::Kill => "KILL",
            Signal::Usr1 => "USR1",
            Signal::Usr2 => "USR2",
            Signal::Term => "TERM",
            Signal::Cont => "CONT",
            Signal::Stop => "STOP",
        }
    }

    /// Parse `9`, `KILL`, `sigkill` and the like.
    pub fn parse(spec: &str) -> Option<Signal> {
        let upper = spec.to_ascii_uppercase();
        let name = upper.strip_prefix("SIG").unwrap_or(&upper);
        Signal::ALL
            .into_iter()
            .find(|s| s.name() == name || s.number().to_string() == name)
    }

    /// Exit code of a process terminated by this signal; `None` for the
    /// job-control signals that do not terminate.
    pub fn exit_code(self) -> Option<i32> {
        match self {
            Signal::Cont | Signal::Stop => None,
            other => Some(128 + other.number()),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One row of the process table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualProcess {
    /// Process id.
    pub pid: u32,
    /// Parent process id.
    pub ppid: u32,
    /// Owning username.
    pub user: String,
    /// Command line.
    pub command: String,
    /// Current state.
    pub state: ProcessState,
    /// Creation time.
    pub started_at: DateTime<Utc>,
    /// Termination time.
    pub ended_at: Option<DateTime<Utc>>,
    /// Exit code once terminated.
    pub exit_code: Option<i32>,
    /// Last signal delivered.
    pub signal: Option<Signal>,
}

impl VirtualProcess {
    /// CPU-less elapsed time as `MM:SS`, up to termination if ended.
    pub fn elapsed(&self, now: DateTime<Utc>) -> String {
        let end = self.ended_at.unwrap_or(now);
        let seconds = (end - self.started_at).num_seconds().max(0);
        format!("{:02}:{:02}", seconds / 60, seconds % 60)
    }
}

/// All processes, keyed by pid.
#[derive(Debug, Clone)]
pub struct ProcessTable {
    processes: BTreeMap<u32, VirtualProcess>,
    next_pid: u32,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable {
    /// An empty table.
    pub fn new() -> Self {
        Self {
            processes: BTreeMap::new(),
            next_pid: FIRST_DYNAMIC_PID,
        }
    }

    /// Reset to `init` (pid 1, root) and the login shell (pid 2, `user`).
    pub fn boot(&mut self, init_command: &str, shell_user: &str, shell_command: &str) {
        self.processes.clear();
        self.next_pid = FIRST_DYNAMIC_PID;
        let now = Utc::now();
        for (pid, ppid, user, command) in [
            (INIT_PID, 0, "root", init_command),
            (LOGIN_SHELL_PID, INIT_PID, shell_user, shell_command),
        ] {
            self.processes.insert(
                pid,
                VirtualProcess {
                    pid,
                    ppid,
                    user: user.to_string(),
                    command: command.to_string(),
                    state: ProcessState::Sleeping,
                    started_at: now,
                    ended_at: None,
                    exit_code: None,
                    signal: None,
                },
            );
        }
    }

    /// Allocate the next pid for a new process.
    pub fn spawn(&mut self, ppid: u32, user: &str, command: &str, state: ProcessState) -> u32 {
        let pid = self.next_pid;
        self.next_pid += 1;
        self.processes.insert(
            pid,
            VirtualProcess {
                pid,
                ppid,
                user: user.to_string(),
                command: command.to_string(),
                state,
                started_at: Utc::now(),
                ended_at: None,
                exit_code: None,
                signal: None,
            },
        );
        pid
    }

    /// Mark `pid` terminated (or stopped) with the given outcome.
    pub fn finish(
        &mut self,
        pid: u32,
        state: ProcessState,
        exit_code: i32,
        signal: Option<Signal>,
    ) {
        if let Some(process) = self.processes.get_mut(&pid) {
            process.state = state;
            process.ended_at = Some(Utc::now());
            process.exit_code = Some(exit_code);
            process.signal = signal;
        }
    }

    /// Drop the oldest terminated dynamic processes beyond
    /// [`PROCESS_HISTORY_LIMIT`]. Pids in `protected` are never dropped.
    pub fn prune(&mut self, protected: &[u32]) {
        let mut finished: Vec<(DateTime<Utc>, u32)> = self
            .processes
            .values()
            .filter(|p| {
                p.pid >= FIRST_DYNAMIC_PID
                    && p.state == ProcessState::Zombie
                    && !protected.contains(&p.pid)
            })
            .map(|p| (p.ended_at.unwrap_or(p.started_at), p.pid))
            .collect();
        if finished.len() <= PROCESS_HISTORY_LIMIT {
            return;
        }
        finished.sort();
        let excess = finished.len() - PROCESS_HISTORY_LIMIT;
        for (_, pid) in finished.into_iter().take(excess) {
            self.processes.remove(&pid);
        }
    }

    /// Look up a process.
    pub fn get(&self, pid: u32) -> Option<&VirtualProcess> {
        self.processes.get(&pid)
    }

    /// Look up a process for modification.
    pub fn get_mut(&mut self, pid: u32) -> Option<&mut VirtualProcess> {
        self.processes.get_mut(&pid)
    }

    /// Processes in pid order.
    pub fn iter(&self) -> impl Iterator<Item = &VirtualProcess> {
        self.processes.values()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_rows() {
        let mut table = ProcessTable::new();
        table.boot("/sbin/init", "guest", "/bin/bash");
        assert_eq!(table.len(), 2);
        let init = table.get(INIT_PID).unwrap();
        assert_eq!((init.ppid, init.user.as_str()), (0, "root"));
        assert_eq!(table.get(LOGIN_SHELL_PID).unwrap().state, ProcessState::Sleeping);
        assert_eq!(table.spawn(2, "guest", "ls", ProcessState::Running), FIRST_DYNAMIC_PID);
    }

    #[test]
    fn test_signal_parsing() {
        assert_eq!(Signal::parse("9"), Some(Signal::Kill));
        assert_eq!(Signal::parse("SIGTERM"), Some(Signal::Term));
        assert_eq!(Signal::parse("sigstop"), Some(Signal::Stop));
        assert_eq!(Signal::parse("usr2"), Some(Signal::Usr2));
        assert_eq!(Signal::parse("7"), None);
        assert_eq!(Signal::parse("BOGUS"), None);

        assert_eq!(Signal::Kill.exit_code(), Some(137));
        assert_eq!(Signal::Term.exit_code(), Some(143));
        assert_eq!(Signal::Usr2.exit_code(), Some(140));
        assert_eq!(Signal::Stop.exit_code(), None);
    }

    #[test]
    fn test_prune_keeps_recent_history() {
        let mut table = ProcessTable::new();
        table.boot("/sbin/init", "guest", "/bin/bash");
        let mut pids = Vec::new();
        for i in 0..(PROCESS_HISTORY_LIMIT + 6) {
            let pid = table.spawn(2, "guest", &format!("cmd{i}"), ProcessState::Running);
            table.finish(pid, ProcessState::Zombie, 0, None);
            pids.push(pid);
        }
        let running = table.spawn(2, "guest", "sleep", ProcessState::Running);

        table.prune(&[pids[0]]);
        assert!(table.get(pids[0]).is_some(), "protected pid survives");
        assert!(table.get(running).is_some());
        assert!(table.get(INIT_PID).is_some());

        let zombies = table
            .iter()
            .filter(|p| p.state == ProcessState::Zombie && p.pid != pids[0])
            .count();
        assert_eq!(zombies, PROCESS_HISTORY_LIMIT);
        assert!(table.get(*pids.last().unwrap()).is_some());
    }

    #[test]
    fn test_elapsed_format() {
        let mut table = ProcessTable::new();
        let pid = table.spawn(2, "guest", "x", ProcessState::Running);
        let process = table.get(pid).unwrap().clone();
        let later = process.started_at + chrono::Duration::seconds(125);
        assert_eq!(process.elapsed(later), "02:05");
    }
}
