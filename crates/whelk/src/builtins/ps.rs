//! `ps`

use async_trait::async_trait;
use chrono::{Local, Utc};

use crate::program::{Program, ProgramError};
use crate::shell::{INIT_PID, LOGIN_SHELL_PID, ProcessState, ProgramContext, VirtualProcess};

/// `ps [-efax]`: report the virtual process table.
#[derive(Debug, Clone, Copy, Default)]
pub struct PsCommand;

const ANSI_RESET: &str = "\x1b[0m";
const ANSI_BOLD_CYAN: &str = "\x1b[1;36m";
const ANSI_BOLD_GREEN: &str = "\x1b[1;32m";
const ANSI_BOLD_YELLOW: &str = "\x1b[1;33m";
const ANSI_DIM_RED: &str = "\x1b[2;31m";

const HEADER: &str = "  PID TTY          STAT   TIME COMMAND";
const FULL_HEADER: &str = "UID        PID  PPID C STIME TTY          TIME CMD";

fn tty(process: &VirtualProcess) -> &'static str {
    if process.pid <= INIT_PID { "?" } else { "pts/0" }
}

fn short_line(process: &VirtualProcess, time: &str) -> String {
    format!(
        "{:>5} {:<12} {:<4} {:>6} {}",
        process.pid,
        tty(process),
        process.state.code(),
        time,
        process.command
    )
}

fn full_line(process: &VirtualProcess, time: &str) -> String {
    let start = process.started_at.with_timezone(&Local).format("%H:%M");
    let cpu = if process.state == ProcessState::Running { 1 } else { 0 };
    format!(
        "{:<8} {:>5} {:>5} {cpu} {start} {:<8} {:>8} {}",
        process.user,
        process.pid,
        process.ppid,
        tty(process),
        time,
        process.command
    )
}

fn state_color(state: ProcessState) -> Option<&'static str> {
    match state {
        ProcessState::Running => Some(ANSI_BOLD_GREEN),
        ProcessState::Stopped => Some(ANSI_BOLD_YELLOW),
        ProcessState::Zombie => Some(ANSI_DIM_RED),
        ProcessState::Sleeping => None,
    }
}

#[async_trait]
impl Program for PsCommand {
    fn name(&self) -> &str {
        "ps"
    }

    fn description(&self) -> &str {
        "report process status"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let mut show_all = false;
        let mut full = false;
        for arg in ctx.args().to_vec() {
            if super::is_option(&arg) {
                for flag in arg[1..].chars() {
                    match flag {
                        'e' | 'a' | 'x' => show_all = true,
                        'f' => full = true,
                        _ => {
                            ctx.write(format!("ps: invalid option -- '{flag}'"));
                            return Ok(1);
                        }
                    }
                }
            } else if !arg.is_empty() {
                ctx.write(format!("ps: unsupported operand '{arg}'"));
                return Ok(1);
            }
        }

        let username = ctx.user().username.clone();
        let now = Utc::now();
        let colorize = ctx.is_tty();
        let paint = |line: String, sgr: Option<&str>| match sgr {
            Some(sgr) if colorize => format!("{sgr}{line}{ANSI_RESET}"),
            _ => line,
        };

        let mut lines = vec![paint(
            if full { FULL_HEADER } else { HEADER }.to_string(),
            Some(ANSI_BOLD_CYAN),
        )];
        // The table is keyed by pid, so iteration is already sorted.
        for process in ctx.shell().processes().iter() {
            let visible = show_all
                || process.pid <= LOGIN_SHELL_PID
                || (process.user == username && process.state != ProcessState::Zombie);
            if !visible {
                continue;
            }
            let time = process.elapsed(now);
            let line = if full {
                full_line(process, &time)
            } else {
                short_line(process, &time)
            };
            lines.push(paint(line, state_color(process.state)));
        }
        for line in lines {
            ctx.write(line);
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(pid: u32, state: ProcessState) -> VirtualProcess {
        VirtualProcess {
            pid,
            ppid: 2,
            user: "guest".to_string(),
            command: "sleep 5".to_string(),
            state,
            started_at: Utc::now(),
            ended_at: None,
            exit_code: None,
            signal: None,
        }
    }

    #[test]
    fn test_short_line_layout() {
        let line = short_line(&process(104, ProcessState::Sleeping), "00:03");
        assert_eq!(line, "  104 pts/0        S     00:03 sleep 5");
        let init = short_line(&process(1, ProcessState::Sleeping), "00:00");
        assert!(init.starts_with("    1 ?            S"));
    }

    #[test]
    fn test_full_line_layout() {
        let line = full_line(&process(104, ProcessState::Running), "00:03");
        assert!(line.starts_with("guest      104     2 1 "));
        assert!(line.ends_with(" pts/0       00:03 sleep 5"));
    }
}
