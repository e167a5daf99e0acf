//! `kill`

use async_trait::async_trait;
use chrono::Utc;

use crate::program::{Program, ProgramError};
use crate::shell::{INIT_PID, ProcessState, ProgramContext, Signal};

/// `kill [-s SIG | -SIG] pid ...`: signal virtual processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct KillCommand;

const USAGE: &str = "kill: usage: kill [-s sigspec | -signum | -sigspec] pid";

#[async_trait]
impl Program for KillCommand {
    fn name(&self) -> &str {
        "kill"
    }

    fn description(&self) -> &str {
        "send a signal to a process"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let args = ctx.args().to_vec();
        if args.is_empty() {
            ctx.write(USAGE);
            return Ok(2);
        }

        let mut signal = Signal::Term;
        let mut targets: Vec<String> = Vec::new();
        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            if arg == "-l" || arg == "--list" {
                let names: Vec<&str> = Signal::ALL.iter().map(|s| s.name()).collect();
                ctx.write(names.join(" "));
                return Ok(0);
            }
            if arg == "-s" {
                let Some(spec) = args.get(i + 1) else {
                    ctx.write("kill: option requires an argument -- 's'");
                    return Ok(2);
                };
                let Some(parsed) = Signal::parse(spec) else {
                    ctx.write(format!("kill: invalid signal specification '{spec}'"));
                    return Ok(1);
                };
                signal = parsed;
                i += 2;
                continue;
            }
            if targets.is_empty() {
                if let Some(spec) = arg.strip_prefix('-') {
                    let Some(parsed) = Signal::parse(spec) else {
                        ctx.write(format!("kill: invalid signal specification '{arg}'"));
                        return Ok(1);
                    };
                    signal = parsed;
                    i += 1;
                    continue;
                }
            }
            targets.push(arg.clone());
            i += 1;
        }
        if targets.is_empty() {
            ctx.write(USAGE);
            return Ok(2);
        }

        let actor = ctx.user().clone();
        let shell_pid = ctx.shell().shell_pid();
        let mut code = 0;
        for raw in targets {
            let pid = match raw.parse::<u32>() {
                Ok(pid) if pid > 0 => pid,
                _ => {
                    ctx.write(format!("kill: {raw}: arguments must be process ids"));
                    code = 1;
                    continue;
                }
            };
            let owner = match ctx.shell().processes().get(pid) {
                Some(process) if process.state != ProcessState::Zombie => process.user.clone(),
                _ => {
                    ctx.write(format!("kill: ({pid}) - No such process"));
                    code = 1;
                    continue;
                }
            };
            let protected = pid == INIT_PID || pid == shell_pid;
            if protected || (!actor.is_root() && owner != actor.username) {
                ctx.write(format!("kill: ({pid}) - Operation not permitted"));
                code = 1;
                continue;
            }

            tracing::debug!(pid, signal = %signal, "delivering signal");
            let Some(process) = ctx.shell_mut().processes_mut().get_mut(pid) else {
                continue;
            };
            process.signal = Some(signal);
            match signal {
                Signal::Stop => {
                    process.state = ProcessState::Stopped;
                    process.ended_at = None;
                    process.exit_code = None;
                }
                Signal::Cont => process.state = ProcessState::Sleeping,
                other => {
                    process.state = ProcessState::Zombie;
                    process.exit_code = Some(other.exit_code().unwrap_or(128));
                    process.ended_at = Some(Utc::now());
                }
            }
        }
        Ok(code)
    }
}
