//! `uptime`

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;

use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `uptime [-p]`: time since boot and load averages.
#[derive(Debug, Clone, Copy, Default)]
pub struct UptimeCommand;

/// `1d 02:03` with days, `02:03:04` without.
fn format_duration_compact(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let minutes = (seconds % 3600) / 60;
    if days > 0 {
        format!("{days}d {hours:02}:{minutes:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{:02}", seconds % 60)
    }
}

/// Fake 1, 5 and 15 minute loads that drift slowly with uptime.
fn load_averages(seconds: u64, rng: &mut impl Rng) -> [f64; 3] {
    let base = seconds as f64 / 300.0;
    [
        0.12 + base.sin() * 0.1 + rng.gen_range(0.0..0.05),
        0.1 + (base / 2.0).cos() * 0.08 + rng.gen_range(0.0..0.04),
        0.08 + (base / 3.0).sin() * 0.06 + rng.gen_range(0.0..0.03),
    ]
    .map(|load| load.clamp(0.0, 4.0))
}

#[async_trait]
impl Program for UptimeCommand {
    fn name(&self) -> &str {
        "uptime"
    }

    fn description(&self) -> &str {
        "show how long the system has been running"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let mut pretty_only = false;
        for arg in ctx.args() {
            match arg.as_str() {
                "-p" | "--pretty" => pretty_only = true,
                other if other.starts_with('-') => {
                    let message = format!("uptime: invalid option -- '{other}'");
                    ctx.write(message);
                    return Ok(1);
                }
                _ => {}
            }
        }

        let now = ctx.now();
        let booted = ctx.shell().booted_at();
        let seconds = u64::try_from((now.with_timezone(&Utc) - booted).num_seconds()).unwrap_or(0);
        let pretty = format_duration_compact(seconds);
        if pretty_only {
            ctx.write(format!("up {pretty}"));
            return Ok(0);
        }

        let [load1, load5, load15] = load_averages(seconds, &mut rand::thread_rng());
        ctx.write(format!(
            "{} up {pretty},  1 user,  load average: {load1:.2}, {load5:.2}, {load15:.2}",
            now.format("%H:%M:%S")
        ));
        Ok(0)
    }
}
