//! `sleep`

use std::time::Duration;

use async_trait::async_trait;

use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `sleep NUMBER[smhd] ...`: pause for the summed duration. Interruptible.
#[derive(Debug, Clone, Copy, Default)]
pub struct SleepCommand;

/// Parse `1.5`, `2m`, `1h` and the like into seconds.
fn parse_interval(text: &str) -> Option<f64> {
    let (number, scale) = match text.chars().last()? {
        's' => (&text[..text.len() - 1], 1.0),
        'm' => (&text[..text.len() - 1], 60.0),
        'h' => (&text[..text.len() - 1], 3600.0),
        'd' => (&text[..text.len() - 1], 86400.0),
        _ => (text, 1.0),
    };
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    let value: f64 = number.parse().ok()?;
    value.is_finite().then_some(value * scale)
}

#[async_trait]
impl Program for SleepCommand {
    fn name(&self) -> &str {
        "sleep"
    }

    fn description(&self) -> &str {
        "delay for a specified amount of time"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let args = ctx.args().to_vec();
        if args.is_empty() {
            ctx.write("sleep: missing operand");
            return Ok(1);
        }
        let mut seconds = 0.0;
        for arg in &args {
            match parse_interval(arg) {
                Some(value) => seconds += value,
                None => {
                    ctx.write(format!("sleep: invalid time interval '{arg}'"));
                    return Ok(1);
                }
            }
        }

        let Ok(duration) = Duration::try_from_secs_f64(seconds) else {
            ctx.write("sleep: invalid time interval");
            return Ok(1);
        };
        match ctx.sleep(duration).await {
            Ok(()) => Ok(0),
            Err(ProgramError::Cancelled) => Ok(130),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("2"), Some(2.0));
        assert_eq!(parse_interval("0.5s"), Some(0.5));
        assert_eq!(parse_interval("2m"), Some(120.0));
        assert_eq!(parse_interval("1h"), Some(3600.0));
        assert_eq!(parse_interval("1d"), Some(86400.0));
        assert_eq!(parse_interval("x"), None);
        assert_eq!(parse_interval("s"), None);
        assert_eq!(parse_interval("-1"), None);
    }
}
