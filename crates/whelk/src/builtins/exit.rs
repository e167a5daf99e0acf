//! `exit`

use async_trait::async_trait;

use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `exit [N]`: leave the innermost shell, or hang up from the login shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitCommand;

/// `N` wrapped into 0..=255, or `None` when it is not an integer.
fn exit_status(raw: &str) -> Option<i32> {
    let digits = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    // Arbitrarily long operands still wrap like the low byte would.
    let magnitude = digits
        .chars()
        .fold(0i64, |acc, c| (acc * 10 + i64::from(c as u8 - b'0')) % 256);
    let signed = if raw.starts_with('-') { -magnitude } else { magnitude };
    Some(((signed % 256 + 256) % 256) as i32)
}

#[async_trait]
impl Program for ExitCommand {
    fn name(&self) -> &str {
        "exit"
    }

    fn description(&self) -> &str {
        "exit the shell"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let args = ctx.args().to_vec();
        if args.len() > 1 {
            ctx.write("exit: too many arguments");
            return Ok(1);
        }
        let code = match args.first() {
            None => 0,
            Some(raw) => match exit_status(raw) {
                Some(code) => code,
                None => {
                    ctx.write(format!("exit: {raw}: numeric argument required"));
                    2
                }
            },
        };

        ctx.write("exit");
        if ctx.shell_mut().exit_session(code).is_err() {
            ctx.write("logout");
            let message = format!("Connection to {} closed.", ctx.host());
            ctx.disconnect(&message);
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_wraps() {
        assert_eq!(exit_status("0"), Some(0));
        assert_eq!(exit_status("3"), Some(3));
        assert_eq!(exit_status("256"), Some(0));
        assert_eq!(exit_status("-1"), Some(255));
        assert_eq!(exit_status("+7"), Some(7));
        assert_eq!(exit_status("99999999999999999999"), Some(255));
        assert_eq!(exit_status("abc"), None);
        assert_eq!(exit_status("-"), None);
    }
}
