//! `hostname`

use async_trait::async_trait;

use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `hostname [name]`: show the host name, or set it as root.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostnameCommand;

fn is_valid_hostname(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_alphanumeric()
        && name.len() <= 63
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

#[async_trait]
impl Program for HostnameCommand {
    fn name(&self) -> &str {
        "hostname"
    }

    fn description(&self) -> &str {
        "show or set system hostname"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let args = ctx.args().to_vec();
        match args.as_slice() {
            [] => {}
            [flag] if matches!(flag.as_str(), "-s" | "--short" | "-f" | "--fqdn") => {}
            [name] => {
                if !ctx.user().is_root() {
                    ctx.write("hostname: you must be root to change the host name");
                    return Ok(1);
                }
                if !is_valid_hostname(name) {
                    ctx.write(format!("hostname: invalid hostname '{name}'"));
                    return Ok(1);
                }
                ctx.shell_mut().set_host_name(name);
                return Ok(0);
            }
            _ => {
                ctx.write("usage: hostname [name]");
                return Ok(1);
            }
        }
        let host = ctx.host().to_string();
        ctx.write(host);
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname_validation() {
        assert!(is_valid_hostname("lab-01.local"));
        assert!(!is_valid_hostname("-lab"));
        assert!(!is_valid_hostname(""));
        assert!(!is_valid_hostname("bad_name"));
        assert!(!is_valid_hostname(&"a".repeat(64)));
    }
}
