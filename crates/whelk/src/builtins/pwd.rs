//! `pwd`

use async_trait::async_trait;

use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `pwd [-L|-P]`: print the working directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct PwdCommand;

#[async_trait]
impl Program for PwdCommand {
    fn name(&self) -> &str {
        "pwd"
    }

    fn description(&self) -> &str {
        "print working directory"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        // There are no symlinks, so logical and physical agree.
        let invalid = ctx
            .args()
            .iter()
            .find(|arg| !matches!(arg.as_str(), "-L" | "--logical" | "-P" | "--physical"))
            .cloned();
        if let Some(arg) = invalid {
            ctx.write(format!("pwd: invalid option: {arg}"));
            return Ok(1);
        }
        let cwd = ctx.cwd();
        ctx.write(cwd);
        Ok(0)
    }
}
