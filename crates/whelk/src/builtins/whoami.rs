//! `whoami`

use async_trait::async_trait;

use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `whoami`: print the effective user name.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhoamiCommand;

#[async_trait]
impl Program for WhoamiCommand {
    fn name(&self) -> &str {
        "whoami"
    }

    fn description(&self) -> &str {
        "print current user"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let name = ctx.user().username.clone();
        ctx.write(name);
        Ok(0)
    }
}
