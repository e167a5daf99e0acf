//! `cd`

use async_trait::async_trait;

use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `cd [dir]`: change directory, home by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct CdCommand;

#[async_trait]
impl Program for CdCommand {
    fn name(&self) -> &str {
        "cd"
    }

    fn description(&self) -> &str {
        "change directory"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let target = match ctx.args().first() {
            Some(dir) => dir.clone(),
            None => ctx.user().home.clone(),
        };
        match ctx.cd(&target) {
            Ok(()) => Ok(0),
            Err(e) => {
                ctx.write(e.message());
                Ok(1)
            }
        }
    }
}
