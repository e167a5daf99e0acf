//! `clear`

use async_trait::async_trait;

use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `clear`: wipe the terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClearCommand;

#[async_trait]
impl Program for ClearCommand {
    fn name(&self) -> &str {
        "clear"
    }

    fn description(&self) -> &str {
        "clear terminal output"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        ctx.clear();
        Ok(0)
    }
}
