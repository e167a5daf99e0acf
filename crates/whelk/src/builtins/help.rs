//! `help`

use async_trait::async_trait;

use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `help [name]`: list the commands on `$PATH`, or describe one.
#[derive(Debug, Clone, Copy, Default)]
pub struct HelpCommand;

#[async_trait]
impl Program for HelpCommand {
    fn name(&self) -> &str {
        "help"
    }

    fn description(&self) -> &str {
        "show available commands"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let executables = ctx.list_executables();
        let query = ctx
            .args()
            .first()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());

        if let Some(query) = query {
            let Some(entry) = executables.into_iter().find(|e| e.name == query) else {
                ctx.write(format!("help: no help topics match '{query}'"));
                return Ok(1);
            };
            ctx.write(format!("{} - {}", entry.name, entry.description));
            ctx.write(format!("  path: {}", entry.path));
            return Ok(0);
        }

        ctx.write("commands in $PATH:");
        for entry in executables {
            ctx.write(format!(
                "  {:<12} {} ({})",
                entry.name, entry.description, entry.path
            ));
        }
        Ok(0)
    }
}
