//! `which`

use async_trait::async_trait;

use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `which [-a] name ...`: show where commands resolve on `$PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhichCommand;

#[async_trait]
impl Program for WhichCommand {
    fn name(&self) -> &str {
        "which"
    }

    fn description(&self) -> &str {
        "show command path from $PATH"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let show_all = ctx.args().iter().any(|a| a == "-a");
        let names: Vec<String> = ctx.args().iter().filter(|a| *a != "-a").cloned().collect();
        if names.is_empty() {
            ctx.write("which: missing command name");
            return Ok(1);
        }

        let mut code = 0;
        for name in names {
            let matches = ctx.resolve_all(&name);
            if matches.is_empty() {
                code = 1;
                continue;
            }
            let shown = if show_all { matches.len() } else { 1 };
            for path in matches.into_iter().take(shown) {
                ctx.write(path);
            }
        }
        Ok(code)
    }
}
