//! `cpp`

use async_trait::async_trait;

use crate::program::{Program, ProgramError};
use crate::shell::{ProgramContext, RunOptions};

/// `cpp ARGS...`: alias for `cp`, run as the invoking user.
#[derive(Debug, Clone, Copy, Default)]
pub struct CppCommand;

#[async_trait]
impl Program for CppCommand {
    fn name(&self) -> &str {
        "cpp"
    }

    fn description(&self) -> &str {
        "copy files and directories (cp alias)"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let mut argv = vec!["cp".to_string()];
        argv.extend(ctx.args().iter().cloned());
        let options = RunOptions {
            stdin: Some(ctx.stdin().to_string()),
            as_user: Some(ctx.user().clone()),
            capture: false,
        };
        let (ok, _) = ctx.run_argv(argv, options).await;
        Ok(if ok { 0 } else { 1 })
    }
}
