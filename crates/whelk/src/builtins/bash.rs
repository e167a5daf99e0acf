//! `bash`

use async_trait::async_trait;

use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `bash [-l] [-c command]`: open a nested interactive shell as the
/// invoking user. With `-c`, run the command inside it and close it again.
#[derive(Debug, Clone, Copy, Default)]
pub struct BashCommand;

#[async_trait]
impl Program for BashCommand {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "GNU Bourne-Again SHell"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let args = ctx.args().to_vec();
        let mut login = false;
        let mut command: Option<String> = None;
        let mut operands = Vec::new();
        let mut parsing_options = true;
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            i += 1;
            if !parsing_options {
                operands.push(arg.clone());
                continue;
            }
            match arg.as_str() {
                "--" => parsing_options = false,
                "-l" | "--login" => login = true,
                "-i" | "--norc" | "--noprofile" | "--posix" | "--restricted" => {}
                "-c" => {
                    let Some(text) = args.get(i).filter(|text| !text.is_empty()) else {
                        ctx.write("bash: option requires an argument -- c");
                        return Ok(2);
                    };
                    command = Some(text.clone());
                    i += 1;
                }
                other if other.starts_with('-') => {
                    ctx.write(format!("bash: invalid option '{other}'"));
                    return Ok(2);
                }
                _ => operands.push(arg.clone()),
            }
        }

        if let Some(first) = operands.first() {
            ctx.write(format!("bash: {first}: No such file or directory"));
            return Ok(127);
        }

        let username = ctx.user().username.clone();
        let spawned = ctx
            .shell_mut()
            .enter_session(&username, login)
            .map_err(|e| ProgramError::Failed(e.to_string()))?;

        let Some(command) = command else {
            return Ok(0);
        };
        let ok = ctx.run_line(&command).await;
        if ctx.shell().shell_pid() == spawned {
            ctx.shell_mut()
                .exit_session(0)
                .map_err(|e| ProgramError::Failed(e.to_string()))?;
        }
        Ok(if ok { 0 } else { 1 })
    }
}
