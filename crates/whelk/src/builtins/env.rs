//! `env`

use async_trait::async_trait;

use crate::program::{Program, ProgramError};
use crate::shell::{Environment, ProgramContext, RunOptions, Shell, is_valid_name};

/// `env [-i] [-u NAME] [NAME=VALUE ...] [command ...]`: print the
/// environment, or run a command with a modified copy of it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCommand;

/// Put `previous` back after a scoped run that started at frame `depth`.
///
/// If the command opened sessions, the scoped environment stays live in
/// them and `previous` goes to the frame `env` ran in, so `exit` returns to
/// it. If the command closed this session, the parent's environment is
/// already live and nothing is restored.
fn restore_env(shell: &mut Shell, depth: usize, previous: Environment) {
    let current = shell.session_depth();
    if current == depth {
        shell.replace_env(previous);
    } else if current > depth {
        shell.set_frame_env(depth.saturating_sub(1), previous);
    }
}

#[async_trait]
impl Program for EnvCommand {
    fn name(&self) -> &str {
        "env"
    }

    fn description(&self) -> &str {
        "print or run with modified environment"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let args = ctx.args().to_vec();
        let mut scoped: Environment = ctx.shell().env().clone();
        let mut command_at = None;
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            if arg == "--" {
                command_at = Some(i + 1);
                break;
            }
            if arg == "-i" || arg == "--ignore-environment" {
                scoped.clear();
                i += 1;
                continue;
            }
            let unset = if arg == "-u" {
                i += 1;
                match args.get(i) {
                    Some(name) => Some(name.as_str()),
                    None => {
                        ctx.write("env: option '-u' requires an argument");
                        return Ok(125);
                    }
                }
            } else {
                arg.strip_prefix("-u").filter(|name| !name.is_empty())
            };
            if let Some(name) = unset {
                if !is_valid_name(name) {
                    ctx.write(format!("env: invalid variable name '{name}'"));
                    return Ok(125);
                }
                scoped.remove(name);
                i += 1;
                continue;
            }
            if arg.starts_with('-') {
                ctx.write(format!("env: invalid option -- '{arg}'"));
                return Ok(125);
            }
            if let Some((name, value)) = arg.split_once('=') {
                if name.is_empty() {
                    ctx.write(format!("env: '{arg}': invalid variable name"));
                    return Ok(125);
                }
                if !is_valid_name(name) {
                    ctx.write(format!("env: '{name}': invalid variable name"));
                    return Ok(125);
                }
                scoped.set(name, value);
                i += 1;
                continue;
            }
            command_at = Some(i);
            break;
        }

        let command: Vec<String> = command_at
            .map(|start| args.get(start..).unwrap_or_default().to_vec())
            .unwrap_or_default();
        if command_at.is_some() {
            if command.is_empty() {
                return Ok(0);
            }
            let options = RunOptions {
                stdin: Some(ctx.stdin().to_string()),
                as_user: Some(ctx.user().clone()),
                capture: false,
            };
            let depth = ctx.shell().session_depth();
            let previous = ctx.shell_mut().replace_env(scoped);
            let (ok, _) = ctx.run_argv(command, options).await;
            restore_env(ctx.shell_mut(), depth, previous);
            return Ok(if ok { 0 } else { 1 });
        }

        let lines: Vec<String> = scoped.iter().map(|(k, v)| format!("{k}={v}")).collect();
        for line in lines {
            ctx.write(line);
        }
        Ok(0)
    }
}
