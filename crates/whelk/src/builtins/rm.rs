//! `rm`

use async_trait::async_trait;

use super::is_option;
use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;
use crate::vfs::RemoveOptions;

/// `rm [-rfv] target ...`: remove files or directory trees.
#[derive(Debug, Clone, Copy, Default)]
pub struct RmCommand;

#[async_trait]
impl Program for RmCommand {
    fn name(&self) -> &str {
        "rm"
    }

    fn description(&self) -> &str {
        "remove files or directories"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let mut options = RemoveOptions::default();
        let mut verbose = false;
        let mut targets = Vec::new();
        let mut parsing_options = true;

        for arg in ctx.args().to_vec() {
            if parsing_options && arg == "--" {
                parsing_options = false;
                continue;
            }
            if parsing_options && arg.starts_with("--") {
                match arg.as_str() {
                    "--rf" | "--fr" => {
                        options.recursive = true;
                        options.force = true;
                    }
                    "--recursive" => options.recursive = true,
                    "--force" => options.force = true,
                    "--verbose" => verbose = true,
                    _ => {
                        ctx.write(format!("rm: unrecognized option '{arg}'"));
                        return Ok(1);
                    }
                }
                continue;
            }
            if parsing_options && is_option(&arg) {
                for flag in arg[1..].chars() {
                    match flag {
                        'r' | 'R' => options.recursive = true,
                        'f' => options.force = true,
                        'v' => verbose = true,
                        _ => {
                            ctx.write(format!("rm: invalid option -- '{flag}'"));
                            return Ok(1);
                        }
                    }
                }
                continue;
            }
            targets.push(arg);
        }

        if targets.is_empty() {
            if options.force {
                return Ok(0);
            }
            ctx.write("rm: missing operand");
            return Ok(1);
        }

        let mut code = 0;
        for target in ctx.expand(&targets) {
            match ctx.fs_mut().remove(&target, options) {
                Ok(()) if verbose => ctx.write(format!("removed '{target}'")),
                Ok(()) => {}
                Err(e) => {
                    ctx.write(e.message());
                    code = 1;
                }
            }
        }
        Ok(code)
    }
}
