//! `touch`

use async_trait::async_trait;

use super::is_option;
use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `touch [-c] file ...`: create files or check they are accessible.
#[derive(Debug, Clone, Copy, Default)]
pub struct TouchCommand;

#[async_trait]
impl Program for TouchCommand {
    fn name(&self) -> &str {
        "touch"
    }

    fn description(&self) -> &str {
        "create files or update file timestamps"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let mut no_create = false;
        let mut targets = Vec::new();
        let mut parsing_options = true;

        for arg in ctx.args().to_vec() {
            if parsing_options && arg == "--" {
                parsing_options = false;
                continue;
            }
            if parsing_options && arg == "--no-create" {
                no_create = true;
                continue;
            }
            if parsing_options && is_option(&arg) {
                for flag in arg[1..].chars() {
                    match flag {
                        'c' => no_create = true,
                        'a' | 'm' => {}
                        _ => {
                            ctx.write(format!("touch: invalid option -- '{flag}'"));
                            return Ok(1);
                        }
                    }
                }
                continue;
            }
            targets.push(arg);
        }

        if targets.is_empty() {
            ctx.write("touch: missing file operand");
            return Ok(1);
        }

        let mut code = 0;
        for target in &targets {
            if let Err(e) = ctx.fs_mut().touch(target, no_create) {
                ctx.write(e.message());
                code = 1;
            }
        }
        Ok(code)
    }
}
