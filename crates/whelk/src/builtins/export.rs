//! `export`

use async_trait::async_trait;

use crate::program::{Program, ProgramError};
use crate::shell::{ProgramContext, is_valid_name};

/// `export [-n] [-p] [NAME[=VALUE] ...]`: set or list exported variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportCommand;

fn declare_lines(ctx: &ProgramContext<'_>) -> Vec<String> {
    ctx.shell()
        .env()
        .iter()
        .map(|(name, value)| {
            let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
            format!("declare -x {name}=\"{escaped}\"")
        })
        .collect()
}

#[async_trait]
impl Program for ExportCommand {
    fn name(&self) -> &str {
        "export"
    }

    fn description(&self) -> &str {
        "set exported environment variables"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let args = ctx.args().to_vec();
        let mut unexport = false;
        let mut print = args.is_empty();

        for arg in &args {
            match arg.as_str() {
                "--" => continue,
                "-p" => {
                    print = true;
                    continue;
                }
                "-n" => {
                    unexport = true;
                    continue;
                }
                _ => {}
            }
            if arg.starts_with('-') {
                ctx.write(format!("export: invalid option -- '{arg}'"));
                return Ok(2);
            }
            let (name, value) = match arg.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (arg.as_str(), None),
            };
            if !is_valid_name(name) {
                ctx.write(format!("export: `{arg}`: not a valid identifier"));
                return Ok(1);
            }
            let env = ctx.shell_mut().env_mut();
            if unexport {
                env.remove(name);
            } else if let Some(value) = value {
                env.set(name, value);
            } else if env.get(name).is_none() {
                env.set(name, "");
            }
        }

        if print {
            for line in declare_lines(ctx) {
                ctx.write(line);
            }
        }
        Ok(0)
    }
}
