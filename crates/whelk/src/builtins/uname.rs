//! `uname`

use async_trait::async_trait;

use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `uname [-snrvmoa]`: print system information.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnameCommand;

#[async_trait]
impl Program for UnameCommand {
    fn name(&self) -> &str {
        "uname"
    }

    fn description(&self) -> &str {
        "print system info"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let system = ctx.shell().system().clone();
        let host = ctx.host().to_string();
        let args = ctx.args().to_vec();

        if args.is_empty() {
            ctx.write(system.kernel_name);
            return Ok(0);
        }
        if args.iter().any(|a| a == "-a" || a == "--all") {
            ctx.write(format!(
                "{} {} {} {} {} {}",
                system.kernel_name,
                host,
                system.kernel_release,
                system.kernel_version,
                system.machine,
                system.operating_system
            ));
            return Ok(0);
        }

        let mut values = Vec::with_capacity(args.len());
        for arg in &args {
            let value = match arg.as_str() {
                "-s" | "--kernel-name" => &system.kernel_name,
                "-n" | "--nodename" => &host,
                "-r" | "--kernel-release" => &system.kernel_release,
                "-v" | "--kernel-version" => &system.kernel_version,
                "-m" | "--machine" => &system.machine,
                "-o" | "--operating-system" => &system.operating_system,
                _ => {
                    ctx.write(format!("uname: invalid option: {arg}"));
                    return Ok(1);
                }
            };
            values.push(value.as_str());
        }
        ctx.write(values.join(" "));
        Ok(0)
    }
}
