//! `true` and `false`.

use async_trait::async_trait;

use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `true`: do nothing, successfully.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrueCommand;

#[async_trait]
impl Program for TrueCommand {
    fn name(&self) -> &str {
        "true"
    }

    fn description(&self) -> &str {
        "do nothing, successfully"
    }

    async fn run(&self, _ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        Ok(0)
    }
}

/// `false`: do nothing, unsuccessfully.
#[derive(Debug, Clone, Copy, Default)]
pub struct FalseCommand;

#[async_trait]
impl Program for FalseCommand {
    fn name(&self) -> &str {
        "false"
    }

    fn description(&self) -> &str {
        "do nothing, unsuccessfully"
    }

    async fn run(&self, _ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        Ok(1)
    }
}
