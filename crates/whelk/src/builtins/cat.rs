//! `cat`

use async_trait::async_trait;

use super::{is_option, read_operand};
use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `cat [-nbsE] [file ...]`: concatenate files to the output.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatCommand;

#[derive(Debug, Default)]
struct Render {
    number_all: bool,
    number_nonblank: bool,
    squeeze_blank: bool,
    show_ends: bool,
    line_no: usize,
    previous_blank: bool,
}

impl Render {
    fn consume(&mut self, content: &str, out: &mut Vec<String>) {
        for line in content.replace("\r\n", "\n").split('\n') {
            let blank = line.is_empty();
            if self.squeeze_blank && blank && self.previous_blank {
                continue;
            }
            self.previous_blank = blank;

            let mut rendered = if self.show_ends {
                format!("{line}$")
            } else {
                line.to_string()
            };
            if (self.number_nonblank && !blank) || (self.number_all && !self.number_nonblank) {
                self.line_no += 1;
                rendered = format!("{:>6}\t{rendered}", self.line_no);
            }
            out.push(rendered);
        }
    }
}

#[async_trait]
impl Program for CatCommand {
    fn name(&self) -> &str {
        "cat"
    }

    fn description(&self) -> &str {
        "print file contents"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let mut render = Render::default();
        let mut targets = Vec::new();
        let mut parsing_options = true;

        for arg in ctx.args().to_vec() {
            if parsing_options && arg == "--" {
                parsing_options = false;
                continue;
            }
            if parsing_options && arg.starts_with("--") {
                match arg.as_str() {
                    "--number" => render.number_all = true,
                    "--number-nonblank" => render.number_nonblank = true,
                    "--squeeze-blank" => render.squeeze_blank = true,
                    "--show-ends" => render.show_ends = true,
                    _ => {
                        ctx.write(format!("cat: unrecognized option '{arg}'"));
                        return Ok(1);
                    }
                }
                continue;
            }
            if parsing_options && is_option(&arg) {
                for flag in arg[1..].chars() {
                    match flag {
                        'n' => render.number_all = true,
                        'b' => render.number_nonblank = true,
                        's' => render.squeeze_blank = true,
                        'E' => render.show_ends = true,
                        _ => {
                            ctx.write(format!("cat: invalid option -- '{flag}'"));
                            return Ok(1);
                        }
                    }
                }
                continue;
            }
            targets.push(arg);
        }

        let targets = if targets.is_empty() {
            vec!["-".to_string()]
        } else {
            ctx.expand(&targets)
        };

        let mut code = 0;
        let mut lines = Vec::new();
        for target in &targets {
            match read_operand(ctx, target, "cat") {
                Some(content) => render.consume(&content, &mut lines),
                None => code = 1,
            }
        }
        if !lines.is_empty() {
            ctx.write(lines.join("\n"));
        }
        Ok(code)
    }
}
