//! `head`

use async_trait::async_trait;

use super::{is_option, read_operand, text_lines};
use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `head [-n LINES] [file ...]`: print the first lines of each input.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadCommand;

/// A line count; negative values clamp to zero.
fn parse_count(value: &str) -> Option<usize> {
    let digits = value.strip_prefix(['+', '-']).unwrap_or(value);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if value.starts_with('-') {
        return Some(0);
    }
    Some(digits.parse().unwrap_or(usize::MAX))
}

#[async_trait]
impl Program for HeadCommand {
    fn name(&self) -> &str {
        "head"
    }

    fn description(&self) -> &str {
        "output the first part of files"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let args = ctx.args().to_vec();
        let mut count = 10;
        let mut targets = Vec::new();
        let mut parsing_options = true;

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if parsing_options && arg == "--" {
                parsing_options = false;
                continue;
            }
            let raw = if parsing_options && (arg == "-n" || arg == "--lines") {
                let Some(value) = iter.next() else {
                    ctx.write(format!("head: option '{arg}' requires an argument"));
                    return Ok(1);
                };
                value.as_str()
            } else if let Some(value) = arg.strip_prefix("--lines=").filter(|_| parsing_options) {
                value
            } else if let Some(value) = arg
                .strip_prefix("-n")
                .filter(|v| parsing_options && !v.is_empty())
            {
                value
            } else if parsing_options && is_option(arg) {
                ctx.write(format!("head: invalid option -- '{arg}'"));
                return Ok(1);
            } else {
                targets.push(arg.clone());
                continue;
            };
            match parse_count(raw) {
                Some(n) => count = n,
                None => {
                    ctx.write(format!("head: invalid number of lines: '{raw}'"));
                    return Ok(1);
                }
            }
        }

        let sources = if targets.is_empty() {
            vec!["-".to_string()]
        } else {
            ctx.expand(&targets)
        };
        let multiple = sources.len() > 1;
        let mut code = 0;

        for (i, source) in sources.iter().enumerate() {
            let Some(content) = read_operand(ctx, source, "head") else {
                code = 1;
                continue;
            };
            if multiple {
                let label = if source == "-" { "standard input" } else { source };
                ctx.write(format!("==> {label} <=="));
            }
            let lines = text_lines(&content);
            let shown: Vec<&str> = lines.iter().take(count).map(String::as_str).collect();
            if !shown.is_empty() {
                ctx.write(shown.join("\n"));
            }
            if multiple && i + 1 < sources.len() {
                ctx.write("");
            }
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("3"), Some(3));
        assert_eq!(parse_count("+3"), Some(3));
        assert_eq!(parse_count("-3"), Some(0));
        assert_eq!(parse_count("x"), None);
        assert_eq!(parse_count(""), None);
    }
}
