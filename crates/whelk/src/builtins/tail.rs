//! `tail`

use async_trait::async_trait;

use super::{is_option, read_operand, text_lines};
use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `tail [-n [+]LINES] [file ...]`: print the last lines of each input.
#[derive(Debug, Clone, Copy, Default)]
pub struct TailCommand;

/// Which lines to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    /// The last N lines.
    Last(usize),
    /// Everything from line N (1-based) on, for `+N`.
    From(usize),
}

fn parse_span(value: &str) -> Option<Span> {
    let digits = value.strip_prefix(['+', '-']).unwrap_or(value);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let n: usize = digits.parse().unwrap_or(usize::MAX);
    if value.starts_with('+') && n > 0 {
        Some(Span::From(n))
    } else {
        Some(Span::Last(n))
    }
}

fn select(lines: &[String], span: Span) -> &[String] {
    match span {
        Span::Last(n) => &lines[lines.len().saturating_sub(n)..],
        Span::From(n) => lines.get(n - 1..).unwrap_or(&[]),
    }
}

#[async_trait]
impl Program for TailCommand {
    fn name(&self) -> &str {
        "tail"
    }

    fn description(&self) -> &str {
        "output the last part of files"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let args = ctx.args().to_vec();
        let mut span = Span::Last(10);
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
                    ctx.write(format!("tail: option '{arg}' requires an argument"));
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
                ctx.write(format!("tail: invalid option -- '{arg}'"));
                return Ok(1);
            } else {
                targets.push(arg.clone());
                continue;
            };
            match parse_span(raw) {
                Some(parsed) => span = parsed,
                None => {
                    ctx.write(format!("tail: invalid number of lines: '{raw}'"));
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
            let Some(content) = read_operand(ctx, source, "tail") else {
                code = 1;
                continue;
            };
            if multiple {
                let label = if source == "-" { "standard input" } else { source };
                ctx.write(format!("==> {label} <=="));
            }
            let lines = text_lines(&content);
            let shown = select(&lines, span);
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
    fn test_span_selection() {
        let lines: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        assert_eq!(select(&lines, parse_span("2").unwrap_or(Span::Last(0))), &lines[2..]);
        assert_eq!(select(&lines, parse_span("+2").unwrap_or(Span::Last(0))), &lines[1..]);
        assert_eq!(select(&lines, Span::Last(10)), &lines[..]);
        assert!(select(&lines, Span::From(9)).is_empty());
        assert_eq!(parse_span("+0"), Some(Span::Last(0)));
        assert_eq!(parse_span("z"), None);
    }
}
