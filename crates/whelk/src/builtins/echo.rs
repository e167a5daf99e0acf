//! `echo`

use async_trait::async_trait;

use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `echo [-neE] [word ...]`: print the words joined by spaces.
///
/// Output is line-oriented, so `-n` is accepted but has nothing to drop.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoCommand;

fn is_flag_cluster(arg: &str) -> bool {
    arg.len() > 1
        && arg.starts_with('-')
        && arg[1..].chars().all(|c| matches!(c, 'n' | 'e' | 'E'))
}

fn interpret_escapes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('e') => out.push('\x1b'),
            Some('f') => out.push('\x0c'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('v') => out.push('\x0b'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[async_trait]
impl Program for EchoCommand {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "print text"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let mut escapes = false;
        let mut parsing_options = true;
        let mut words = Vec::new();

        for arg in ctx.args() {
            if parsing_options && arg == "--" {
                parsing_options = false;
                continue;
            }
            if parsing_options && is_flag_cluster(arg) {
                for flag in arg[1..].chars() {
                    match flag {
                        'e' => escapes = true,
                        'E' => escapes = false,
                        _ => {}
                    }
                }
                continue;
            }
            parsing_options = false;
            words.push(arg.as_str());
        }

        let text = words.join(" ");
        let text = if escapes { interpret_escapes(&text) } else { text };
        ctx.write(text);
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escapes() {
        assert_eq!(interpret_escapes(r"a\tb\\c\q"), "a\tb\\c\\q");
        assert_eq!(interpret_escapes(r"line\n"), "line\n");
        assert!(is_flag_cluster("-ne"));
        assert!(!is_flag_cluster("-x"));
        assert!(!is_flag_cluster("-"));
    }
}
