//! `grep`

use async_trait::async_trait;
use regex_lite::{Regex, RegexBuilder};

use super::{is_option, join_path, reprefix};
use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;
use crate::vfs::NodeKind;

/// `grep [-ivncrFHhs] PATTERN [file ...]`: print matching lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrepCommand;

const STDIN_LABEL: &str = "(standard input)";

#[derive(Debug, Default)]
struct Options {
    ignore_case: bool,
    invert: bool,
    line_number: bool,
    count_only: bool,
    recursive: bool,
    fixed: bool,
    with_filename: bool,
    no_filename: bool,
    no_messages: bool,
}

enum Matcher {
    Fixed { needle: String, ignore_case: bool },
    Pattern(Regex),
}

impl Matcher {
    fn new(pattern: &str, options: &Options) -> Result<Self, regex_lite::Error> {
        if options.fixed {
            let needle = if options.ignore_case {
                pattern.to_lowercase()
            } else {
                pattern.to_string()
            };
            return Ok(Matcher::Fixed {
                needle,
                ignore_case: options.ignore_case,
            });
        }
        RegexBuilder::new(pattern)
            .case_insensitive(options.ignore_case)
            .build()
            .map(Matcher::Pattern)
    }

    fn is_match(&self, line: &str) -> bool {
        match self {
            Matcher::Fixed {
                needle,
                ignore_case: true,
            } => line.to_lowercase().contains(needle.as_str()),
            Matcher::Fixed { needle, .. } => line.contains(needle.as_str()),
            Matcher::Pattern(regex) => regex.is_match(line),
        }
    }
}

struct Input {
    label: String,
    content: String,
}

impl GrepCommand {
    /// Files below `root`, depth first. Listing errors stop the walk.
    fn collect(ctx: &mut ProgramContext<'_>, root: &str, quiet: bool, out: &mut Vec<String>) -> bool {
        let listing = match ctx.ls(Some(root)) {
            Ok(listing) => listing,
            Err(e) => {
                if !quiet {
                    ctx.write(reprefix(e.message(), "ls:", "grep:"));
                }
                return false;
            }
        };
        for entry in listing.entries {
            let child = join_path(root, &entry.name);
            if entry.kind == NodeKind::Dir {
                if !Self::collect(ctx, &child, quiet, out) {
                    return false;
                }
            } else {
                out.push(child);
            }
        }
        true
    }
}

#[async_trait]
impl Program for GrepCommand {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "print lines matching a pattern"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let mut options = Options::default();
        let mut pattern = None;
        let mut operands = Vec::new();
        let mut parsing_options = true;

        for arg in ctx.args().to_vec() {
            if parsing_options && arg == "--" {
                parsing_options = false;
                continue;
            }
            if parsing_options && arg.starts_with("--") {
                match arg.as_str() {
                    "--ignore-case" => options.ignore_case = true,
                    "--invert-match" => options.invert = true,
                    "--line-number" => options.line_number = true,
                    "--count" => options.count_only = true,
                    "--recursive" => options.recursive = true,
                    "--fixed-strings" => options.fixed = true,
                    "--with-filename" => options.with_filename = true,
                    "--no-filename" => options.no_filename = true,
                    "--no-messages" => options.no_messages = true,
                    _ => {
                        ctx.write(format!("grep: unrecognized option '{arg}'"));
                        return Ok(2);
                    }
                }
                continue;
            }
            if parsing_options && is_option(&arg) {
                for flag in arg[1..].chars() {
                    match flag {
                        'i' => options.ignore_case = true,
                        'v' => options.invert = true,
                        'n' => options.line_number = true,
                        'c' => options.count_only = true,
                        'r' | 'R' => options.recursive = true,
                        'F' => options.fixed = true,
                        'H' => options.with_filename = true,
                        'h' => options.no_filename = true,
                        's' => options.no_messages = true,
                        _ => {
                            ctx.write(format!("grep: invalid option -- '{flag}'"));
                            return Ok(2);
                        }
                    }
                }
                continue;
            }
            if pattern.is_none() {
                pattern = Some(arg);
            } else {
                operands.push(arg);
            }
        }

        let Some(pattern) = pattern else {
            ctx.write("usage: grep [OPTION]... PATTERN [FILE]...");
            return Ok(2);
        };
        let matcher = match Matcher::new(&pattern, &options) {
            Ok(matcher) => matcher,
            Err(e) => {
                ctx.write(format!("grep: invalid regular expression: {e}"));
                return Ok(2);
            }
        };

        let quiet = options.no_messages;
        let mut had_error = false;
        let mut inputs = Vec::new();
        if operands.is_empty() {
            inputs.push(Input {
                label: STDIN_LABEL.to_string(),
                content: ctx.stdin().to_string(),
            });
        }
        for operand in ctx.expand(&operands) {
            if operand == "-" {
                inputs.push(Input {
                    label: STDIN_LABEL.to_string(),
                    content: ctx.stdin().to_string(),
                });
                continue;
            }
            let Some(stat) = ctx.fs().stat(&operand) else {
                if !quiet {
                    ctx.write(format!("grep: {operand}: No such file or directory"));
                }
                had_error = true;
                continue;
            };
            let files = if stat.kind == NodeKind::Dir {
                if !options.recursive {
                    if !quiet {
                        ctx.write(format!("grep: {operand}: Is a directory"));
                    }
                    had_error = true;
                    continue;
                }
                let mut files = Vec::new();
                if !Self::collect(ctx, &operand, quiet, &mut files) {
                    had_error = true;
                    continue;
                }
                files
            } else {
                vec![operand]
            };
            for path in files {
                match ctx.read_file(&path) {
                    Ok(content) => inputs.push(Input {
                        label: path,
                        content,
                    }),
                    Err(e) => {
                        if !quiet {
                            ctx.write(reprefix(e.message(), "cat:", "grep:"));
                        }
                        had_error = true;
                    }
                }
            }
        }

        let show_filename = options.with_filename || (!options.no_filename && inputs.len() > 1);
        let mut matched_any = false;
        for input in &inputs {
            let mut matched = 0usize;
            for (index, line) in input.content.replace("\r\n", "\n").split('\n').enumerate() {
                if matcher.is_match(line) == options.invert {
                    continue;
                }
                matched += 1;
                if options.count_only {
                    continue;
                }
                let mut prefix = Vec::new();
                if show_filename {
                    prefix.push(input.label.clone());
                }
                if options.line_number {
                    prefix.push((index + 1).to_string());
                }
                if prefix.is_empty() {
                    ctx.write(line);
                } else {
                    ctx.write(format!("{}:{line}", prefix.join(":")));
                }
            }
            if options.count_only {
                let prefix = if show_filename {
                    format!("{}:", input.label)
                } else {
                    String::new()
                };
                ctx.write(format!("{prefix}{matched}"));
            }
            matched_any |= matched > 0;
        }

        Ok(match (had_error, matched_any) {
            (true, _) => 2,
            (false, true) => 0,
            (false, false) => 1,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_matchers() {
        let options = Options {
            ignore_case: true,
            ..Default::default()
        };
        let regex = Matcher::new("^Err(or)?", &options).unwrap();
        assert!(regex.is_match("error: disk"));
        assert!(!regex.is_match("no error"));

        let fixed = Matcher::new(
            "A.B",
            &Options {
                fixed: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(fixed.is_match("xA.By"));
        assert!(!fixed.is_match("AxB"));

        assert!(Matcher::new("(", &Options::default()).is_err());
    }
}
