//! `wc`

use async_trait::async_trait;

use super::{is_option, read_operand};
use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `wc [-lwcm] [file ...]`: count lines, words, bytes and characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct WcCommand;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counts {
    lines: usize,
    words: usize,
    bytes: usize,
    chars: usize,
}

impl Counts {
    fn of(content: &str) -> Self {
        Self {
            lines: content.matches('\n').count(),
            words: content.split_whitespace().count(),
            bytes: content.len(),
            chars: content.chars().count(),
        }
    }

    fn add(&mut self, other: Counts) {
        self.lines += other.lines;
        self.words += other.words;
        self.bytes += other.bytes;
        self.chars += other.chars;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Columns {
    lines: bool,
    words: bool,
    bytes: bool,
    chars: bool,
}

impl Columns {
    fn format(&self, counts: Counts, label: Option<&str>) -> String {
        let mut row = String::new();
        for (shown, value) in [
            (self.lines, counts.lines),
            (self.words, counts.words),
            (self.bytes, counts.bytes),
            (self.chars, counts.chars),
        ] {
            if shown {
                row.push_str(&format!("{value:>8}"));
            }
        }
        match label {
            Some(label) => format!("{row} {label}"),
            None => row,
        }
    }
}

#[async_trait]
impl Program for WcCommand {
    fn name(&self) -> &str {
        "wc"
    }

    fn description(&self) -> &str {
        "print newline, word, and byte counts"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let mut columns = Columns::default();
        let mut targets = Vec::new();
        let mut parsing_options = true;

        for arg in ctx.args().to_vec() {
            if parsing_options && arg == "--" {
                parsing_options = false;
                continue;
            }
            if parsing_options && arg.starts_with("--") {
                match arg.as_str() {
                    "--lines" => columns.lines = true,
                    "--words" => columns.words = true,
                    "--bytes" => columns.bytes = true,
                    "--chars" => columns.chars = true,
                    _ => {
                        ctx.write(format!("wc: unrecognized option '{arg}'"));
                        return Ok(1);
                    }
                }
                continue;
            }
            if parsing_options && is_option(&arg) {
                for flag in arg[1..].chars() {
                    match flag {
                        'l' => columns.lines = true,
                        'w' => columns.words = true,
                        'c' => columns.bytes = true,
                        'm' => columns.chars = true,
                        _ => {
                            ctx.write(format!("wc: invalid option -- '{flag}'"));
                            return Ok(1);
                        }
                    }
                }
                continue;
            }
            targets.push(arg);
        }

        if !(columns.lines || columns.words || columns.bytes || columns.chars) {
            columns.lines = true;
            columns.words = true;
            columns.bytes = true;
        }

        let labelled = !targets.is_empty();
        let sources = if labelled {
            ctx.expand(&targets)
        } else {
            vec!["-".to_string()]
        };

        let mut code = 0;
        let mut rows = Vec::new();
        for source in &sources {
            match read_operand(ctx, source, "wc") {
                Some(content) => rows.push((source.clone(), Counts::of(&content))),
                None => code = 1,
            }
        }

        let mut total = Counts::default();
        for (label, counts) in &rows {
            total.add(*counts);
            let label = labelled.then_some(label.as_str());
            ctx.write(columns.format(*counts, label));
        }
        if rows.len() > 1 {
            ctx.write(columns.format(total, Some("total")));
        }
        Ok(code)
    }
}
