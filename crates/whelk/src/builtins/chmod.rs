//! `chmod`

use async_trait::async_trait;

use super::{is_option, join_path};
use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;
use crate::vfs::NodeKind;

/// `chmod [-Rv] MODE file ...`: change permission bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChmodCommand;

/// A parsed mode operand: octal, or comma-separated symbolic clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ModeSpec {
    Octal(u32),
    Symbolic(Vec<Clause>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
    who: u32,
    op: char,
    perms: Vec<char>,
}

const WHO_USER: u32 = 0o700;
const WHO_GROUP: u32 = 0o070;
const WHO_OTHER: u32 = 0o007;
const WHO_ALL: u32 = 0o777;

fn parse_mode(spec: &str) -> Option<ModeSpec> {
    if !spec.is_empty() && spec.chars().all(|c| c.is_digit(8)) {
        return u32::from_str_radix(spec, 8)
            .ok()
            .filter(|mode| *mode <= 0o7777)
            .map(|mode| ModeSpec::Octal(mode & 0o777));
    }
    let mut clauses = Vec::new();
    for part in spec.split(',') {
        let op_at = part.find(['+', '-', '='])?;
        let (who_text, rest) = part.split_at(op_at);
        let mut who = 0;
        for c in who_text.chars() {
            who |= match c {
                'u' => WHO_USER,
                'g' => WHO_GROUP,
                'o' => WHO_OTHER,
                'a' => WHO_ALL,
                _ => return None,
            };
        }
        let mut chars = rest.chars();
        let op = chars.next()?;
        let perms: Vec<char> = chars.collect();
        if perms.iter().any(|c| !matches!(c, 'r' | 'w' | 'x' | 'X')) {
            return None;
        }
        clauses.push(Clause {
            who: if who == 0 { WHO_ALL } else { who },
            op,
            perms,
        });
    }
    Some(ModeSpec::Symbolic(clauses))
}

/// Mode bits for `perms`, replicated into every class, before masking by `who`.
fn perm_bits(perms: &[char], kind: NodeKind, current: u32) -> u32 {
    let any_exec = current & 0o111 != 0;
    perms.iter().fold(0, |bits, c| {
        bits | match c {
            'r' => 0o444,
            'w' => 0o222,
            'x' => 0o111,
            'X' if kind == NodeKind::Dir || any_exec => 0o111,
            _ => 0,
        }
    })
}

fn apply_mode(spec: &ModeSpec, kind: NodeKind, current: u32) -> u32 {
    match spec {
        ModeSpec::Octal(mode) => *mode,
        ModeSpec::Symbolic(clauses) => clauses.iter().fold(current, |mode, clause| {
            let bits = perm_bits(&clause.perms, kind, mode) & clause.who;
            match clause.op {
                '+' => mode | bits,
                '-' => mode & !bits,
                _ => (mode & !clause.who) | bits,
            }
        }),
    }
}

/// `path` followed by everything beneath it that the caller can list.
fn collect_tree(ctx: &ProgramContext<'_>, path: &str, out: &mut Vec<String>) {
    out.push(path.to_string());
    let Some(stat) = ctx.fs().stat(path) else {
        return;
    };
    if stat.kind != NodeKind::Dir {
        return;
    }
    let Ok(listing) = ctx.fs().list(Some(path)) else {
        return;
    };
    for entry in listing.entries {
        collect_tree(ctx, &join_path(path, &entry.name), out);
    }
}

#[async_trait]
impl Program for ChmodCommand {
    fn name(&self) -> &str {
        "chmod"
    }

    fn description(&self) -> &str {
        "change file mode bits"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let mut recursive = false;
        let mut verbose = false;
        let mut operands = Vec::new();
        let mut parsing_options = true;

        for arg in ctx.args().to_vec() {
            if parsing_options && arg == "--" {
                parsing_options = false;
                continue;
            }
            if parsing_options && arg.starts_with("--") {
                match arg.as_str() {
                    "--recursive" => recursive = true,
                    "--verbose" => verbose = true,
                    _ => {
                        ctx.write(format!("chmod: unrecognized option '{arg}'"));
                        return Ok(1);
                    }
                }
                continue;
            }
            // `-x` and friends are modes, not options.
            if parsing_options && is_option(&arg) && arg[1..].chars().all(|c| matches!(c, 'R' | 'v')) {
                for flag in arg[1..].chars() {
                    match flag {
                        'R' => recursive = true,
                        _ => verbose = true,
                    }
                }
                continue;
            }
            operands.push(arg);
        }

        let Some((mode_text, files)) = operands.split_first() else {
            ctx.write("chmod: missing operand");
            return Ok(1);
        };
        if files.is_empty() {
            ctx.write(format!("chmod: missing operand after '{mode_text}'"));
            return Ok(1);
        }
        let Some(spec) = parse_mode(mode_text) else {
            ctx.write(format!("chmod: invalid mode: '{mode_text}'"));
            return Ok(1);
        };

        let mut code = 0;
        for file in ctx.expand(files) {
            if ctx.fs().stat(&file).is_none() {
                ctx.write(format!("chmod: cannot access '{file}': No such file or directory"));
                code = 1;
                continue;
            }
            let mut targets = Vec::new();
            if recursive {
                collect_tree(ctx, &file, &mut targets);
            } else {
                targets.push(file);
            }
            for target in targets {
                let Some(stat) = ctx.fs().stat(&target) else {
                    continue;
                };
                let next = apply_mode(&spec, stat.kind, stat.mode);
                match ctx.fs_mut().chmod_mode(&target, next) {
                    Ok(()) if verbose && next != stat.mode => ctx.write(format!(
                        "mode of '{target}' changed from {:04o} to {next:04o}",
                        stat.mode
                    )),
                    Ok(()) if verbose => {
                        ctx.write(format!("mode of '{target}' retained as {next:04o}"));
                    }
                    Ok(()) => {}
                    Err(e) => {
                        ctx.write(e.message());
                        code = 1;
                    }
                }
            }
        }
        Ok(code)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_octal_modes() {
        assert_eq!(parse_mode("755"), Some(ModeSpec::Octal(0o755)));
        assert_eq!(parse_mode("0640"), Some(ModeSpec::Octal(0o640)));
        assert_eq!(parse_mode("99"), None);
    }

    #[test]
    fn test_symbolic_modes() {
        let plus_x = parse_mode("+x").unwrap();
        assert_eq!(apply_mode(&plus_x, NodeKind::File, 0o644), 0o755);

        let go_minus_w = parse_mode("go-w").unwrap();
        assert_eq!(apply_mode(&go_minus_w, NodeKind::File, 0o666), 0o644);

        let set = parse_mode("u=rw,g=r,o=").unwrap();
        assert_eq!(apply_mode(&set, NodeKind::File, 0o777), 0o640);

        let big_x = parse_mode("a+X").unwrap();
        assert_eq!(apply_mode(&big_x, NodeKind::Dir, 0o644), 0o755);
        assert_eq!(apply_mode(&big_x, NodeKind::File, 0o644), 0o644);

        assert_eq!(parse_mode("z+x"), None);
        assert_eq!(parse_mode("u+q"), None);
        assert_eq!(parse_mode("u"), None);
    }
}
