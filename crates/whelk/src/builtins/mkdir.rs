//! `mkdir`

use async_trait::async_trait;

use super::is_option;
use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;
use crate::vfs::NodeKind;

/// `mkdir [-p] [-v] [-m MODE] dir ...`: create directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct MkdirCommand;

/// Octal `NNN` or `NNNN`.
fn parse_mode(raw: &str) -> Option<u32> {
    if !(3..=4).contains(&raw.len()) || !raw.chars().all(|c| ('0'..='7').contains(&c)) {
        return None;
    }
    u32::from_str_radix(raw, 8).ok().map(|mode| mode & 0o777)
}

fn parent_of(absolute: &str) -> &str {
    match absolute.trim_end_matches('/').rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &absolute[..idx],
    }
}

#[async_trait]
impl Program for MkdirCommand {
    fn name(&self) -> &str {
        "mkdir"
    }

    fn description(&self) -> &str {
        "create directories"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let args = ctx.args().to_vec();
        let mut parents = false;
        let mut verbose = false;
        let mut mode = None;
        let mut targets = Vec::new();
        let mut parsing_options = true;

        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            i += 1;
            if parsing_options && arg == "--" {
                parsing_options = false;
                continue;
            }
            if parsing_options && arg.starts_with("--") {
                let raw = match arg.as_str() {
                    "--parents" => {
                        parents = true;
                        continue;
                    }
                    "--verbose" => {
                        verbose = true;
                        continue;
                    }
                    "--mode" => {
                        let Some(value) = args.get(i) else {
                            ctx.write("mkdir: option '--mode' requires an argument");
                            return Ok(1);
                        };
                        i += 1;
                        value.as_str()
                    }
                    other => match other.strip_prefix("--mode=") {
                        Some(value) => value,
                        None => {
                            ctx.write(format!("mkdir: unrecognized option '{arg}'"));
                            return Ok(1);
                        }
                    },
                };
                let Some(parsed) = parse_mode(raw) else {
                    ctx.write(format!("mkdir: invalid mode '{raw}'"));
                    return Ok(1);
                };
                mode = Some(parsed);
                continue;
            }
            if parsing_options && is_option(arg) {
                for (pos, flag) in arg.char_indices().skip(1) {
                    match flag {
                        'p' => parents = true,
                        'v' => verbose = true,
                        'm' => {
                            let inline = &arg[pos + 1..];
                            let value = if inline.is_empty() {
                                let Some(value) = args.get(i) else {
                                    ctx.write("mkdir: option requires an argument -- 'm'");
                                    return Ok(1);
                                };
                                i += 1;
                                value.as_str()
                            } else {
                                inline
                            };
                            let Some(parsed) = parse_mode(value) else {
                                ctx.write(format!("mkdir: invalid mode '{value}'"));
                                return Ok(1);
                            };
                            mode = Some(parsed);
                            break;
                        }
                        _ => {
                            ctx.write(format!("mkdir: invalid option -- '{flag}'"));
                            return Ok(1);
                        }
                    }
                }
                continue;
            }
            targets.push(arg.clone());
        }

        if targets.is_empty() {
            ctx.write("mkdir: missing operand");
            return Ok(1);
        }

        let mut code = 0;
        for target in &targets {
            let absolute = ctx.fs().to_absolute(target);
            if let Some(existing) = ctx.fs().stat(&absolute) {
                if existing.kind != NodeKind::Dir || !parents {
                    ctx.write(format!("mkdir: cannot create directory '{target}': File exists"));
                    code = 1;
                }
                continue;
            }
            if !parents {
                let problem = match ctx.fs().stat(parent_of(&absolute)) {
                    None => Some("No such file or directory"),
                    Some(parent) if parent.kind != NodeKind::Dir => Some("Not a directory"),
                    Some(_) => None,
                };
                if let Some(problem) = problem {
                    ctx.write(format!("mkdir: cannot create directory '{target}': {problem}"));
                    code = 1;
                    continue;
                }
            }
            if let Err(e) = ctx.fs_mut().mkdir(&absolute) {
                ctx.write(e.message());
                code = 1;
                continue;
            }
            if let Some(mode) = mode {
                if let Err(e) = ctx.fs_mut().chmod_mode(&absolute, mode) {
                    ctx.write(e.message());
                    code = 1;
                    continue;
                }
            }
            if verbose {
                ctx.write(format!("mkdir: created directory '{target}'"));
            }
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_and_parent() {
        assert_eq!(parse_mode("750"), Some(0o750));
        assert_eq!(parse_mode("1777"), Some(0o777));
        assert_eq!(parse_mode("8"), None);
        assert_eq!(parse_mode("rwx"), None);
        assert_eq!(parent_of("/a/b"), "/a");
        assert_eq!(parent_of("/a"), "/");
    }
}
