//! `ls`

use async_trait::async_trait;

use super::is_option;
use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;
use crate::vfs::{ListEntry, NodeKind, format_mode};

/// `ls [-alhdF1] [--color[=WHEN]] [path ...]`: list directory contents.
#[derive(Debug, Clone, Copy, Default)]
pub struct LsCommand;

const ANSI_RESET: &str = "\x1b[0m";
const ANSI_BOLD_BLUE: &str = "\x1b[1;34m";
const ANSI_BOLD_GREEN: &str = "\x1b[1;32m";
const DIR_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Copy)]
struct Options {
    all: bool,
    long: bool,
    one_per_line: bool,
    classify: bool,
    human: bool,
    directory: bool,
    color: Color,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            all: false,
            long: false,
            one_per_line: false,
            classify: false,
            human: false,
            directory: false,
            color: Color::Auto,
        }
    }
}

fn human_size(bytes: usize) -> String {
    const UNITS: [&str; 5] = ["B", "K", "M", "G", "T"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}{}", UNITS[0])
    } else if value >= 10.0 {
        format!("{value:.0}{}", UNITS[unit])
    } else {
        format!("{value:.1}{}", UNITS[unit])
    }
}

fn display_name(entry: &ListEntry, options: &Options, colorize: bool) -> String {
    let is_dir = entry.kind == NodeKind::Dir;
    let mut name = entry.name.clone();
    if options.classify {
        if is_dir {
            name.push('/');
        } else if entry.executable {
            name.push('*');
        }
    }
    if !colorize {
        return name;
    }
    if is_dir {
        format!("{ANSI_BOLD_BLUE}{name}{ANSI_RESET}")
    } else if entry.executable {
        format!("{ANSI_BOLD_GREEN}{name}{ANSI_RESET}")
    } else {
        name
    }
}

#[async_trait]
impl Program for LsCommand {
    fn name(&self) -> &str {
        "ls"
    }

    fn description(&self) -> &str {
        "list files and directories"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let mut options = Options::default();
        let mut targets = Vec::new();
        let mut parsing_options = true;

        for arg in ctx.args().to_vec() {
            if parsing_options && arg == "--" {
                parsing_options = false;
                continue;
            }
            if parsing_options && arg.starts_with("--") {
                match arg.as_str() {
                    "--all" => options.all = true,
                    "--long" => options.long = true,
                    "--human-readable" => options.human = true,
                    "--classify" => options.classify = true,
                    "--directory" => options.directory = true,
                    "--color" => options.color = Color::Always,
                    other => {
                        let Some(value) = other.strip_prefix("--color=") else {
                            ctx.write(format!("ls: unrecognized option '{arg}'"));
                            return Ok(2);
                        };
                        options.color = match value {
                            "always" | "yes" | "force" => Color::Always,
                            "never" | "no" | "none" => Color::Never,
                            "auto" | "tty" | "if-tty" => Color::Auto,
                            _ => {
                                ctx.write(format!("ls: invalid argument '{value}' for '--color'"));
                                return Ok(2);
                            }
                        };
                    }
                }
                continue;
            }
            if parsing_options && is_option(&arg) {
                for flag in arg[1..].chars() {
                    match flag {
                        'a' => options.all = true,
                        'l' => options.long = true,
                        '1' => options.one_per_line = true,
                        'F' => options.classify = true,
                        'h' => options.human = true,
                        'd' => options.directory = true,
                        _ => {
                            ctx.write(format!("ls: invalid option -- '{flag}'"));
                            return Ok(2);
                        }
                    }
                }
                continue;
            }
            targets.push(arg);
        }

        let targets = if targets.is_empty() {
            vec![".".to_string()]
        } else {
            ctx.expand(&targets)
        };
        let multiple = targets.len() > 1;
        let colorize = options.color == Color::Always
            || (options.color == Color::Auto && ctx.is_tty());
        let mut code = 0;

        for (index, target) in targets.iter().enumerate() {
            let entries = if options.directory {
                let Some(stat) = ctx.fs().stat(target) else {
                    ctx.write(format!("ls: cannot access '{target}': no such file or directory"));
                    code = 2;
                    continue;
                };
                vec![ListEntry {
                    name: target.clone(),
                    kind: stat.kind,
                    executable: stat.executable.unwrap_or(false),
                    owner: stat.owner,
                    group: stat.group,
                    mode: stat.mode,
                    size: stat.size,
                }]
            } else {
                let path = (target != ".").then_some(target.as_str());
                match ctx.ls(path) {
                    Ok(listing) if listing.single_file => listing.entries,
                    Ok(listing) => listing
                        .entries
                        .into_iter()
                        .filter(|e| options.all || !e.name.starts_with('.'))
                        .collect(),
                    Err(e) => {
                        ctx.write(e.message());
                        code = 2;
                        continue;
                    }
                }
            };

            if multiple {
                ctx.write(format!("{target}:"));
            }
            if options.long {
                for entry in &entries {
                    let users = ctx.shell().users();
                    let owner = users.name_for_uid(entry.owner);
                    let group = users.name_for_gid(entry.group);
                    let bytes = if entry.kind == NodeKind::Dir {
                        DIR_SIZE
                    } else {
                        entry.size
                    };
                    let size = if options.human {
                        human_size(bytes)
                    } else {
                        bytes.to_string()
                    };
                    let line = format!(
                        "{} 1 {owner} {group} {size:>7} {}",
                        format_mode(entry.kind, entry.mode),
                        display_name(entry, &options, colorize)
                    );
                    ctx.write(line);
                }
            } else if options.one_per_line {
                for entry in &entries {
                    ctx.write(display_name(entry, &options, colorize));
                }
            } else {
                let names: Vec<String> = entries
                    .iter()
                    .map(|entry| display_name(entry, &options, colorize))
                    .collect();
                ctx.write(names.join("  "));
            }
            if multiple && index + 1 < targets.len() {
                ctx.write("");
            }
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, kind: NodeKind, executable: bool) -> ListEntry {
        ListEntry {
            name: name.to_string(),
            kind,
            executable,
            owner: 0,
            group: 0,
            mode: 0o755,
            size: 0,
        }
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512B");
        assert_eq!(human_size(1536), "1.5K");
        assert_eq!(human_size(20 * 1024 * 1024), "20M");
    }

    #[test]
    fn test_display_name() {
        let classify = Options {
            classify: true,
            ..Default::default()
        };
        let dir = entry("docs", NodeKind::Dir, false);
        let exe = entry("run", NodeKind::File, true);
        assert_eq!(display_name(&dir, &classify, false), "docs/");
        assert_eq!(display_name(&exe, &classify, false), "run*");
        assert_eq!(
            display_name(&dir, &Options::default(), true),
            "\x1b[1;34mdocs\x1b[0m"
        );
    }
}
