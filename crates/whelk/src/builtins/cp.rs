//! `cp`

use async_trait::async_trait;

use super::{basename, is_option, join_path, reprefix};
use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;
use crate::vfs::{NodeKind, WriteOptions};

/// `cp [-rnv] source ... dest`: copy files and directory trees.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpCommand;

#[derive(Debug, Clone, Copy, Default)]
struct Options {
    recursive: bool,
    no_clobber: bool,
    verbose: bool,
}

/// Copy `source` to `target`, descending into directories. Keeps going
/// after a failed child and reports whether everything copied.
fn copy_entry(ctx: &mut ProgramContext<'_>, options: Options, source: &str, target: &str) -> bool {
    let Some(stat) = ctx.fs().stat(source) else {
        ctx.write(format!("cp: cannot stat '{source}': No such file or directory"));
        return false;
    };

    if stat.kind == NodeKind::Dir {
        if !options.recursive {
            ctx.write(format!("cp: -r not specified; omitting directory '{source}'"));
            return false;
        }
        if target == source || target.starts_with(&format!("{source}/")) {
            ctx.write(format!(
                "cp: cannot copy a directory, '{source}', into itself, '{target}'"
            ));
            return false;
        }
        if let Err(e) = ctx.fs_mut().mkdir(target) {
            ctx.write(format!("cp: cannot create directory '{target}': {e}"));
            return false;
        }
        let listing = match ctx.fs().list(Some(source)) {
            Ok(listing) => listing,
            Err(e) => {
                ctx.write(reprefix(e.message(), "ls:", "cp:"));
                return false;
            }
        };
        let mut ok = true;
        for entry in listing.entries {
            let child_source = join_path(source, &entry.name);
            let child_target = join_path(target, &entry.name);
            if !copy_entry(ctx, options, &child_source, &child_target) {
                ok = false;
            }
        }
        if options.verbose {
            ctx.write(format!("'{source}' -> '{target}'"));
        }
        return ok;
    }

    let mut final_target = target.to_string();
    if ctx
        .fs()
        .stat(target)
        .is_some_and(|existing| existing.kind == NodeKind::Dir)
    {
        final_target = join_path(target, basename(source));
    }
    if options.no_clobber && ctx.fs().exists(&final_target) {
        return true;
    }

    let content = match ctx.read_file(source) {
        Ok(content) => content,
        Err(e) => {
            ctx.write(reprefix(e.message(), "cat:", "cp:"));
            return false;
        }
    };
    let write = WriteOptions {
        executable: Some(stat.executable.unwrap_or(false)),
    };
    if let Err(e) = ctx.fs_mut().write_file(&final_target, &content, write) {
        ctx.write(format!(
            "cp: cannot copy '{source}' to '{final_target}': {e}"
        ));
        return false;
    }
    if options.verbose {
        ctx.write(format!("'{source}' -> '{final_target}'"));
    }
    true
}

#[async_trait]
impl Program for CpCommand {
    fn name(&self) -> &str {
        "cp"
    }

    fn description(&self) -> &str {
        "copy files and directories"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let mut options = Options::default();
        let mut operands = Vec::new();
        let mut parsing_options = true;

        for arg in ctx.args().to_vec() {
            if parsing_options && arg == "--" {
                parsing_options = false;
                continue;
            }
            if parsing_options && arg.starts_with("--") {
                match arg.as_str() {
                    "--recursive" | "--archive" => options.recursive = true,
                    "--no-clobber" => options.no_clobber = true,
                    "--verbose" => options.verbose = true,
                    "--force" => {}
                    _ => {
                        ctx.write(format!("cp: unrecognized option '{arg}'"));
                        return Ok(1);
                    }
                }
                continue;
            }
            if parsing_options && is_option(&arg) {
                for flag in arg[1..].chars() {
                    match flag {
                        'r' | 'R' | 'a' => options.recursive = true,
                        'n' => options.no_clobber = true,
                        'v' => options.verbose = true,
                        'f' => {}
                        _ => {
                            ctx.write(format!("cp: invalid option -- '{flag}'"));
                            return Ok(1);
                        }
                    }
                }
                continue;
            }
            operands.push(arg);
        }

        let operands = ctx.expand(&operands);
        let Some((destination, sources)) = operands.split_last() else {
            ctx.write("cp: missing file operand");
            return Ok(1);
        };
        if sources.is_empty() {
            ctx.write(format!("cp: missing destination file operand after '{destination}'"));
            return Ok(1);
        }

        let destination_abs = ctx.fs().to_absolute(destination);
        let destination_kind = ctx.fs().stat(&destination_abs).map(|stat| stat.kind);
        let destination_is_dir = destination_kind == Some(NodeKind::Dir);
        if sources.len() > 1 && !destination_is_dir {
            ctx.write(format!("cp: target '{destination}' is not a directory"));
            return Ok(1);
        }

        let mut code = 0;
        for source in sources {
            let source_abs = ctx.fs().to_absolute(source);
            let Some(stat) = ctx.fs().stat(&source_abs) else {
                ctx.write(format!("cp: cannot stat '{source}': No such file or directory"));
                code = 1;
                continue;
            };
            let target_abs = if destination_is_dir {
                join_path(&destination_abs, basename(&source_abs))
            } else {
                destination_abs.clone()
            };
            if stat.kind == NodeKind::Dir && destination_kind == Some(NodeKind::File) {
                ctx.write(format!(
                    "cp: cannot overwrite non-directory '{destination}' with directory '{source}'"
                ));
                code = 1;
                continue;
            }
            if !copy_entry(ctx, options, &source_abs, &target_abs) {
                code = 1;
            }
        }
        Ok(code)
    }
}
