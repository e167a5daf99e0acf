//! `mv`

use async_trait::async_trait;

use super::{basename, is_option, join_path, reprefix};
use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;
use crate::vfs::{NodeKind, RemoveOptions, Stat, WriteOptions};

/// `mv [-fnv] source ... dest`: move or rename.
///
/// A move is a copy that keeps mode bits (and ownership when run by root)
/// followed by a recursive removal of the source.
#[derive(Debug, Clone, Copy, Default)]
pub struct MvCommand;

#[derive(Debug, Clone, Copy, Default)]
struct Options {
    force: bool,
    no_clobber: bool,
    verbose: bool,
}

/// Carry mode and, for root, ownership over to the copy. `-f` ignores
/// failures here.
fn preserve_metadata(
    ctx: &mut ProgramContext<'_>,
    options: Options,
    target: &str,
    stat: &Stat,
) -> bool {
    if let Err(e) = ctx.fs_mut().chmod_mode(target, stat.mode) {
        if !options.force {
            ctx.write(reprefix(e.message(), "chmod:", "mv:"));
            return false;
        }
    }
    if ctx.user().is_root() {
        if let Err(e) = ctx.fs_mut().chown(target, stat.owner, stat.group) {
            if !options.force {
                ctx.write(reprefix(e.message(), "chown:", "mv:"));
                return false;
            }
        }
    }
    true
}

fn copy_tree(ctx: &mut ProgramContext<'_>, options: Options, source: &str, target: &str) -> bool {
    let Some(stat) = ctx.fs().stat(source) else {
        ctx.write(format!("mv: cannot stat '{source}': No such file or directory"));
        return false;
    };

    if stat.kind == NodeKind::Dir {
        if target == source || target.starts_with(&format!("{source}/")) {
            ctx.write(format!(
                "mv: cannot move '{source}' to a subdirectory of itself, '{target}'"
            ));
            return false;
        }
        match ctx.fs().stat(target).map(|existing| existing.kind) {
            Some(NodeKind::File) => {
                ctx.write(format!(
                    "mv: cannot overwrite non-directory '{target}' with directory '{source}'"
                ));
                return false;
            }
            Some(NodeKind::Dir) => {}
            None => {
                if let Err(e) = ctx.fs_mut().mkdir(target) {
                    ctx.write(reprefix(e.message(), "mkdir:", "mv:"));
                    return false;
                }
            }
        }
        if !preserve_metadata(ctx, options, target, &stat) {
            return false;
        }
        let listing = match ctx.fs().list(Some(source)) {
            Ok(listing) => listing,
            Err(e) => {
                ctx.write(reprefix(e.message(), "ls:", "mv:"));
                return false;
            }
        };
        return listing.entries.iter().all(|entry| {
            copy_tree(
                ctx,
                options,
                &join_path(source, &entry.name),
                &join_path(target, &entry.name),
            )
        });
    }

    let content = match ctx.read_file(source) {
        Ok(content) => content,
        Err(e) => {
            ctx.write(reprefix(e.message(), "cat:", "mv:"));
            return false;
        }
    };
    if let Some(existing) = ctx.fs().stat(target) {
        if options.no_clobber {
            return true;
        }
        if existing.kind == NodeKind::Dir {
            ctx.write(format!(
                "mv: cannot overwrite directory '{target}' with non-directory '{source}'"
            ));
            return false;
        }
        let remove = RemoveOptions {
            recursive: false,
            force: options.force,
        };
        if let Err(e) = ctx.fs_mut().remove(target, remove) {
            ctx.write(reprefix(e.message(), "rm:", "mv:"));
            return false;
        }
    }
    let write = WriteOptions {
        executable: Some(stat.executable.unwrap_or(false)),
    };
    if let Err(e) = ctx.fs_mut().write_file(target, &content, write) {
        ctx.write(reprefix(e.message(), "write:", "mv:"));
        return false;
    }
    preserve_metadata(ctx, options, target, &stat)
}

#[async_trait]
impl Program for MvCommand {
    fn name(&self) -> &str {
        "mv"
    }

    fn description(&self) -> &str {
        "move (rename) files and directories"
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
                    "--force" => options.force = true,
                    "--no-clobber" => options.no_clobber = true,
                    "--verbose" => options.verbose = true,
                    _ => {
                        ctx.write(format!("mv: unrecognized option '{arg}'"));
                        return Ok(1);
                    }
                }
                continue;
            }
            if parsing_options && is_option(&arg) {
                for flag in arg[1..].chars() {
                    match flag {
                        'f' => options.force = true,
                        'n' => options.no_clobber = true,
                        'v' => options.verbose = true,
                        _ => {
                            ctx.write(format!("mv: invalid option -- '{flag}'"));
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
            ctx.write("mv: missing file operand");
            return Ok(1);
        };
        if sources.is_empty() {
            ctx.write(format!("mv: missing destination file operand after '{destination}'"));
            return Ok(1);
        }

        let destination_abs = ctx.fs().to_absolute(destination);
        let destination_is_dir = ctx
            .fs()
            .stat(&destination_abs)
            .is_some_and(|stat| stat.kind == NodeKind::Dir);
        if sources.len() > 1 && !destination_is_dir {
            ctx.write(format!("mv: target '{destination}' is not a directory"));
            return Ok(1);
        }

        let mut code = 0;
        for source in sources {
            let source_abs = ctx.fs().to_absolute(source);
            let Some(stat) = ctx.fs().stat(&source_abs) else {
                ctx.write(format!("mv: cannot stat '{source}': No such file or directory"));
                code = 1;
                continue;
            };
            let target_abs = if destination_is_dir {
                join_path(&destination_abs, basename(&source_abs))
            } else {
                destination_abs.clone()
            };

            if source_abs == target_abs {
                if options.verbose {
                    ctx.write(format!("'{source}' -> '{destination}'"));
                }
                continue;
            }
            let target_kind = ctx.fs().stat(&target_abs).map(|existing| existing.kind);
            if options.no_clobber && target_kind.is_some() {
                continue;
            }
            if stat.kind == NodeKind::Dir {
                match target_kind {
                    Some(NodeKind::File) => {
                        ctx.write(format!(
                            "mv: cannot overwrite non-directory '{target_abs}' with directory '{source}'"
                        ));
                        code = 1;
                        continue;
                    }
                    Some(NodeKind::Dir) => {
                        ctx.write(format!("mv: cannot overwrite directory '{target_abs}'"));
                        code = 1;
                        continue;
                    }
                    None => {}
                }
            }

            if !copy_tree(ctx, options, &source_abs, &target_abs) {
                code = 1;
                continue;
            }
            let remove = RemoveOptions {
                recursive: true,
                force: options.force,
            };
            if let Err(e) = ctx.fs_mut().remove(&source_abs, remove) {
                ctx.write(reprefix(e.message(), "rm:", "mv:"));
                code = 1;
                continue;
            }
            if options.verbose {
                ctx.write(format!("'{source}' -> '{target_abs}'"));
            }
        }
        Ok(code)
    }
}
