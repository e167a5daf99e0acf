//! `chown`

use async_trait::async_trait;

use super::{is_option, join_path, reprefix};
use crate::auth::UserDirectory;
use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;
use crate::vfs::NodeKind;

/// `chown [-Rv] OWNER[:GROUP] file ...`: change ownership. Root only.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChownCommand;

/// Resolved target ids; `None` keeps the current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ownership {
    owner: Option<u32>,
    group: Option<u32>,
}

fn lookup_uid(users: &UserDirectory, name: &str) -> Option<u32> {
    match name.parse::<u32>() {
        Ok(uid) => Some(uid),
        Err(_) => users.get(name).map(|user| user.uid),
    }
}

/// Groups share their names with the accounts they belong to.
fn lookup_gid(users: &UserDirectory, name: &str) -> Option<u32> {
    match name.parse::<u32>() {
        Ok(gid) => Some(gid),
        Err(_) => users.get(name).map(|user| user.gid),
    }
}

fn parse_ownership(users: &UserDirectory, spec: &str) -> Result<Ownership, String> {
    let (owner_text, group_text) = spec.split_once(':').unwrap_or((spec, ""));
    if owner_text.is_empty() && group_text.is_empty() {
        return Err(format!("chown: invalid spec: '{spec}'"));
    }
    let owner = match owner_text {
        "" => None,
        name => Some(lookup_uid(users, name).ok_or_else(|| format!("chown: invalid user: '{name}'"))?),
    };
    let group = match group_text {
        "" => None,
        name => Some(lookup_gid(users, name).ok_or_else(|| format!("chown: invalid group: '{name}'"))?),
    };
    Ok(Ownership { owner, group })
}

/// `path` and, when recursing into a directory, everything beneath it.
/// Returns `false` after reporting the first unreachable path.
fn collect_targets(
    ctx: &mut ProgramContext<'_>,
    path: &str,
    recursive: bool,
    out: &mut Vec<String>,
) -> bool {
    let Some(stat) = ctx.fs().stat(path) else {
        ctx.write(format!("chown: cannot access '{path}': No such file or directory"));
        return false;
    };
    out.push(path.to_string());
    if !recursive || stat.kind != NodeKind::Dir {
        return true;
    }
    let listing = match ctx.fs().list(Some(path)) {
        Ok(listing) => listing,
        Err(e) => {
            ctx.write(reprefix(e.message(), "ls:", "chown:"));
            return false;
        }
    };
    listing
        .entries
        .iter()
        .all(|entry| collect_targets(ctx, &join_path(path, &entry.name), recursive, out))
}

#[async_trait]
impl Program for ChownCommand {
    fn name(&self) -> &str {
        "chown"
    }

    fn description(&self) -> &str {
        "change file owner and group"
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
                        ctx.write(format!("chown: unrecognized option '{arg}'"));
                        return Ok(1);
                    }
                }
                continue;
            }
            if parsing_options && is_option(&arg) {
                for flag in arg[1..].chars() {
                    match flag {
                        'R' => recursive = true,
                        'v' => verbose = true,
                        _ => {
                            ctx.write(format!("chown: invalid option -- '{flag}'"));
                            return Ok(1);
                        }
                    }
                }
                continue;
            }
            operands.push(arg);
        }

        let Some((spec, files)) = operands.split_first() else {
            ctx.write("chown: missing operand");
            return Ok(1);
        };
        if files.is_empty() {
            ctx.write(format!("chown: missing operand after '{spec}'"));
            return Ok(1);
        }
        let ownership = match parse_ownership(ctx.shell().users(), spec) {
            Ok(ownership) => ownership,
            Err(message) => {
                ctx.write(message);
                return Ok(1);
            }
        };

        let mut code = 0;
        for file in ctx.expand(files) {
            let absolute = ctx.fs().to_absolute(&file);
            let mut targets = Vec::new();
            if !collect_targets(ctx, &absolute, recursive, &mut targets) {
                code = 1;
                continue;
            }
            for target in targets {
                let Some(current) = ctx.fs().stat(&target) else {
                    ctx.write(format!("chown: cannot access '{target}': No such file or directory"));
                    code = 1;
                    continue;
                };
                let owner = ownership.owner.unwrap_or(current.owner);
                let group = ownership.group.unwrap_or(current.group);
                match ctx.fs_mut().chown(&target, owner, group) {
                    Ok(()) if verbose => {
                        ctx.write(format!("changed ownership of '{target}' to {owner}:{group}"));
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
    fn test_parse_ownership() {
        let users = UserDirectory::seeded("/bin/bash");
        let guest = users.get("guest").unwrap().clone();

        assert_eq!(
            parse_ownership(&users, "guest").unwrap(),
            Ownership {
                owner: Some(guest.uid),
                group: None
            }
        );
        assert_eq!(
            parse_ownership(&users, "root:guest").unwrap(),
            Ownership {
                owner: Some(0),
                group: Some(guest.gid)
            }
        );
        assert_eq!(parse_ownership(&users, "guest:").unwrap().group, None);
        assert_eq!(parse_ownership(&users, ":").unwrap_err(), "chown: invalid spec: ':'");
        assert_eq!(parse_ownership(&users, ":0").unwrap().owner, None);
        assert_eq!(parse_ownership(&users, "1234").unwrap().owner, Some(1234));
        assert_eq!(
            parse_ownership(&users, "nobody").unwrap_err(),
            "chown: invalid user: 'nobody'"
        );
        assert_eq!(
            parse_ownership(&users, "root:nogroup").unwrap_err(),
            "chown: invalid group: 'nogroup'"
        );
    }
}
