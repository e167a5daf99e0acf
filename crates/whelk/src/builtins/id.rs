//! `id`

use async_trait::async_trait;

use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `id [-u|-g|-G] [-n] [user]`: print user and group ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selector {
    Default,
    Uid,
    Gid,
    Groups,
}

#[async_trait]
impl Program for IdCommand {
    fn name(&self) -> &str {
        "id"
    }

    fn description(&self) -> &str {
        "print real and effective user and group IDs"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let mut selector = Selector::Default;
        let mut name_only = false;
        let mut operands = Vec::new();
        let mut parsing_options = true;

        for arg in ctx.args().to_vec() {
            if parsing_options && arg == "--" {
                parsing_options = false;
                continue;
            }
            let requested = if parsing_options && arg.starts_with("--") {
                match arg.as_str() {
                    "--name" => vec![None],
                    "--user" => vec![Some(Selector::Uid)],
                    "--group" => vec![Some(Selector::Gid)],
                    "--groups" => vec![Some(Selector::Groups)],
                    _ => {
                        ctx.write(format!("id: unrecognized option '{arg}'"));
                        return Ok(1);
                    }
                }
            } else if parsing_options && super::is_option(&arg) {
                let mut flags = Vec::new();
                for flag in arg[1..].chars() {
                    flags.push(match flag {
                        'n' => None,
                        'u' => Some(Selector::Uid),
                        'g' => Some(Selector::Gid),
                        'G' => Some(Selector::Groups),
                        _ => {
                            ctx.write(format!("id: invalid option -- '{flag}'"));
                            return Ok(1);
                        }
                    });
                }
                flags
            } else {
                operands.push(arg);
                continue;
            };

            for choice in requested {
                match choice {
                    None => name_only = true,
                    Some(next) => {
                        if selector != Selector::Default && selector != next {
                            ctx.write("id: cannot print 'only' of more than one choice");
                            return Ok(1);
                        }
                        selector = next;
                    }
                }
            }
        }

        if operands.len() > 1 {
            ctx.write("id: too many arguments");
            return Ok(1);
        }
        if name_only && selector == Selector::Default {
            ctx.write("id: cannot print only names in default format");
            return Ok(1);
        }

        let target_name = operands
            .first()
            .cloned()
            .unwrap_or_else(|| ctx.user().username.clone());
        let Some(target) = ctx.shell().users().get(&target_name).cloned() else {
            ctx.write(format!("id: '{target_name}': no such user"));
            return Ok(1);
        };
        let group = ctx.shell().users().name_for_gid(target.gid);

        let line = match (selector, name_only) {
            (Selector::Uid, true) => target.username.clone(),
            (Selector::Uid, false) => target.uid.to_string(),
            (Selector::Gid | Selector::Groups, true) => group,
            (Selector::Gid | Selector::Groups, false) => target.gid.to_string(),
            (Selector::Default, _) => format!(
                "uid={}({}) gid={gid}({group}) groups={gid}({group})",
                target.uid,
                target.username,
                gid = target.gid,
            ),
        };
        ctx.write(line);
        Ok(0)
    }
}
