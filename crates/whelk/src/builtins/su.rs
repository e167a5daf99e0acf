//! `su`

use async_trait::async_trait;

use super::{enter_home, stdin_secret, verify_user_password};
use crate::parser::split_words;
use crate::program::{Program, ProgramError};
use crate::shell::{ProgramContext, RunOptions};

/// `su [-] [user] [-c command]`: become another user, or run one command
/// as them. Root and same-user switches skip the password.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuCommand;

#[derive(Debug, Default)]
struct Request {
    login: bool,
    target: Option<String>,
    password: Option<String>,
    command: Vec<String>,
}

fn parse_request(args: &[String]) -> Result<Request, Vec<String>> {
    let mut request = Request::default();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "--" => {
                let mut rest = args[i + 1..].iter();
                if request.target.is_none() {
                    request.target = rest.next().cloned();
                }
                let remaining: Vec<String> = rest.cloned().collect();
                if !remaining.is_empty() {
                    request.command = remaining;
                }
                return Ok(request);
            }
            "-" | "-l" | "--login" => request.login = true,
            "--password" | "--password-stdin" => {
                let Some(value) = args.get(i + 1).filter(|v| !v.is_empty()) else {
                    return Err(vec![format!("su: option '{arg}' requires an argument")]);
                };
                request.password = Some(value.clone());
                i += 1;
            }
            "-c" | "--command" => {
                let Some(value) = args.get(i + 1).filter(|v| !v.is_empty()) else {
                    return Err(vec![format!("su: option '{arg}' requires an argument")]);
                };
                request.command = split_words(value);
                i += 1;
            }
            // The environment is carried over either way.
            "-p" | "-m" | "--preserve-environment" => {}
            other if other.starts_with('-') => {
                return Err(vec![
                    format!("su: invalid option -- '{other}'"),
                    "Try 'su --help' for more information.".to_string(),
                ]);
            }
            _ if request.target.is_none() => request.target = Some(arg.clone()),
            _ => {
                if request.command.is_empty() {
                    request.command = args[i..].to_vec();
                }
                return Ok(request);
            }
        }
        i += 1;
    }
    Ok(request)
}

#[async_trait]
impl Program for SuCommand {
    fn name(&self) -> &str {
        "su"
    }

    fn description(&self) -> &str {
        "switch user or run a command as another user"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let request = match parse_request(ctx.args()) {
            Ok(request) => request,
            Err(lines) => {
                for line in lines {
                    ctx.write(line);
                }
                return Ok(1);
            }
        };

        let target_name = request.target.as_deref().unwrap_or("root");
        let Some(target) = ctx.shell().users().get(target_name).cloned() else {
            ctx.write(format!("su: user '{target_name}' does not exist"));
            return Ok(1);
        };

        let actor = ctx.user().clone();
        if !actor.is_root() && actor.username != target.username {
            let mut supplied = request.password.clone().or_else(|| stdin_secret(ctx));
            if supplied.is_none() {
                supplied = ctx.read_secret("Password: ").await;
            }
            let verified = match supplied.filter(|p| !p.is_empty()) {
                Some(password) => verify_user_password(&target, &password).await,
                None => false,
            };
            if !verified {
                tracing::info!(from = %actor.username, to = %target.username, "su authentication failed");
                ctx.write("su: Authentication failure");
                return Ok(1);
            }
        }

        if request.command.is_empty() {
            ctx.shell_mut()
                .enter_session(&target.username, request.login)
                .map_err(|e| ProgramError::Failed(e.to_string()))?;
            return Ok(0);
        }

        let original_cwd = request.login.then(|| ctx.cwd());
        if request.login {
            enter_home(ctx, &target);
        }
        let options = RunOptions {
            stdin: Some(ctx.stdin().to_string()),
            as_user: Some(target),
            capture: false,
        };
        let (ok, _) = ctx.run_argv(request.command, options).await;
        if let Some(cwd) = original_cwd {
            let _ = ctx.cd(&cwd);
        }
        Ok(if ok { 0 } else { 1 })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_request() {
        let request = parse_request(&args(&["-", "operator"])).unwrap();
        assert!(request.login);
        assert_eq!(request.target.as_deref(), Some("operator"));
        assert!(request.command.is_empty());

        let request = parse_request(&args(&["guest", "-c", "echo 'a b'"])).unwrap();
        assert_eq!(request.command, vec!["echo", "a b"]);

        let request = parse_request(&args(&["root", "ls", "-l"])).unwrap();
        assert_eq!(request.command, vec!["ls", "-l"]);

        let request = parse_request(&args(&["--", "guest", "id", "-u"])).unwrap();
        assert_eq!(request.target.as_deref(), Some("guest"));
        assert_eq!(request.command, vec!["id", "-u"]);

        let err = parse_request(&args(&["-x"])).unwrap_err();
        assert_eq!(err[0], "su: invalid option -- '-x'");
        assert!(parse_request(&args(&["-c"])).is_err());
    }
}
