//! `sudo`

use async_trait::async_trait;

use super::{enter_home, stdin_secret, verify_user_password};
use crate::program::{Program, ProgramError};
use crate::shell::{ProgramContext, RunOptions};

/// `sudo [-u user] [-S] [-s|-i] command ...`: run a command, or open a
/// shell, as another user after checking the caller's own password.
#[derive(Debug, Clone, Copy, Default)]
pub struct SudoCommand;

const USAGE: &str = "usage: sudo [-u user] [-p password] command [args...]";

#[derive(Debug)]
struct Request {
    target: String,
    password: Option<String>,
    prompt: Option<String>,
    password_from_stdin: bool,
    non_interactive: bool,
    shell: bool,
    login: bool,
    command: Vec<String>,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            target: "root".to_string(),
            password: None,
            prompt: None,
            password_from_stdin: false,
            non_interactive: false,
            shell: false,
            login: false,
            command: Vec::new(),
        }
    }
}

fn parse_request(args: &[String]) -> Result<Request, String> {
    let mut request = Request::default();
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        let value = args.get(i + 1).filter(|v| !v.is_empty()).cloned();
        match arg {
            "--" => {
                request.command = args[i + 1..].to_vec();
                break;
            }
            "-u" | "--user" => {
                request.target = value.ok_or_else(|| format!("sudo: option {arg} requires a user"))?;
                i += 1;
            }
            "--password" => {
                request.password =
                    Some(value.ok_or_else(|| format!("sudo: option {arg} requires a password"))?);
                i += 1;
            }
            "-p" | "--prompt" => {
                request.prompt =
                    Some(value.ok_or_else(|| format!("sudo: option {arg} requires an argument"))?);
                i += 1;
            }
            "-S" | "--stdin" => request.password_from_stdin = true,
            "-s" | "--shell" => request.shell = true,
            "-i" | "--login" => {
                request.shell = true;
                request.login = true;
            }
            "-k" | "--reset-timestamp" => {}
            "-n" | "--non-interactive" => request.non_interactive = true,
            other if other.starts_with('-') => {
                return Err(format!("sudo: invalid option -- '{other}'"));
            }
            _ => {
                request.command = args[i..].to_vec();
                break;
            }
        }
        i += 1;
    }
    Ok(request)
}

#[async_trait]
impl Program for SudoCommand {
    fn name(&self) -> &str {
        "sudo"
    }

    fn description(&self) -> &str {
        "run a command as another user"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let request = match parse_request(ctx.args()) {
            Ok(request) => request,
            Err(message) => {
                ctx.write(message);
                return Ok(1);
            }
        };

        let actor = ctx.user().clone();
        if !actor.is_root() {
            if !actor.sudo {
                tracing::warn!(user = %actor.username, "sudo refused: not in sudoers");
                ctx.write(format!(
                    "{} is not in the sudoers file. This incident will be reported.",
                    actor.username
                ));
                return Ok(1);
            }

            let mut supplied = request.password.clone();
            if supplied.is_none() && request.password_from_stdin {
                supplied = stdin_secret(ctx);
            }
            let password = match supplied {
                Some(password) => password,
                None if request.non_interactive => {
                    ctx.write("sudo: a password is required");
                    return Ok(1);
                }
                None if request.password_from_stdin => {
                    ctx.write("sudo: no password was provided");
                    return Ok(1);
                }
                None => {
                    let prompt = request
                        .prompt
                        .clone()
                        .unwrap_or_else(|| format!("[sudo] password for {}: ", actor.username));
                    match ctx.read_secret(&prompt).await.filter(|p| !p.is_empty()) {
                        Some(password) => password,
                        None => {
                            ctx.write("sudo: no password was provided");
                            return Ok(1);
                        }
                    }
                }
            };
            if !verify_user_password(&actor, &password).await {
                tracing::info!(user = %actor.username, "sudo authentication failed");
                ctx.write("Sorry, try again.");
                ctx.write("sudo: 1 incorrect password attempt");
                return Ok(1);
            }
        }

        let Some(target) = ctx.shell().users().get(&request.target).cloned() else {
            ctx.write(format!("sudo: unknown user: {}", request.target));
            return Ok(1);
        };

        if request.command.is_empty() {
            if !request.shell {
                ctx.write(USAGE);
                return Ok(1);
            }
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
