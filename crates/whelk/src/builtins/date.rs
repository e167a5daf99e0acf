//! `date`

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};

use crate::program::{Program, ProgramError};
use crate::shell::ProgramContext;

/// `date [-uR] [+FORMAT]`: print the current date and time.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateCommand;

const DEFAULT_FORMAT: &str = "%a %b %e %H:%M:%S %Z %Y";

/// Zone label for `%Z`: `UTC` at offset zero, the numeric offset otherwise.
fn zone_name(at: &DateTime<FixedOffset>) -> String {
    if at.offset().local_minus_utc() == 0 {
        "UTC".to_string()
    } else {
        at.format("%:z").to_string()
    }
}

/// Expand the supported conversions; anything else is copied through.
fn render(at: &DateTime<FixedOffset>, format: &str) -> String {
    let mut out = String::with_capacity(format.len() * 2);
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(&spec) = chars.peek() else {
            out.push('%');
            break;
        };
        match spec {
            'Y' | 'm' | 'd' | 'e' | 'H' | 'M' | 'S' | 'a' | 'b' | 'F' | 'T' | 'z' => {
                chars.next();
                out.push_str(&at.format(&format!("%{spec}")).to_string());
            }
            'Z' => {
                chars.next();
                out.push_str(&zone_name(at));
            }
            '%' => {
                chars.next();
                out.push('%');
            }
            _ => out.push('%'),
        }
    }
    out
}

#[async_trait]
impl Program for DateCommand {
    fn name(&self) -> &str {
        "date"
    }

    fn description(&self) -> &str {
        "print current date/time"
    }

    async fn run(&self, ctx: &mut ProgramContext<'_>) -> Result<i32, ProgramError> {
        let mut utc = false;
        let mut rfc2822 = false;
        let mut format: Option<String> = None;

        for arg in ctx.args().to_vec() {
            match arg.as_str() {
                "-u" | "--utc" | "--universal" => utc = true,
                "-R" | "--rfc-email" => rfc2822 = true,
                _ => {
                    if let Some(spec) = arg.strip_prefix('+') {
                        if format.is_some() {
                            ctx.write("date: multiple output formats specified");
                            return Ok(1);
                        }
                        format = Some(spec.to_string());
                    } else if arg.starts_with('-') {
                        ctx.write(format!("date: invalid option -- '{arg}'"));
                        return Ok(1);
                    } else {
                        ctx.write(format!("date: extra operand '{arg}'"));
                        return Ok(1);
                    }
                }
            }
        }

        let now = ctx.now();
        let at = if utc {
            now.with_timezone(&Utc).fixed_offset()
        } else {
            now.fixed_offset()
        };
        let line = if rfc2822 {
            at.to_rfc2822()
        } else {
            render(&at, format.as_deref().unwrap_or(DEFAULT_FORMAT))
        };
        ctx.write(line);
        Ok(0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_render_conversions() {
        let at = DateTime::parse_from_rfc3339("2024-03-05T07:08:09+00:00").unwrap();
        assert_eq!(render(&at, "%F %T"), "2024-03-05 07:08:09");
        assert_eq!(render(&at, "%a %b %e|%d"), "Tue Mar  5|05");
        assert_eq!(render(&at, "%Z %z 100%% %q"), "UTC +0000 100% %q");
        assert_eq!(render(&at, DEFAULT_FORMAT), "Tue Mar  5 07:08:09 UTC 2024");
        assert_eq!(at.to_rfc2822(), "Tue, 05 Mar 2024 07:08:09 +0000");

        let shifted = DateTime::parse_from_rfc3339("2024-03-05T07:08:09+05:30").unwrap();
        assert_eq!(render(&shifted, "%Z %z"), "+05:30 +0530");
        assert_eq!(render(&shifted, "trailing %"), "trailing %");
    }
}
