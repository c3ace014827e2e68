//! The closed set of PM2 commands the dashboard is willing to run.
//!
//! Incoming command strings are split with shell-word rules and mapped onto
//! [`Pm2Command`]. Anything outside the schema is rejected before a process
//! is ever spawned, and the accepted command is executed as an argument
//! vector, so a process name always reaches pm2 as one literal argument.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ApiError;

pub const TOOL: &str = "pm2";
pub const ONLY_PM2_ALLOWED: &str = "Only PM2 commands are allowed";

pub const DEFAULT_LOG_LINES: u32 = 100;
pub const MAX_LOG_LINES: u32 = 1000;

/// Any printable name that pm2 will not read as a flag.
static TARGET_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^-\p{Cc}][^\p{Cc}]{0,255}$").expect("target pattern is valid")
});

/// Which PM2 process a command applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    Id(u32),
    Name(String),
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        if raw == "all" {
            return Ok(Target::All);
        }
        if let Ok(id) = raw.parse::<u32>() {
            return Ok(Target::Id(id));
        }
        if TARGET_NAME.is_match(raw) {
            return Ok(Target::Name(raw.to_string()));
        }
        Err(ApiError::CommandRejected(format!(
            "Invalid process name: {:?}",
            raw
        )))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::All => f.write_str("all"),
            Target::Id(id) => write!(f, "{}", id),
            Target::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pm2Command {
    /// `pm2 jlist`
    List,
    Start(Target),
    Stop(Target),
    Restart(Target),
    /// `pm2 logs <target> --lines N --nostream`
    Logs { target: Target, lines: u32 },
}

impl Pm2Command {
    /// Parses a command line such as `pm2 stop "web-server"`.
    pub fn parse(input: &str) -> Result<Self, ApiError> {
        let words = shell_words::split(input)
            .map_err(|e| ApiError::CommandRejected(format!("Malformed command: {}", e)))?;

        let mut words = words.into_iter();
        if words.next().as_deref() != Some(TOOL) {
            return Err(ApiError::CommandRejected(ONLY_PM2_ALLOWED.to_string()));
        }

        let subcommand = words.next().unwrap_or_default();
        let rest: Vec<String> = words.collect();

        match subcommand.as_str() {
            "jlist" if rest.is_empty() => Ok(Pm2Command::List),
            "start" | "stop" | "restart" => {
                let [target] = rest.as_slice() else {
                    return Err(unsupported(input));
                };
                let target = Target::parse(target)?;
                Ok(match subcommand.as_str() {
                    "start" => Pm2Command::Start(target),
                    "stop" => Pm2Command::Stop(target),
                    _ => Pm2Command::Restart(target),
                })
            }
            "logs" => parse_logs(input, &rest),
            _ => Err(unsupported(input)),
        }
    }

    /// Arguments passed to the `pm2` binary.
    pub fn to_args(&self) -> Vec<String> {
        match self {
            Pm2Command::List => vec!["jlist".to_string()],
            Pm2Command::Start(target) => vec!["start".to_string(), target.to_string()],
            Pm2Command::Stop(target) => vec!["stop".to_string(), target.to_string()],
            Pm2Command::Restart(target) => vec!["restart".to_string(), target.to_string()],
            Pm2Command::Logs { target, lines } => vec![
                "logs".to_string(),
                target.to_string(),
                "--lines".to_string(),
                lines.to_string(),
                "--nostream".to_string(),
            ],
        }
    }

    /// The process this command names, if any.
    pub fn target(&self) -> Option<&Target> {
        match self {
            Pm2Command::List => None,
            Pm2Command::Start(target) | Pm2Command::Stop(target) | Pm2Command::Restart(target) => {
                Some(target)
            }
            Pm2Command::Logs { target, .. } => Some(target),
        }
    }
}

impl fmt::Display for Pm2Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", TOOL, shell_words::join(self.to_args()))
    }
}

fn parse_logs(input: &str, rest: &[String]) -> Result<Pm2Command, ApiError> {
    let Some((target, flags)) = rest.split_first() else {
        return Err(unsupported(input));
    };
    let target = Target::parse(target)?;

    let mut lines = DEFAULT_LOG_LINES;
    let mut flags = flags.iter();
    while let Some(flag) = flags.next() {
        match flag.as_str() {
            "--nostream" => {}
            "--lines" => {
                let value = flags.next().ok_or_else(|| unsupported(input))?;
                let parsed: u32 = value.parse().map_err(|_| {
                    ApiError::CommandRejected(format!("Invalid line count: {:?}", value))
                })?;
                lines = parsed.clamp(1, MAX_LOG_LINES);
            }
            _ => return Err(unsupported(input)),
        }
    }

    Ok(Pm2Command::Logs { target, lines })
}

fn unsupported(input: &str) -> ApiError {
    ApiError::CommandRejected(format!("Unsupported PM2 command: {}", input))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(input: &str) -> String {
        match Pm2Command::parse(input) {
            Err(ApiError::CommandRejected(msg)) => msg,
            other => panic!("expected rejection for {:?}, got {:?}", input, other),
        }
    }

    #[test]
    fn parses_the_dashboard_commands() {
        assert_eq!(Pm2Command::parse("pm2 jlist").unwrap(), Pm2Command::List);
        assert_eq!(
            Pm2Command::parse(r#"pm2 stop "web-server""#).unwrap(),
            Pm2Command::Stop(Target::Name("web-server".into()))
        );
        assert_eq!(
            Pm2Command::parse("pm2 restart 3").unwrap(),
            Pm2Command::Restart(Target::Id(3))
        );
        assert_eq!(
            Pm2Command::parse("pm2 start all").unwrap(),
            Pm2Command::Start(Target::All)
        );
        assert_eq!(
            Pm2Command::parse(r#"pm2 logs "worker" --lines 100 --nostream"#).unwrap(),
            Pm2Command::Logs {
                target: Target::Name("worker".into()),
                lines: 100
            }
        );
    }

    #[test]
    fn non_pm2_commands_get_the_fixed_message() {
        assert_eq!(rejected("ls -la"), ONLY_PM2_ALLOWED);
        assert_eq!(rejected(""), ONLY_PM2_ALLOWED);
        assert_eq!(rejected("pm2x jlist"), ONLY_PM2_ALLOWED);
    }

    #[test]
    fn names_pass_through_as_one_argument() {
        assert_eq!(
            Pm2Command::parse(r#"pm2 stop "my api""#).unwrap().to_args(),
            vec!["stop", "my api"]
        );
        assert_eq!(
            Pm2Command::parse(r#"pm2 restart "api; rm -rf /""#).unwrap(),
            Pm2Command::Restart(Target::Name("api; rm -rf /".into()))
        );
        assert_eq!(
            Pm2Command::parse("pm2 logs 'my api'").unwrap().to_string(),
            "pm2 logs 'my api' --lines 100 --nostream"
        );
    }

    #[test]
    fn flag_like_and_control_character_names_are_rejected() {
        assert!(rejected("pm2 stop -s").starts_with("Invalid process name"));
        assert!(rejected("pm2 stop --help").starts_with("Invalid process name"));
        assert!(rejected("pm2 stop \"\"").starts_with("Invalid process name"));
        assert!(rejected("pm2 stop \"a\u{7}b\"").starts_with("Invalid process name"));
        rejected("pm2 stop api; rm -rf /");
        rejected(r#"pm2 stop "unterminated"#);
    }

    #[test]
    fn unsupported_shapes_are_rejected() {
        assert!(rejected("pm2 delete api").starts_with("Unsupported PM2 command"));
        rejected("pm2 jlist extra");
        rejected("pm2 stop");
        rejected("pm2 stop a b");
        rejected("pm2 logs api --follow");
        rejected("pm2 logs api --lines");
        rejected("pm2 logs api --lines many");
    }

    #[test]
    fn logs_always_end_and_line_count_is_capped() {
        let cmd = Pm2Command::parse("pm2 logs api --lines 50000").unwrap();
        assert_eq!(
            cmd.to_args(),
            vec!["logs", "api", "--lines", "1000", "--nostream"]
        );

        let cmd = Pm2Command::parse("pm2 logs api").unwrap();
        assert_eq!(cmd.to_string(), "pm2 logs api --lines 100 --nostream");
    }
}
