//! Chat command parser
//!
//! Inbound chat text is either a `/command`, the `check <number>` shorthand,
//! a bare phone number, or free text. Commands are case-insensitive and may
//! carry a `@botname` suffix as chat clients append it in group chats.

use crate::ledger::Plan;
use crate::number::normalize_number;
use thiserror::Error;

/// Errors that can occur when parsing chat commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nSend /help to see available commands")]
    UnknownCommand(String),

    /// Command was given an argument it cannot use
    #[error("Unsupported argument for {command}: {arg}\n\nSend /help to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// A parsed chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Welcome message
    Start,

    /// Command overview
    Help,

    /// Look up a number; holds the raw text, normalized later
    Check(String),

    /// Caller's plan, usage, and recent searches
    MyStats,

    /// Caller's full search history
    History,

    /// Forget the caller's search history
    ClearHistory,

    /// Plan prices
    Pricing,

    /// Uptime and counters
    Status,

    /// Admin overview (admin only)
    Admin,

    /// Set a user's plan (admin only)
    ///
    /// Without an amount the plan's list price is recorded.
    Grant {
        user_id: i64,
        plan: Plan,
        amount: Option<u64>,
    },

    /// List subscribers (admin only)
    Users,

    /// Check a record on disk matches memory (admin only)
    Verify(Option<i64>),

    /// Reset usage statistics (admin only)
    ResetStats,

    /// Anything that is neither a command nor a number
    Text(String),
}

impl ChatCommand {
    /// Whether only the admin may run this command
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Self::Admin | Self::Grant { .. } | Self::Users | Self::Verify(_) | Self::ResetStats
        )
    }
}

const CHECK_USAGE: &str = "/check <number>";
const GRANT_USAGE: &str = "/grant <user_id> <free|single|lifetime> [amount]";

/// Parse one inbound chat message
///
/// # Errors
///
/// Returns `CommandError` for unknown commands and for commands with missing
/// or malformed arguments.
///
/// # Examples
///
/// ```
/// use lookup_bot::frontend::commands::{parse_chat_command, ChatCommand};
///
/// assert_eq!(parse_chat_command("/start").unwrap(), ChatCommand::Start);
/// assert_eq!(
///     parse_chat_command("check 9876543210").unwrap(),
///     ChatCommand::Check("9876543210".to_string())
/// );
/// assert!(parse_chat_command("/nope").is_err());
/// ```
pub fn parse_chat_command(input: &str) -> Result<ChatCommand, CommandError> {
    let trimmed = input.trim();

    let Some(body) = trimmed.strip_prefix('/') else {
        return Ok(parse_plain_text(trimmed));
    };

    let (head, rest) = split_head(body);
    let name = head
        .split('@')
        .next()
        .unwrap_or(head)
        .to_lowercase();
    let args: Vec<&str> = rest.split_whitespace().collect();

    match name.as_str() {
        "start" => Ok(ChatCommand::Start),
        "help" | "?" => Ok(ChatCommand::Help),
        "check" => parse_check(rest),
        "mystats" => Ok(ChatCommand::MyStats),
        "history" => Ok(ChatCommand::History),
        "clearhistory" => Ok(ChatCommand::ClearHistory),
        "pricing" | "plans" => Ok(ChatCommand::Pricing),
        "status" => Ok(ChatCommand::Status),
        "admin" => Ok(ChatCommand::Admin),
        "users" => Ok(ChatCommand::Users),
        "resetstats" => Ok(ChatCommand::ResetStats),
        "grant" => parse_grant(&args),
        "verify" => match args.first() {
            None => Ok(ChatCommand::Verify(None)),
            Some(arg) => arg
                .parse::<i64>()
                .map(|id| ChatCommand::Verify(Some(id)))
                .map_err(|_| CommandError::UnsupportedArgument {
                    command: "/verify".to_string(),
                    arg: arg.to_string(),
                }),
        },
        _ => Err(CommandError::UnknownCommand(format!("/{}", head))),
    }
}

fn split_head(text: &str) -> (&str, &str) {
    match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    }
}

fn parse_plain_text(text: &str) -> ChatCommand {
    let (head, rest) = split_head(text);
    if head.eq_ignore_ascii_case("check") && !rest.is_empty() {
        return ChatCommand::Check(rest.to_string());
    }
    if normalize_number(text).is_some() {
        return ChatCommand::Check(text.to_string());
    }
    ChatCommand::Text(text.to_string())
}

fn parse_check(rest: &str) -> Result<ChatCommand, CommandError> {
    if rest.is_empty() {
        return Err(CommandError::MissingArgument {
            command: "/check".to_string(),
            usage: CHECK_USAGE.to_string(),
        });
    }
    Ok(ChatCommand::Check(rest.to_string()))
}

fn parse_grant(args: &[&str]) -> Result<ChatCommand, CommandError> {
    let unsupported = |arg: &str| CommandError::UnsupportedArgument {
        command: "/grant".to_string(),
        arg: arg.to_string(),
    };

    let (user_id, plan) = match args {
        [user_id, plan, ..] => (*user_id, *plan),
        _ => {
            return Err(CommandError::MissingArgument {
                command: "/grant".to_string(),
                usage: GRANT_USAGE.to_string(),
            })
        }
    };
    if args.len() > 3 {
        return Err(unsupported(args[3]));
    }

    let user_id = user_id.parse::<i64>().map_err(|_| unsupported(user_id))?;
    let plan = plan.parse::<Plan>().map_err(|_| unsupported(plan))?;
    let amount = match args.get(2) {
        Some(amount) => Some(amount.parse::<u64>().map_err(|_| unsupported(amount))?),
        None => None,
    };

    Ok(ChatCommand::Grant {
        user_id,
        plan,
        amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_chat_command("/start").unwrap(), ChatCommand::Start);
        assert_eq!(parse_chat_command("/HELP").unwrap(), ChatCommand::Help);
        assert_eq!(parse_chat_command("/mystats").unwrap(), ChatCommand::MyStats);
        assert_eq!(parse_chat_command("/history").unwrap(), ChatCommand::History);
        assert_eq!(
            parse_chat_command("/clearhistory").unwrap(),
            ChatCommand::ClearHistory
        );
        assert_eq!(parse_chat_command("/pricing").unwrap(), ChatCommand::Pricing);
        assert_eq!(parse_chat_command(" /status ").unwrap(), ChatCommand::Status);
    }

    #[test]
    fn test_parse_strips_bot_suffix() {
        assert_eq!(
            parse_chat_command("/start@LookupBot").unwrap(),
            ChatCommand::Start
        );
        assert_eq!(
            parse_chat_command("/check@LookupBot 9876543210").unwrap(),
            ChatCommand::Check("9876543210".to_string())
        );
    }

    #[test]
    fn test_parse_check_forms() {
        assert_eq!(
            parse_chat_command("/check +91 98765 43210").unwrap(),
            ChatCommand::Check("+91 98765 43210".to_string())
        );
        assert_eq!(
            parse_chat_command("Check 98765-43210").unwrap(),
            ChatCommand::Check("98765-43210".to_string())
        );
        assert_eq!(
            parse_chat_command("check abc").unwrap(),
            ChatCommand::Check("abc".to_string())
        );
    }

    #[test]
    fn test_parse_check_without_argument() {
        assert!(matches!(
            parse_chat_command("/check"),
            Err(CommandError::MissingArgument { .. })
        ));
        assert_eq!(
            parse_chat_command("check").unwrap(),
            ChatCommand::Text("check".to_string())
        );
    }

    #[test]
    fn test_parse_bare_number() {
        assert_eq!(
            parse_chat_command("98765 43210").unwrap(),
            ChatCommand::Check("98765 43210".to_string())
        );
        assert_eq!(
            parse_chat_command("hello there").unwrap(),
            ChatCommand::Text("hello there".to_string())
        );
        assert_eq!(
            parse_chat_command("12345").unwrap(),
            ChatCommand::Text("12345".to_string())
        );
    }

    #[test]
    fn test_parse_grant() {
        assert_eq!(
            parse_chat_command("/grant 42 single 100").unwrap(),
            ChatCommand::Grant {
                user_id: 42,
                plan: Plan::Single,
                amount: Some(100)
            }
        );
        assert_eq!(
            parse_chat_command("/grant 42 Lifetime").unwrap(),
            ChatCommand::Grant {
                user_id: 42,
                plan: Plan::Lifetime,
                amount: None
            }
        );
    }

    #[test]
    fn test_parse_grant_errors() {
        assert!(matches!(
            parse_chat_command("/grant 42"),
            Err(CommandError::MissingArgument { .. })
        ));
        assert_eq!(
            parse_chat_command("/grant abc single"),
            Err(CommandError::UnsupportedArgument {
                command: "/grant".to_string(),
                arg: "abc".to_string()
            })
        );
        assert!(matches!(
            parse_chat_command("/grant 42 premium"),
            Err(CommandError::UnsupportedArgument { .. })
        ));
        assert!(matches!(
            parse_chat_command("/grant 42 single lots"),
            Err(CommandError::UnsupportedArgument { .. })
        ));
        assert!(matches!(
            parse_chat_command("/grant 42 single 100 extra"),
            Err(CommandError::UnsupportedArgument { .. })
        ));
    }

    #[test]
    fn test_parse_verify() {
        assert_eq!(
            parse_chat_command("/verify").unwrap(),
            ChatCommand::Verify(None)
        );
        assert_eq!(
            parse_chat_command("/verify 7").unwrap(),
            ChatCommand::Verify(Some(7))
        );
        assert!(parse_chat_command("/verify me").is_err());
    }

    #[test]
    fn test_parse_unknown_command() {
        assert_eq!(
            parse_chat_command("/frobnicate now"),
            Err(CommandError::UnknownCommand("/frobnicate".to_string()))
        );
    }

    #[test]
    fn test_requires_admin() {
        assert!(ChatCommand::Admin.requires_admin());
        assert!(ChatCommand::Users.requires_admin());
        assert!(ChatCommand::ResetStats.requires_admin());
        assert!(ChatCommand::Verify(None).requires_admin());
        assert!(!ChatCommand::Check("1".into()).requires_admin());
        assert!(!ChatCommand::Pricing.requires_admin());
    }
}
