//! Special commands for the interactive follow-up loop
//!
//! Anything typed at the follow-up prompt is sent to the model as a
//! question about the rewrite, except lines starting with `/` (and the
//! bare words `exit` and `quit`), which act on the session instead.
//! Commands are case-insensitive.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command does not take arguments
    #[error("{command} does not take arguments (got: {arg})")]
    UnexpectedArgument { command: String, arg: String },
}

/// Commands handled by the follow-up loop itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Re-render the current session
    Show,

    /// Clear the session and leave the loop
    Reset,

    /// Display help information
    Help,

    /// Leave the loop, keeping the session
    Exit,

    /// Not a special command; send the line as a follow-up
    None,
}

/// Parse a line typed at the follow-up prompt
///
/// # Errors
///
/// Returns `CommandError::UnknownCommand` for an unrecognized `/command`
/// and `CommandError::UnexpectedArgument` when a command is given
/// arguments.
///
/// # Examples
///
/// ```
/// use suikou::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/show").unwrap(), SpecialCommand::Show);
/// assert_eq!(parse_special_command("QUIT").unwrap(), SpecialCommand::Exit);
/// assert_eq!(
///     parse_special_command("Why is the formal one better?").unwrap(),
///     SpecialCommand::None
/// );
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    let (command, arg) = match lower.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (lower.as_str(), ""),
    };

    let parsed = match command {
        "/show" | "/status" => SpecialCommand::Show,
        "/reset" | "/clear" => SpecialCommand::Reset,
        "/help" | "/?" => SpecialCommand::Help,
        "/exit" | "/quit" | "exit" | "quit" => SpecialCommand::Exit,
        _ => return Err(CommandError::UnknownCommand(trimmed.to_string())),
    };

    if !arg.is_empty() {
        return Err(CommandError::UnexpectedArgument {
            command: command.to_string(),
            arg: arg.to_string(),
        });
    }

    Ok(parsed)
}

/// Print help for the follow-up loop
pub fn print_help() {
    println!(
        r#"
Follow-up Commands
==================

Type a question about the rewrite and press Enter to ask it.

  /show    - Show the session again (alias: /status)
  /reset   - Clear the session and exit (alias: /clear)
  /help    - Show this help (alias: /?)
  exit     - Leave, keeping the session (aliases: quit, /exit)
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(
            parse_special_command("make it shorter").unwrap(),
            SpecialCommand::None
        );
    }

    #[test]
    fn test_aliases() {
        assert_eq!(parse_special_command("/status").unwrap(), SpecialCommand::Show);
        assert_eq!(parse_special_command("/CLEAR").unwrap(), SpecialCommand::Reset);
        assert_eq!(parse_special_command("/?").unwrap(), SpecialCommand::Help);
        assert_eq!(parse_special_command(" exit ").unwrap(), SpecialCommand::Exit);
        assert_eq!(parse_special_command("/quit").unwrap(), SpecialCommand::Exit);
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse_special_command("/retry"),
            Err(CommandError::UnknownCommand("/retry".to_string()))
        );
    }

    #[test]
    fn test_unexpected_argument() {
        let err = parse_special_command("/reset now").unwrap_err();
        assert_eq!(
            err,
            CommandError::UnexpectedArgument {
                command: "/reset".to_string(),
                arg: "now".to_string(),
            }
        );
    }

    #[test]
    fn test_exit_with_words_is_a_question() {
        assert_eq!(
            parse_special_command("exit strategy?").unwrap(),
            SpecialCommand::None
        );
    }
}
