//! Special commands parser for interactive chat mode
//!
//! Special commands manage the conversation history from inside a chat
//! session instead of being sent to the assistant. Commands are prefixed
//! with `/`; the command word is case-insensitive while titles keep their
//! case.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Reference to a stored conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationRef {
    /// Exact title
    Title(String),
    /// 1-based position in the `/list` output (`#3`)
    Index(usize),
}

impl ConversationRef {
    fn parse(arg: &str) -> Self {
        if let Some(n) = arg.strip_prefix('#').and_then(|n| n.parse::<usize>().ok()) {
            if n > 0 {
                return Self::Index(n);
            }
        }
        Self::Title(arg.to_string())
    }

    /// Resolve against the current listing (newest first)
    pub fn resolve<'a>(&'a self, titles: &'a [String]) -> Option<&'a str> {
        match self {
            Self::Title(title) => Some(title.as_str()),
            Self::Index(n) => titles.get(n - 1).map(String::as_str),
        }
    }
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Start a fresh conversation
    New,

    /// List stored conversations, newest first
    List,

    /// Switch to a stored conversation and print it
    Open(ConversationRef),

    /// Rename the current conversation
    Rename(String),

    /// Delete a conversation; the current one when no argument is given
    Delete(Option<ConversationRef>),

    /// Print the current conversation
    Show,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command
    ///
    /// The input should be sent to the assistant.
    None,
}

/// Parse a user input string into a special command
///
/// # Errors
///
/// Returns `CommandError::UnknownCommand` for an unrecognized `/word`,
/// `CommandError::MissingArgument` when a required argument is absent,
/// and `CommandError::UnsupportedArgument` when a command takes none.
///
/// # Examples
///
/// ```
/// use colloquy::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/new").unwrap(), SpecialCommand::New);
/// assert_eq!(parse_special_command("hello").unwrap(), SpecialCommand::None);
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if lower == "exit" || lower == "quit" {
        return Ok(SpecialCommand::Exit);
    }
    if !trimmed.starts_with('/') {
        return Ok(SpecialCommand::None);
    }

    let (word, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((word, rest)) => (word.to_lowercase(), rest.trim()),
        None => (lower, ""),
    };

    let no_arg = |command: SpecialCommand| {
        if arg.is_empty() {
            Ok(command)
        } else {
            Err(CommandError::UnsupportedArgument {
                command: word.clone(),
                arg: arg.to_string(),
            })
        }
    };

    match word.as_str() {
        "/new" => no_arg(SpecialCommand::New),
        "/list" | "/ls" => no_arg(SpecialCommand::List),
        "/show" => no_arg(SpecialCommand::Show),
        "/help" | "/?" => no_arg(SpecialCommand::Help),
        "/exit" | "/quit" => no_arg(SpecialCommand::Exit),
        "/open" => {
            if arg.is_empty() {
                Err(CommandError::MissingArgument {
                    command: "/open".to_string(),
                    usage: "/open <title|#n>".to_string(),
                })
            } else {
                Ok(SpecialCommand::Open(ConversationRef::parse(arg)))
            }
        }
        "/rename" => {
            if arg.is_empty() {
                Err(CommandError::MissingArgument {
                    command: "/rename".to_string(),
                    usage: "/rename <new title>".to_string(),
                })
            } else {
                Ok(SpecialCommand::Rename(arg.to_string()))
            }
        }
        "/delete" | "/rm" => {
            if arg.is_empty() {
                Ok(SpecialCommand::Delete(None))
            } else {
                Ok(SpecialCommand::Delete(Some(ConversationRef::parse(arg))))
            }
        }
        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

/// Display help for special commands
pub fn print_help() {
    println!(
        r#"
Special Commands for Interactive Chat
=====================================

CONVERSATIONS:
  /new              - Start a new conversation (titled after the first reply)
  /list             - List stored conversations, newest first
  /open <title|#n>  - Switch to a conversation by title or list number
  /show             - Print the current conversation
  /rename <title>   - Rename the current conversation
  /delete [title|#n] - Delete a conversation (default: the current one)

SESSION:
  /help             - Show this help message
  /exit, /quit      - Exit (Ctrl-D works too)

NOTES:
  - Command words are case-insensitive; titles are matched exactly
  - Ctrl-C cancels a reply that is still streaming; nothing is saved
  - Regular text (not starting with /) is sent to the assistant
"#
    );
}
