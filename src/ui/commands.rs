//! Input line parsing
//!
//! Lines starting with `/` are commands; anything else is a chat turn.

/// What the user asked for on one input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start a new conversation
    New,
    /// Show the conversation list
    List,
    /// Switch to a conversation by list position or id prefix
    Open(String),
    /// Set the active conversation's title
    Rename(String),
    /// Print the active conversation again
    Show,
    Help,
    Quit,
    /// Send a chat turn
    Say(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    MissingArgument(&'static str),
    Unknown(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::MissingArgument(cmd) => write!(f, "/{} needs an argument", cmd),
            ParseError::Unknown(cmd) => write!(f, "unknown command /{} (try /help)", cmd),
        }
    }
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Option<Result<Command, ParseError>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Some(Ok(Command::Say(line.to_string())));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "new" => Ok(Command::New),
        "list" | "ls" => Ok(Command::List),
        "open" if arg.is_empty() => Err(ParseError::MissingArgument("open")),
        "open" => Ok(Command::Open(arg.to_string())),
        "rename" if arg.is_empty() => Err(ParseError::MissingArgument("rename")),
        "rename" => Ok(Command::Rename(arg.to_string())),
        "show" => Ok(Command::Show),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(ParseError::Unknown(other.to_string())),
    };
    Some(command)
}
