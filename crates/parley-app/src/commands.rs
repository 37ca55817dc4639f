//! Slash-command parsing for the chat composer.
//!
//! Anything not starting with `/` is a message. `//` escapes a literal
//! leading slash.

use parley_proto::Role;

/// A parsed composer line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain chat message.
    Message {
        /// Text to post
        content: String,
    },
    /// `/leave`
    Leave,
    /// `/retry`
    Retry,
    /// `/upload <path>`
    Upload {
        /// Local file path
        path: String,
    },
    /// `/download <file>` by name or key
    Download {
        /// File name or storage key
        file: String,
    },
    /// `/delete <file>` by name or key
    Delete {
        /// File name or storage key
        file: String,
    },
    /// `/kick <user>`
    Kick {
        /// Display name
        user: String,
    },
    /// `/role <user> <role>`
    AssignRole {
        /// Display name
        user: String,
        /// New role
        role: Role,
    },
    /// `/export`
    Export,
    /// `/help`
    Help,
    /// `/quit`
    Quit,
    /// Unrecognized command.
    Unknown {
        /// The raw line
        input: String,
    },
    /// Known command with bad arguments.
    InvalidArgs {
        /// Command name without the slash
        command: String,
        /// What was wrong
        error: String,
    },
}

/// One-line summary of every command.
pub const HELP: &str = "/upload <path>  /download <file>  /delete <file>  /kick <user>  \
                        /role <user> <member|co-leader|leader>  /export  /retry  /leave  /quit";

/// Parse one composer line.
pub fn parse(line: &str) -> Command {
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Message { content: line.to_string() };
    };
    if rest.starts_with('/') {
        return Command::Message { content: rest.to_string() };
    }

    let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let args = args.trim();
    let name = name.to_ascii_lowercase();

    match name.as_str() {
        "leave" => Command::Leave,
        "retry" | "reconnect" => Command::Retry,
        "export" => Command::Export,
        "help" | "?" => Command::Help,
        "quit" | "q" => Command::Quit,
        "upload" => required(&name, args, "missing file path")
            .map_or_else(|e| e, |path| Command::Upload { path }),
        "download" => required(&name, args, "missing file name")
            .map_or_else(|e| e, |file| Command::Download { file }),
        "delete" => required(&name, args, "missing file name")
            .map_or_else(|e| e, |file| Command::Delete { file }),
        "kick" => required(&name, args, "missing user name")
            .map_or_else(|e| e, |user| Command::Kick { user }),
        "role" => parse_role(&name, args),
        _ => Command::Unknown { input: line.to_string() },
    }
}

fn required(command: &str, args: &str, error: &str) -> Result<String, Command> {
    if args.is_empty() {
        Err(Command::InvalidArgs { command: command.to_string(), error: error.to_string() })
    } else {
        Ok(args.to_string())
    }
}

fn parse_role(command: &str, args: &str) -> Command {
    let invalid = |error: String| Command::InvalidArgs { command: command.to_string(), error };

    let Some((user, role)) = args.rsplit_once(char::is_whitespace) else {
        return invalid("usage: /role <user> <role>".to_string());
    };
    match role.parse::<Role>() {
        Ok(role) => Command::AssignRole { user: user.trim().to_string(), role },
        Err(e) => invalid(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(parse("hello"), Command::Message { content: "hello".into() });
        assert_eq!(parse("//not a command"), Command::Message { content: "/not a command".into() });
    }

    #[test]
    fn commands_with_arguments() {
        assert_eq!(parse("/upload ./a b.png"), Command::Upload { path: "./a b.png".into() });
        assert_eq!(parse("/KICK bob"), Command::Kick { user: "bob".into() });
        assert_eq!(
            parse("/role bob co-leader"),
            Command::AssignRole { user: "bob".into(), role: Role::CoLeader }
        );
    }

    #[test]
    fn missing_arguments_are_reported() {
        assert!(matches!(parse("/kick"), Command::InvalidArgs { command, .. } if command == "kick"));
        assert!(matches!(parse("/role bob"), Command::InvalidArgs { .. }));
        assert!(matches!(parse("/role bob admin"), Command::InvalidArgs { .. }));
    }

    #[test]
    fn unknown_command() {
        assert_eq!(parse("/dance"), Command::Unknown { input: "/dance".into() });
    }
}
