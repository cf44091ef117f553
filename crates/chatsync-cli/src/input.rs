//! Stdin line commands.

use std::fmt;

/// Help text for `/help`.
pub const HELP: &str = "commands: /join <room>, /reload, /reconnect, /disconnect, /quit; \
                        anything else is sent to the active room";

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Send text to the active room.
    Send(String),
    /// Switch rooms.
    Join(String),
    /// Reload the active room.
    Reload,
    /// Reopen the push connection.
    Reconnect,
    /// Close the push connection.
    Disconnect,
    /// Print the command list.
    Help,
    /// Exit.
    Quit,
    /// Unrecognized or malformed command.
    Invalid(String),
}

impl Input {
    /// Parse a line. `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        // A doubled slash sends the text literally
        if let Some(text) = line.strip_prefix("//") {
            return Some(Self::Send(format!("/{text}")));
        }
        let Some(command) = line.strip_prefix('/') else {
            return Some(Self::Send(line.to_string()));
        };

        let mut parts = command.split_whitespace();
        let input = match (parts.next(), parts.next(), parts.next()) {
            (Some("join" | "j"), Some(room), None) => Self::Join(room.to_string()),
            (Some("reload"), None, _) => Self::Reload,
            (Some("reconnect"), None, _) => Self::Reconnect,
            (Some("disconnect"), None, _) => Self::Disconnect,
            (Some("help" | "h"), None, _) => Self::Help,
            (Some("quit" | "q"), None, _) => Self::Quit,
            _ => Self::Invalid(line.to_string()),
        };
        Some(input)
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send(text) => write!(f, "send {text:?}"),
            Self::Join(room) => write!(f, "join {room}"),
            Self::Reload => f.write_str("reload"),
            Self::Reconnect => f.write_str("reconnect"),
            Self::Disconnect => f.write_str("disconnect"),
            Self::Help => f.write_str("help"),
            Self::Quit => f.write_str("quit"),
            Self::Invalid(line) => write!(f, "invalid {line:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_sent_trimmed() {
        assert_eq!(Input::parse("  hello  "), Some(Input::Send("hello".into())));
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(Input::parse("   "), None);
    }

    #[test]
    fn join_takes_one_room() {
        assert_eq!(Input::parse("/join dev"), Some(Input::Join("dev".into())));
        assert_eq!(Input::parse("/j dev"), Some(Input::Join("dev".into())));
        assert_eq!(Input::parse("/join"), Some(Input::Invalid("/join".into())));
        assert_eq!(Input::parse("/join a b"), Some(Input::Invalid("/join a b".into())));
    }

    #[test]
    fn double_slash_escapes() {
        assert_eq!(Input::parse("//shrug"), Some(Input::Send("/shrug".into())));
    }

    #[test]
    fn unknown_command_is_invalid() {
        assert_eq!(Input::parse("/dance"), Some(Input::Invalid("/dance".into())));
    }
}
