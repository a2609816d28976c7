use crate::error::CommandParseError;

/// Prefixes that mark a line of input as a command rather than chat.
const COMMAND_MARKERS: [char; 2] = ['/', ':'];

/// A parsed slash-command: lower-case name without the marker, plus arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Parse raw input such as `/join random` or `:q`.
    pub fn parse(input: &str) -> Result<Self, CommandParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CommandParseError::Empty);
        }

        let rest = trimmed
            .strip_prefix(COMMAND_MARKERS)
            .ok_or(CommandParseError::MissingMarker)?;

        let mut words = rest.split_whitespace();
        let name = words.next().ok_or(CommandParseError::Empty)?;

        Ok(Self {
            name: name.to_lowercase(),
            args: words.map(str::to_string).collect(),
        })
    }

    /// Whether `input` looks like a command.
    pub fn is_command(input: &str) -> bool {
        input.trim_start().starts_with(COMMAND_MARKERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_and_args() {
        let cmd = Command::parse("/dm bob hello   there").unwrap();
        assert_eq!(cmd.name, "dm");
        assert_eq!(cmd.args, vec!["bob", "hello", "there"]);
    }

    #[test]
    fn lowercases_name_but_not_args() {
        let cmd = Command::parse("  /JOIN Random ").unwrap();
        assert_eq!(cmd.name, "join");
        assert_eq!(cmd.args, vec!["Random"]);
    }

    #[test]
    fn accepts_command_bar_marker() {
        let cmd = Command::parse(":q!").unwrap();
        assert_eq!(cmd.name, "q!");
        assert!(cmd.args.is_empty());
    }

    #[test]
    fn rejects_empty_and_unmarked_input() {
        assert_eq!(Command::parse("   "), Err(CommandParseError::Empty));
        assert_eq!(Command::parse("/"), Err(CommandParseError::Empty));
        assert_eq!(Command::parse("hello"), Err(CommandParseError::MissingMarker));
    }

    #[test]
    fn is_command_checks_marker() {
        assert!(Command::is_command("/help"));
        assert!(Command::is_command("  :q"));
        assert!(!Command::is_command("hello /help"));
    }
}
