//! Interactive commands.
//!
//! Input lines are parsed once into a [`Command`] and dispatched with a single
//! match in the REPL. Commands are reachable either through the numbered menu
//! (`menu`, then a number) or directly by their slash name.

/// Menu entry with name and description
pub struct MenuEntry {
    pub number: &'static str,
    pub slash: &'static str,
    pub description: &'static str,
    pub command: Command,
}

pub const MENU: &[MenuEntry] = &[
    MenuEntry {
        number: "1",
        slash: "/reset",
        description: "Reset chat",
        command: Command::ResetChat,
    },
    MenuEntry {
        number: "2",
        slash: "/context",
        description: "Change context",
        command: Command::ChangeContext,
    },
    MenuEntry {
        number: "3",
        slash: "/delete",
        description: "Delete a conversation log",
        command: Command::DeleteLog,
    },
    MenuEntry {
        number: "4",
        slash: "/apikey",
        description: "Change API key",
        command: Command::ChangeApiKey,
    },
    MenuEntry {
        number: "5",
        slash: "/exit",
        description: "Exit",
        command: Command::Exit,
    },
];

/// Commands that only have a slash form.
pub const EXTRA: &[(&str, &str, Command)] = &[
    ("/status", "Show history size and token budget", Command::Status),
    ("/help", "Show this help", Command::Help),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Show the numbered menu and read a choice.
    Menu,
    ResetChat,
    ChangeContext,
    DeleteLog,
    ChangeApiKey,
    Status,
    Help,
    Exit,
}

/// What a line of user input means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Command(Command),
    /// Looks like a slash command but matches nothing.
    Unknown(String),
    Message(String),
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if line == "menu" {
            return Self::Command(Command::Menu);
        }
        if looks_like_command(line) {
            return match Command::from_slash(line) {
                Some(cmd) => Self::Command(cmd),
                None => Self::Unknown(line.to_string()),
            };
        }
        Self::Message(line.to_string())
    }
}

/// A single `/word` with no further slashes; `/etc/hosts` or a sentence
/// starting with a slash is a message.
fn looks_like_command(line: &str) -> bool {
    line.strip_prefix('/')
        .is_some_and(|rest| !rest.contains(['/', '\\']) && !rest.contains(char::is_whitespace))
}

impl Command {
    pub fn from_slash(word: &str) -> Option<Self> {
        let word = word.trim().to_lowercase();
        match word.as_str() {
            "/quit" | "/q" => return Some(Self::Exit),
            "/h" | "/?" => return Some(Self::Help),
            "/menu" => return Some(Self::Menu),
            _ => {}
        }
        MENU.iter()
            .find(|entry| entry.slash == word)
            .map(|entry| entry.command)
            .or_else(|| {
                EXTRA
                    .iter()
                    .find(|(slash, _, _)| *slash == word)
                    .map(|(_, _, c)| *c)
            })
    }

    /// Map a numbered menu choice.
    pub fn from_menu_choice(choice: &str) -> Option<Self> {
        let choice = choice.trim();
        MENU.iter()
            .find(|entry| entry.number == choice)
            .map(|entry| entry.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message_and_empty() {
        assert_eq!(Input::parse("   "), Input::Empty);
        assert_eq!(
            Input::parse("  what is rust?\n"),
            Input::Message("what is rust?".to_string())
        );
    }

    #[test]
    fn test_parse_menu_keyword() {
        assert_eq!(Input::parse("menu"), Input::Command(Command::Menu));
        // only the exact keyword opens the menu
        assert_eq!(
            Input::parse("menu please"),
            Input::Message("menu please".to_string())
        );
    }

    #[test]
    fn test_parse_slash_commands() {
        assert_eq!(Input::parse("/reset"), Input::Command(Command::ResetChat));
        assert_eq!(Input::parse("/EXIT"), Input::Command(Command::Exit));
        assert_eq!(Input::parse("/q"), Input::Command(Command::Exit));
        assert_eq!(Input::parse("/status"), Input::Command(Command::Status));
        assert_eq!(Input::parse("/nope"), Input::Unknown("/nope".to_string()));
        assert_eq!(Input::parse("/"), Input::Unknown("/".to_string()));
    }

    #[test]
    fn test_slash_text_is_a_message() {
        assert_eq!(
            Input::parse("/etc/hosts what is this?"),
            Input::Message("/etc/hosts what is this?".to_string())
        );
        assert_eq!(
            Input::parse("/etc/hosts"),
            Input::Message("/etc/hosts".to_string())
        );
        assert_eq!(
            Input::parse("/reset the counter please"),
            Input::Message("/reset the counter please".to_string())
        );
    }

    #[test]
    fn test_menu_choices() {
        assert_eq!(Command::from_menu_choice("1"), Some(Command::ResetChat));
        assert_eq!(Command::from_menu_choice(" 2 "), Some(Command::ChangeContext));
        assert_eq!(Command::from_menu_choice("3"), Some(Command::DeleteLog));
        assert_eq!(Command::from_menu_choice("4"), Some(Command::ChangeApiKey));
        assert_eq!(Command::from_menu_choice("5"), Some(Command::Exit));
        assert_eq!(Command::from_menu_choice("6"), None);
        assert_eq!(Command::from_menu_choice(""), None);
    }
}
