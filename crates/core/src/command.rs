use crate::models::Category;
use std::fmt;
use std::str::FromStr;

/// The commands an input layer can issue. Voice, keys and gestures all
/// translate into these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Scan(String),
    Next,
    Previous,
    Categorize(Category),
    ExportAndClose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand(pub String);

impl fmt::Display for UnknownCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command not recognized: {}", self.0)
    }
}

impl std::error::Error for UnknownCommand {}

impl FromStr for Command {
    type Err = UnknownCommand;

    /// Parses a spoken or typed phrase. Case and surrounding whitespace are
    /// ignored; `scan <dir>` keeps the directory verbatim.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let normalized = trimmed
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let cmd = match normalized.as_str() {
            "yes" | "y" => Command::Categorize(Category::Yes),
            "no" | "n" => Command::Categorize(Category::No),
            "not sure" | "notsure" | "maybe" | "?" => Command::Categorize(Category::NotSure),
            "next" | "skip" => Command::Next,
            "previous" | "prev" | "back" => Command::Previous,
            "exit" | "quit" | "done" => Command::ExportAndClose,
            _ => {
                if let Some(dir) = normalized
                    .strip_prefix("scan ")
                    .map(|_| trimmed["scan".len()..].trim())
                {
                    return Ok(Command::Scan(dir.to_string()));
                }
                return Err(UnknownCommand(trimmed.to_string()));
            }
        };
        Ok(cmd)
    }
}
