use thiserror::Error;

/// A typed line split into a command name and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub args: Vec<String>,
}

/// `None` for blank input.
pub fn parse_line(input: &str) -> Option<ParsedCommand> {
    let mut words = input.split_whitespace();
    let name = words.next()?.to_string();
    Some(ParsedCommand {
        name,
        args: words.map(str::to_string).collect(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Monitor,
    Kill(i64),
    Log,
    Help,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),
    #[error("'kill' command requires a PID.")]
    MissingPid,
    #[error("Invalid PID '{0}'.")]
    InvalidPid(String),
}

pub const HELP_ENTRIES: [(&str, &str); 6] = [
    ("list", "List all active processes."),
    ("monitor", "Monitor CPU and memory usage in real-time."),
    ("kill <pid>", "Terminate a process by PID."),
    ("log", "Display recent log entries."),
    ("help", "Show this help message."),
    ("exit", "Exit the program."),
];

impl Command {
    pub fn from_parsed(parsed: &ParsedCommand) -> Result<Self, CommandError> {
        match parsed.name.to_lowercase().as_str() {
            "list" => Ok(Command::List),
            "monitor" => Ok(Command::Monitor),
            "kill" => {
                let raw = parsed.args.first().ok_or(CommandError::MissingPid)?;
                raw.parse()
                    .map(Command::Kill)
                    .map_err(|_| CommandError::InvalidPid(raw.clone()))
            }
            "log" => Ok(Command::Log),
            "help" => Ok(Command::Help),
            "exit" | "quit" => Ok(Command::Exit),
            _ => Err(CommandError::Unknown(parsed.name.clone())),
        }
    }

    pub fn parse(input: &str) -> Result<Option<Self>, CommandError> {
        parse_line(input).map(|p| Self::from_parsed(&p)).transpose()
    }
}
