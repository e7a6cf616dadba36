//! Slash command parsing for the REPL.

/// Every command, for completion and hints.
pub const COMMANDS: &[&str] = &[
    "/new", "/sessions", "/archived", "/switch", "/rename", "/archive", "/unarchive", "/pin",
    "/unpin", "/pinned", "/log", "/help", "/quit",
];

/// A session reference: a 1-based position in the last listing, or an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Index(usize),
    Id(String),
}

impl Target {
    fn parse(arg: &str) -> Self {
        match arg.parse::<usize>() {
            Ok(index) if index > 0 => Self::Index(index),
            _ => Self::Id(arg.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text to send to the agent.
    Send(String),
    New(Option<String>),
    Sessions,
    Archived,
    Switch(Target),
    Rename(String),
    /// Archives the given session, or the active one.
    Archive(Option<Target>),
    Unarchive(Target),
    Pin(usize),
    Unpin(usize),
    Pinned,
    Log,
    Help,
    Quit,
    /// A known command missing its argument.
    Usage(&'static str),
    Unknown(String),
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Option<Command> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !trimmed.starts_with('/') {
        return Some(Command::Send(trimmed.to_string()));
    }

    let (name, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, Some(rest.trim()).filter(|rest| !rest.is_empty())),
        None => (trimmed, None),
    };

    let command = match (name, arg) {
        ("/new", arg) => Command::New(arg.map(str::to_string)),
        ("/sessions", _) => Command::Sessions,
        ("/archived", _) => Command::Archived,
        ("/switch", Some(arg)) => Command::Switch(Target::parse(arg)),
        ("/switch", None) => Command::Usage("/switch <n|id>"),
        ("/rename", Some(arg)) => Command::Rename(arg.to_string()),
        ("/rename", None) => Command::Usage("/rename <name>"),
        ("/archive", arg) => Command::Archive(arg.map(Target::parse)),
        ("/unarchive", Some(arg)) => Command::Unarchive(Target::parse(arg)),
        ("/unarchive", None) => Command::Usage("/unarchive <n|id>"),
        ("/pin", Some(arg)) => parse_position(arg).map_or(Command::Usage("/pin <n>"), Command::Pin),
        ("/pin", None) => Command::Usage("/pin <n>"),
        ("/unpin", Some(arg)) => {
            parse_position(arg).map_or(Command::Usage("/unpin <n>"), Command::Unpin)
        }
        ("/unpin", None) => Command::Usage("/unpin <n>"),
        ("/pinned", _) => Command::Pinned,
        ("/log", _) => Command::Log,
        ("/help", _) => Command::Help,
        ("/quit" | "/exit", _) => Command::Quit,
        (other, _) => Command::Unknown(other.to_string()),
    };
    Some(command)
}

fn parse_position(arg: &str) -> Option<usize> {
    arg.parse::<usize>().ok().filter(|n| *n > 0)
}
