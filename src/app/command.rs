/// A line typed into the input box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    New,
    Switch(i64),
    List,
    Stop,
    Approve,
    Reject,
    Prefs,
    Reset,
    Tools,
    Tool(String),
    Cause(i64),
    Confirm,
    Unconfirm,
    Input(String),
    Run,
    Regenerate(i64),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Unknown(String),
    Usage(&'static str),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Unknown(name) => write!(f, "unknown command /{name}, try /help"),
            CommandError::Usage(usage) => write!(f, "usage: {usage}"),
        }
    }
}

pub const HELP_LINES: &[&str] = &[
    "/new                 start a new conversation",
    "/switch <id>         open another conversation",
    "/list                show conversations",
    "/stop                stop the streaming reply (Ctrl+C also works)",
    "/approve /reject     decide the pending preference proposal",
    "/prefs               show stored preferences",
    "/reset               clear stored preferences (asks twice)",
    "/tools               show the tool catalog",
    "/tool <id>           select a tool",
    "/cause <message-id>  attribute the run to one of your messages",
    "/confirm /unconfirm  toggle confirmation for guarded tools",
    "/input <json>        set the tool input",
    "/run                 run the selected tool",
    "/regen <message-id>  regenerate an assistant reply",
    "/quit                exit",
];

/// Lines that do not start with `/` are chat messages; `//` escapes a
/// leading slash.
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let trimmed = line.trim();
    if let Some(escaped) = trimmed.strip_prefix("//") {
        return Ok(Command::Send(format!("/{escaped}")));
    }
    let Some(body) = trimmed.strip_prefix('/') else {
        return Ok(Command::Send(trimmed.to_string()));
    };

    let (name, rest) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "new" => Command::New,
        "switch" => Command::Switch(parse_id(rest, "/switch <conversation-id>")?),
        "list" => Command::List,
        "stop" => Command::Stop,
        "approve" => Command::Approve,
        "reject" => Command::Reject,
        "prefs" => Command::Prefs,
        "reset" => Command::Reset,
        "tools" => Command::Tools,
        "tool" if !rest.is_empty() => Command::Tool(rest.to_string()),
        "tool" => return Err(CommandError::Usage("/tool <tool-id>")),
        "cause" => Command::Cause(parse_id(rest, "/cause <message-id>")?),
        "confirm" => Command::Confirm,
        "unconfirm" => Command::Unconfirm,
        "input" => Command::Input(rest.to_string()),
        "run" => Command::Run,
        "regen" | "regenerate" => Command::Regenerate(parse_id(rest, "/regen <message-id>")?),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(command)
}

fn parse_id(raw: &str, usage: &'static str) -> Result<i64, CommandError> {
    raw.trim_start_matches('#')
        .parse::<i64>()
        .map_err(|_| CommandError::Usage(usage))
}
