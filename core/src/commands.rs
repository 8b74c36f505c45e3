/// Chat commands understood by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `!record`: show the current record.
    Record,
    /// `!taunt <text>`: add a taunt (owner only).
    AddTaunt(String),
}

/// Parse a message body. `None` for ordinary messages and unknown commands.
pub fn parse(content: &str) -> Option<Command> {
    let rest = content.trim().strip_prefix('!')?;
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    match name {
        "record" => Some(Command::Record),
        "taunt" if !arg.is_empty() => Some(Command::AddTaunt(arg.to_string())),
        _ => None,
    }
}
