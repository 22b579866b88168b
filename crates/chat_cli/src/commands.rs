#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Clear,
    Stop,
    Quit,
    Models,
    Model(String),
    Attach(String),
    /// One-based index into the staged media list.
    Detach(usize),
    Media,
    Sessions,
    New,
    Switch(String),
    Delete(String),
    Usage(&'static str),
    Unknown(String),
}

pub const HELP_TEXT: &str = "Commands: /help, /clear, /stop, /quit, /models, /model <id>, \
/attach <path>, /detach <n>, /media, /sessions, /new, /switch <id>, /delete <id>";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (command, argument) = match trimmed.split_once(char::is_whitespace) {
        Some((command, argument)) => (command, argument.trim()),
        None => (trimmed, ""),
    };
    let required = |usage: &'static str, build: fn(String) -> SlashCommand| {
        if argument.is_empty() {
            SlashCommand::Usage(usage)
        } else {
            build(argument.to_string())
        }
    };

    let parsed = match command {
        "/help" => SlashCommand::Help,
        "/clear" => SlashCommand::Clear,
        "/stop" => SlashCommand::Stop,
        "/quit" | "/exit" => SlashCommand::Quit,
        "/models" => SlashCommand::Models,
        "/model" => required("/model <id>", SlashCommand::Model),
        "/attach" => required("/attach <path>", SlashCommand::Attach),
        "/detach" => match argument.parse::<usize>() {
            Ok(index) if index > 0 => SlashCommand::Detach(index),
            _ => SlashCommand::Usage("/detach <n>"),
        },
        "/media" => SlashCommand::Media,
        "/sessions" => SlashCommand::Sessions,
        "/new" => SlashCommand::New,
        "/switch" => required("/switch <id>", SlashCommand::Switch),
        "/delete" => required("/delete <id>", SlashCommand::Delete),
        _ => SlashCommand::Unknown(command.to_string()),
    };

    Some(parsed)
}
