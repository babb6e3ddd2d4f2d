pub const HELP: &str = "\
/session <id>   open a session and load its history
/sessions       list sessions, most recent first
/models         list available models
/model [id]     set the model override for new sends (no id clears it)
/reload         reload the open session from the server
/help           show this help
/quit           exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Session(Option<String>),
    Sessions,
    Models,
    Model(Option<String>),
    Reload,
    Quit,
    Unknown(String),
}

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut parts = trimmed.split_whitespace();
    let command = parts.next().unwrap_or(trimmed).to_string();
    let argument = parts.next().map(ToOwned::to_owned);

    let parsed = match command.as_str() {
        "/help" => SlashCommand::Help,
        "/session" => SlashCommand::Session(argument),
        "/sessions" => SlashCommand::Sessions,
        "/models" => SlashCommand::Models,
        "/model" => SlashCommand::Model(argument),
        "/reload" => SlashCommand::Reload,
        "/quit" | "/exit" => SlashCommand::Quit,
        _ => SlashCommand::Unknown(command),
    };

    Some(parsed)
}
