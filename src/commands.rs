#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Clear,
    Models,
    Model(Option<String>),
    Template(Option<String>),
    Temperature(Option<String>),
    MaxTokens(Option<String>),
    /// Show the request the next message would send.
    Prompt,
    Export(Option<String>),
    Metrics,
    Quit,
    Unknown(String),
}

pub const HELP_TEXT: &str = "\
/help                 show this help
/clear                clear the conversation and its saved history
/models               list available models
/model <id>           switch model
/template <name>      general, explain (eli5) or summarize
/temperature <0-2>    set sampling temperature
/max-tokens <n>       set response token limit
/prompt               show the request context
/export [path]        write the conversation as JSON
/metrics              show last response and session usage
/quit                 exit";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (command, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (trimmed, ""),
    };
    let argument = (!rest.is_empty()).then(|| rest.to_string());

    let parsed = match command {
        "/help" | "/?" => SlashCommand::Help,
        "/clear" => SlashCommand::Clear,
        "/models" => SlashCommand::Models,
        "/model" => SlashCommand::Model(argument),
        "/template" => SlashCommand::Template(argument),
        "/temperature" | "/temp" => SlashCommand::Temperature(argument),
        "/max-tokens" | "/max_tokens" => SlashCommand::MaxTokens(argument),
        "/prompt" => SlashCommand::Prompt,
        "/export" => SlashCommand::Export(argument),
        "/metrics" | "/stats" => SlashCommand::Metrics,
        "/quit" | "/exit" => SlashCommand::Quit,
        _ => SlashCommand::Unknown(command.to_string()),
    };

    Some(parsed)
}
