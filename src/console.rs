use crate::agent::{ AgentError, ChatAgent };
use crate::conversation::Conversation;
use crate::llm::catalog::{ AVAILABLE_MODELS, DEFAULT_MODEL };
use crate::models::chat::{ ChatMessage, Role };

use log::error;
use std::io;
use tokio::io::{ AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt };

#[derive(Debug, Clone, PartialEq)]
pub enum FontAction {
    Increase,
    Decrease,
    Toggle,
    Set(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Chat(String),
    History,
    Sessions,
    NewChat,
    Clear,
    Models,
    Model(String),
    Font(FontAction),
    Help,
    Quit,
    Unknown(String),
}

pub fn parse_line(line: &str) -> ConsoleCommand {
    let line = line.trim();
    if !line.starts_with('/') {
        return ConsoleCommand::Chat(line.to_string());
    }
    let mut parts = line.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).unwrap_or_default();

    match cmd {
        "/history" => ConsoleCommand::History,
        "/sessions" => ConsoleCommand::Sessions,
        "/new" => ConsoleCommand::NewChat,
        "/clear" => ConsoleCommand::Clear,
        "/models" => ConsoleCommand::Models,
        "/model" if !arg.is_empty() => ConsoleCommand::Model(arg.to_string()),
        "/font" =>
            match arg {
                "+" => ConsoleCommand::Font(FontAction::Increase),
                "-" => ConsoleCommand::Font(FontAction::Decrease),
                "toggle" => ConsoleCommand::Font(FontAction::Toggle),
                other =>
                    match other.parse::<f32>() {
                        Ok(v) => ConsoleCommand::Font(FontAction::Set(v)),
                        Err(_) => ConsoleCommand::Unknown(line.to_string()),
                    }
            }
        "/help" => ConsoleCommand::Help,
        "/quit" | "/exit" => ConsoleCommand::Quit,
        _ => ConsoleCommand::Unknown(line.to_string()),
    }
}

const HELP: &str =
    "Commands: /history /sessions /new /clear /models /model <id> /font <+|-|toggle|value> /quit";

fn render(message: &ChatMessage) -> String {
    let speaker = match message.role {
        Role::User => "you",
        Role::Assistant => "LawAssist",
    };
    format!("[{}] {}\n", speaker, message.text)
}

pub fn render_catalog() -> String {
    AVAILABLE_MODELS.iter()
        .map(|m| {
            let marker = if m.id == DEFAULT_MODEL { " (default)" } else { "" };
            format!("{:<30} {:<8} {:>7}{}\n", m.id, m.owner, m.context_window, marker)
        })
        .collect()
}

/// Line-based chat loop for one user. Returns when input ends or on `/quit`.
pub async fn run_console<R, W>(
    agent: &ChatAgent,
    user_id: &str,
    input: R,
    out: &mut W
) -> io::Result<()>
    where R: AsyncBufRead + Unpin, W: AsyncWrite + Unpin
{
    let mut conversation = Conversation::new(user_id);
    agent.load_history(&mut conversation).await;
    for message in conversation.messages() {
        out.write_all(render(message).as_bytes()).await?;
    }
    out.write_all(format!("{}\n", HELP).as_bytes()).await?;
    out.flush().await?;

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let reply = match parse_line(&line) {
            ConsoleCommand::Quit => {
                break;
            }
            ConsoleCommand::Chat(text) => {
                match agent.submit(&mut conversation, &text, None).await {
                    Ok(reply) => render(&reply),
                    Err(AgentError::EmptyPrompt) => String::new(),
                    Err(e) => {
                        error!("Chat failed: {}", e);
                        format!("{}\n", e)
                    }
                }
            }
            ConsoleCommand::History => {
                agent.load_history(&mut conversation).await;
                conversation.messages().iter().map(render).collect()
            }
            ConsoleCommand::Sessions => {
                let sessions = agent.sessions(conversation.user_key()).await;
                if sessions.is_empty() {
                    "No saved chats.\n".to_string()
                } else {
                    sessions
                        .iter()
                        .map(|s| format!("{} ({} messages) {}\n", s.title, s.message_count, s.preview))
                        .collect()
                }
            }
            ConsoleCommand::NewChat => {
                agent.new_chat(&mut conversation).await;
                conversation.messages().iter().map(render).collect()
            }
            ConsoleCommand::Clear => {
                if agent.delete_all_chats(&mut conversation).await {
                    "All chats deleted.\n".to_string()
                } else {
                    "Failed to delete chats. Please try again.\n".to_string()
                }
            }
            ConsoleCommand::Models => render_catalog(),
            ConsoleCommand::Model(id) => {
                let settings = agent.settings();
                let mut manager = settings.write().await;
                match manager.set_selected_model(&id) {
                    Ok(chosen) => format!("Model set to {}\n", chosen),
                    Err(e) => format!("Could not save model: {}\n", e),
                }
            }
            ConsoleCommand::Font(action) => {
                let settings = agent.settings();
                let mut manager = settings.write().await;
                let result = match action {
                    FontAction::Increase => manager.increase_font_size(),
                    FontAction::Decrease => manager.decrease_font_size(),
                    FontAction::Toggle => manager.toggle_font_size(),
                    FontAction::Set(v) => manager.set_font_size(v),
                };
                match result {
                    Ok(size) => format!("Font size {:.1}\n", size),
                    Err(e) => format!("Could not save font size: {}\n", e),
                }
            }
            ConsoleCommand::Help => format!("{}\n", HELP),
            ConsoleCommand::Unknown(cmd) => format!("Unknown command: {}\n{}\n", cmd, HELP),
        };
        out.write_all(reply.as_bytes()).await?;
        out.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_recognised() {
        assert_eq!(parse_line("/history"), ConsoleCommand::History);
        assert_eq!(parse_line("/model gemma2-9b-it"), ConsoleCommand::Model("gemma2-9b-it".into()));
        assert_eq!(parse_line("/font +"), ConsoleCommand::Font(FontAction::Increase));
        assert_eq!(parse_line("/font 1.2"), ConsoleCommand::Font(FontAction::Set(1.2)));
        assert_eq!(parse_line(" /quit "), ConsoleCommand::Quit);
        assert!(matches!(parse_line("/model"), ConsoleCommand::Unknown(_)));
        assert!(matches!(parse_line("/font big"), ConsoleCommand::Unknown(_)));
    }

    #[test]
    fn plain_text_is_a_chat_message() {
        assert_eq!(parse_line("  what is RTE?  "), ConsoleCommand::Chat("what is RTE?".into()));
    }

    #[test]
    fn catalog_marks_the_default() {
        let listing = render_catalog();
        assert_eq!(listing.lines().count(), AVAILABLE_MODELS.len());
        assert!(listing.lines().any(|l| l.starts_with(DEFAULT_MODEL) && l.ends_with("(default)")));
    }
}
