use colored::Colorize;

use crate::providers::{Message, Role};

/// Render a transcript for the terminal
///
/// Each message gets a `You:` or `Assistant:` header; messages are
/// separated by a blank line. System messages are not shown.
pub fn render_transcript(messages: &[Message]) -> String {
    let blocks: Vec<String> = messages
        .iter()
        .filter_map(|message| {
            let header = match message.role {
                Role::User => "You:".cyan().bold(),
                Role::Assistant => "Assistant:".green().bold(),
                Role::System => return None,
            };
            Some(format!("{}\n{}\n", header, message.content))
        })
        .collect();
    blocks.join("\n")
}
