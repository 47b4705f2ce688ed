use crate::cli::HistoryCommand;
use crate::config::Config;
use crate::error::{ColloquyError, Result};
use crate::session::render_transcript;
use crate::storage::{self, ConversationRecord};
use chrono::Local;
use colored::Colorize;
use prettytable::{format, Table};

const TITLE_WIDTH: usize = 48;

/// Handle history commands
pub fn handle_history(command: HistoryCommand, config: &Config) -> Result<()> {
    let (_lock, store) = storage::open_locked(config)?;

    match command {
        HistoryCommand::List => {
            let records = store.load()?;

            if records.is_empty() {
                println!("{}", "No conversation history found.".yellow());
                return Ok(());
            }

            println!("\nConversation History:");
            history_table(&records).printstd();
            println!();
            println!(
                "Use {} to continue a conversation.",
                "colloquy chat --resume <TITLE>".cyan()
            );
            println!();
        }
        HistoryCommand::Show { title } => {
            let record = store
                .get(&title)?
                .ok_or_else(|| ColloquyError::ConversationNotFound(title.clone()))?;

            println!("{}", record.title.bold());
            println!(
                "{}\n",
                format!("Last updated {}", format_timestamp(&record)).dimmed()
            );
            println!("{}", render_transcript(&record.messages));
        }
        HistoryCommand::Rename { old, new } => {
            store.rename(&old, new.trim())?;
            println!(
                "{}",
                format!("Renamed '{}' to '{}'", old, new.trim()).green()
            );
        }
        HistoryCommand::Delete { title } => {
            if store.delete(&title)? {
                println!("{}", format!("Deleted conversation '{}'", title).green());
            } else {
                println!("{}", format!("No conversation titled '{}'", title).yellow());
            }
        }
    }

    Ok(())
}

/// Table of conversations in listing order
pub fn history_table(records: &[ConversationRecord]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "#".bold(),
        "Title".bold(),
        "Messages".bold(),
        "Last Updated".bold()
    ]);

    for (i, record) in records.iter().enumerate() {
        table.add_row(prettytable::row![
            (i + 1).to_string().cyan(),
            truncate_title(&record.title),
            record.messages.len(),
            format_timestamp(record)
        ]);
    }

    table
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() > TITLE_WIDTH {
        let head: String = title.chars().take(TITLE_WIDTH - 3).collect();
        format!("{}...", head)
    } else {
        title.to_string()
    }
}

fn format_timestamp(record: &ConversationRecord) -> String {
    record
        .last_updated
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}
