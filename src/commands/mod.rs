/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `chat`    — Interactive chat session
- `history` — List, show, rename, and delete stored conversations
*/

use crate::config::Config;
use crate::error::{ColloquyError, Result};

// Special commands parser for the chat prompt
pub mod special_commands;

// History subcommands
pub mod history;

// Chat command handler
pub mod chat {
    //! Interactive chat handler.
    //!
    //! Creates the completion client, opens a locked `Session`, and runs a
    //! readline-based loop that streams each reply as it arrives.

    use super::*;
    use crate::commands::special_commands::{
        parse_special_command, print_help, ConversationRef, SpecialCommand,
    };
    use crate::providers::create_client;
    use crate::session::{render_transcript, Session, TurnOutcome};
    use colored::Colorize;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use std::io::Write;
    use tokio_util::sync::CancellationToken;

    /// Start an interactive chat session
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `resume` - Optional title of a stored conversation to continue
    ///
    /// # Errors
    ///
    /// Returns `ColloquyError::MissingApiKey` before touching the store when
    /// no API key is configured, and `ColloquyError::LockTimeout` when
    /// another session owns the history store.
    pub async fn run_chat(config: Config, resume: Option<String>) -> Result<()> {
        tracing::info!("Starting interactive chat");

        let api_key = config.api_key()?;
        let client = create_client(&config.provider, &api_key)?;

        let open_config = config.clone();
        let mut session = tokio::task::spawn_blocking(move || Session::open(&open_config, client))
            .await
            .map_err(|e| ColloquyError::Lock(format!("Lock task failed: {}", e)))??;

        let mut rl = DefaultEditor::new()?;

        print_welcome_banner(&config.provider.model, session.titles().len());

        if let Some(title) = resume {
            match session.select_conversation(&title) {
                Some(messages) => {
                    println!("{}\n", format!("Continuing '{}'", title).green());
                    println!("{}", render_transcript(&messages));
                }
                None => println!(
                    "{}\n",
                    format!("No conversation titled '{}'; starting a new one", title).yellow()
                ),
            }
        }

        loop {
            let prompt = format_prompt(session.current_title());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(trimmed)?;

                    match parse_special_command(trimmed) {
                        Ok(SpecialCommand::None) => {}
                        Ok(SpecialCommand::Exit) => break,
                        Ok(command) => {
                            handle_special_command(&mut session, command)?;
                            continue;
                        }
                        Err(e) => {
                            eprintln!("{}\n", e.to_string().red());
                            continue;
                        }
                    }

                    run_turn(&mut session, trimmed).await?;
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "(use /exit or Ctrl-D to quit)".dimmed());
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    /// Submit one user message and stream the reply to stdout
    ///
    /// Completion failures and cancellation are reported and the loop goes
    /// on; anything else ends the session.
    async fn run_turn(session: &mut Session, content: &str) -> Result<()> {
        let cancel = CancellationToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        println!("{}", "Assistant:".green().bold());
        let mut stdout = std::io::stdout();
        let mut sink = |fragment: &str| {
            print!("{}", fragment);
            let _ = stdout.flush();
        };
        let result = session
            .submit_turn_cancellable(content, &mut sink, cancel)
            .await;
        interrupt.abort();
        println!("\n");

        match result {
            Ok(TurnOutcome::Committed { title, created, .. }) => {
                if created {
                    println!("{}\n", format!("Saved as '{}'", title).dimmed());
                }
                Ok(())
            }
            Ok(TurnOutcome::Ignored) => Ok(()),
            Err(e) => match e.downcast_ref::<ColloquyError>() {
                Some(ColloquyError::Cancelled) => {
                    println!("{}\n", "Cancelled; nothing was saved.".yellow());
                    Ok(())
                }
                Some(err) if err.is_turn_recoverable() => {
                    eprintln!("{} {}\n", "Error:".red().bold(), err);
                    Ok(())
                }
                _ => Err(e),
            },
        }
    }

    /// Apply a history command to the session
    ///
    /// Per-conversation failures (unknown title, duplicate title) are
    /// reported without ending the session.
    fn handle_special_command(session: &mut Session, command: SpecialCommand) -> Result<()> {
        match command {
            SpecialCommand::New => {
                session.new_conversation();
                println!("{}\n", "Started a new conversation".green());
            }
            SpecialCommand::List => print_conversation_list(session),
            SpecialCommand::Open(target) => {
                let titles = session.titles().to_vec();
                let selected = target
                    .resolve(&titles)
                    .and_then(|title| session.select_conversation(title));
                match selected {
                    Some(messages) => {
                        println!();
                        println!("{}", render_transcript(&messages));
                    }
                    None => report_missing(&target),
                }
            }
            SpecialCommand::Rename(new_title) => {
                let Some(current) = session.current_title().map(str::to_string) else {
                    println!("{}\n", "No conversation selected to rename".yellow());
                    return Ok(());
                };
                match session.rename_conversation(&current, &new_title) {
                    Ok(()) => println!(
                        "{}\n",
                        format!("Renamed '{}' to '{}'", current, new_title.trim()).green()
                    ),
                    Err(e) => report_recoverable(e)?,
                }
            }
            SpecialCommand::Delete(target) => {
                let titles = session.titles().to_vec();
                let title = match &target {
                    Some(target) => target.resolve(&titles).map(str::to_string),
                    None => session.current_title().map(str::to_string),
                };
                match title {
                    Some(title) => {
                        if session.delete_conversation(&title)? {
                            println!("{}\n", format!("Deleted '{}'", title).green());
                        } else {
                            println!("{}\n", format!("No conversation titled '{}'", title).yellow());
                        }
                    }
                    None => match target {
                        Some(target) => report_missing(&target),
                        None => println!("{}\n", "No conversation selected to delete".yellow()),
                    },
                }
            }
            SpecialCommand::Show => {
                if session.current_messages().is_empty() {
                    println!("{}\n", "No conversation selected".yellow());
                } else {
                    println!("{}", render_transcript(session.current_messages()));
                }
            }
            SpecialCommand::Help => print_help(),
            SpecialCommand::Exit | SpecialCommand::None => {}
        }
        Ok(())
    }

    fn report_missing(target: &ConversationRef) {
        let label = match target {
            ConversationRef::Title(title) => format!("'{}'", title),
            ConversationRef::Index(n) => format!("#{}", n),
        };
        println!("{}\n", format!("No conversation {}", label).yellow());
    }

    fn report_recoverable(e: anyhow::Error) -> Result<()> {
        match e.downcast_ref::<ColloquyError>() {
            Some(
                ColloquyError::DuplicateTitle(_)
                | ColloquyError::InvalidTitle(_)
                | ColloquyError::ConversationNotFound(_),
            ) => {
                eprintln!("{} {}\n", "Error:".red().bold(), e);
                Ok(())
            }
            _ => Err(e),
        }
    }

    fn print_conversation_list(session: &Session) {
        let records: Vec<_> = session
            .titles()
            .iter()
            .filter_map(|title| session.record(title))
            .cloned()
            .collect();
        if records.is_empty() {
            println!("{}\n", "No conversation history found.".yellow());
            return;
        }
        super::history::history_table(&records).printstd();
        println!();
    }

    /// Prompt showing the current conversation
    pub(crate) fn format_prompt(current: Option<&str>) -> String {
        match current {
            Some(title) => format!("[{}] >> ", title.cyan()),
            None => format!("[{}] >> ", "new".dimmed()),
        }
    }

    /// Display welcome banner at the start of a chat session
    fn print_welcome_banner(model: &str, stored: usize) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║              Colloquy Interactive Chat - Welcome!            ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!("Model:   {}", model.cyan());
        println!("History: {} stored conversation(s)\n", stored);
        println!("Type '/help' for available commands, '/exit' to quit\n");
    }

}
