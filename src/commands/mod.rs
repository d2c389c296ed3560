/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `proofread`: Producer and viewer in one process, with follow-up chat
- `show`: Render the current session from the store
- `reset`: Fire the reset trigger
- `serve`: Run the HTTP surface
- `check`: Provider health check

Handlers are thin: they open the configured store and provider and hand
off to the orchestrator, the reset trigger, or the server.
*/

use crate::config::Config;
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::providers::create_provider;
use crate::store::{open_store, SessionStore};
use std::sync::Arc;

// Special commands for the follow-up loop
pub mod special_commands;

fn open_orchestrator(config: &Config) -> Result<Orchestrator> {
    let store = open_store(&config.store)?;
    let provider = create_provider(&config.provider)?;
    Ok(Orchestrator::from_config(store, provider, config))
}

// Proofread command handler
pub mod proofread {
    //! Proofread text and chat about the result.
    //!
    //! The handler is both producer and viewer: it subscribes to the store
    //! before starting a request and prints what each snapshot adds, so
    //! the terminal shows exactly what any other viewer of the store sees.

    use super::*;
    use crate::commands::special_commands::{parse_special_command, print_help, SpecialCommand};
    use crate::error::SuikouError;
    use crate::orchestrator::PendingRequest;
    use crate::reset::ResetTrigger;
    use crate::session::{Role, SessionRecord, SessionStatus};
    use crate::store::Subscription;
    use crate::stream::StreamOutcome;
    use crate::view::SessionView;
    use colored::Colorize;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use std::io::Write;
    use tokio::io::AsyncReadExt;

    /// Run a proofreading request, then the follow-up loop
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration
    /// * `text` - Text to proofread, when given on the command line
    /// * `from_stdin` - Read the text from standard input instead
    /// * `no_chat` - Stop after the first answer
    ///
    /// # Errors
    ///
    /// Returns error if the store or provider cannot be opened, the text
    /// is empty, or the terminal cannot be read
    pub async fn run_proofread(
        config: Config,
        text: Option<String>,
        from_stdin: bool,
        no_chat: bool,
    ) -> Result<()> {
        let text = match text {
            Some(text) if !from_stdin => text,
            _ => {
                let mut buffer = String::new();
                tokio::io::stdin().read_to_string(&mut buffer).await?;
                buffer
            }
        };

        let orchestrator = open_orchestrator(&config)?;
        let mut printer = LivePrinter::default();

        let subscription = orchestrator.store().subscribe();
        let request = orchestrator.begin_proofreading(&text).await?;
        let outcome = drive(&orchestrator, request, subscription, &mut printer).await?;
        tracing::debug!("Proofreading finished: completed={}", outcome.is_completed());

        if no_chat {
            return Ok(());
        }
        follow_up_loop(&orchestrator, &mut printer).await
    }

    async fn follow_up_loop(orchestrator: &Orchestrator, printer: &mut LivePrinter) -> Result<()> {
        let store = orchestrator.store().clone();
        let mut rl = DefaultEditor::new()?;
        println!(
            "{}",
            "Ask a follow-up question, or type '/help' for commands.".dimmed()
        );

        loop {
            match rl.readline("› ") {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    match parse_special_command(trimmed) {
                        Ok(SpecialCommand::Show) => {
                            let record = store.read().await?;
                            print!("{}", SessionView::from_record(record.as_ref()).render());
                            continue;
                        }
                        Ok(SpecialCommand::Reset) => {
                            ResetTrigger::new(store.clone()).reset().await?;
                            println!("Session cleared.");
                            break;
                        }
                        Ok(SpecialCommand::Help) => {
                            print_help();
                            continue;
                        }
                        Ok(SpecialCommand::Exit) => break,
                        Ok(SpecialCommand::None) => {}
                        Err(e) => {
                            println!("{}", e.to_string().red());
                            continue;
                        }
                    }

                    rl.add_history_entry(trimmed)?;

                    let Some(record) = store.read().await? else {
                        println!("{}", "The session was cleared.".yellow());
                        break;
                    };

                    let subscription = store.subscribe();
                    let request = match orchestrator
                        .begin_follow_up(trimmed, &record.history, &record.original_text)
                        .await
                    {
                        Ok(request) => request,
                        Err(e) => {
                            let superseded = matches!(
                                e.downcast_ref::<SuikouError>(),
                                Some(SuikouError::NoActiveSession | SuikouError::Superseded(_))
                            );
                            println!("{}", e.to_string().red());
                            if superseded {
                                break;
                            }
                            continue;
                        }
                    };

                    drive(orchestrator, request, subscription, printer).await?;
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
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

        Ok(())
    }

    /// Run `request` to its end, printing what each snapshot adds
    ///
    /// Returns once the producer is done, after printing the latest
    /// snapshot, even if the store never showed a settled session.
    async fn drive(
        orchestrator: &Orchestrator,
        request: PendingRequest,
        subscription: Subscription,
        printer: &mut LivePrinter,
    ) -> Result<StreamOutcome> {
        let store = orchestrator.store().clone();
        let complete = orchestrator.complete(request);
        tokio::pin!(complete);

        let outcome = tokio::select! {
            outcome = &mut complete => outcome,
            watched = watch_until_settled(store.as_ref(), subscription, printer) => {
                let outcome = complete.await;
                watched?;
                outcome
            }
        };

        let record = print_snapshot(store.as_ref(), printer).await?;
        if let StreamOutcome::Failed { message, .. } = &outcome {
            // The failure never reached the store.
            if record.map_or(true, |r| r.status != SessionStatus::Error) {
                println!("{}", message.red());
            }
        }
        Ok(outcome)
    }

    /// Read the record and print what it adds to the terminal
    async fn print_snapshot(
        store: &dyn SessionStore,
        printer: &mut LivePrinter,
    ) -> Result<Option<SessionRecord>> {
        let record = store.read().await?;
        let output = printer.update(&SessionView::from_record(record.as_ref()));
        if !output.is_empty() {
            print!("{}", output);
            std::io::stdout().flush()?;
        }
        Ok(record)
    }

    /// Print every snapshot until the session settles or is cleared
    async fn watch_until_settled(
        store: &dyn SessionStore,
        mut subscription: Subscription,
        printer: &mut LivePrinter,
    ) -> Result<()> {
        let mut seen_session = false;
        while subscription.changed().await.is_some() {
            let record = print_snapshot(store, printer).await?;

            match record {
                Some(record) if record.status.is_terminal() && record.pending_count() == 0 => {
                    return Ok(());
                }
                Some(_) => seen_session = true,
                // The first event of a new request is the clear.
                None if seen_session => return Ok(()),
                None => {}
            }
        }
        Ok(())
    }

    /// Turns successive views into incremental terminal output
    ///
    /// Only what a snapshot adds is printed: new turns, and the new tail
    /// of the turn still being streamed.
    #[derive(Debug, Default)]
    pub struct LivePrinter {
        original_text: Option<String>,
        turns_done: usize,
        header_printed: bool,
        printed_bytes: usize,
        status: Option<SessionStatus>,
    }

    impl LivePrinter {
        /// Output to print for `view`
        pub fn update(&mut self, view: &SessionView) -> String {
            let mut out = String::new();

            if view.original_text != self.original_text {
                let had_session = self.original_text.is_some();
                *self = Self {
                    original_text: view.original_text.clone(),
                    ..Self::default()
                };
                match &view.original_text {
                    Some(text) => {
                        out.push_str(&format!("{}\n{}\n\n", "Original text".bold(), text))
                    }
                    None if had_session => out.push_str(&format!("{}\n", "Session cleared.".yellow())),
                    None => {}
                }
            }

            if self.status != Some(view.status) {
                match view.status {
                    SessionStatus::Loading => out.push_str(&format!(
                        "{}\n",
                        "Proofreading, please wait...".yellow()
                    )),
                    SessionStatus::Error if self.header_printed => out.push('\n'),
                    _ => {}
                }
            }

            for turn in view.turns.iter().skip(self.turns_done) {
                if !self.header_printed {
                    let label = match turn.role {
                        Role::User => "You".cyan().bold(),
                        Role::Assistant => "Assistant".green().bold(),
                    };
                    out.push_str(&format!("{}\n", label));
                    self.header_printed = true;
                    self.printed_bytes = 0;
                }

                if let Some(tail) = turn.content.get(self.printed_bytes..) {
                    out.push_str(tail);
                    self.printed_bytes = turn.content.len();
                }

                if turn.pending {
                    break;
                }
                out.push_str("\n\n");
                self.turns_done += 1;
                self.header_printed = false;
            }

            if self.status != Some(view.status) && view.status == SessionStatus::Error {
                let message = view.error_message.as_deref().unwrap_or("unknown error");
                out.push_str(&format!("{} {}\n", "Error:".red().bold(), message));
            }
            self.status = Some(view.status);

            out
        }
    }

}

// Show command handler
pub mod show {
    //! Render the current session from the store.

    use super::*;
    use crate::view::SessionView;

    /// Print the current session
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be opened or read
    pub async fn run_show(config: Config, json: bool) -> Result<()> {
        let store = open_store(&config.store)?;
        let record = store.read().await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&record)?);
        } else {
            print!("{}", SessionView::from_record(record.as_ref()).render());
        }
        Ok(())
    }
}

// Reset command handler
pub mod reset {
    //! Clear the session.

    use super::*;
    use crate::reset::ResetTrigger;

    /// Fire the reset trigger against the configured store
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be opened or cleared
    pub async fn run_reset(config: Config) -> Result<()> {
        let store: Arc<dyn SessionStore> = open_store(&config.store)?;
        ResetTrigger::new(store).reset().await?;
        println!("Session cleared.");
        Ok(())
    }
}

// Serve command handler
pub mod serve {
    //! Run the HTTP surface.

    use super::*;

    /// Serve until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns error if the store, provider, or listener cannot be opened
    pub async fn run_serve(config: Config, bind: Option<String>) -> Result<()> {
        let orchestrator = open_orchestrator(&config)?;
        let bind = bind.unwrap_or_else(|| config.server.bind.clone());
        crate::server::serve(&config, orchestrator, &bind).await
    }
}

// Check command handler
pub mod check {
    //! Provider health check.

    use super::*;
    use colored::Colorize;

    /// Check that the configured provider is ready
    ///
    /// # Errors
    ///
    /// Returns the provider's health check error
    pub async fn run_check(config: Config) -> Result<()> {
        let provider = create_provider(&config.provider)?;
        match provider.health_check().await {
            Ok(()) => {
                println!("{} provider '{}' is ready", "✓".green(), provider.name());
                Ok(())
            }
            Err(e) => {
                println!("{} provider '{}' is not ready", "✗".red(), provider.name());
                Err(e)
            }
        }
    }
}
