use std::future::Future;
use std::io::{self, Write};
use std::path::Path;
use std::pin::pin;
use std::sync::Arc;

use mxln_chat::{
    ConversationEvent, GenerationController, MediaSummary, SendOutcome, SendRejection,
    SessionManager,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::commands::{parse_slash_command, SlashCommand, HELP_TEXT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Repl {
    controller: GenerationController,
    sessions: Option<Arc<SessionManager>>,
}

impl Repl {
    pub fn new(controller: GenerationController, sessions: Option<Arc<SessionManager>>) -> Self {
        Self {
            controller,
            sessions,
        }
    }

    pub fn controller(&self) -> &GenerationController {
        &self.controller
    }

    /// Runs one input line. Chat lines stream the reply into `out` until it
    /// completes or `interrupt` resolves.
    pub async fn handle_line<W, I>(&self, line: &str, interrupt: I, out: &mut W) -> io::Result<Flow>
    where
        W: Write,
        I: Future<Output = ()>,
    {
        match parse_slash_command(line) {
            Some(command) => self.run_command(command, out).await,
            None if line.trim().is_empty() => Ok(Flow::Continue),
            None => {
                self.send(line, interrupt, out).await?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn send<W, I>(&self, line: &str, interrupt: I, out: &mut W) -> io::Result<()>
    where
        W: Write,
        I: Future<Output = ()>,
    {
        let mut events = self.controller.subscribe();
        let mut send = pin!(self.controller.send(line, None));
        let mut interrupt = pin!(interrupt);
        let mut interrupted = false;

        let outcome = loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Ok(event) => render_event(&event, out)?,
                    Err(RecvError::Lagged(skipped)) => debug!(skipped, "event renderer lagged"),
                    Err(RecvError::Closed) => {}
                },
                outcome = &mut send => break outcome,
                () = &mut interrupt, if !interrupted => {
                    interrupted = true;
                    self.controller.stop();
                }
            }
        };
        while let Ok(event) = events.try_recv() {
            render_event(&event, out)?;
        }

        match outcome {
            SendOutcome::Completed { .. } => writeln!(out),
            SendOutcome::Cancelled => writeln!(out, "\n[stopped]"),
            SendOutcome::Failed(message) => writeln!(out, "\nerror: {message}"),
            SendOutcome::Rejected(SendRejection::Busy) => {
                writeln!(out, "a reply is still streaming; /stop it first")
            }
            SendOutcome::Rejected(SendRejection::Empty) => Ok(()),
        }
    }

    async fn run_command<W: Write>(&self, command: SlashCommand, out: &mut W) -> io::Result<Flow> {
        match command {
            SlashCommand::Help => writeln!(out, "{HELP_TEXT}")?,
            SlashCommand::Clear => {
                self.controller.clear_messages();
                writeln!(out, "conversation cleared")?;
            }
            SlashCommand::Stop => {
                if self.controller.stop() {
                    writeln!(out, "stopped")?;
                } else {
                    writeln!(out, "nothing to stop")?;
                }
            }
            SlashCommand::Quit => return Ok(Flow::Quit),
            SlashCommand::Models => {
                self.controller.load_models().await;
                let current = self.controller.current_model();
                for model in self.controller.available_models() {
                    let marker = if model == current { '*' } else { ' ' };
                    writeln!(out, "{marker} {model}")?;
                }
            }
            SlashCommand::Model(model) => {
                self.controller.set_model(&model);
                writeln!(out, "model set to {}", self.controller.current_model())?;
            }
            SlashCommand::Attach(path) => match self.controller.stage_path(Path::new(&path)).await {
                Ok(summary) => writeln!(out, "attached {}", describe_media(&summary))?,
                Err(error) => writeln!(out, "error: {error}")?,
            },
            SlashCommand::Detach(index) => {
                if index
                    .checked_sub(1)
                    .is_some_and(|position| self.controller.unstage_media(position))
                {
                    writeln!(out, "detached #{index}")?;
                } else {
                    writeln!(out, "no attachment #{index}")?;
                }
            }
            SlashCommand::Media => {
                let staged = self.controller.staged_media();
                if staged.is_empty() {
                    writeln!(out, "no attachments")?;
                }
                for (index, summary) in staged.iter().enumerate() {
                    writeln!(out, "#{} {}", index + 1, describe_media(summary))?;
                }
            }
            SlashCommand::Sessions
            | SlashCommand::New
            | SlashCommand::Switch(_)
            | SlashCommand::Delete(_) => self.run_session_command(command, out).await?,
            SlashCommand::Usage(usage) => writeln!(out, "usage: {usage}")?,
            SlashCommand::Unknown(command) => {
                writeln!(out, "unknown command {command}; try /help")?
            }
        }
        Ok(Flow::Continue)
    }

    async fn run_session_command<W: Write>(
        &self,
        command: SlashCommand,
        out: &mut W,
    ) -> io::Result<()> {
        let Some(sessions) = self.sessions.as_ref() else {
            return writeln!(out, "session history is unavailable");
        };
        let model = self.controller.current_model();

        match command {
            SlashCommand::Sessions => match sessions.refresh_sessions().await {
                Ok(list) => {
                    let current = sessions.current_session_id();
                    for session in list {
                        let marker = if current.as_deref() == Some(session.id.as_str()) {
                            '*'
                        } else {
                            ' '
                        };
                        writeln!(
                            out,
                            "{marker} {}  {} ({} messages)",
                            session.id, session.title, session.message_count
                        )?;
                    }
                }
                Err(error) => writeln!(out, "error: {error}")?,
            },
            SlashCommand::New => match sessions.create_session(&model).await {
                Ok(session) => {
                    self.controller.clear_messages();
                    writeln!(out, "started session {}", session.id)?;
                }
                Err(error) => writeln!(out, "error: {error}")?,
            },
            SlashCommand::Switch(id) => match sessions.switch_session(&id).await {
                Ok(Some(detail)) => {
                    self.controller.load_from_session(&detail.messages);
                    writeln!(
                        out,
                        "switched to {} ({} messages)",
                        detail.session.title,
                        self.controller.messages().len()
                    )?;
                }
                Ok(None) => writeln!(out, "already in session {id}")?,
                Err(error) => writeln!(out, "error: {error}")?,
            },
            SlashCommand::Delete(id) => match sessions.delete_session(&id, &model).await {
                Ok(Some(detail)) => {
                    self.controller.load_from_session(&detail.messages);
                    writeln!(out, "deleted {id}; now in {}", detail.session.title)?;
                }
                Ok(None) => writeln!(out, "deleted {id}")?,
                Err(error) => writeln!(out, "error: {error}")?,
            },
            _ => {}
        }
        Ok(())
    }
}

/// Writes streamed reply text as it arrives.
pub fn render_event<W: Write>(event: &ConversationEvent, out: &mut W) -> io::Result<()> {
    if let ConversationEvent::DeltaApplied { delta, .. } = event {
        out.write_all(delta.as_bytes())?;
        out.flush()?;
    }
    Ok(())
}

fn describe_media(summary: &MediaSummary) -> String {
    format!(
        "{} ({}, {} bytes)",
        summary.display_name, summary.mime_type, summary.size
    )
}
