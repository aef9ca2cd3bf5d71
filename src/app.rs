//! Line-oriented terminal front end.

use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use completion_api::{
    new_cancellation_signal, IngestError, IngestOutcome, Metrics, StreamSink,
};
use conversation_store::KeyValueStorage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::commands::{parse_slash_command, SlashCommand, HELP_TEXT};
use crate::session::{ChatSession, SessionError, CONTEXT_MESSAGES};
use crate::templates::PromptTemplate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    Quit,
}

/// Writes assistant text as it arrives.
pub struct TerminalSink<W> {
    out: W,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        let result = self
            .out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush());
        if let Err(error) = result {
            debug!(%error, "terminal write failed");
        }
    }
}

impl<W: Write> StreamSink for TerminalSink<W> {
    fn on_content_chunk(&mut self, text: &str) {
        self.emit(text);
    }

    fn on_complete(&mut self, metrics: Option<&Metrics>) {
        match metrics {
            Some(metrics) => self.emit(&format!("\n[{}]\n", format_metrics(metrics))),
            None => self.emit("\n"),
        }
    }

    fn on_error(&mut self, error: &IngestError) {
        self.emit(&format!("\n[error] {error}\n"));
    }
}

pub fn format_metrics(metrics: &Metrics) -> String {
    let mut line = format!(
        "tokens {} (prompt {}, completion {}) | cost ${:.6}",
        metrics.effective_total_tokens(),
        metrics.prompt_tokens,
        metrics.completion_tokens,
        metrics.cost
    );
    if let Some(latency) = metrics.latency_seconds {
        line.push_str(&format!(" | latency {latency:.2}s"));
    }
    line
}

pub async fn handle_command<S, W>(
    session: &mut ChatSession<S>,
    command: SlashCommand,
    out: &mut W,
    cwd: &Path,
) -> io::Result<CommandOutcome>
where
    S: KeyValueStorage,
    W: Write,
{
    match command {
        SlashCommand::Help => writeln!(out, "{HELP_TEXT}")?,
        SlashCommand::Clear => match session.clear() {
            Ok(()) => writeln!(out, "conversation cleared")?,
            Err(error) => writeln!(out, "conversation cleared; {error}")?,
        },
        SlashCommand::Models => {
            let selected = session.model().to_owned();
            let models = session.refresh_models().await.to_vec();
            for model in models {
                let marker = if model == selected { '*' } else { ' ' };
                writeln!(out, "{marker} {model}")?;
            }
        }
        SlashCommand::Model(None) => writeln!(out, "model: {}", session.model())?,
        SlashCommand::Model(Some(model)) => match session.select_model(&model) {
            Ok(()) => writeln!(out, "model: {}", session.model())?,
            Err(error) => writeln!(out, "{error}; try /models")?,
        },
        SlashCommand::Template(None) => {
            let names: Vec<&str> = PromptTemplate::ALL.iter().map(|t| t.name()).collect();
            writeln!(
                out,
                "template: {} (available: {})",
                session.template(),
                names.join(", ")
            )?;
        }
        SlashCommand::Template(Some(name)) => match name.parse::<PromptTemplate>() {
            Ok(template) => {
                session.set_template(template);
                writeln!(out, "template: {template}")?;
            }
            Err(error) => writeln!(out, "{error}")?,
        },
        SlashCommand::Temperature(None) => {
            writeln!(out, "temperature: {:.2}", session.temperature())?
        }
        SlashCommand::Temperature(Some(value)) => match value.parse::<f64>() {
            Ok(value) => {
                let applied = session.set_temperature(value);
                writeln!(out, "temperature: {applied:.2}")?;
            }
            Err(_) => writeln!(out, "temperature must be a number between 0 and 2")?,
        },
        SlashCommand::MaxTokens(None) => writeln!(out, "max tokens: {}", session.max_tokens())?,
        SlashCommand::MaxTokens(Some(value)) => match value.parse::<u32>() {
            Ok(value) => {
                let applied = session.set_max_tokens(value);
                writeln!(out, "max tokens: {applied}")?;
            }
            Err(_) => writeln!(out, "max tokens must be a positive integer")?,
        },
        SlashCommand::Prompt => {
            let request = session.build_request("<your next message>");
            writeln!(
                out,
                "model {} | temperature {:.2} | max tokens {} | last {CONTEXT_MESSAGES} messages",
                request.model,
                session.temperature(),
                session.max_tokens()
            )?;
            for message in &request.messages {
                writeln!(out, "{:>9}: {}", message.role.as_str(), message.content)?;
            }
        }
        SlashCommand::Export(path) => {
            let path = path.as_deref().map(Path::new);
            match session.export_to(path, cwd) {
                Ok(written) => writeln!(out, "exported to {}", written.display())?,
                Err(error) => writeln!(out, "export failed: {error}")?,
            }
        }
        SlashCommand::Metrics => {
            let conversation = session.conversation();
            match conversation.last_metrics() {
                Some(metrics) => writeln!(out, "last response: {}", format_metrics(metrics))?,
                None => writeln!(out, "last response: no metrics")?,
            }
            let totals = conversation.totals();
            writeln!(
                out,
                "session: {} responses | tokens {} | cost ${:.6}",
                totals.responses, totals.tokens, totals.cost
            )?;
        }
        SlashCommand::Quit => return Ok(CommandOutcome::Quit),
        SlashCommand::Unknown(name) => writeln!(out, "unknown command {name}; try /help")?,
    }

    Ok(CommandOutcome::Continue)
}

/// Send one message, cancelling the response if Ctrl-C arrives meanwhile.
pub async fn send_interruptible<S, W>(
    session: &mut ChatSession<S>,
    text: &str,
    out: &mut W,
) -> io::Result<()>
where
    S: KeyValueStorage,
    W: Write,
{
    let cancellation = new_cancellation_signal();
    let watcher = tokio::spawn({
        let cancellation = Arc::clone(&cancellation);
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancellation.store(true, Ordering::Release);
            }
        }
    });

    let mut sink = TerminalSink::new(&mut *out);
    let result = session
        .send_user_message(text, &mut sink, Some(&cancellation))
        .await;
    watcher.abort();

    match result {
        Ok(summary) if summary.outcome == IngestOutcome::Cancelled => {
            writeln!(out, "\n[cancelled]")?;
        }
        Ok(_) => {}
        Err(SessionError::EmptyMessage) => {}
        Err(error) => writeln!(out, "{error}")?,
    }
    Ok(())
}

/// Read lines from stdin until `/quit`, end of input or Ctrl-C at the prompt.
pub async fn run_repl<S: KeyValueStorage>(
    session: &mut ChatSession<S>,
    cwd: &Path,
) -> io::Result<()> {
    let mut stdout = io::stdout();
    session.refresh_models().await;
    writeln!(
        stdout,
        "model {} | template {} | {} messages restored | /help for commands",
        session.model(),
        session.template(),
        session.conversation().messages().len()
    )?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                writeln!(stdout)?;
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        if let Some(command) = parse_slash_command(&line) {
            if handle_command(session, command, &mut stdout, cwd).await? == CommandOutcome::Quit {
                break;
            }
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        send_interruptible(session, &line, &mut stdout).await?;
    }

    Ok(())
}
