//! Interactive chat loop.
//!
//! Reads one line at a time, dispatches commands through [`Command`], and
//! sends everything else to the model. Input, output and transport are all
//! generic so the loop runs the same against a terminal or a test script.

use anyhow::Result;
use colored::*;
use crossterm::{
    cursor::MoveTo,
    execute,
    terminal::{Clear, ClearType},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{BufRead, Write};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::command::{Command, Input, EXTRA, MENU};
use crate::llm::provider::ChatTransport;
use crate::session::{load_context_file, Session};
use crate::transcript;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Loop behaviour that differs between a terminal and tests.
#[derive(Debug, Clone, Copy)]
pub struct ReplOptions {
    /// Show a spinner while waiting for the model
    pub show_spinner: bool,
    /// Clear the screen before menu actions
    pub clear_screen: bool,
}

impl ReplOptions {
    pub fn interactive() -> Self {
        Self {
            show_spinner: true,
            clear_screen: true,
        }
    }

    pub fn quiet() -> Self {
        Self {
            show_spinner: false,
            clear_screen: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// Print the welcome banner
pub fn print_banner<W: Write>(out: &mut W, session: &Session, model: &str) -> Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "  {} v{}  ·  {}",
        "geminicli".green().bold(),
        VERSION,
        model.cyan()
    )?;
    writeln!(out, "  Forget the browser. Chat with Gemini right here!")?;
    writeln!(out)?;
    writeln!(
        out,
        "  Add context to the conversation with {}.",
        "--context <file>".yellow()
    )?;
    writeln!(
        out,
        "  Your conversation will be logged in {}",
        session.transcript().path().display().to_string().white()
    )?;
    writeln!(
        out,
        "  {}",
        "It might take a few seconds to get a response from the model.".dimmed()
    )?;
    writeln!(out)?;
    Ok(())
}

/// Run the interactive loop until `/exit` or end of input.
pub async fn run_repl<T, R, W>(
    session: &mut Session,
    transport: &mut T,
    input: &mut R,
    out: &mut W,
    opts: ReplOptions,
) -> Result<()>
where
    T: ChatTransport,
    R: BufRead,
    W: Write,
{
    loop {
        writeln!(
            out,
            "{}",
            "Enter your message or type 'menu' to see the options:".dimmed()
        )?;
        out.flush()?;

        let Some(line) = read_line(input)? else {
            break;
        };

        let flow = match Input::parse(&line) {
            Input::Empty => Flow::Continue,
            Input::Unknown(cmd) => {
                writeln!(out, "{} Unknown command: {}", "Error:".red().bold(), cmd)?;
                writeln!(out, "Type {} for available commands.", "/help".yellow())?;
                Flow::Continue
            }
            Input::Command(cmd) => handle_command(cmd, session, transport, input, out, opts)?,
            Input::Message(text) => {
                send_message(&text, session, transport, out, opts).await?;
                Flow::Continue
            }
        };

        if flow == Flow::Exit {
            break;
        }
        writeln!(out)?;
    }

    Ok(())
}

/// Handle a command. Returns `Flow::Exit` when the loop should stop.
fn handle_command<T, R, W>(
    cmd: Command,
    session: &mut Session,
    transport: &mut T,
    input: &mut R,
    out: &mut W,
    opts: ReplOptions,
) -> Result<Flow>
where
    T: ChatTransport,
    R: BufRead,
    W: Write,
{
    match cmd {
        Command::Menu => {
            print_menu(out)?;
            let Some(choice) = read_line(input)? else {
                return Ok(Flow::Exit);
            };
            match Command::from_menu_choice(&choice) {
                Some(cmd) => return handle_command(cmd, session, transport, input, out, opts),
                None => writeln!(out, "{} '{}'", "Invalid choice:".yellow(), choice)?,
            }
        }
        Command::ResetChat => {
            clear_screen(out, opts)?;
            writeln!(out, "Resetting chat...")?;
            match session.reset_chat() {
                Ok(()) => {
                    writeln!(out, "{}", "Chat reset.".green())?;
                    writeln!(
                        out,
                        "  New log: {}",
                        session.transcript().path().display().to_string().dimmed()
                    )?;
                }
                Err(e) => writeln!(out, "{} {:#}", "Error:".red().bold(), e)?,
            }
        }
        Command::ChangeContext => {
            clear_screen(out, opts)?;
            writeln!(out, "Change context...")?;
            prompt(out, "Enter the path to the context file (leave empty for none):")?;
            let first = read_line(input)?.unwrap_or_default();
            match acquire_context(session, input, out, &first)? {
                Some(text) => {
                    session.change_context(text);
                    writeln!(out, "{}", "Context changed.".green())?;
                }
                None => {
                    session.change_context(String::new());
                    writeln!(out, "{}", "Context cleared.".green())?;
                }
            }
        }
        Command::DeleteLog => {
            clear_screen(out, opts)?;
            delete_log(session, input, out)?;
        }
        Command::ChangeApiKey => {
            clear_screen(out, opts)?;
            writeln!(out, "Change API Key...")?;
            prompt(out, "Enter the new API Key:")?;
            match read_line(input)? {
                Some(key) if !key.is_empty() => {
                    transport.set_api_key(key);
                    writeln!(out, "{}", "API Key changed.".green())?;
                }
                _ => writeln!(out, "{}", "API Key unchanged.".yellow())?,
            }
        }
        Command::Status => print_status(session, out)?,
        Command::Help => print_help(out)?,
        Command::Exit => {
            writeln!(out, "{}", "Exiting...".cyan())?;
            return Ok(Flow::Exit);
        }
    }
    Ok(Flow::Continue)
}

/// Send one message and report the reply, budget and finish reason.
async fn send_message<T, W>(
    text: &str,
    session: &mut Session,
    transport: &T,
    out: &mut W,
    opts: ReplOptions,
) -> Result<()>
where
    T: ChatTransport,
    W: Write,
{
    writeln!(out, "Sending request to {}...", transport.model())?;
    out.flush()?;

    let spinner = opts.show_spinner.then(spinner);
    let result = {
        let request = session.begin_exchange(text);
        transport.generate(request).await
    };
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let reply = match result {
        Ok(reply) => reply,
        Err(e) => {
            session.abort_exchange();
            warn!(error = %e, "request failed");
            writeln!(out, "{} {}", "Request failed:".red().bold(), e)?;
            writeln!(
                out,
                "{}",
                "Your message was not added to the conversation. Try again.".dimmed()
            )?;
            return Ok(());
        }
    };

    let outcome = session.complete_exchange(reply);
    writeln!(out, "{} {}", "Model Response:".green().bold(), outcome.model.text())?;

    if let Some(notice) = outcome.finish_reason.notice() {
        writeln!(out, "{} {}", "Note:".yellow().bold(), notice)?;
    }
    if !outcome.logged {
        writeln!(
            out,
            "{} this exchange could not be written to the conversation log",
            "Warning:".yellow().bold()
        )?;
    }
    if let Some(eviction) = &outcome.eviction {
        writeln!(out, "{} {}", "Warning:".yellow().bold(), eviction.exceeded)?;
        writeln!(
            out,
            "The {} oldest messages have been removed from the conversation history.",
            eviction.removed
        )?;
    }
    if outcome.over_warning {
        let status = session.status();
        writeln!(
            out,
            "{} history is ~{} tokens, past the warning limit of {}",
            "Heads up:".yellow(),
            outcome.total_tokens,
            status.warning_limit
        )?;
    }
    Ok(())
}

/// Load and validate a context file, asking for another path until one fits.
///
/// Returns `None` when the user gives up with an empty path or input ends.
pub fn acquire_context<R, W>(
    session: &Session,
    input: &mut R,
    out: &mut W,
    first_path: &str,
) -> Result<Option<String>>
where
    R: BufRead,
    W: Write,
{
    let mut path = first_path.trim().to_string();
    loop {
        if path.is_empty() {
            return Ok(None);
        }

        match load_context_file(Path::new(&path)) {
            Err(e) => {
                writeln!(out, "{} {:#}", "Error:".red().bold(), e)?;
                prompt(out, "Enter the path to the context file (leave empty for none):")?;
            }
            Ok(text) => match session.validate_context(&text) {
                Ok(check) => {
                    if check.over_warning {
                        writeln!(
                            out,
                            "{} context is ~{} tokens, close to the limit",
                            "Heads up:".yellow(),
                            check.estimated_tokens
                        )?;
                    }
                    return Ok(Some(text));
                }
                Err(e) => {
                    writeln!(out, "{}", "Context is too large...".yellow().bold())?;
                    writeln!(out, "  {}", e)?;
                    let status = session.status();
                    prompt(
                        out,
                        &format!(
                            "Please enter the path to the context file (Max tokens {} or ~{} words):",
                            status.hard_limit,
                            session.word_allowance()
                        ),
                    )?;
                }
            },
        }

        match read_line(input)? {
            Some(next) => path = next,
            None => return Ok(None),
        }
    }
}

fn delete_log<R: BufRead, W: Write>(session: &Session, input: &mut R, out: &mut W) -> Result<()> {
    writeln!(out, "Delete conversation log...")?;
    let dir = session.output_dir();
    let active = session.transcript().path();

    let logs = match transcript::list_logs(dir, active) {
        Ok(logs) => logs,
        Err(e) => {
            writeln!(out, "{} {:#}", "Error:".red().bold(), e)?;
            return Ok(());
        }
    };
    if logs.is_empty() {
        writeln!(out, "{}", "No other conversation logs found.".yellow())?;
        return Ok(());
    }

    writeln!(
        out,
        "{}",
        "Note: the current conversation log can't be deleted.".dimmed()
    )?;
    writeln!(out, "{}", "Conversation logs:".green().bold())?;
    for name in &logs {
        writeln!(out, "  {}", name.white())?;
    }
    prompt(out, "Enter the name of the file you want to delete:")?;

    let Some(name) = read_line(input)? else {
        return Ok(());
    };
    match transcript::delete_log(dir, &name, active) {
        Ok(_) => writeln!(out, "{}", "Conversation log deleted.".green())?,
        Err(e) => writeln!(out, "{} {}", "Error:".red().bold(), e)?,
    }
    Ok(())
}

fn print_menu<W: Write>(out: &mut W) -> Result<()> {
    writeln!(out, "{}", "Menu:".green().bold())?;
    for entry in MENU {
        writeln!(out, "  {}. {}", entry.number.cyan(), entry.description.white())?;
    }
    prompt(out, "Enter your choice:")
}

fn print_help<W: Write>(out: &mut W) -> Result<()> {
    writeln!(out, "{}", "Commands:".green().bold())?;
    writeln!(out)?;
    writeln!(
        out,
        "  {}  {}",
        format!("{:<12}", "<message>").dimmed(),
        "Send a message (default)".white()
    )?;
    writeln!(
        out,
        "  {}  {}",
        format!("{:<12}", "menu").dimmed(),
        "Numbered menu".white()
    )?;
    for entry in MENU {
        writeln!(
            out,
            "  {}  {}",
            format!("{:<12}", entry.slash).dimmed(),
            entry.description.white()
        )?;
    }
    for (slash, description, _) in EXTRA {
        writeln!(
            out,
            "  {}  {}",
            format!("{:<12}", slash).dimmed(),
            description.white()
        )?;
    }
    Ok(())
}

fn print_status<W: Write>(session: &Session, out: &mut W) -> Result<()> {
    let status = session.status();
    writeln!(out, "{}", "Conversation:".green().bold())?;
    writeln!(out, "  Turns:          {}", status.turns.to_string().white())?;
    writeln!(
        out,
        "  Tokens (est.):  {}",
        status.total_tokens.to_string().white()
    )?;
    writeln!(out, "  Warning limit:  {}", status.warning_limit)?;
    writeln!(out, "  Hard limit:     {}", status.hard_limit)?;
    writeln!(out, "  Reserved:       {}", status.reserved_output_tokens)?;
    writeln!(out, "  Eviction:       {}", status.policy)?;
    writeln!(
        out,
        "  Context:        {}",
        if status.has_context { "loaded" } else { "none" }
    )?;
    writeln!(
        out,
        "  Log:            {}",
        session.transcript().path().display()
    )?;
    Ok(())
}

fn prompt<W: Write>(out: &mut W, text: &str) -> Result<()> {
    writeln!(out, "{}", text)?;
    out.flush()?;
    Ok(())
}

fn clear_screen<W: Write>(out: &mut W, opts: ReplOptions) -> Result<()> {
    if opts.clear_screen {
        execute!(out, Clear(ClearType::All), MoveTo(0, 0))?;
    }
    Ok(())
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message("Waiting for the model...");
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Next trimmed line, or `None` at end of input.
fn read_line<R: BufRead>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}
