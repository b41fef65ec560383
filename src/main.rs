//! geminicli
//!
//! Reads messages from stdin, sends the running conversation to Gemini and
//! logs every exchange to a markdown file. Type `menu` for options.

use anyhow::{Context, Result};
use clap::Parser;
use geminicli::config::{DEFAULT_TOKEN_LIMIT, DEFAULT_TOKEN_WARNING};
use geminicli::{
    acquire_context, print_banner, run_repl, ChatTransport, Config, ConfigFile,
    ConversationHistory, GeminiClient, ReplOptions, Session, TokenBudget, TranscriptLog,
};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "geminicli")]
#[command(about = "Chat with Gemini right here in your terminal")]
#[command(version)]
struct Cli {
    /// Path to the context file
    #[arg(long)]
    context: Option<PathBuf>,

    /// Directory for the conversation logs
    #[arg(long, default_value = ".")]
    output: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Hide welcome message
    #[arg(long)]
    hide_welcome: bool,

    /// Max tokens for the conversation history
    #[arg(long, default_value_t = DEFAULT_TOKEN_LIMIT)]
    token_limit: usize,

    /// Warning threshold for the conversation history
    #[arg(long, default_value_t = DEFAULT_TOKEN_WARNING)]
    token_warning: usize,
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let file = ConfigFile::load()?;
    let (config, warnings) = Config::load(file.as_ref());
    if !warnings.is_empty() {
        info!(count = warnings.len(), "configuration values replaced by defaults");
    }

    let api_key = config.api_key.clone().context("API_KEY is not set")?;
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let mut transport = GeminiClient::new(api_key, timeout)?
        .with_base_url(&config.base_url)
        .with_api_version(&config.api_version)
        .with_model(&config.model);
    debug!(model = %config.model, version = %config.api_version, "transport ready");

    let budget = TokenBudget::new(
        cli.token_limit,
        cli.token_warning,
        config.generation.max_output_tokens as usize,
    );
    let history =
        ConversationHistory::new(budget, config.estimator.build()).with_policy(config.eviction);
    let transcript = TranscriptLog::create_timestamped(&cli.output)?;
    let mut session = Session::new(
        history,
        config.generation.clone(),
        config.safety,
        config.estimator,
        transcript,
        cli.output.clone(),
    );

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = io::stdout();

    if let Some(path) = &cli.context {
        let path = path.to_string_lossy();
        if let Some(text) = acquire_context(&session, &mut input, &mut out, &path)? {
            session.change_context(text);
        }
    }

    if !cli.hide_welcome {
        print_banner(&mut out, &session, transport.model())?;
    }

    run_repl(
        &mut session,
        &mut transport,
        &mut input,
        &mut out,
        ReplOptions::interactive(),
    )
    .await
}
