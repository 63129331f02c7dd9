//! Runlet CLI
//!
//! Drives the execution engine from the terminal: streams output events as
//! they arrive and forwards terminal input lines to the running program.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use runlet::{Config, EXAMPLE_CONFIG, Engine, Inbound, Outbound, SessionId};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "runlet")]
#[command(about = "A tool for streaming sandboxed code execution")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: runlet.toml)
        #[arg(short, long, default_value = "runlet.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a source file, streaming its output; terminal input lines are
    /// forwarded to the program's stdin
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID (e.g., python, cpp, java)
        #[arg(short, long)]
        language: String,
    },

    /// Pre-warm the per-language sandbox pools and report their state
    Prewarm,

    /// List available languages
    Languages,

    /// Show the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run { source, language } => run_streaming(config, &source, &language).await,
        Commands::Prewarm => prewarm_pools(config).await,
        Commands::Languages => {
            list_languages(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn run_streaming(config: Config, source: &PathBuf, language_id: &str) -> Result<()> {
    config
        .get_language(language_id)
        .context("unknown language")?;

    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let engine = Arc::new(Engine::new(config));
    let session = SessionId::new("cli");
    let mut events = engine.open_session(session.clone());

    engine
        .handle_message(
            &session,
            Inbound::Execute {
                language: language_id.to_owned(),
                code,
            },
        )
        .await;

    // Forward terminal lines as input messages for interactive programs.
    let stdin_forwarder = {
        let engine = Arc::clone(&engine);
        let session = session.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                engine
                    .handle_message(&session, Inbound::Input { data: line })
                    .await;
            }
        })
    };

    let mut stdout = tokio::io::stdout();
    let mut completion = None;

    while let Some(envelope) = events.recv().await {
        match envelope.payload {
            Outbound::ExecutionStarted(_) => debug!("execution started"),
            Outbound::Output(chunk) => {
                stdout.write_all(chunk.as_bytes()).await?;
                stdout.flush().await?;
            }
            Outbound::InputRequest(_) => debug!("program appears to be waiting for input"),
            Outbound::Error(message) => eprintln!("{message}"),
            Outbound::ExecutionComplete(summary) => {
                completion = Some(summary);
                break;
            }
            other => debug!(?other, "ignoring event"),
        }
    }

    stdin_forwarder.abort();
    engine.close_session(&session).await;

    let summary = completion.unwrap_or_else(|| "Exit code: 1".to_owned());
    info!(%summary, "execution finished");

    // The summary is "Exit code: N" for natural exits; mirror it.
    let exit_code = summary
        .strip_prefix("Exit code: ")
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|code| code.parse::<i32>().ok())
        .unwrap_or(0);

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

async fn prewarm_pools(config: Config) -> Result<()> {
    let engine = Engine::new(config);
    let pool = engine.pool();

    if pool.language_count() == 0 {
        println!("No languages carry a sandbox image; nothing to pre-warm.");
        return Ok(());
    }

    info!(
        languages = pool.language_count(),
        count = engine.config().pool.prewarm_count,
        "pre-warming sandbox pools"
    );
    pool.prewarm(engine.config()).await;
    println!("Pre-warmed pools for {} languages.", pool.language_count());
    Ok(())
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    let mut languages: Vec<_> = config.languages.iter().collect();
    languages.sort_by_key(|(id, _)| *id);

    for (id, lang) in languages {
        let lang_type = if lang.is_compiled() {
            "compiled"
        } else {
            "interpreted"
        };
        println!("  {:<15} {} ({})", id, lang.name, lang_type);
    }
}

fn show_config(config: &Config) {
    println!("Engine:");
    println!("  Hard timeout: {}s", config.engine.hard_timeout_secs);
    println!("  Base environment entries: {}", config.engine.env.len());
    println!();
    println!("Sandbox pool:");
    println!("  Pre-warm count: {}", config.pool.prewarm_count);
    println!("  Start concurrency: {}", config.pool.start_concurrency);
    println!("  Startup timeout: {}s", config.pool.startup_timeout_secs);
    println!();
    println!("Languages configured: {}", config.languages.len());
}

async fn init_config(output: &PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
