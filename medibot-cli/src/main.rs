//! medibot CLI entry point
//!
//! - `medibot ask <question>` - answer one question and exit
//! - `medibot chat` - interactive session (default)
//! - `medibot inspect` - describe the vector index

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use medibot_cli::{LauncherConfig, Overrides, commands, render_failure, telemetry};

#[derive(Parser)]
#[command(name = "medibot", version, about = "Answer medical questions from an indexed reference")]
struct Cli {
    /// Path to the config file (defaults to ./medibot.toml if present)
    #[arg(short, long, global = true, env = "MEDIBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the persisted vector index
    #[arg(long, global = true, env = "MEDIBOT_INDEX")]
    index: Option<PathBuf>,

    /// Number of chunks retrieved per question
    #[arg(short = 'k', long, global = true)]
    top_k: Option<usize>,

    /// Generation model (overrides config)
    #[arg(short, long, global = true, env = "MEDIBOT_MODEL")]
    model: Option<String>,

    /// Sampling temperature in [0, 1]
    #[arg(long, global = true)]
    temperature: Option<f32>,

    /// Maximum completion length in tokens
    #[arg(long, global = true)]
    max_tokens: Option<u32>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question
    Ask {
        /// The question to answer
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Print the answer and its sources as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive question answering
    Chat,

    /// Show what the vector index contains
    Inspect,
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is normal; the environment may already be set.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    telemetry::init(cli.json_logs);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "command failed");
            eprintln!("{}", render_failure(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = LauncherConfig::load(cli.config.as_deref())?;
    config.apply(&Overrides {
        index: cli.index,
        top_k: cli.top_k,
        model: cli.model,
        temperature: cli.temperature,
        max_tokens: cli.max_tokens,
    })?;

    match cli.command {
        Some(Commands::Ask { question, json }) => {
            let pipeline = commands::build_pipeline(&config).await?;
            commands::ask(&pipeline, &question.join(" "), json, &mut std::io::stdout()).await
        }
        None | Some(Commands::Chat) => {
            let pipeline = commands::build_pipeline(&config).await?;
            commands::chat(&pipeline).await
        }
        Some(Commands::Inspect) => commands::inspect(&config, &mut std::io::stdout()).await,
    }
}
