use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use hush::config::{Config, ModelBackend};
use hush::lexicon::store::LexiconStore;
use hush::model::openai::OpenAiModel;
use hush::model::traits::{ModerationModel, NoopModel};
use hush::moderation::orchestrator::Moderator;
use hush::output::terminal;

/// Hush: multilingual profanity moderation.
///
/// Combines a deterministic evasion-aware detector with a language model,
/// and never lets the model censor less than the detector would.
#[derive(Parser)]
#[command(name = "hush", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide whether a message contains profanity
    Check {
        /// Message to check (read from stdin when omitted)
        text: Option<String>,

        /// Print the stage-by-stage trace
        #[arg(long)]
        verbose: bool,

        /// Print the trace as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the redacted message
    Filter {
        /// Message to filter (read from stdin when omitted)
        text: Option<String>,

        /// Print the full moderation response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run only the deterministic detector and report every stage
    Scan {
        /// Message to scan (read from stdin when omitted)
        text: Option<String>,
    },

    /// Moderate every line of a file, one JSON response per line
    Batch {
        /// Input file, one message per line
        #[arg(long)]
        input: PathBuf,

        /// Number of messages moderated in parallel (default: 4)
        #[arg(long, default_value = "4")]
        concurrency: usize,
    },

    /// Summarize the loaded lexicon
    Lexicon,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Logs go to stderr so stdout stays clean for piping
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hush=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Check {
            text,
            verbose,
            json,
        } => {
            let text = read_text(text)?;
            let moderator = build_moderator(&config)?;

            if verbose || json {
                let trace = moderator.contains_profanity_verbose(&text).await;
                if json {
                    println!("{}", serde_json::to_string_pretty(&trace)?);
                } else {
                    terminal::display_trace(&text, &trace);
                }
            } else {
                let flagged = moderator.contains_profanity(&text).await;
                terminal::display_verdict(flagged);
            }
        }

        Commands::Filter { text, json } => {
            let text = read_text(text)?;
            let moderator = build_moderator(&config)?;
            let outcome = moderator.moderate(&text).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.response)?);
            } else {
                terminal::display_outcome(&outcome);
            }
        }

        Commands::Scan { text } => {
            let text = read_text(text)?;
            let store = LexiconStore::load(config.lexicon_path.as_deref())?;
            let detector = hush::detect::scanner::EvasionDetector::new(store);
            let (result, stages) = detector.trace(&text);
            terminal::display_stages(&text, &result, &stages);
        }

        Commands::Batch { input, concurrency } => {
            let contents = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
            let moderator = build_moderator(&config)?;
            run_batch(&moderator, &lines, concurrency.max(1)).await?;
        }

        Commands::Lexicon => {
            let store = LexiconStore::load(config.lexicon_path.as_deref())?;
            match &config.lexicon_path {
                Some(path) => println!("Lexicon file: {}", path.display()),
                None => println!("Lexicon: built-in"),
            }
            terminal::display_lexicon(&store);
        }
    }

    Ok(())
}

/// Use the argument, or read the whole of stdin.
fn read_text(text: Option<String>) -> Result<String> {
    match text {
        Some(text) => Ok(text),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read message from stdin")?;
            Ok(buf.trim_end_matches(['\n', '\r']).to_string())
        }
    }
}

/// Create the moderation model selected by config.
fn create_model(config: &Config) -> Result<Arc<dyn ModerationModel>> {
    match config.model_backend {
        ModelBackend::OpenAi => {
            config.require_model()?;
            info!(model = %config.model_name, "Using OpenAI-compatible moderation model");
            let model = OpenAiModel::new(
                config.api_url.clone(),
                config.api_key.clone(),
                config.model_name.clone(),
                config.requests_per_second,
            )?;
            Ok(Arc::new(model))
        }
        ModelBackend::None => {
            info!(
                fallback = %config.fallback_policy(),
                "No moderation model configured, using the deterministic detector only"
            );
            Ok(Arc::new(NoopModel))
        }
    }
}

fn build_moderator(config: &Config) -> Result<Moderator> {
    let model = create_model(config)?;
    Moderator::from_config(config, model)
}

/// Moderate lines concurrently, printing results in input order.
async fn run_batch(moderator: &Moderator, lines: &[&str], concurrency: usize) -> Result<()> {
    let pb = ProgressBar::new(lines.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  Moderating [{bar:30}] {pos}/{len} ({eta})")
            .context("Invalid progress bar template")?,
    );

    let outcomes: Vec<_> = stream::iter(lines.iter().map(|line| {
        let pb = &pb;
        async move {
            let outcome = moderator.moderate(line).await;
            pb.inc(1);
            outcome
        }
    }))
    .buffered(concurrency)
    .collect()
    .await;
    pb.finish_and_clear();

    let mut flagged = 0;
    for outcome in &outcomes {
        if outcome.contains_profanity {
            flagged += 1;
        }
        println!("{}", serde_json::to_string(&outcome.response)?);
    }

    eprintln!(
        "{} {} of {} messages flagged",
        "Done:".bold(),
        flagged,
        outcomes.len()
    );
    Ok(())
}
