//! Chorus command-line harness.
//!
//! Usage:
//!   chorus "what is 2+2?" -m openai/gpt-3.5-turbo -m anthropic/claude-2
//!   chorus --cache "what model are you?"
//!   chorus --config chorus.toml
//!   chorus                      # runs the demo prompts against all providers
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY` - OpenAI token
//! - `ANTHROPIC_API_KEY` - Anthropic token
//! - `REPLICATE_API_TOKEN` - Replicate token
//! - `PPLX_API_KEY` - Perplexity token
//! - `RUST_LOG` - log filter (default: `info,chorus_orchestrator=debug`)
//!
//! Variables are also read from `~/.env`, or `./.env` when that is absent.

use std::path::PathBuf;

use chorus_orchestrator::{BatchRequest, ChorusConfig, Credentials, Orchestrator};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "info,chorus_orchestrator=debug";

const DEMO_PROMPTS: [&str; 3] = [
    "what model are you?",
    "what is 2+2?",
    "what is the current date?",
];

const DEMO_MODELS: [&str; 5] = [
    "openai/gpt-3.5-turbo",
    "openai/gpt-4-1106-preview",
    "anthropic/claude-2",
    "replicate/mistral-7b",
    "pplx/pplx-70b-online",
];

#[derive(Parser, Debug)]
#[command(name = "chorus", about = "Run prompts against several LLM providers at once")]
struct Args {
    /// Prompts to complete. Without any, the demo prompts run.
    prompts: Vec<String>,

    /// Model as provider/model, or a bare provider tag for its default
    /// model. Repeat for several.
    #[arg(short, long = "model")]
    models: Vec<String>,

    /// Read and write the model cache.
    #[arg(long)]
    cache: bool,

    /// Cache database location.
    #[arg(long)]
    cache_path: Option<PathBuf>,

    /// Cap on simultaneous requests for this batch.
    #[arg(long)]
    concurrency: Option<usize>,

    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn load_env_file() {
    let home_env = dirs::home_dir()
        .map(|home| home.join(".env"))
        .filter(|path| path.is_file());
    let loaded = match home_env {
        Some(path) => dotenvy::from_path(&path).map(|()| path),
        None => dotenvy::dotenv(),
    };
    if let Ok(path) = loaded {
        debug!(path = %path.display(), "Loaded environment file");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only the JSON result.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    load_env_file();

    let mut config = match &args.config {
        Some(path) => ChorusConfig::load(path)?,
        None => ChorusConfig::default(),
    };
    if let Some(path) = args.cache_path.clone() {
        config.cache.path = path;
    }

    let credentials = Credentials::from_env();
    let orchestrator = Orchestrator::from_config(&config, &credentials)?;

    let (prompts, models) = if args.prompts.is_empty() {
        info!("No prompts given, running demo batch");
        let models = if args.models.is_empty() {
            DEMO_MODELS.iter().map(|m| m.to_string()).collect()
        } else {
            args.models
        };
        (DEMO_PROMPTS.iter().map(|p| p.to_string()).collect(), Some(models))
    } else {
        // No `-m` flags means the configured default models.
        let models = (!args.models.is_empty()).then_some(args.models);
        (args.prompts, models)
    };

    let mut request = BatchRequest::new(prompts).with_cache(args.cache || config.cache.enabled);
    if let Some(models) = models {
        request = request.with_models(models);
    }
    if let Some(limit) = args.concurrency {
        request = request.with_concurrency_limit(limit);
    }

    let responses = orchestrator.complete(request).await?;
    println!("{}", serde_json::to_string_pretty(&responses)?);

    Ok(())
}
