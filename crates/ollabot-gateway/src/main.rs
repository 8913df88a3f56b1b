use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use ollabot_agent::{Bridge, ContextManager, OllamaProvider};
use ollabot_channels::Channel;
use ollabot_core::BotConfig;
use ollabot_twitch::TwitchAdapter;

/// Twitch chat bot that answers commands with a local Ollama model.
#[derive(Debug, Parser)]
#[command(name = "ollabot", version, about)]
struct Args {
    /// `.env` file to load before reading the environment.
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// TOML config file (default: $OLLABOT_CONFIG or ./ollabot.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // .env must be loaded before the subscriber reads RUST_LOG.
    load_env_file(args.env_file.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ollabot=info,ollabot_agent=info,ollabot_twitch=info".into()),
        )
        .init();

    // explicit --config > OLLABOT_CONFIG env > ./ollabot.toml
    let config_path = args.config.or_else(|| std::env::var("OLLABOT_CONFIG").ok());
    let config = match BotConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(code = e.code(), "{e}");
            return Err(e.into());
        }
    };

    let provider = OllamaProvider::new(
        Some(config.ollama.host.clone()),
        Duration::from_secs(config.ollama.timeout_secs),
    )
    .context("failed to build HTTP client")?;
    let context = Arc::new(ContextManager::from_config(Arc::new(provider), &config.ollama));
    let bridge = Arc::new(Bridge::from_config(context, &config));

    info!(
        context = %config.ollama.context,
        model = %config.ollama.model,
        host = %config.ollama.host,
        max_history = config.ollama.max_history,
        "Ollama context ready"
    );
    match config.ollama.system.as_deref() {
        Some(system) => info!(system = %system, "system prompt set"),
        None => info!("no system prompt"),
    }

    let mut adapter = TwitchAdapter::new(&config.twitch);
    if let Err(e) = adapter.connect().await {
        error!(error = %e, fatal = e.is_fatal(), "failed to connect to Twitch");
        return Err(e.into());
    }

    tokio::select! {
        result = adapter.run(bridge) => {
            result?;
            warn!("Twitch connection closed, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl-C, shutting down");
        }
    }

    Ok(())
}

/// Load `path`, or `./.env` when no path is given. Only a missing default
/// file is tolerated.
fn load_env_file(path: Option<&std::path::Path>) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load env file {}", path.display()))?;
        }
        None => match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e).context("failed to load .env"),
        },
    }
    Ok(())
}
