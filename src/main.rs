use anyhow::Context;
use clap::Parser;
use emotion_chatbot::config_loader::Settings;
use emotion_chatbot::server::{self, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "emotion-chatbot")]
#[command(version)]
#[command(about = "Voice-enabled, emotion-aware chatbot page", long_about = None)]
struct Cli {
    /// Extra configuration file, layered over the defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overrides `bind_address`
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = cli.bind {
        settings.bind_address = bind;
    }

    let state = Arc::new(AppState::from_settings(&settings)?);
    server::spawn_eviction(state.clone(), EVICTION_INTERVAL);

    let listener = TcpListener::bind(&settings.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_address))?;
    server::serve(listener, state).await?;
    Ok(())
}
