//! Card replay
//!
//! Loads a card configuration, replays a script of state updates into a card
//! controller and logs the effective configuration after each step.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use card_actions::LoggingEffects;
use card_conditions::SimulatedViewport;
use card_config::load_card_config;
use card_engine::{parse_steps, CardController, ControllerOptions, ReplaySession};
use card_overrides::ConfigSchema;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Replay a scripted session against a card configuration
#[derive(Parser, Debug)]
#[command(name = "card-replay", version, about)]
struct Cli {
    /// Card configuration (YAML)
    config: PathBuf,

    /// Replay script (JSON lines)
    script: PathBuf,

    /// JSON Schema the effective configuration must satisfy
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Initial viewport width
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Initial viewport height
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// How long to wait for running actions before tearing down, in seconds
    #[arg(long, default_value_t = 30)]
    settle_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let config = load_card_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let viewport = SimulatedViewport::new(cli.width, cli.height);
    let mut options = ControllerOptions::new(Arc::new(viewport.clone()), Arc::new(LoggingEffects));
    if let Some(path) = &cli.schema {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let schema = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        options = options.with_schema(ConfigSchema::compile(&schema)?);
    }

    let controller = CardController::new(options);
    controller.status().set_host_session(true);
    controller.set_config(config)?;
    controller.status().set_initialized(true);

    let script = tokio::fs::read_to_string(&cli.script)
        .await
        .with_context(|| format!("reading {}", cli.script.display()))?;
    let steps = parse_steps(&script)?;
    info!(steps = steps.len(), "Replaying script");

    let session = ReplaySession::new(Arc::clone(&controller), viewport);
    for (index, step) in steps.into_iter().enumerate() {
        session.apply(step).await?;
        // Let automation batches started by this step get going
        tokio::task::yield_now().await;

        if let Some(effective) = controller.effective_config() {
            info!(step = index + 1, epoch = controller.get_epoch().version, "Effective configuration: {effective}");
        }
        if let Some(message) = controller.status().messages().current() {
            warn!(step = index + 1, "{message}");
        }
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(cli.settle_secs);
    while controller.in_flight_actions() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    controller.teardown();
    info!("Replay finished");
    Ok(())
}
