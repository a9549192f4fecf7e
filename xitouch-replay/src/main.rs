// xitouch-replay: runs a touch scenario through the engine against the
// in-memory environment and prints every event written to a client.

mod scenario;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use xitouch_core::{init_logging, ConfigLoader, CoreConfig};
use xitouch_engine::{ClientId, WireEvent};

use crate::scenario::Scenario;

#[derive(Debug, Parser)]
#[command(name = "xitouch-replay")]
#[command(about = "Runs a touch scenario and prints every event written to a client")]
struct Args {
    /// Configuration file; defaults to $XITOUCH_CONFIG or built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Scenario TOML file.
    scenario: PathBuf,
}

fn format_write(client: ClientId, event: &WireEvent) -> String {
    format!(
        "client {:<4} {:<16} window {:<4} detail {:<4} root ({}, {}) {:?}",
        client.to_string(),
        format!("{:?}", event.event_type),
        event.window.to_string(),
        event.detail,
        event.root.x,
        event.root.y,
        event.flags,
    )
}

fn run(scenario: &Scenario, config: &CoreConfig) -> Result<Vec<String>> {
    let mut core = scenario.build(&config.touch)?;
    let mut lines = Vec::new();
    for (index, step) in scenario.steps.iter().enumerate() {
        lines.push(format!("step {}: {:?}", index + 1, step));
        if let Err(err) = step.apply(&mut core) {
            warn!("Step {} failed: {}", index + 1, err);
            lines.push(format!("  error {:?}: {}", err.protocol_code(), err));
        }
        for (client, event) in core.env_mut().take_writes() {
            lines.push(format!("  {}", format_write(client, &event)));
        }
    }
    Ok(lines)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ConfigLoader::load_from_path(path)?,
        None => ConfigLoader::load()?,
    };
    init_logging(&config.logging, false)?;

    let content = std::fs::read_to_string(&args.scenario)
        .with_context(|| format!("Failed to read scenario {}", args.scenario.display()))?;
    let scenario = Scenario::parse(&content)?;
    info!(
        "Replaying {} steps over {} devices",
        scenario.steps.len(),
        scenario.devices.len()
    );

    for line in run(&scenario, &config)? {
        println!("{}", line);
    }
    Ok(())
}
