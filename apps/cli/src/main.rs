#![deny(warnings)]

//! Headless CLI: registers players, lets the engine produce for a while,
//! requests upgrades and prints every player's dashboard as JSON.

use anyhow::{bail, Context, Result};
use idle_core::{EngineConfig, ResourceKind};
use idle_runtime::Game;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    config: Option<String>,
    players: Vec<String>,
    seconds: Option<u64>,
    speed: Option<u32>,
    upgrades: Vec<(String, ResourceKind)>,
    dump_levels: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = it.next(),
            "--player" => args.players.extend(it.next()),
            "--seconds" => args.seconds = it.next().and_then(|s| s.parse().ok()),
            "--speed" => args.speed = it.next().and_then(|s| s.parse().ok()),
            "--upgrade" => {
                let value = it.next().context("--upgrade expects <player>:<resource>")?;
                let (name, kind) = value
                    .split_once(':')
                    .with_context(|| format!("malformed upgrade '{value}', expected <player>:<resource>"))?;
                args.upgrades.push((name.to_string(), kind.parse()?));
            }
            "--dump-levels" => args.dump_levels = true,
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = parse_args()?;
    info!(?args, "starting CLI");

    let mut config = match &args.config {
        Some(path) => EngineConfig::from_yaml_file(path)
            .with_context(|| format!("loading engine config from {path}"))?,
        None => EngineConfig::default(),
    };
    if let Some(speed) = args.speed {
        config.levels = config.levels.accelerated(speed);
    }
    if args.dump_levels {
        print!("{}", serde_yaml::to_string(&config.levels)?);
        return Ok(());
    }

    let game = Game::new(config)?;
    let players = if args.players.is_empty() {
        vec!["alice".to_string()]
    } else {
        args.players.clone()
    };
    for name in &players {
        game.register(name).await?;
    }

    tokio::time::sleep(Duration::from_secs(args.seconds.unwrap_or(5))).await;

    for (name, kind) in &args.upgrades {
        match game.request_upgrade(name, *kind).await {
            Ok(window) => info!(player = %name, resource = %kind, finishes_at = %window.finishes_at, "upgrade started"),
            Err(err) => warn!(player = %name, resource = %kind, %err, retryable = err.is_retryable(), "upgrade refused"),
        }
    }

    for name in game.names().await {
        let snap = game.lookup(&name).await?;
        println!("{}", serde_json::to_string_pretty(&snap)?);
    }
    game.shutdown().await;
    Ok(())
}
