//! Binary entry point: opens the game-state database and replays block
//! envelopes into it.
//!
//! The blockchain daemon integration (block notifications, reorg handling)
//! lives outside this crate; the binary consumes block envelopes from JSON
//! files, which is also how test fixtures drive the engine.

use std::path::PathBuf;

use anyhow::{bail, Context as AnyhowContext, Result};
use clap::Parser;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use aurora_gsp::config::Chain;
use aurora_gsp::db::Database;
use aurora_gsp::logic::Game;
use aurora_gsp::statejson::GameStateJson;

#[derive(Parser, Debug)]
#[command(name = "aurora-gsp", about = "Deterministic game-state processor")]
struct Args {
    /// Chain to validate: main, test or regtest.
    #[arg(long, default_value = "main")]
    chain: String,

    /// Database file; an in-memory database is used if omitted.
    #[arg(long)]
    datadir: Option<PathBuf>,

    /// JSON files with block envelopes (single block or array of blocks),
    /// processed in order.
    #[arg(long)]
    blocks: Vec<PathBuf>,

    /// Print the resulting game state as JSON.
    #[arg(long)]
    print_state: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let chain = match Chain::from_str(&args.chain) {
        Some(c) => c,
        None => bail!("invalid chain: {}", args.chain),
    };

    let db = match &args.datadir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating data directory {}", dir.display()))?;
            Database::open(&dir.join(format!("{}.sqlite", chain.as_str())))?
        }
        None => Database::open_in_memory()?,
    };

    let game = Game::new(db, chain);
    game.initialise_state()?;
    info!(chain = chain.as_str(), "game state initialised");

    for file in &args.blocks {
        let raw = std::fs::read_to_string(file)
            .with_context(|| format!("reading block file {}", file.display()))?;
        let parsed: Value = serde_json::from_str(&raw)
            .with_context(|| format!("parsing block file {}", file.display()))?;

        match parsed {
            Value::Array(blocks) => {
                for block in &blocks {
                    game.update_state(block);
                }
                info!(file = %file.display(), count = blocks.len(), "blocks processed");
            }
            block => {
                game.update_state(&block);
                info!(file = %file.display(), "block processed");
            }
        }
    }

    if args.print_state {
        let ctx = game.context(0, 0);
        let gsj = GameStateJson::new(game.db(), &ctx);
        println!("{}", serde_json::to_string_pretty(&gsj.full_state())?);
    }

    Ok(())
}
