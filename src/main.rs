#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use airdrop_tree::builder::TreeBuilder;
use airdrop_tree::{faucet, github, hn, output, strongset};

#[derive(Parser, Debug)]
#[command(name = "airdrop-tree")]
#[command(about = "Build the airdrop commitment tree from harvested public keys", long_about = None)]
#[command(version)]
struct Cli {
    /// Input prefix holding faucet.json, github-ssh.json, github-pgp.json,
    /// strongset.asc, and hn-keys.json
    prefix: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    run(&cli.prefix)
}

fn run(prefix: &Path) -> Result<()> {
    let faucet = faucet::load(prefix)?;
    let mut builder = TreeBuilder::new(rand::thread_rng(), faucet.dedup.clone());

    github::ingest(&mut builder, prefix)?;
    strongset::ingest(&mut builder, prefix)?;
    hn::ingest(&mut builder, prefix)?;

    let tree = builder.finalize();
    let summary = output::write(prefix, &tree, &faucet)?;
    info!(
        root = %summary.root,
        leaves = summary.leaves,
        keys = summary.keys,
        reward = summary.reward,
        "airdrop tree complete"
    );
    Ok(())
}
