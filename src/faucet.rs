//! Pre-existing reward claimants. Faucet entries contribute their shares to
//! the reward denominator and their identifiers to the dedup set that keeps
//! upstream keys of the same people out of the tree.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct FaucetEntry {
    email: String,
    github: Option<String>,
    pgp: Option<String>,
    freenode: Option<String>,
    address: String,
    shares: u64,
}

/// Summary of the claimants list.
pub struct Faucet {
    pub entries: usize,
    pub shares: u64,
    /// Lowercased github handles, pgp emails, and freenode nicks.
    pub dedup: HashSet<String>,
}

/// Loads `faucet.json` from the input prefix.
pub fn load(prefix: &Path) -> Result<Faucet> {
    let path = prefix.join("faucet.json");
    let text = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let entries: Vec<FaucetEntry> = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let mut shares = 0u64;
    let mut dedup = HashSet::new();
    for entry in &entries {
        shares += entry.shares;
        for identifier in [&entry.github, &entry.pgp, &entry.freenode]
            .into_iter()
            .flatten()
        {
            dedup.insert(identifier.to_lowercase());
        }
    }

    info!(
        entries = entries.len(),
        shares,
        identifiers = dedup.len(),
        "faucet loaded"
    );

    Ok(Faucet {
        entries: entries.len(),
        shares,
        dedup,
    })
}
