//! Social-news ingestor. Each entry pairs a site username with a
//! keybase-proofed primary PGP key: a declared full fingerprint plus an
//! armored bundle whose first packet is the primary key. There is no faucet
//! dedup for this source; the site has no identifier the claimants list
//! carries.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rand::{CryptoRng, RngCore};
use serde::de::IgnoredAny;
use serde::Deserialize;
use tracing::{info, warn};

use crate::builder::{SourceStats, TreeBuilder};
use crate::key::{AirdropKey, KeyError};
use crate::pgp;

/// `[hn_user, keybase_user, primary, addrs]`.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct HnUser(String, String, PrimaryKey, IgnoredAny);

/// `[fingerprint, kid, ktype, ctime, mtime, bundle]`.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct PrimaryKey(String, IgnoredAny, IgnoredAny, IgnoredAny, IgnoredAny, String);

/// Ingests `hn-keys.json`, one single-key subtree per accepted entry.
pub fn ingest<R: RngCore + CryptoRng>(
    builder: &mut TreeBuilder<R>,
    prefix: &Path,
) -> Result<SourceStats> {
    let path = prefix.join("hn-keys.json");
    let users: Vec<HnUser> = serde_json::from_str(
        &fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?,
    )
    .with_context(|| format!("failed to parse {}", path.display()))?;

    let mut stats = SourceStats::default();
    for (index, user) in users.iter().enumerate() {
        if (index + 1) % 1000 == 0 {
            info!("processed {} social-news users", index + 1);
        }
        let username = &user.0;
        let declared = &user.2 .0;

        let blocks = pgp::read_armored_blocks(&user.2 .5)
            .with_context(|| format!("unreadable key bundle for user {username}"))?;
        let block = blocks
            .first()
            .with_context(|| format!("empty key bundle for user {username}"))?;

        let packet = match pgp::parse_public_key(&block.data) {
            Ok(packet) => packet,
            Err(KeyError::UnsupportedAlgorithm) => {
                stats.record_user(0, 1);
                continue;
            }
            Err(error) => {
                return Err(error).with_context(|| format!("broken key bundle for user {username}"))
            }
        };

        let computed = packet.fingerprint_hex();
        if !computed.eq_ignore_ascii_case(declared) {
            warn!(
                user = %username,
                declared = %declared,
                computed = %computed,
                "social-news fingerprint mismatch"
            );
            stats.record_user(0, 1);
            continue;
        }

        let key = match AirdropKey::from_pgp_packet(packet) {
            Ok(key) => key,
            Err(KeyError::UnsupportedAlgorithm) => {
                stats.record_user(0, 1);
                continue;
            }
            Err(error) => {
                return Err(error).with_context(|| format!("broken key for user {username}"))
            }
        };
        if !key.validate() {
            stats.record_user(0, 1);
            continue;
        }

        let mut subtree = builder.new_subtree();
        builder
            .add_key(&mut subtree, &key)
            .with_context(|| format!("failed to process key for user {username}"))?;
        builder.commit(subtree);
        stats.record_user(1, 0);
    }

    stats.log("hn");
    Ok(stats)
}
