//! PGP strong-set ingestor. The dump is one armored block per key, each
//! carrying the declared `Key-ID` (and optionally the owner's email) as
//! armor headers above a raw public-key packet stream.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rand::{CryptoRng, RngCore};
use tracing::{info, warn};

use crate::builder::{SourceStats, TreeBuilder};
use crate::key::{AirdropKey, KeyError};
use crate::pgp;

/// Ingests `strongset.asc`, one single-key subtree per accepted block.
pub fn ingest<R: RngCore + CryptoRng>(
    builder: &mut TreeBuilder<R>,
    prefix: &Path,
) -> Result<SourceStats> {
    let path = prefix.join("strongset.asc");
    let text = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let blocks = pgp::read_armored_blocks(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let mut stats = SourceStats::default();
    for (index, block) in blocks.iter().enumerate() {
        if (index + 1) % 1000 == 0 {
            info!("processed {} strong-set blocks", index + 1);
        }

        let declared = block
            .header("Key-ID")
            .with_context(|| format!("strong-set block {index} is missing its Key-ID header"))?;
        if let Some(email) = block.header("Email") {
            if builder.is_duplicate(email) {
                continue;
            }
        }

        let packet = match pgp::parse_public_key(&block.data) {
            Ok(packet) => packet,
            Err(KeyError::UnsupportedAlgorithm) => {
                stats.record_user(0, 1);
                continue;
            }
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("broken strong-set block for key {declared}"))
            }
        };

        let computed = packet.short_id();
        if !computed.eq_ignore_ascii_case(declared) {
            warn!(declared = %declared, computed = %computed, "strong-set key id mismatch");
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
                return Err(error)
                    .with_context(|| format!("broken strong-set key {declared}"))
            }
        };
        if !key.validate() {
            stats.record_user(0, 1);
            continue;
        }

        let mut subtree = builder.new_subtree();
        builder
            .add_key(&mut subtree, &key)
            .with_context(|| format!("failed to process strong-set key {declared}"))?;
        builder.commit(subtree);
        stats.record_user(1, 0);
    }

    stats.log("strongset");
    Ok(stats)
}
