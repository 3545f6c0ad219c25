//! Code-host ingestor. The upstream dump is a pair of parallel arrays, one
//! with each user's SSH keys and one with their PGP keys; both are merged
//! into a single per-user record before any key is touched, and any
//! disagreement between the two files aborts the run.

use std::fs;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::{CryptoRng, RngCore};
use serde::Deserialize;
use tracing::info;

use crate::builder::{SourceStats, TreeBuilder};
use crate::key::{AirdropKey, KeyError};

#[derive(Debug, Deserialize)]
struct SshUser(i64, String, Vec<SshKeyRecord>);

#[derive(Debug, Deserialize)]
struct SshKeyRecord(i64, String);

#[derive(Debug, Deserialize)]
struct PgpUser(i64, String, Vec<PgpKeyRecord>);

/// `[id, parent_id, key_id, key_data, emails, uses, ctime, etime, depth]`.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct PgpKeyRecord(
    i64,
    i64,
    String,
    String,
    Vec<EmailRecord>,
    i64,
    i64,
    i64,
    i64,
);

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct EmailRecord(String, i64);

enum UserKey {
    Ssh(String),
    Pgp(PgpKeyRecord),
}

/// Ingests the parallel SSH/PGP dumps under one seed per user.
pub fn ingest<R: RngCore + CryptoRng>(
    builder: &mut TreeBuilder<R>,
    prefix: &Path,
) -> Result<SourceStats> {
    let ssh_path = prefix.join("github-ssh.json");
    let ssh_users: Vec<SshUser> = serde_json::from_str(
        &fs::read_to_string(&ssh_path)
            .with_context(|| format!("failed to read {}", ssh_path.display()))?,
    )
    .with_context(|| format!("failed to parse {}", ssh_path.display()))?;

    let pgp_path = prefix.join("github-pgp.json");
    let pgp_users: Vec<PgpUser> = serde_json::from_str(
        &fs::read_to_string(&pgp_path)
            .with_context(|| format!("failed to read {}", pgp_path.display()))?,
    )
    .with_context(|| format!("failed to parse {}", pgp_path.display()))?;

    ensure!(
        ssh_users.len() == pgp_users.len(),
        "parallel user arrays disagree: {} ssh records vs {} pgp records",
        ssh_users.len(),
        pgp_users.len()
    );

    let mut stats = SourceStats::default();
    for (index, (ssh, pgp)) in ssh_users.into_iter().zip(pgp_users).enumerate() {
        ensure!(
            ssh.0 == pgp.0 && ssh.1 == pgp.1,
            "user record mismatch at index {}: ({}, {}) vs ({}, {})",
            index,
            ssh.0,
            ssh.1,
            pgp.0,
            pgp.1
        );
        if (index + 1) % 1000 == 0 {
            info!("processed {} code-host users", index + 1);
        }

        let handle = ssh.1.to_lowercase();
        if builder.is_duplicate(&handle) {
            continue;
        }

        // Most recent key first; ids are monotone in creation time.
        let mut keys: Vec<(i64, UserKey)> = Vec::new();
        for record in ssh.2 {
            keys.push((record.0, UserKey::Ssh(record.1)));
        }
        for record in pgp.2 {
            keys.push((record.0, UserKey::Pgp(record)));
        }
        keys.sort_by(|a, b| b.0.cmp(&a.0));

        let mut subtree = builder.new_subtree();
        let mut valid = 0u64;
        let mut invalid = 0u64;
        for (_, user_key) in keys {
            if subtree.is_full() {
                invalid += 1;
                continue;
            }
            let parsed = match user_key {
                UserKey::Ssh(line) => AirdropKey::from_ssh(&line),
                UserKey::Pgp(record) => {
                    // Subkeys declare their parent; only primaries count.
                    if record.1 != -1 {
                        invalid += 1;
                        continue;
                    }
                    if !record.4.iter().any(|email| email.1 == 1) {
                        invalid += 1;
                        continue;
                    }
                    let packet = STANDARD
                        .decode(&record.3)
                        .with_context(|| format!("undecodable pgp key for user {handle}"))?;
                    AirdropKey::from_pgp(&packet)
                }
            };
            let key = match parsed {
                Ok(key) => key,
                Err(KeyError::UnsupportedAlgorithm) => {
                    invalid += 1;
                    continue;
                }
                Err(error) => {
                    return Err(error).with_context(|| format!("broken key for user {handle}"))
                }
            };
            if !key.validate() {
                invalid += 1;
                continue;
            }
            builder
                .add_key(&mut subtree, &key)
                .with_context(|| format!("failed to process key for user {handle}"))?;
            valid += 1;
        }

        stats.record_user(valid, invalid);
        builder.commit(subtree);
    }

    stats.log("github");
    Ok(stats)
}
