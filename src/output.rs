//! On-disk outputs: the flat tree file, the 256 nonce bucket files, and the
//! summary JSON. The build directory is wiped and re-created on every run;
//! each file lands at its final path through a temp-file rename so a crash
//! never leaves a half-written output behind.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::builder::CommitmentTree;
use crate::faucet::Faucet;
use crate::merkle;
use crate::{BUCKETS, MAX_AIRDROP, SUBTREE_LEAVES};

/// Contents of `etc/tree.json`.
#[derive(Debug, Serialize)]
pub struct Summary {
    pub checksum: String,
    pub root: String,
    pub leaves: u64,
    pub keys: u64,
    pub subleaves: u32,
    pub depth: u32,
    pub subdepth: u32,
    pub faucet: u64,
    pub shares: u64,
    pub reward: u64,
    pub checksums: Vec<String>,
}

/// Writes every output under `<prefix>/build` and `<prefix>/etc`.
pub fn write(prefix: &Path, tree: &CommitmentTree, faucet: &Faucet) -> Result<Summary> {
    let build = prefix.join("build");
    match fs::remove_dir_all(&build) {
        Ok(()) => {}
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => {
            return Err(error).with_context(|| format!("failed to clear {}", build.display()))
        }
    }
    let nonces = build.join("nonces");
    fs::create_dir_all(&nonces)
        .with_context(|| format!("failed to create {}", nonces.display()))?;
    let etc = prefix.join("etc");
    fs::create_dir_all(&etc).with_context(|| format!("failed to create {}", etc.display()))?;

    ensure!(
        tree.subtrees.len() <= u32::MAX as usize,
        "subtree count {} does not fit the tree header",
        tree.subtrees.len()
    );
    let encoded = tree.encode();
    let checksum = hex::encode(Sha256::digest(&encoded));
    write_file_atomic(&build.join("tree.bin"), &encoded)?;

    let mut checksums = Vec::with_capacity(BUCKETS);
    for (index, bucket) in tree.buckets.iter().enumerate() {
        let mut bytes = Vec::new();
        for ciphertext in bucket {
            let length = u16::try_from(ciphertext.len())
                .context("nonce ciphertext does not fit its length prefix")?;
            bytes.extend_from_slice(&length.to_le_bytes());
            bytes.extend_from_slice(ciphertext);
        }
        checksums.push(hex::encode(Sha256::digest(&bytes)));
        write_file_atomic(&nonces.join(format!("{index:03}.bin")), &bytes)?;
    }

    let leaves = tree.subtrees.len() as u64;
    let denominator = leaves + faucet.shares;
    let reward = if denominator == 0 {
        0
    } else {
        MAX_AIRDROP / denominator
    };
    ensure!(
        denominator as u128 * reward as u128 <= MAX_AIRDROP as u128,
        "reward {} times {} recipients exceeds the airdrop cap",
        reward,
        denominator
    );

    let summary = Summary {
        checksum,
        root: hex::encode(tree.root),
        leaves,
        keys: tree.keys,
        subleaves: SUBTREE_LEAVES as u32,
        depth: merkle::depth(tree.subtrees.len()),
        subdepth: merkle::depth(SUBTREE_LEAVES),
        faucet: faucet.entries as u64,
        shares: faucet.shares,
        reward,
        checksums,
    };
    let json = serde_json::to_string_pretty(&summary).context("failed to serialize summary")?;
    write_file_atomic(&etc.join("tree.json"), json.as_bytes())?;

    info!(
        root = %summary.root,
        leaves = summary.leaves,
        keys = summary.keys,
        reward = summary.reward,
        "outputs written"
    );
    Ok(summary)
}

/// Writes bytes to a sibling temp file, then renames over the final path.
pub fn write_file_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move {} into place", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TreeBuilder;
    use crate::testutil;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    fn empty_faucet() -> Faucet {
        Faucet {
            entries: 0,
            shares: 0,
            dedup: HashSet::new(),
        }
    }

    #[test]
    fn test_empty_build() {
        let dir = tempfile::tempdir().unwrap();
        let tree = TreeBuilder::new(StdRng::seed_from_u64(1), HashSet::new()).finalize();
        let summary = write(dir.path(), &tree, &empty_faucet()).unwrap();

        assert_eq!(summary.leaves, 0);
        assert_eq!(summary.keys, 0);
        assert_eq!(summary.depth, 0);
        assert_eq!(summary.subdepth, 3);
        assert_eq!(summary.reward, 0);
        assert_eq!(summary.root, hex::encode(merkle::merkle_root(&[])));
        assert_eq!(summary.checksums.len(), BUCKETS);
        assert!(summary.checksums.iter().all(|sum| sum == EMPTY_SHA256));

        let tree_bin = fs::read(dir.path().join("build/tree.bin")).unwrap();
        assert_eq!(tree_bin, 0u32.to_le_bytes());
        assert_eq!(summary.checksum, hex::encode(Sha256::digest(&tree_bin)));
        for index in [0usize, 17, 255] {
            let bucket = fs::read(dir.path().join(format!("build/nonces/{index:03}.bin"))).unwrap();
            assert!(bucket.is_empty());
        }
    }

    #[test]
    fn test_single_key_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = TreeBuilder::new(StdRng::seed_from_u64(2), HashSet::new());
        let key = testutil::airdrop_key(400);
        let bucket = key.bucket() as usize;
        let mut subtree = builder.new_subtree();
        builder.add_key(&mut subtree, &key).unwrap();
        builder.commit(subtree);
        let tree = builder.finalize();

        let summary = write(dir.path(), &tree, &empty_faucet()).unwrap();
        assert_eq!(summary.leaves, 1);
        assert_eq!(summary.keys, 1);
        assert_eq!(summary.reward, MAX_AIRDROP);

        // One bucket holds one length-prefixed RSA-1024 ciphertext; every
        // other bucket file hashes to the empty-string digest.
        let populated =
            fs::read(dir.path().join(format!("build/nonces/{bucket:03}.bin"))).unwrap();
        assert_eq!(populated.len(), 2 + 128);
        assert_eq!(populated[..2], 128u16.to_le_bytes());
        for (index, sum) in summary.checksums.iter().enumerate() {
            if index == bucket {
                assert_eq!(sum, &hex::encode(Sha256::digest(&populated)));
            } else {
                assert_eq!(sum, EMPTY_SHA256);
            }
        }

        // The tree file reproduces the root computed in memory.
        let tree_bin = fs::read(dir.path().join("build/tree.bin")).unwrap();
        assert_eq!(tree_bin.len(), 4 + SUBTREE_LEAVES * 32);
        let mut roots = Vec::new();
        for chunk in tree_bin[4..].chunks_exact(SUBTREE_LEAVES * 32) {
            let leaves: Vec<[u8; 32]> = chunk
                .chunks_exact(32)
                .map(|leaf| {
                    let mut hash = [0u8; 32];
                    hash.copy_from_slice(leaf);
                    hash
                })
                .collect();
            roots.push(merkle::merkle_root(&leaves));
        }
        assert_eq!(hex::encode(merkle::merkle_root(&roots)), summary.root);
    }

    #[test]
    fn test_reward_respects_shares() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = TreeBuilder::new(StdRng::seed_from_u64(3), HashSet::new());
        let mut subtree = builder.new_subtree();
        builder.add_key(&mut subtree, &testutil::airdrop_key(401)).unwrap();
        builder.commit(subtree);
        let tree = builder.finalize();

        let faucet = Faucet {
            entries: 2,
            shares: 6,
            dedup: HashSet::new(),
        };
        let summary = write(dir.path(), &tree, &faucet).unwrap();
        assert_eq!(summary.reward, MAX_AIRDROP / 7);
        assert_eq!(summary.faucet, 2);
        assert_eq!(summary.shares, 6);
        assert!((summary.leaves + summary.shares) * summary.reward <= MAX_AIRDROP);
    }

    #[test]
    fn test_rerun_replaces_previous_build() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("build/nonces")).unwrap();
        fs::write(dir.path().join("build/stale.bin"), b"stale").unwrap();

        let tree = TreeBuilder::new(StdRng::seed_from_u64(4), HashSet::new()).finalize();
        write(dir.path(), &tree, &empty_faucet()).unwrap();
        assert!(!dir.path().join("build/stale.bin").exists());
        assert!(dir.path().join("build/tree.bin").exists());
    }
}
