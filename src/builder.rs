//! Mutable state for one build pass: subtrees, nonce buckets, the faucet
//! dedup set, and the valid-key counter. Ingestors drive this through
//! `new_subtree` / `add_key` / `commit`; `finalize` freezes everything into
//! the sorted commitment tree.

use std::collections::HashSet;

use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use tracing::info;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::key::{AirdropKey, KeyError};
use crate::merkle::merkle_root;
use crate::{BUCKETS, SEED_SIZE, SUBTREE_LEAVES};

/// Per-user random seed, shared by every key in that user's subtree.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; SEED_SIZE]);

impl Seed {
    /// Draws a fresh seed: the first 30 bytes of `SHA256(64 random bytes)`.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut entropy = [0u8; 64];
        rng.fill_bytes(&mut entropy);
        let digest = Sha256::digest(entropy);
        let mut seed = [0u8; SEED_SIZE];
        seed.copy_from_slice(&digest[..SEED_SIZE]);
        entropy.zeroize();
        Self(seed)
    }

    pub fn as_bytes(&self) -> &[u8; SEED_SIZE] {
        &self.0
    }
}

/// An in-progress subtree: up to eight 32-byte hashes under one seed.
pub struct Subtree {
    hashes: Vec<[u8; 32]>,
    seed: Seed,
}

impl Subtree {
    fn new(seed: Seed) -> Self {
        Self {
            hashes: Vec::with_capacity(SUBTREE_LEAVES),
            seed,
        }
    }

    /// True once all eight slots are taken; further keys are truncated.
    pub fn is_full(&self) -> bool {
        self.hashes.len() >= SUBTREE_LEAVES
    }

    /// True while no key has landed in this subtree.
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    fn push_pair(&mut self, before: [u8; 32], after: [u8; 32]) {
        self.hashes.push(before);
        self.hashes.push(after);
    }

    /// Pads to eight leaves with the seed's HKDF stream and sorts.
    ///
    /// Filler is `HKDF-SHA256` (extract with no salt, expand with empty
    /// info) so a claimant holding the seed can tell filler from real
    /// leaves. The sort is plain bytewise comparison, which is what array
    /// `Ord` gives us; it both fixes the on-disk order and hides how many
    /// leaves are real.
    fn finish(self) -> [[u8; 32]; SUBTREE_LEAVES] {
        let mut hashes = self.hashes;
        if hashes.len() < SUBTREE_LEAVES {
            let hkdf = Hkdf::<Sha256>::new(None, self.seed.as_bytes());
            let mut stream = [0u8; SUBTREE_LEAVES * 32];
            hkdf.expand(&[], &mut stream)
                .expect("filler length is within the hkdf output bound");
            for chunk in stream.chunks_exact(32) {
                if hashes.len() == SUBTREE_LEAVES {
                    break;
                }
                let mut filler = [0u8; 32];
                filler.copy_from_slice(chunk);
                hashes.push(filler);
            }
        }
        hashes.sort_unstable();

        let mut leaves = [[0u8; 32]; SUBTREE_LEAVES];
        for (slot, hash) in leaves.iter_mut().zip(hashes) {
            *slot = hash;
        }
        leaves
    }
}

/// Per-source ingestion counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct SourceStats {
    pub valid_users: u64,
    pub valid_keys: u64,
    pub invalid_users: u64,
    pub invalid_keys: u64,
}

impl SourceStats {
    /// Folds one user's key tally into the totals.
    pub fn record_user(&mut self, valid_keys: u64, invalid_keys: u64) {
        self.valid_keys += valid_keys;
        self.invalid_keys += invalid_keys;
        if valid_keys > 0 {
            self.valid_users += 1;
        } else {
            self.invalid_users += 1;
        }
    }

    pub fn log(&self, source: &str) {
        info!(
            source,
            valid_users = self.valid_users,
            valid_keys = self.valid_keys,
            invalid_users = self.invalid_users,
            invalid_keys = self.invalid_keys,
            "source ingested"
        );
    }
}

/// Owns all mutable build state; ingestors borrow it mutably.
pub struct TreeBuilder<R: RngCore + CryptoRng> {
    rng: R,
    dedup: HashSet<String>,
    subtrees: Vec<[[u8; 32]; SUBTREE_LEAVES]>,
    buckets: Vec<Vec<Vec<u8>>>,
    total_keys: u64,
}

impl<R: RngCore + CryptoRng> TreeBuilder<R> {
    /// Creates a builder over the faucet dedup identifiers.
    pub fn new(rng: R, dedup: HashSet<String>) -> Self {
        Self {
            rng,
            dedup,
            subtrees: Vec::new(),
            buckets: vec![Vec::new(); BUCKETS],
            total_keys: 0,
        }
    }

    /// True when the identifier belongs to a faucet claimant.
    pub fn is_duplicate(&self, identifier: &str) -> bool {
        self.dedup.contains(&identifier.to_lowercase())
    }

    /// Opens a subtree with a freshly generated seed.
    pub fn new_subtree(&mut self) -> Subtree {
        Subtree::new(Seed::generate(&mut self.rng))
    }

    /// Runs the per-key pipeline for one validated key.
    ///
    /// Routes the encrypted `nonce || seed` into the key's bucket and
    /// commits the pre- and post-nonce hashes to the subtree. The caller
    /// must have checked `is_full` first.
    pub fn add_key(&mut self, subtree: &mut Subtree, key: &AirdropKey) -> Result<(), KeyError> {
        let bucket = key.bucket() as usize;
        let (nonce, new_key) = key.generate(&mut self.rng);
        let ciphertext = key.encrypt(&mut self.rng, &nonce, subtree.seed.as_bytes())?;
        self.buckets[bucket].push(ciphertext);
        subtree.push_pair(key.hash(), new_key.hash());
        self.total_keys += 1;
        Ok(())
    }

    /// Pads, sorts, and appends the subtree. Empty subtrees are dropped.
    pub fn commit(&mut self, subtree: Subtree) {
        if !subtree.is_empty() {
            self.subtrees.push(subtree.finish());
        }
    }

    /// Freezes the build state into the final sorted commitment tree.
    pub fn finalize(self) -> CommitmentTree {
        let mut entries: Vec<([u8; 32], [[u8; 32]; SUBTREE_LEAVES])> = self
            .subtrees
            .into_iter()
            .map(|leaves| (merkle_root(&leaves), leaves))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let roots: Vec<[u8; 32]> = entries.iter().map(|(root, _)| *root).collect();
        let root = merkle_root(&roots);

        CommitmentTree {
            subtrees: entries.into_iter().map(|(_, leaves)| leaves).collect(),
            root,
            keys: self.total_keys,
            buckets: self.buckets,
        }
    }
}

/// The finished commitment: subtrees sorted by their roots, the top-level
/// root over those roots, and the populated nonce buckets.
pub struct CommitmentTree {
    pub subtrees: Vec<[[u8; 32]; SUBTREE_LEAVES]>,
    pub root: [u8; 32],
    pub keys: u64,
    pub buckets: Vec<Vec<Vec<u8>>>,
}

impl CommitmentTree {
    /// Serializes the tree file: `u32 LE` subtree count, then the raw
    /// leaves in order.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.subtrees.len() * SUBTREE_LEAVES * 32);
        out.extend_from_slice(&(self.subtrees.len() as u32).to_le_bytes());
        for subtree in &self.subtrees {
            for leaf in subtree {
                out.extend_from_slice(leaf);
            }
        }
        out
    }
}
