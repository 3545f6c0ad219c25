#![forbid(unsafe_code)]

pub mod builder;
pub mod faucet;
pub mod github;
pub mod hn;
pub mod key;
pub mod merkle;
pub mod output;
pub mod pgp;
pub mod ssh;
pub mod strongset;

#[cfg(test)]
pub(crate) mod testutil;

/// Total airdrop amount in base units.
pub const MAX_AIRDROP: u64 = 924_800_000 * 1_000_000;

/// Number of 32-byte leaves committed per subtree.
pub const SUBTREE_LEAVES: usize = 8;

/// Size in bytes of the per-user encrypted seed.
///
/// Chosen so that a 32-byte nonce plus the seed fit inside the PKCS#1 v1.5
/// envelope of an RSA-1024 key, the smallest key the tree accepts.
pub const SEED_SIZE: usize = 30;

/// Size in bytes of the per-key nonce.
pub const NONCE_SIZE: usize = 32;

/// Number of nonce ciphertext buckets.
pub const BUCKETS: usize = 256;

pub use builder::{CommitmentTree, Seed, SourceStats, Subtree, TreeBuilder};
pub use key::{AirdropKey, KeyError, Nonce};
