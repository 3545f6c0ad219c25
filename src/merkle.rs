use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

/// BLAKE2b with a 32-byte digest, the hash committed to by the tree.
pub type Blake2b256 = Blake2b<U32>;

/// Hashes arbitrary bytes to a 32-byte BLAKE2b digest.
pub fn blake2b256(data: &[u8]) -> [u8; 32] {
    Blake2b256::digest(data).into()
}

/// Hashes two child nodes into their parent: `BLAKE2b-256(left || right)`.
pub fn hash_nodes(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    Blake2b256::new()
        .chain_update(left)
        .chain_update(right)
        .finalize()
        .into()
}

/// Computes the Merkle root over a sequence of 32-byte nodes.
///
/// Levels are built pairwise; an odd level duplicates its last node. A single
/// node is its own root, and the root of the empty sequence is the BLAKE2b-256
/// digest of the empty string.
pub fn merkle_root(nodes: &[[u8; 32]]) -> [u8; 32] {
    if nodes.is_empty() {
        return blake2b256(b"");
    }

    let mut level = nodes.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for chunk in level.chunks(2) {
            let left = &chunk[0];
            let right = if chunk.len() == 2 { &chunk[1] } else { &chunk[0] };
            next.push(hash_nodes(left, right));
        }
        level = next;
    }

    level[0]
}

/// Number of levels above the leaves in a Merkle tree over `n` nodes.
pub fn depth(mut n: usize) -> u32 {
    let mut depth = 0;
    while n > 1 {
        n = (n + 1) >> 1;
        depth += 1;
    }
    depth
}
