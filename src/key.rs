//! Uniform airdrop key abstraction over the harvested PGP and SSH keys.
//!
//! Every accepted key, whatever its source encoding, ends up as an RSA
//! public key plus the canonical encoding it was parsed from. The canonical
//! encoding is what gets hashed into the commitment tree, so a key keeps
//! producing the same leaf no matter which dump it was harvested from.

use rand::{CryptoRng, RngCore};
use rsa::{BigUint, Pkcs1v15Encrypt, RsaPublicKey};

use crate::merkle::blake2b256;
use crate::pgp::{self, KeyMaterial, PublicKeyPacket};
use crate::ssh;
use crate::{NONCE_SIZE, SEED_SIZE};

/// Per-key nonce committed to the tree and handed back to claimants.
pub type Nonce = [u8; NONCE_SIZE];

/// Errors raised while decoding or using a harvested key.
///
/// `UnsupportedAlgorithm` is an expected classifier outcome and callers count
/// it as an invalid key. Every other variant means the input itself is broken
/// and the run must abort.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("unsupported algorithm")]
    UnsupportedAlgorithm,
    #[error("truncated key material")]
    Truncated,
    #[error("malformed key material: {0}")]
    Malformed(&'static str),
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("rsa operation failed: {0}")]
    Rsa(#[from] rsa::Error),
}

/// An RSA public key harvested from one of the upstream dumps.
///
/// The key carries an optional 32-byte nonce tweak. Applying a nonce changes
/// the canonical encoding, so the pre-nonce and post-nonce hashes commit to
/// the nonce-application step a claimant later has to reproduce.
#[derive(Clone, Debug)]
pub struct AirdropKey {
    n: BigUint,
    e: BigUint,
    raw: Vec<u8>,
    tweak: Option<Nonce>,
}

impl AirdropKey {
    /// Builds a key from a raw PGP public-key packet stream.
    pub fn from_pgp(packet: &[u8]) -> Result<Self, KeyError> {
        Self::from_pgp_packet(pgp::parse_public_key(packet)?)
    }

    /// Builds a key from an already parsed PGP public-key packet.
    pub fn from_pgp_packet(packet: PublicKeyPacket) -> Result<Self, KeyError> {
        match packet.material {
            KeyMaterial::Rsa { n, e } => Ok(Self {
                n: BigUint::from_bytes_be(&n),
                e: BigUint::from_bytes_be(&e),
                raw: packet.body,
                tweak: None,
            }),
            KeyMaterial::Unsupported => Err(KeyError::UnsupportedAlgorithm),
        }
    }

    /// Builds a key from a single OpenSSH public-key line.
    pub fn from_ssh(line: &str) -> Result<Self, KeyError> {
        let key = ssh::parse_openssh(line)?;
        Ok(Self {
            n: BigUint::from_bytes_be(&key.n),
            e: BigUint::from_bytes_be(&key.e),
            raw: key.blob,
            tweak: None,
        })
    }

    /// Semantic validity of the key parameters.
    ///
    /// The modulus must be between 1024 and 4096 bits and the public exponent
    /// odd and within `[3, 2^33)`. Anything outside those bounds is counted
    /// invalid rather than aborting the run.
    pub fn validate(&self) -> bool {
        let modulus_bits = self.n.bits() as u64;
        if !(1024..=4096).contains(&modulus_bits) {
            return false;
        }
        let exponent_bits = self.e.bits() as u64;
        if exponent_bits > 33 || self.e < BigUint::from(3u32) {
            return false;
        }
        // Exponent parity from the low byte of the big-endian encoding.
        match self.e.to_bytes_be().last() {
            Some(low) => low & 1 == 1,
            None => false,
        }
    }

    /// 32-byte BLAKE2b digest of the canonical encoding, with the nonce
    /// tweak appended once one has been applied.
    pub fn hash(&self) -> [u8; 32] {
        match &self.tweak {
            Some(tweak) => {
                let mut data = Vec::with_capacity(self.raw.len() + NONCE_SIZE);
                data.extend_from_slice(&self.raw);
                data.extend_from_slice(tweak);
                blake2b256(&data)
            }
            None => blake2b256(&self.raw),
        }
    }

    /// Bucket index for this key's nonce ciphertext: the low byte of the
    /// key hash.
    pub fn bucket(&self) -> u8 {
        self.hash()[31]
    }

    /// Records the nonce tweak, moving the key to its post-nonce form.
    pub fn apply_nonce(&mut self, nonce: &Nonce) {
        self.tweak = Some(*nonce);
    }

    /// Draws a fresh nonce and returns it together with the post-nonce key.
    pub fn generate<R: RngCore + CryptoRng>(&self, rng: &mut R) -> (Nonce, AirdropKey) {
        let mut nonce = [0u8; NONCE_SIZE];
        rng.fill_bytes(&mut nonce);
        let mut new_key = self.clone();
        new_key.apply_nonce(&nonce);
        (nonce, new_key)
    }

    /// Encrypts `nonce || seed` under this public key with PKCS#1 v1.5.
    ///
    /// The 62-byte plaintext fits the envelope of every key `validate()`
    /// accepts; the ciphertext is as long as the modulus.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        nonce: &Nonce,
        seed: &[u8; SEED_SIZE],
    ) -> Result<Vec<u8>, KeyError> {
        let public = RsaPublicKey::new(self.n.clone(), self.e.clone())?;
        let mut message = [0u8; NONCE_SIZE + SEED_SIZE];
        message[..NONCE_SIZE].copy_from_slice(nonce);
        message[NONCE_SIZE..].copy_from_slice(seed);
        Ok(public.encrypt(rng, Pkcs1v15Encrypt, &message)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_from_ssh_roundtrip() {
        let (n, e) = testutil::rsa_parts(1);
        let line = testutil::encode_openssh(&n, &e);
        let key = AirdropKey::from_ssh(&line).unwrap();
        assert!(key.validate());
        assert_eq!(key.n.to_bytes_be(), n);
        assert_eq!(key.e.to_bytes_be(), e);
    }

    #[test]
    fn test_from_pgp_roundtrip() {
        let (n, e) = testutil::rsa_parts(2);
        let packet = testutil::encode_pgp_packet(1, &n, &e);
        let key = AirdropKey::from_pgp(&packet).unwrap();
        assert!(key.validate());
        assert_eq!(key.n.to_bytes_be(), n);
    }

    #[test]
    fn test_ssh_ed25519_unsupported() {
        let line = testutil::encode_ssh_blob("ssh-ed25519", &[0xab; 32]);
        assert!(matches!(
            AirdropKey::from_ssh(&line),
            Err(KeyError::UnsupportedAlgorithm)
        ));
    }

    #[test]
    fn test_pgp_eddsa_unsupported() {
        let (n, e) = testutil::rsa_parts(3);
        // Algorithm 22 is EdDSA; the MPI payload is irrelevant here.
        let packet = testutil::encode_pgp_packet(22, &n, &e);
        assert!(matches!(
            AirdropKey::from_pgp(&packet),
            Err(KeyError::UnsupportedAlgorithm)
        ));
    }

    #[test]
    fn test_validate_rejects_small_modulus() {
        let key = AirdropKey {
            n: BigUint::from(0xffff_ffffu64),
            e: BigUint::from(65537u32),
            raw: vec![1, 2, 3],
            tweak: None,
        };
        assert!(!key.validate());
    }

    #[test]
    fn test_validate_rejects_even_exponent() {
        let (n, _) = testutil::rsa_parts(4);
        let key = AirdropKey {
            n: BigUint::from_bytes_be(&n),
            e: BigUint::from(65536u32),
            raw: vec![1, 2, 3],
            tweak: None,
        };
        assert!(!key.validate());
    }

    #[test]
    fn test_nonce_changes_hash_and_is_deterministic() {
        let (n, e) = testutil::rsa_parts(5);
        let key = AirdropKey::from_ssh(&testutil::encode_openssh(&n, &e)).unwrap();
        let before = key.hash();

        let mut rng = StdRng::seed_from_u64(7);
        let (nonce, new_key) = key.generate(&mut rng);
        assert_ne!(before, new_key.hash());
        assert_eq!(before, key.hash());

        let mut tweaked = key.clone();
        tweaked.apply_nonce(&nonce);
        assert_eq!(tweaked.hash(), new_key.hash());
    }

    #[test]
    fn test_bucket_is_low_hash_byte() {
        let (n, e) = testutil::rsa_parts(6);
        let key = AirdropKey::from_ssh(&testutil::encode_openssh(&n, &e)).unwrap();
        assert_eq!(key.bucket(), key.hash()[31]);
    }

    #[test]
    fn test_encrypt_produces_modulus_sized_ciphertext() {
        let (n, e) = testutil::rsa_parts(7);
        let key = AirdropKey::from_ssh(&testutil::encode_openssh(&n, &e)).unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        let (nonce, _) = key.generate(&mut rng);
        let seed = [0x11u8; SEED_SIZE];
        let ciphertext = key.encrypt(&mut rng, &nonce, &seed).unwrap();
        // RSA-1024 modulus is 128 bytes.
        assert_eq!(ciphertext.len(), 128);
    }
}
