//! OpenSSH public-key line parsing.
//!
//! A line is `<type> <base64 blob> [comment]`; the blob repeats the type as
//! a length-prefixed string, then carries the algorithm fields. Only
//! `ssh-rsa` (exponent then modulus, as mpints) is accepted.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::key::KeyError;

const TYPE_RSA: &str = "ssh-rsa";

/// A decoded `ssh-rsa` public key.
#[derive(Clone, Debug)]
pub struct SshPublicKey {
    /// Decoded wire blob, the canonical encoding of the key.
    pub blob: Vec<u8>,
    /// Modulus, big-endian.
    pub n: Vec<u8>,
    /// Public exponent, big-endian.
    pub e: Vec<u8>,
}

/// Parses one OpenSSH public-key line.
pub fn parse_openssh(line: &str) -> Result<SshPublicKey, KeyError> {
    let mut parts = line.split_whitespace();
    let key_type = parts.next().ok_or(KeyError::Malformed("empty key line"))?;
    if key_type != TYPE_RSA {
        return Err(KeyError::UnsupportedAlgorithm);
    }
    let encoded = parts
        .next()
        .ok_or(KeyError::Malformed("missing key blob"))?;
    let blob = STANDARD.decode(encoded)?;

    let mut offset = 0;
    let wire_type = read_string(&blob, &mut offset)?;
    if wire_type != TYPE_RSA.as_bytes() {
        return Err(KeyError::Malformed("key blob type disagrees with line"));
    }
    let e = strip_leading_zeros(read_string(&blob, &mut offset)?);
    let n = strip_leading_zeros(read_string(&blob, &mut offset)?);

    Ok(SshPublicKey { blob, n, e })
}

/// Reads one `u32`-length-prefixed field from the wire blob.
fn read_string(blob: &[u8], offset: &mut usize) -> Result<Vec<u8>, KeyError> {
    let header = blob.get(*offset..*offset + 4).ok_or(KeyError::Truncated)?;
    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    *offset += 4;
    let value = blob
        .get(*offset..*offset + length)
        .ok_or(KeyError::Truncated)?;
    *offset += length;
    Ok(value.to_vec())
}

/// Drops the sign byte mpints carry when the high bit of the value is set.
fn strip_leading_zeros(mut value: Vec<u8>) -> Vec<u8> {
    while value.first() == Some(&0) {
        value.remove(0);
    }
    value
}
