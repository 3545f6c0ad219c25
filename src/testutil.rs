//! Shared test fixtures: seeded RSA keypairs re-encoded through the same
//! wire formats the parsers consume.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;

use crate::key::AirdropKey;

/// Generates a deterministic RSA-1024 keypair and returns `(n, e)` big-endian.
pub(crate) fn rsa_parts(seed: u64) -> (Vec<u8>, Vec<u8>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let private = RsaPrivateKey::new(&mut rng, 1024).expect("rsa keygen");
    (private.n().to_bytes_be(), private.e().to_bytes_be())
}

/// A ready-to-use validated key, encoded and parsed through the SSH path.
pub(crate) fn airdrop_key(seed: u64) -> AirdropKey {
    let (n, e) = rsa_parts(seed);
    AirdropKey::from_ssh(&encode_openssh(&n, &e)).expect("fixture key parses")
}

fn push_ssh_string(blob: &mut Vec<u8>, value: &[u8]) {
    blob.extend_from_slice(&(value.len() as u32).to_be_bytes());
    blob.extend_from_slice(value);
}

fn push_ssh_mpint(blob: &mut Vec<u8>, value: &[u8]) {
    if value.first().is_some_and(|first| first & 0x80 != 0) {
        let mut padded = Vec::with_capacity(value.len() + 1);
        padded.push(0);
        padded.extend_from_slice(value);
        push_ssh_string(blob, &padded);
    } else {
        push_ssh_string(blob, value);
    }
}

/// Encodes an `ssh-rsa` public-key line.
pub(crate) fn encode_openssh(n: &[u8], e: &[u8]) -> String {
    let mut blob = Vec::new();
    push_ssh_string(&mut blob, b"ssh-rsa");
    push_ssh_mpint(&mut blob, e);
    push_ssh_mpint(&mut blob, n);
    format!("ssh-rsa {}", STANDARD.encode(&blob))
}

/// Encodes a public-key line of arbitrary type with an opaque payload.
pub(crate) fn encode_ssh_blob(key_type: &str, payload: &[u8]) -> String {
    let mut blob = Vec::new();
    push_ssh_string(&mut blob, key_type.as_bytes());
    push_ssh_string(&mut blob, payload);
    format!("{} {}", key_type, STANDARD.encode(&blob))
}

fn push_mpi(body: &mut Vec<u8>, value: &[u8]) {
    let bits = (value.len() - 1) * 8 + (8 - value[0].leading_zeros() as usize);
    body.extend_from_slice(&(bits as u16).to_be_bytes());
    body.extend_from_slice(value);
}

/// Encodes a v4 public-key packet (old-format header, 2-octet length).
pub(crate) fn encode_pgp_packet(algorithm: u8, n: &[u8], e: &[u8]) -> Vec<u8> {
    let mut body = vec![4];
    body.extend_from_slice(&1_544_140_800u32.to_be_bytes());
    body.push(algorithm);
    push_mpi(&mut body, n);
    push_mpi(&mut body, e);

    let mut packet = vec![0x99];
    packet.extend_from_slice(&(body.len() as u16).to_be_bytes());
    packet.extend_from_slice(&body);
    packet
}

/// Re-encodes an old-format 2-octet-length packet with a new-format header.
pub(crate) fn to_new_format(old_packet: &[u8]) -> Vec<u8> {
    let body = &old_packet[3..];
    let mut packet = vec![0xc0 | 6];
    let length = body.len();
    if length < 192 {
        packet.push(length as u8);
    } else if length < 8384 {
        packet.push((((length - 192) >> 8) + 192) as u8);
        packet.push(((length - 192) & 0xff) as u8);
    } else {
        packet.push(255);
        packet.extend_from_slice(&(length as u32).to_be_bytes());
    }
    packet.extend_from_slice(body);
    packet
}

/// Wraps data in an armored block with the given headers.
pub(crate) fn armor(label: &str, headers: &[(&str, &str)], data: &[u8]) -> String {
    let mut text = format!("-----BEGIN {label}-----\n");
    for (name, value) in headers {
        text.push_str(&format!("{name}: {value}\n"));
    }
    text.push('\n');
    text.push_str(&STANDARD.encode(data));
    text.push('\n');
    text.push_str(&format!("-----END {label}-----\n"));
    text
}
