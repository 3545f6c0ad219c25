//! Minimal OpenPGP support: enough of RFC 4880 to pull an RSA public key
//! out of a packet stream and to read armored blocks.
//!
//! The upstream dumps only ever hand us public-key packets, so everything
//! else (signatures, user ids, subkeys trailing a bundle) is ignored. Only
//! version 4 keys are handled; the few pre-v4 keys still floating around the
//! strong set use an MD5 fingerprint scheme the airdrop excludes.

use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha1::{Digest, Sha1};

use crate::key::KeyError;

/// Packet tag for a primary public key.
const TAG_PUBLIC_KEY: u8 = 6;

/// RSA algorithm ids: encrypt-or-sign, encrypt-only, sign-only.
const RSA_ALGORITHMS: [u8; 3] = [1, 2, 3];

/// Key material pulled from a public-key packet.
#[derive(Clone, Debug)]
pub enum KeyMaterial {
    /// RSA modulus and public exponent, big-endian with no leading zeros.
    Rsa { n: Vec<u8>, e: Vec<u8> },
    /// An algorithm the airdrop does not accept (DSA, ElGamal, ECC, ...).
    Unsupported,
}

/// A parsed version 4 public-key packet.
#[derive(Clone, Debug)]
pub struct PublicKeyPacket {
    pub algorithm: u8,
    pub created: u32,
    pub material: KeyMaterial,
    /// Raw packet body, the canonical encoding of the key.
    pub body: Vec<u8>,
}

impl PublicKeyPacket {
    /// Version 4 fingerprint: `SHA1(0x99 || u16 length || body)`.
    pub fn fingerprint(&self) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update([0x99]);
        hasher.update((self.body.len() as u16).to_be_bytes());
        hasher.update(&self.body);
        hasher.finalize().into()
    }

    /// Full fingerprint as 40 lowercase hex characters.
    pub fn fingerprint_hex(&self) -> String {
        hex::encode(self.fingerprint())
    }

    /// Short key id: the low 8 fingerprint bytes as 16 hex characters.
    pub fn short_id(&self) -> String {
        hex::encode(&self.fingerprint()[12..])
    }
}

/// Parses the first packet of a public-key packet stream.
///
/// The first packet must be a primary public key; anything else means the
/// input file is not what it claims to be and the error is fatal to the
/// caller. Non-v4 versions surface as `UnsupportedAlgorithm`.
pub fn parse_public_key(data: &[u8]) -> Result<PublicKeyPacket, KeyError> {
    let (tag, body) = read_packet(data)?;
    if tag != TAG_PUBLIC_KEY {
        return Err(KeyError::Malformed("expected a public key packet"));
    }

    let version = *body.first().ok_or(KeyError::Truncated)?;
    match version {
        4 => {}
        2 | 3 => return Err(KeyError::UnsupportedAlgorithm),
        _ => return Err(KeyError::Malformed("unknown public key packet version")),
    }
    if body.len() < 6 {
        return Err(KeyError::Truncated);
    }
    let created = u32::from_be_bytes([body[1], body[2], body[3], body[4]]);
    let algorithm = body[5];

    let material = if RSA_ALGORITHMS.contains(&algorithm) {
        let mut offset = 6;
        let n = read_mpi(body, &mut offset)?;
        let e = read_mpi(body, &mut offset)?;
        KeyMaterial::Rsa { n, e }
    } else {
        KeyMaterial::Unsupported
    };

    Ok(PublicKeyPacket {
        algorithm,
        created,
        material,
        body: body.to_vec(),
    })
}

/// Reads one packet header and returns the tag and body.
///
/// Handles both old-format (1/2/4-octet and indeterminate lengths) and
/// new-format (one/two/five-octet lengths) headers. Partial body lengths
/// never appear on key packets and are rejected.
fn read_packet(data: &[u8]) -> Result<(u8, &[u8]), KeyError> {
    let first = *data.first().ok_or(KeyError::Truncated)?;
    if first & 0x80 == 0 {
        return Err(KeyError::Malformed("packet tag bit not set"));
    }

    let (tag, length, start) = if first & 0x40 != 0 {
        // New format.
        let tag = first & 0x3f;
        let octet = *data.get(1).ok_or(KeyError::Truncated)?;
        match octet {
            0..=191 => (tag, octet as usize, 2),
            192..=223 => {
                let second = *data.get(2).ok_or(KeyError::Truncated)?;
                (tag, ((octet as usize - 192) << 8) + second as usize + 192, 3)
            }
            255 => {
                let bytes = data.get(2..6).ok_or(KeyError::Truncated)?;
                let length = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                (tag, length as usize, 6)
            }
            _ => return Err(KeyError::Malformed("partial body length on key packet")),
        }
    } else {
        // Old format.
        let tag = (first >> 2) & 0x0f;
        match first & 0x03 {
            0 => {
                let octet = *data.get(1).ok_or(KeyError::Truncated)?;
                (tag, octet as usize, 2)
            }
            1 => {
                let bytes = data.get(1..3).ok_or(KeyError::Truncated)?;
                (tag, u16::from_be_bytes([bytes[0], bytes[1]]) as usize, 3)
            }
            2 => {
                let bytes = data.get(1..5).ok_or(KeyError::Truncated)?;
                let length = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                (tag, length as usize, 5)
            }
            _ => {
                // Indeterminate length runs to the end of the input.
                return Ok(((first >> 2) & 0x0f, &data[1..]));
            }
        }
    };

    let body = data
        .get(start..start + length)
        .ok_or(KeyError::Truncated)?;
    Ok((tag, body))
}

/// Reads one multiprecision integer: a u16 bit count then the value bytes.
fn read_mpi(data: &[u8], offset: &mut usize) -> Result<Vec<u8>, KeyError> {
    let header = data.get(*offset..*offset + 2).ok_or(KeyError::Truncated)?;
    let bits = u16::from_be_bytes([header[0], header[1]]) as usize;
    *offset += 2;
    let length = (bits + 7) / 8;
    let value = data
        .get(*offset..*offset + length)
        .ok_or(KeyError::Truncated)?;
    *offset += length;
    Ok(value.to_vec())
}

/// One armored block: its `Name: value` headers and the decoded body.
#[derive(Clone, Debug)]
pub struct ArmoredBlock {
    pub headers: Vec<(String, String)>,
    pub data: Vec<u8>,
}

impl ArmoredBlock {
    /// Looks up a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Reads every armored block out of a concatenated armor stream.
///
/// Headers run until the first blank line (or the first non-header line for
/// blocks written without the separator); the `=XXXX` CRC line is skipped.
/// A block without its END line is a structural error.
pub fn read_armored_blocks(text: &str) -> anyhow::Result<Vec<ArmoredBlock>> {
    let mut blocks = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        if !line.trim().starts_with("-----BEGIN") {
            continue;
        }

        let mut headers = Vec::new();
        let mut body = String::new();
        let mut in_body = false;
        let mut terminated = false;

        for line in lines.by_ref() {
            let line = line.trim();
            if line.starts_with("-----END") {
                terminated = true;
                break;
            }
            if !in_body {
                if line.is_empty() {
                    in_body = true;
                    continue;
                }
                if let Some((name, value)) = line.split_once(": ") {
                    headers.push((name.to_string(), value.to_string()));
                    continue;
                }
                in_body = true;
            }
            if line.is_empty() || line.starts_with('=') {
                continue;
            }
            body.push_str(line);
        }

        anyhow::ensure!(terminated, "unterminated armored block");
        let data = STANDARD
            .decode(body.as_bytes())
            .context("invalid base64 in armored block")?;
        blocks.push(ArmoredBlock { headers, data });
    }

    Ok(blocks)
}
