//! Hex encoding for `0x` prefixed identifiers

use thiserror::Error;

const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

/// Hex error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Missing `0x` prefix
    #[error("Missing 0x prefix")]
    MissingPrefix,
    /// Invalid character
    #[error("Invalid hex character `{0}` at index {1}")]
    InvalidHexCharacter(char, usize),
    /// Wrong length
    #[error("Invalid length: expected {expected} hex digits, got {actual}")]
    InvalidLength {
        /// Expected digits
        expected: usize,
        /// Found digits
        actual: usize,
    },
}

/// Encode bytes as lowercase hex with a `0x` prefix
pub fn encode<T: AsRef<[u8]>>(data: T) -> String {
    let data = data.as_ref();
    let mut s = String::with_capacity(2 + data.len() * 2);
    s.push_str("0x");
    for byte in data {
        s.push(HEX_CHARS[(byte >> 4) as usize] as char);
        s.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
    }
    s
}

fn strip_prefix(s: &str) -> Result<&str, Error> {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or(Error::MissingPrefix)
}

fn nibble(c: u8, idx: usize) -> Result<u8, Error> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(Error::InvalidHexCharacter(c as char, idx)),
    }
}

/// Decode a `0x` prefixed hex string of exactly `N` bytes
pub fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], Error> {
    let digits = strip_prefix(s)?;
    if digits.len() != N * 2 {
        return Err(Error::InvalidLength {
            expected: N * 2,
            actual: digits.len(),
        });
    }
    decode_padded(s)
}

/// Decode a `0x` prefixed hex string of up to `N` bytes, left padding with zeros
pub fn decode_padded<const N: usize>(s: &str) -> Result<[u8; N], Error> {
    let digits = strip_prefix(s)?.as_bytes();
    if digits.is_empty() || digits.len() > N * 2 {
        return Err(Error::InvalidLength {
            expected: N * 2,
            actual: digits.len(),
        });
    }

    let mut out = [0u8; N];
    // Walk from the least significant digit so odd lengths pad on the left
    for (i, &c) in digits.iter().rev().enumerate() {
        let value = nibble(c, digits.len() - 1 - i)?;
        let byte = N - 1 - i / 2;
        if i % 2 == 0 {
            out[byte] |= value;
        } else {
            out[byte] |= value << 4;
        }
    }

    Ok(out)
}
