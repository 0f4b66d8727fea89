//! ROM hex text codec.
//!
//! The simulation harness initializes its ROM array from a text stream of two-digit uppercase hex tokens, one per
//! byte, in byte order. Every token is followed by a single space. There is no length prefix, checksum, or
//! terminator: the consumer infers the length from the token count.
//!
//! ## Examples
//! ```rust
//! use rvconform_core::hex;
//!
//! assert_eq!(hex::encode(&[0x13, 0x00, 0xAB]), "13 00 AB ");
//! assert_eq!(hex::decode("13 00 AB ").unwrap(), vec![0x13, 0x00, 0xAB]);
//! assert_eq!(hex::encode(&[]), "");
//! ```

use std::fmt;

const DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Encode raw ROM bytes as hex text.
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for &byte in bytes {
        out.push(DIGITS[(byte >> 4) as usize] as char);
        out.push(DIGITS[(byte & 0x0F) as usize] as char);
        out.push(' ');
    }
    out
}

/// Error produced when hex text contains a malformed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexDecodeError {
    /// Zero-based index of the offending token.
    pub index: usize,
    pub token: String,
}

impl fmt::Display for HexDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid hex byte token #{}: {:?}", self.index, self.token)
    }
}

impl std::error::Error for HexDecodeError {}

/// Decode hex text back into raw bytes.
///
/// Tokens are split on whitespace and must each be exactly two hex digits.
pub fn decode(text: &str) -> Result<Vec<u8>, HexDecodeError> {
    text.split_whitespace()
        .enumerate()
        .map(|(index, token)| {
            let invalid = || HexDecodeError {
                index,
                token: token.to_string(),
            };
            // from_str_radix alone would accept a leading sign
            if token.len() != 2 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            u8::from_str_radix(token, 16).map_err(|_| invalid())
        })
        .collect()
}
