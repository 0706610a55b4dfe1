//! Nonce generation.

use base64::{engine::general_purpose::STANDARD as Base64, Engine};
use std::collections::VecDeque;

/// How many random bytes go into a nonce.
pub const NONCE_LENGTH: usize = 32;

/// Generates `byte_length` secure random bytes and returns them base64 encoded.
pub fn generate_nonce(byte_length: usize) -> Result<String, getrandom::Error> {
    let mut data = vec![0u8; byte_length];
    getrandom::getrandom(&mut data)?;
    Ok(Base64.encode(&data))
}

/// Where mechanisms get their nonces from.
pub trait NonceSource {
    /// Returns a fresh nonce.
    fn nonce(&mut self) -> Result<String, getrandom::Error>;
}

/// Nonces from the operating system's secure random source.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsNonce;

impl NonceSource for OsNonce {
    fn nonce(&mut self) -> Result<String, getrandom::Error> {
        generate_nonce(NONCE_LENGTH)
    }
}

/// Hands out a fixed sequence of nonces, repeating the last one once exhausted.
///
/// Only useful to reproduce known exchanges, never use it for real authentication.
#[derive(Debug, Clone)]
pub struct FixedNonce {
    nonces: VecDeque<String>,
    last: String,
}

impl FixedNonce {
    /// Always returns `nonce`.
    pub fn new<S: Into<String>>(nonce: S) -> FixedNonce {
        FixedNonce {
            nonces: VecDeque::new(),
            last: nonce.into(),
        }
    }

    /// Returns each of `nonces` in order.
    pub fn sequence<I, S>(nonces: I) -> FixedNonce
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FixedNonce {
            nonces: nonces.into_iter().map(Into::into).collect(),
            last: String::new(),
        }
    }
}

impl NonceSource for FixedNonce {
    fn nonce(&mut self) -> Result<String, getrandom::Error> {
        if let Some(nonce) = self.nonces.pop_front() {
            self.last = nonce;
        }
        Ok(self.last.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_nonces_differ() {
        let one = generate_nonce(NONCE_LENGTH).unwrap();
        let two = generate_nonce(NONCE_LENGTH).unwrap();
        assert_eq!(Base64.decode(&one).unwrap().len(), NONCE_LENGTH);
        assert_ne!(one, two);
    }

    #[test]
    fn fixed_sequence() {
        let mut nonces = FixedNonce::sequence(["a", "b"]);
        assert_eq!(nonces.nonce().unwrap(), "a");
        assert_eq!(nonces.nonce().unwrap(), "b");
        assert_eq!(nonces.nonce().unwrap(), "b");

        let mut nonces = FixedNonce::new("c");
        assert_eq!(nonces.nonce().unwrap(), "c");
        assert_eq!(nonces.nonce().unwrap(), "c");
    }
}
