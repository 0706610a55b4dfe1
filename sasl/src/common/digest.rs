//! Hashing, HMAC and PBKDF2 key derivation over the hash functions the mechanisms need.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use md5::Md5;
use pbkdf2::pbkdf2;
use sha1::{Digest, Sha1};
use sha2::{Sha256, Sha512};
use sha3::Sha3_512;
use std::fmt;

/// The hash functions usable with `derive_key` and SCRAM.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hash {
    /// SHA-1, 20 bytes of output.
    Sha1,
    /// SHA-256, 32 bytes of output.
    Sha256,
    /// SHA-512, 64 bytes of output.
    Sha512,
    /// SHA3-512, 64 bytes of output.
    Sha3_512,
}

macro_rules! hmac_with {
    ($hash:ty, $data:expr, $key:expr) => {{
        let mut mac = Hmac::<$hash>::new_from_slice($key)?;
        mac.update($data);
        mac.finalize().into_bytes().to_vec()
    }};
}

impl Hash {
    /// The name of this hash function, as used in SCRAM mechanism names.
    pub fn name(self) -> &'static str {
        match self {
            Hash::Sha1 => "SHA-1",
            Hash::Sha256 => "SHA-256",
            Hash::Sha512 => "SHA-512",
            Hash::Sha3_512 => "SHA3-512",
        }
    }

    /// Looks up a hash function from its name.
    pub fn from_name(name: &str) -> Option<Hash> {
        Some(match name {
            "SHA-1" => Hash::Sha1,
            "SHA-256" => Hash::Sha256,
            "SHA-512" => Hash::Sha512,
            "SHA3-512" => Hash::Sha3_512,
            _ => return None,
        })
    }

    /// The output size in bytes.
    pub fn output_size(self) -> usize {
        match self {
            Hash::Sha1 => 20,
            Hash::Sha256 => 32,
            Hash::Sha512 | Hash::Sha3_512 => 64,
        }
    }

    /// Hashes `data`.
    pub fn hash(self, data: &[u8]) -> Vec<u8> {
        match self {
            Hash::Sha1 => Sha1::digest(data).to_vec(),
            Hash::Sha256 => Sha256::digest(data).to_vec(),
            Hash::Sha512 => Sha512::digest(data).to_vec(),
            Hash::Sha3_512 => Sha3_512::digest(data).to_vec(),
        }
    }

    /// Computes the HMAC of `data` keyed by `key`.
    pub fn hmac(self, data: &[u8], key: &[u8]) -> Result<Vec<u8>, InvalidLength> {
        Ok(match self {
            Hash::Sha1 => hmac_with!(Sha1, data, key),
            Hash::Sha256 => hmac_with!(Sha256, data, key),
            Hash::Sha512 => hmac_with!(Sha512, data, key),
            Hash::Sha3_512 => hmac_with!(Sha3_512, data, key),
        })
    }
}

/// An error which can occur while deriving or reusing a salted password.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeriveError {
    /// A stored PBKDF2 secret was made with another hash function.
    IncompatibleHashingMethod(String, String),
    /// A stored PBKDF2 secret was made with another salt.
    IncorrectSalt,
    /// A stored PBKDF2 secret was made with another iteration count.
    IncompatibleIterationCount(u32, u32),
    /// Zero bytes of output were requested.
    InvalidOutputLength,
    /// Zero iterations were requested.
    InvalidIterationCount,
    /// The HMAC rejected the key.
    InvalidKeyLength(InvalidLength),
}

impl fmt::Display for DeriveError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeriveError::IncompatibleHashingMethod(one, two) => {
                write!(fmt, "incompatible hashing method, {} is not {}", one, two)
            }
            DeriveError::IncorrectSalt => write!(fmt, "incorrect salt"),
            DeriveError::IncompatibleIterationCount(one, two) => {
                write!(fmt, "incompatible iteration count, {} is not {}", one, two)
            }
            DeriveError::InvalidOutputLength => write!(fmt, "requested output length is zero"),
            DeriveError::InvalidIterationCount => write!(fmt, "iteration count is zero"),
            DeriveError::InvalidKeyLength(err) => write!(fmt, "invalid key length: {}", err),
        }
    }
}

impl std::error::Error for DeriveError {}

impl From<InvalidLength> for DeriveError {
    fn from(err: InvalidLength) -> DeriveError {
        DeriveError::InvalidKeyLength(err)
    }
}

/// Derives `output_length` bytes from `password` and `salt` with PBKDF2, using HMAC over `hash`
/// as the pseudorandom function.
pub fn derive_key(
    hash: Hash,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    output_length: usize,
) -> Result<Vec<u8>, DeriveError> {
    if output_length == 0 {
        return Err(DeriveError::InvalidOutputLength);
    }
    if iterations == 0 {
        return Err(DeriveError::InvalidIterationCount);
    }
    let mut result = vec![0; output_length];
    match hash {
        Hash::Sha1 => pbkdf2::<Hmac<Sha1>>(password, salt, iterations, &mut result),
        Hash::Sha256 => pbkdf2::<Hmac<Sha256>>(password, salt, iterations, &mut result),
        Hash::Sha512 => pbkdf2::<Hmac<Sha512>>(password, salt, iterations, &mut result),
        Hash::Sha3_512 => pbkdf2::<Hmac<Sha3_512>>(password, salt, iterations, &mut result),
    }?;
    Ok(result)
}

/// Computes the HTTP digest style `KD(H(A1), nonce:nc:cnonce:qop:H(A2))` with MD5, as lowercase
/// hex. An empty `qop` selects the RFC 2069 form `KD(H(A1), nonce:H(A2))`.
pub fn legacy_digest(
    a1: &[u8],
    a2: &[u8],
    nonce: &[u8],
    cnonce: &[u8],
    nc: &[u8],
    qop: &[u8],
) -> String {
    let ha1 = hex::encode(Md5::digest(a1));
    let ha2 = hex::encode(Md5::digest(a2));

    let mut kd = Vec::new();
    kd.extend(ha1.bytes());
    kd.push(b':');
    kd.extend(nonce);
    if !qop.is_empty() {
        kd.push(b':');
        kd.extend(nc);
        kd.push(b':');
        kd.extend(cnonce);
        kd.push(b':');
        kd.extend(qop);
    }
    kd.push(b':');
    kd.extend(ha2.bytes());
    hex::encode(Md5::digest(&kd))
}
