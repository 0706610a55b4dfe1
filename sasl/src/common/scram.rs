//! The hash functions SCRAM can be instantiated with.

use hmac::digest::InvalidLength;

use crate::common::digest::{derive_key, DeriveError, Hash};
use crate::common::Password;

/// A trait which defines the needed methods for SCRAM.
pub trait ScramProvider {
    /// The hash function backing this provider.
    const HASH: Hash;

    /// The name of the hash function.
    fn name() -> &'static str {
        Self::HASH.name()
    }

    /// A function which hashes the data using the hash function.
    fn hash(data: &[u8]) -> Vec<u8> {
        Self::HASH.hash(data)
    }

    /// A function which performs an HMAC using the hash function.
    fn hmac(data: &[u8], key: &[u8]) -> Result<Vec<u8>, InvalidLength> {
        Self::HASH.hmac(data, key)
    }

    /// A function which does PBKDF2 key derivation using the hash function.
    ///
    /// A stored `Password::Pbkdf2` is returned as is, provided it was made with the same hash
    /// function, salt and iteration count.
    fn derive(password: &Password, salt: &[u8], iterations: u32) -> Result<Vec<u8>, DeriveError> {
        match password {
            Password::Plain(plain) => derive_key(
                Self::HASH,
                plain.as_bytes(),
                salt,
                iterations,
                Self::HASH.output_size(),
            ),
            Password::Pbkdf2 {
                method,
                salt: my_salt,
                iterations: my_iterations,
                data,
            } => {
                if method != Self::name() {
                    Err(DeriveError::IncompatibleHashingMethod(
                        method.to_string(),
                        Self::name().to_string(),
                    ))
                } else if my_salt != salt {
                    Err(DeriveError::IncorrectSalt)
                } else if *my_iterations != iterations {
                    Err(DeriveError::IncompatibleIterationCount(
                        *my_iterations,
                        iterations,
                    ))
                } else {
                    Ok(data.to_vec())
                }
            }
        }
    }
}

macro_rules! provider {
    ($name:ident, $hash:ident, $doc:literal) => {
        #[doc = $doc]
        pub struct $name;

        impl ScramProvider for $name {
            const HASH: Hash = Hash::$hash;
        }
    };
}

provider!(Sha1, Sha1, "A `ScramProvider` which provides SCRAM-SHA-1.");
provider!(Sha256, Sha256, "A `ScramProvider` which provides SCRAM-SHA-256.");
provider!(Sha512, Sha512, "A `ScramProvider` which provides SCRAM-SHA-512.");
provider!(
    Sha3_512,
    Sha3_512,
    "A `ScramProvider` which provides SCRAM-SHA3-512."
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Secret;

    #[test]
    fn stored_secret_must_match() {
        let data = Sha256::derive(&Password::from("pencil"), b"salt", 4096).unwrap();
        let stored = match Secret::password_pbkdf2("SHA-256", b"salt".to_vec(), 4096, data.clone())
        {
            Secret::Password(password) => password,
            Secret::None => unreachable!(),
        };
        assert_eq!(Sha256::derive(&stored, b"salt", 4096).unwrap(), data);
        assert_eq!(
            Sha256::derive(&stored, b"pepper", 4096),
            Err(DeriveError::IncorrectSalt)
        );
        assert_eq!(
            Sha256::derive(&stored, b"salt", 1),
            Err(DeriveError::IncompatibleIterationCount(4096, 1))
        );
        assert_eq!(
            Sha1::derive(&stored, b"salt", 4096),
            Err(DeriveError::IncompatibleHashingMethod(
                String::from("SHA-256"),
                String::from("SHA-1")
            ))
        );
    }
}
