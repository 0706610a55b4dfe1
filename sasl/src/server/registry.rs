//! Creation of server mechanisms by name.

use log::debug;

use crate::common::nonce::{NonceSource, OsNonce};
use crate::common::scram::{Sha1, Sha256, Sha3_512, Sha512};
use crate::server::mechanisms::{Anonymous, DigestMd5, Plain, Scram};
use crate::server::{MechanismError, ServerMechanism};

const MECHANISMS: &[&str] = &[
    "SCRAM-SHA3-512",
    "SCRAM-SHA-512",
    "SCRAM-SHA-256",
    "SCRAM-SHA-1",
    "DIGEST-MD5",
    "PLAIN",
    "ANONYMOUS",
];

/// The iteration count used when salting plaintext passwords for SCRAM.
pub const DEFAULT_SCRAM_ITERATIONS: u32 = 4096;

/// The names of every supported server mechanism, strongest first.
pub fn available_mechanisms() -> &'static [&'static str] {
    MECHANISMS
}

/// Creates server mechanisms, feeding them nonces from its `NonceSource`.
#[derive(Debug)]
pub struct Registry<N: NonceSource = OsNonce> {
    nonces: N,
    realm: Option<String>,
    scram_iterations: u32,
}

impl Registry<OsNonce> {
    /// A registry drawing nonces from the operating system.
    pub fn new() -> Registry<OsNonce> {
        Registry::with_nonce_source(OsNonce)
    }
}

impl Default for Registry<OsNonce> {
    fn default() -> Registry<OsNonce> {
        Registry::new()
    }
}

impl<N: NonceSource> Registry<N> {
    /// A registry drawing nonces from `nonces`.
    pub fn with_nonce_source(nonces: N) -> Registry<N> {
        Registry {
            nonces,
            realm: None,
            scram_iterations: DEFAULT_SCRAM_ITERATIONS,
        }
    }

    /// Sets the realm DIGEST-MD5 advertises.
    pub fn with_realm<R: Into<String>>(mut self, realm: R) -> Registry<N> {
        self.realm = Some(realm.into());
        self
    }

    /// Sets the iteration count SCRAM uses with plaintext passwords.
    pub fn with_scram_iterations(mut self, iterations: u32) -> Registry<N> {
        self.scram_iterations = iterations;
        self
    }

    fn nonce(&mut self) -> Result<String, MechanismError> {
        self.nonces
            .nonce()
            .map_err(|_| MechanismError::FailedToGenerateNonce)
    }

    fn scram<S: crate::common::scram::ScramProvider>(
        &mut self,
    ) -> Result<Scram<S>, MechanismError> {
        let nonce = self.nonce()?;
        let salt = self.nonce()?.into_bytes();
        Ok(Scram::new(nonce, salt, self.scram_iterations))
    }

    /// Creates the mechanism called `name`, or returns `None` if it isn't supported.
    pub fn create(&mut self, name: &str) -> Option<Result<ServerMechanism, MechanismError>> {
        let mechanism = match name {
            "SCRAM-SHA3-512" => self.scram().map(ServerMechanism::ScramSha3_512),
            "SCRAM-SHA-512" => self.scram().map(ServerMechanism::ScramSha512),
            "SCRAM-SHA-256" => self.scram().map(ServerMechanism::ScramSha256),
            "SCRAM-SHA-1" => self.scram().map(ServerMechanism::ScramSha1),
            "DIGEST-MD5" => {
                let realm = self.realm.clone();
                self.nonce()
                    .map(|nonce| ServerMechanism::DigestMd5(DigestMd5::new(realm, nonce)))
            }
            "PLAIN" => Ok(ServerMechanism::Plain(Plain::new())),
            "ANONYMOUS" => Ok(ServerMechanism::Anonymous(Anonymous::new())),
            _ => return None,
        };
        debug!("Creating server SASL mechanism {}", name);
        Some(mechanism)
    }
}
