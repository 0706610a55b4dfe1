//! Lookup of client mechanisms by name, and selection among the ones a server offers.

use log::debug;

use crate::client::mechanisms::{
    Anonymous, DigestMd5, FacebookPlatform, MessengerOAuth2, OAuth2, Plain, Scram,
};
use crate::client::{ClientMechanism, MechanismError};
use crate::common::nonce::{NonceSource, OsNonce};
use crate::common::scram::{Sha1, Sha256, Sha3_512, Sha512};
use crate::common::Credentials;

/// Builds a mechanism from credentials.
pub type Constructor =
    fn(&Credentials, &mut dyn NonceSource) -> Result<ClientMechanism, MechanismError>;

const MECHANISMS: &[&str] = &[
    "SCRAM-SHA3-512",
    "SCRAM-SHA-512",
    "SCRAM-SHA-256",
    "SCRAM-SHA-1",
    "DIGEST-MD5",
    "PLAIN",
    "ANONYMOUS",
    "X-FACEBOOK-PLATFORM",
    "X-MESSENGER-OAUTH2",
    "X-OAUTH2",
];

/// The names of every supported mechanism, strongest first.
pub fn available_mechanisms() -> &'static [&'static str] {
    MECHANISMS
}

macro_rules! constructor {
    ($variant:ident, $mechanism:ty) => {{
        fn construct(
            credentials: &Credentials,
            nonces: &mut dyn NonceSource,
        ) -> Result<ClientMechanism, MechanismError> {
            <$mechanism>::from_credentials(credentials, nonces).map(ClientMechanism::$variant)
        }
        construct
    }};
}

/// Looks up the constructor of a mechanism by name.
pub fn constructor(name: &str) -> Option<Constructor> {
    let constructor: Constructor = match name {
        "SCRAM-SHA3-512" => constructor!(ScramSha3_512, Scram<Sha3_512>),
        "SCRAM-SHA-512" => constructor!(ScramSha512, Scram<Sha512>),
        "SCRAM-SHA-256" => constructor!(ScramSha256, Scram<Sha256>),
        "SCRAM-SHA-1" => constructor!(ScramSha1, Scram<Sha1>),
        "DIGEST-MD5" => constructor!(DigestMd5, DigestMd5),
        "PLAIN" => constructor!(Plain, Plain),
        "ANONYMOUS" => constructor!(Anonymous, Anonymous),
        "X-FACEBOOK-PLATFORM" => constructor!(FacebookPlatform, FacebookPlatform),
        "X-MESSENGER-OAUTH2" => constructor!(MessengerOAuth2, MessengerOAuth2),
        "X-OAUTH2" => constructor!(OAuth2, OAuth2),
        _ => return None,
    };
    Some(constructor)
}

/// Picks the first of `preferences` which this crate supports and the server offers.
pub fn select<'a, I, S>(preferences: I, offered: &[S]) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
    S: AsRef<str>,
{
    preferences.into_iter().find(|name| {
        constructor(name).is_some() && offered.iter().any(|offer| offer.as_ref() == *name)
    })
}

/// Creates client mechanisms, feeding them nonces from its `NonceSource`.
#[derive(Debug, Default)]
pub struct Registry<N: NonceSource = OsNonce> {
    nonces: N,
}

impl Registry<OsNonce> {
    /// A registry drawing nonces from the operating system.
    pub fn new() -> Registry<OsNonce> {
        Registry { nonces: OsNonce }
    }
}

impl<N: NonceSource> Registry<N> {
    /// A registry drawing nonces from `nonces`.
    pub fn with_nonce_source(nonces: N) -> Registry<N> {
        Registry { nonces }
    }

    /// Creates the mechanism called `name`, or returns `None` if it isn't supported.
    pub fn create(
        &mut self,
        name: &str,
        credentials: &Credentials,
    ) -> Option<Result<ClientMechanism, MechanismError>> {
        let constructor = constructor(name)?;
        debug!("Creating SASL mechanism {}", name);
        Some(constructor(credentials, &mut self.nonces))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Mechanism;
    use crate::common::nonce::FixedNonce;

    #[test]
    fn every_name_has_a_constructor() {
        let creds = Credentials::default()
            .with_username("user")
            .with_password("pencil")
            .with_host("example.org")
            .with_google_access_token("token")
            .with_windows_live_access_token("dG9rZW4=")
            .with_facebook_token("token", "42");
        let mut registry = Registry::with_nonce_source(FixedNonce::new("nonce"));
        for name in available_mechanisms() {
            let mechanism = registry.create(name, &creds).unwrap().unwrap();
            assert_eq!(mechanism.name(), *name);
            assert!(!mechanism.is_finished());
        }
    }

    #[test]
    fn unknown_mechanism() {
        assert!(constructor("GSSAPI").is_none());
        let mut registry = Registry::new();
        assert!(registry.create("GSSAPI", &Credentials::default()).is_none());
    }

    #[test]
    fn select_honours_preference_order() {
        let offered = ["PLAIN", "SCRAM-SHA-1", "GSSAPI"];
        assert_eq!(
            select(["SCRAM-SHA-256", "PLAIN", "SCRAM-SHA-1"], &offered),
            Some("PLAIN")
        );
        assert_eq!(
            select(available_mechanisms().iter().copied(), &offered),
            Some("SCRAM-SHA-1")
        );
        assert_eq!(select(["GSSAPI"], &offered), None);
        assert_eq!(select(["SCRAM-SHA-256"], &offered), None);
    }

    #[test]
    fn construction_errors_are_reported() {
        let mut registry = Registry::new();
        let result = registry.create("PLAIN", &Credentials::default());
        assert_eq!(
            result.map(|r| r.err()),
            Some(Some(MechanismError::RequiresUsername))
        );
    }
}
