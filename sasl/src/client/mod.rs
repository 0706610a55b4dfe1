//! Client side SASL mechanisms.

use crate::common::digest::DeriveError;
use hmac::digest::InvalidLength;
use std::fmt;

pub mod mechanisms;
pub mod registry;

use self::mechanisms::{
    Anonymous, DigestMd5, FacebookPlatform, MessengerOAuth2, OAuth2, Plain, Scram,
};
use crate::common::scram::{Sha1, Sha256, Sha3_512, Sha512};

/// An error a client mechanism can run into.
#[derive(Debug, PartialEq)]
pub enum MechanismError {
    /// The credentials lack a username.
    RequiresUsername,
    /// The credentials lack a password.
    RequiresPassword,
    /// The credentials hold a salted password where the plaintext is needed.
    RequiresPlaintextPassword,
    /// The credentials lack the service host.
    RequiresHost,
    /// The credentials lack the access token of this provider.
    RequiresAccessToken,
    /// The access token is not in the expected encoding.
    InvalidAccessToken,

    /// No nonce could be obtained.
    CannotGenerateNonce,

    /// The mechanism was driven past its last step.
    InvalidStep,
    /// The server sent something which doesn't fit the mechanism.
    InvalidServerMessage(&'static str),
    /// The server reported an error inside the mechanism exchange.
    ServerError(String),
    /// The server doesn't offer a quality of protection we can use.
    UnsupportedQop,
    /// The server failed to prove it knows our credentials.
    ChallengeMismatch,

    /// Key derivation failed.
    DeriveError(DeriveError),
    /// The HMAC rejected its key.
    InvalidKeyLength(InvalidLength),
}

impl From<DeriveError> for MechanismError {
    fn from(err: DeriveError) -> MechanismError {
        MechanismError::DeriveError(err)
    }
}

impl From<InvalidLength> for MechanismError {
    fn from(err: InvalidLength) -> MechanismError {
        MechanismError::InvalidKeyLength(err)
    }
}

impl From<getrandom::Error> for MechanismError {
    fn from(_err: getrandom::Error) -> MechanismError {
        MechanismError::CannotGenerateNonce
    }
}

impl fmt::Display for MechanismError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "{}",
            match self {
                MechanismError::RequiresUsername => "this mechanism requires a username",
                MechanismError::RequiresPassword => "this mechanism requires a password",
                MechanismError::RequiresPlaintextPassword =>
                    "this mechanism requires a plaintext password",
                MechanismError::RequiresHost => "this mechanism requires the service host",
                MechanismError::RequiresAccessToken => "this mechanism requires an access token",
                MechanismError::InvalidAccessToken => "invalid access token",

                MechanismError::CannotGenerateNonce => "can't generate nonce",

                MechanismError::InvalidStep => "invalid step for this mechanism",
                MechanismError::InvalidServerMessage(err) =>
                    return write!(fmt, "invalid server message: {}", err),
                MechanismError::ServerError(err) => return write!(fmt, "server error: {}", err),
                MechanismError::UnsupportedQop => "no supported quality of protection",
                MechanismError::ChallengeMismatch => "the server failed to authenticate itself",

                MechanismError::DeriveError(err) => return write!(fmt, "derive error: {}", err),
                MechanismError::InvalidKeyLength(err) =>
                    return write!(fmt, "invalid key length: {}", err),
            }
        )
    }
}

impl std::error::Error for MechanismError {}

/// A trait which defines SASL mechanisms.
///
/// Mechanisms are constructed from `Credentials` through their own `from_credentials`, or by
/// name through the registry.
pub trait Mechanism {
    /// The name of the mechanism.
    fn name(&self) -> &str;

    /// Feeds the next server payload to the mechanism and returns what to send back.
    ///
    /// The first call, made with an empty challenge, yields the initial response.
    fn respond(&mut self, challenge: &[u8]) -> Result<Vec<u8>, MechanismError>;

    /// Whether the mechanism has run all of its steps.
    fn is_finished(&self) -> bool;

    /// Provides initial payload of the SASL mechanism.
    fn initial(&mut self) -> Result<Vec<u8>, MechanismError> {
        self.respond(&[])
    }

    /// Verifies the additional data sent along with a success, if the mechanism still expects
    /// some.
    fn success(&mut self, data: &[u8]) -> Result<(), MechanismError> {
        if self.is_finished() {
            return Ok(());
        }
        self.respond(data).map(|_| ())
    }
}

/// Any of the client mechanisms this crate provides.
pub enum ClientMechanism {
    /// SCRAM-SHA3-512
    ScramSha3_512(Scram<Sha3_512>),
    /// SCRAM-SHA-512
    ScramSha512(Scram<Sha512>),
    /// SCRAM-SHA-256
    ScramSha256(Scram<Sha256>),
    /// SCRAM-SHA-1
    ScramSha1(Scram<Sha1>),
    /// DIGEST-MD5
    DigestMd5(DigestMd5),
    /// PLAIN
    Plain(Plain),
    /// ANONYMOUS
    Anonymous(Anonymous),
    /// X-FACEBOOK-PLATFORM
    FacebookPlatform(FacebookPlatform),
    /// X-MESSENGER-OAUTH2
    MessengerOAuth2(MessengerOAuth2),
    /// X-OAUTH2
    OAuth2(OAuth2),
}

macro_rules! dispatch {
    ($self:expr, $mechanism:ident => $e:expr) => {
        match $self {
            ClientMechanism::ScramSha3_512($mechanism) => $e,
            ClientMechanism::ScramSha512($mechanism) => $e,
            ClientMechanism::ScramSha256($mechanism) => $e,
            ClientMechanism::ScramSha1($mechanism) => $e,
            ClientMechanism::DigestMd5($mechanism) => $e,
            ClientMechanism::Plain($mechanism) => $e,
            ClientMechanism::Anonymous($mechanism) => $e,
            ClientMechanism::FacebookPlatform($mechanism) => $e,
            ClientMechanism::MessengerOAuth2($mechanism) => $e,
            ClientMechanism::OAuth2($mechanism) => $e,
        }
    };
}

impl Mechanism for ClientMechanism {
    fn name(&self) -> &str {
        dispatch!(self, m => m.name())
    }

    fn respond(&mut self, challenge: &[u8]) -> Result<Vec<u8>, MechanismError> {
        dispatch!(self, m => m.respond(challenge))
    }

    fn is_finished(&self) -> bool {
        dispatch!(self, m => m.is_finished())
    }

    fn initial(&mut self) -> Result<Vec<u8>, MechanismError> {
        dispatch!(self, m => m.initial())
    }

    fn success(&mut self, data: &[u8]) -> Result<(), MechanismError> {
        dispatch!(self, m => m.success(data))
    }
}

impl fmt::Debug for ClientMechanism {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("ClientMechanism")
            .field("name", &self.name())
            .field("finished", &self.is_finished())
            .finish()
    }
}
