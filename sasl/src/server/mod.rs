//! Server side SASL mechanisms.
//!
//! A server mechanism does not know the users of the server: when it needs a secret it returns
//! `Response::InputNeeded` with the identity the client claimed. The caller then looks the secret
//! up, hands it over with `set_password` or `set_password_digest`, and replays the same payload.

use crate::common::digest::DeriveError;
use crate::common::{Identity, Password};
use std::error::Error;
use std::fmt;

pub mod mechanisms;
pub mod registry;

use self::mechanisms::{Anonymous, DigestMd5, Plain, Scram};
use crate::common::scram::{Sha1, Sha256, Sha3_512, Sha512};

/// An error a server mechanism can run into. Anything but a failure to get random data means
/// the client should be told `not-authorized` or `malformed-request`.
#[derive(Debug, PartialEq)]
#[allow(missing_docs)]
pub enum MechanismError {
    NoUsernameSpecified,
    ErrorDecodingUsername,
    NoPasswordSpecified,
    ErrorDecodingPassword,

    FailedToDecodeMessage,
    ChannelBindingNotSupported,
    CannotDecodeInitialMessage,
    NoUsername,
    NoNonce,
    FailedToGenerateNonce,
    UnsupportedQop,
    DeriveError(DeriveError),

    CannotDecodeResponse,
    InvalidKeyLength(hmac::digest::InvalidLength),
    RandomFailure(getrandom::Error),
    NoProof,
    CannotDecodeProof,
    AuthenticationFailed,
    InvalidStep,
}

impl From<DeriveError> for MechanismError {
    fn from(err: DeriveError) -> MechanismError {
        MechanismError::DeriveError(err)
    }
}

impl From<hmac::digest::InvalidLength> for MechanismError {
    fn from(err: hmac::digest::InvalidLength) -> MechanismError {
        MechanismError::InvalidKeyLength(err)
    }
}

impl From<getrandom::Error> for MechanismError {
    fn from(err: getrandom::Error) -> MechanismError {
        MechanismError::RandomFailure(err)
    }
}

impl fmt::Display for MechanismError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MechanismError::NoUsernameSpecified => write!(fmt, "no username specified"),
            MechanismError::ErrorDecodingUsername => write!(fmt, "error decoding username"),
            MechanismError::NoPasswordSpecified => write!(fmt, "no password specified"),
            MechanismError::ErrorDecodingPassword => write!(fmt, "error decoding password"),

            MechanismError::FailedToDecodeMessage => write!(fmt, "failed to decode message"),
            MechanismError::ChannelBindingNotSupported => {
                write!(fmt, "channel binding not supported")
            }
            MechanismError::CannotDecodeInitialMessage => {
                write!(fmt, "can’t decode initial message")
            }
            MechanismError::NoUsername => write!(fmt, "no username"),
            MechanismError::NoNonce => write!(fmt, "no nonce"),
            MechanismError::FailedToGenerateNonce => write!(fmt, "failed to generate nonce"),
            MechanismError::UnsupportedQop => write!(fmt, "unsupported quality of protection"),
            MechanismError::DeriveError(err) => write!(fmt, "derive error: {}", err),

            MechanismError::CannotDecodeResponse => write!(fmt, "can’t decode response"),
            MechanismError::InvalidKeyLength(err) => write!(fmt, "invalid key length: {}", err),
            MechanismError::RandomFailure(err) => {
                write!(fmt, "failure to get random data: {}", err)
            }
            MechanismError::NoProof => write!(fmt, "no proof"),
            MechanismError::CannotDecodeProof => write!(fmt, "can’t decode proof"),
            MechanismError::AuthenticationFailed => write!(fmt, "authentication failed"),
            MechanismError::InvalidStep => write!(fmt, "SASL session already over"),
        }
    }
}

impl Error for MechanismError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MechanismError::DeriveError(err) => Some(err),
            _ => None,
        }
    }
}

/// A trait which defines server SASL mechanisms.
pub trait Mechanism {
    /// The name of the mechanism.
    fn name(&self) -> &str;

    /// Processes the next client payload.
    fn respond(&mut self, payload: &[u8]) -> Result<Response, MechanismError>;
}

/// What to do after a client payload has been processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The client is authenticated as this identity, with optional additional data.
    Success(Identity, Vec<u8>),
    /// Send this challenge to the client.
    Proceed(Vec<u8>),
    /// The secret of this identity is needed before the same payload can be processed again.
    InputNeeded(Identity),
}

/// Any of the server mechanisms this crate provides.
pub enum ServerMechanism {
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
}

impl ServerMechanism {
    /// Hands over the password of the identity last returned in `Response::InputNeeded`.
    pub fn set_password(&mut self, password: Password) {
        match self {
            ServerMechanism::ScramSha3_512(m) => m.set_password(password),
            ServerMechanism::ScramSha512(m) => m.set_password(password),
            ServerMechanism::ScramSha256(m) => m.set_password(password),
            ServerMechanism::ScramSha1(m) => m.set_password(password),
            ServerMechanism::DigestMd5(m) => m.set_password(password),
            ServerMechanism::Plain(m) => m.set_password(password),
            ServerMechanism::Anonymous(_) => (),
        }
    }

    /// Hands over the `H(username:realm:password)` secret, only meaningful for DIGEST-MD5.
    pub fn set_password_digest(&mut self, digest: Vec<u8>) {
        if let ServerMechanism::DigestMd5(m) = self {
            m.set_password_digest(digest);
        }
    }
}

impl Mechanism for ServerMechanism {
    fn name(&self) -> &str {
        match self {
            ServerMechanism::ScramSha3_512(m) => m.name(),
            ServerMechanism::ScramSha512(m) => m.name(),
            ServerMechanism::ScramSha256(m) => m.name(),
            ServerMechanism::ScramSha1(m) => m.name(),
            ServerMechanism::DigestMd5(m) => m.name(),
            ServerMechanism::Plain(m) => m.name(),
            ServerMechanism::Anonymous(m) => m.name(),
        }
    }

    fn respond(&mut self, payload: &[u8]) -> Result<Response, MechanismError> {
        match self {
            ServerMechanism::ScramSha3_512(m) => m.respond(payload),
            ServerMechanism::ScramSha512(m) => m.respond(payload),
            ServerMechanism::ScramSha256(m) => m.respond(payload),
            ServerMechanism::ScramSha1(m) => m.respond(payload),
            ServerMechanism::DigestMd5(m) => m.respond(payload),
            ServerMechanism::Plain(m) => m.respond(payload),
            ServerMechanism::Anonymous(m) => m.respond(payload),
        }
    }
}
