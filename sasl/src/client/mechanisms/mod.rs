//! Provides the client SASL mechanisms.

mod anonymous;
mod digest_md5;
mod facebook;
mod oauth2;
mod plain;
mod scram;

pub use self::anonymous::Anonymous;
pub use self::digest_md5::DigestMd5;
pub use self::facebook::FacebookPlatform;
pub use self::oauth2::{MessengerOAuth2, OAuth2};
pub use self::plain::Plain;
pub use self::scram::Scram;
