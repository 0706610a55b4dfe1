//! Provides the server SASL mechanisms.

mod anonymous;
mod digest_md5;
mod plain;
mod scram;

pub use self::anonymous::Anonymous;
pub use self::digest_md5::DigestMd5;
pub use self::plain::Plain;
pub use self::scram::Scram;
