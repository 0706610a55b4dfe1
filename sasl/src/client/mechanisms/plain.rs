//! Provides the SASL "PLAIN" mechanism.

use crate::client::{Mechanism, MechanismError};
use crate::common::nonce::NonceSource;
use crate::common::{Credentials, Identity, Password, Secret};
use log::warn;

/// A struct for the SASL PLAIN mechanism.
pub struct Plain {
    authzid: Option<String>,
    username: String,
    password: String,
    step: u32,
}

impl Plain {
    /// Constructs a new struct for authenticating using the SASL PLAIN mechanism.
    ///
    /// It is recommended that instead you use a `Credentials` struct and turn it into the
    /// requested mechanism using `from_credentials`.
    pub fn new<N: Into<String>, P: Into<String>>(username: N, password: P) -> Plain {
        Plain {
            authzid: None,
            username: username.into(),
            password: password.into(),
            step: 0,
        }
    }

    /// Creates this mechanism from a username and plaintext password.
    pub fn from_credentials(
        credentials: &Credentials,
        _nonces: &mut dyn NonceSource,
    ) -> Result<Plain, MechanismError> {
        let Identity::Username(username) = &credentials.identity else {
            return Err(MechanismError::RequiresUsername);
        };
        let password = match &credentials.secret {
            Secret::Password(Password::Plain(password)) => password,
            Secret::Password(Password::Pbkdf2 { .. }) => {
                return Err(MechanismError::RequiresPlaintextPassword)
            }
            Secret::None => return Err(MechanismError::RequiresPassword),
        };
        let mut plain = Plain::new(username.as_str(), password.as_str());
        plain.authzid = credentials.authzid.clone();
        Ok(plain)
    }
}

impl Mechanism for Plain {
    fn name(&self) -> &str {
        "PLAIN"
    }

    fn respond(&mut self, _challenge: &[u8]) -> Result<Vec<u8>, MechanismError> {
        if self.step > 0 {
            warn!("PLAIN: invalid step {}", self.step);
            return Err(MechanismError::InvalidStep);
        }
        self.step += 1;
        let mut auth = Vec::new();
        if let Some(authzid) = &self.authzid {
            auth.extend(authzid.bytes());
        }
        auth.push(0);
        auth.extend(self.username.bytes());
        auth.push(0);
        auth.extend(self.password.bytes());
        Ok(auth)
    }

    fn is_finished(&self) -> bool {
        self.step > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::nonce::OsNonce;

    #[test]
    fn initial_response() {
        let creds = Credentials::default()
            .with_username("alice")
            .with_password("secret");
        let mut mechanism = Plain::from_credentials(&creds, &mut OsNonce).unwrap();
        assert_eq!(mechanism.initial().unwrap(), b"\0alice\0secret");
        assert_eq!(mechanism.respond(b""), Err(MechanismError::InvalidStep));
    }

    #[test]
    fn with_authzid() {
        let creds = Credentials::default()
            .with_username("alice")
            .with_password("secret")
            .with_authzid("admin@example.org");
        let mut mechanism = Plain::from_credentials(&creds, &mut OsNonce).unwrap();
        assert_eq!(
            mechanism.initial().unwrap(),
            b"admin@example.org\0alice\0secret"
        );
    }

    #[test]
    fn missing_credentials() {
        let creds = Credentials::default().with_password("secret");
        assert_eq!(
            Plain::from_credentials(&creds, &mut OsNonce).err(),
            Some(MechanismError::RequiresUsername)
        );
        let creds = Credentials::default().with_username("alice");
        assert_eq!(
            Plain::from_credentials(&creds, &mut OsNonce).err(),
            Some(MechanismError::RequiresPassword)
        );
        let creds = Credentials::default()
            .with_username("alice")
            .with_secret(Secret::password_pbkdf2("SHA-1", vec![1], 1, vec![2]));
        assert_eq!(
            Plain::from_credentials(&creds, &mut OsNonce).err(),
            Some(MechanismError::RequiresPlaintextPassword)
        );
    }
}
