use crate::common::digest::{derive_key, Hash};
use crate::common::{Identity, Password};
use crate::server::{Mechanism, MechanismError, Response};
use log::warn;

/// The server side of PLAIN.
#[derive(Debug, Default)]
pub struct Plain {
    password: Option<Password>,
    done: bool,
}

impl Plain {
    /// Creates a new PLAIN mechanism.
    pub fn new() -> Plain {
        Plain::default()
    }

    /// Sets the password to check against, either in plaintext or salted.
    pub fn set_password(&mut self, password: Password) {
        self.password = Some(password);
    }
}

fn verify(expected: &Password, given: &str) -> Result<bool, MechanismError> {
    Ok(match expected {
        Password::Plain(plain) => plain == given,
        Password::Pbkdf2 {
            method,
            salt,
            iterations,
            data,
        } => {
            let Some(hash) = Hash::from_name(method) else {
                warn!("PLAIN: unknown hash function {} for stored password", method);
                return Err(MechanismError::AuthenticationFailed);
            };
            derive_key(hash, given.as_bytes(), salt, *iterations, data.len())? == *data
        }
    })
}

impl Mechanism for Plain {
    fn name(&self) -> &str {
        "PLAIN"
    }

    fn respond(&mut self, payload: &[u8]) -> Result<Response, MechanismError> {
        if self.done {
            warn!("PLAIN: invalid step");
            return Err(MechanismError::InvalidStep);
        }
        if payload.is_empty() {
            // The client waits for an empty challenge before sending its credentials.
            return Ok(Response::Proceed(Vec::new()));
        }
        let parts: Vec<&[u8]> = payload.split(|&b| b == 0).collect();
        let &[_authzid, username, password] = parts.as_slice() else {
            return Err(MechanismError::FailedToDecodeMessage);
        };
        let username =
            String::from_utf8(username.to_vec()).map_err(|_| MechanismError::ErrorDecodingUsername)?;
        if username.is_empty() {
            return Err(MechanismError::NoUsernameSpecified);
        }
        let password =
            String::from_utf8(password.to_vec()).map_err(|_| MechanismError::ErrorDecodingPassword)?;
        let ident = Identity::Username(username);
        let Some(expected) = &self.password else {
            return Ok(Response::InputNeeded(ident));
        };
        self.done = true;
        if verify(expected, &password)? {
            Ok(Response::Success(ident, Vec::new()))
        } else {
            Err(MechanismError::AuthenticationFailed)
        }
    }
}
