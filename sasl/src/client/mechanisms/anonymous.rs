//! Provides the SASL "ANONYMOUS" mechanism.

use crate::client::{Mechanism, MechanismError};
use crate::common::nonce::NonceSource;
use crate::common::Credentials;
use log::warn;

/// A struct for the SASL ANONYMOUS mechanism.
#[derive(Debug, Default)]
pub struct Anonymous {
    step: u32,
}

impl Anonymous {
    /// Constructs a new struct for authenticating using the SASL ANONYMOUS mechanism.
    ///
    /// It is recommended that instead you use a `Credentials` struct and turn it into the
    /// requested mechanism using `from_credentials`.
    pub fn new() -> Anonymous {
        Anonymous { step: 0 }
    }

    /// Creates this mechanism, ignoring whatever the credentials hold.
    pub fn from_credentials(
        _credentials: &Credentials,
        _nonces: &mut dyn NonceSource,
    ) -> Result<Anonymous, MechanismError> {
        Ok(Anonymous::new())
    }
}

impl Mechanism for Anonymous {
    fn name(&self) -> &str {
        "ANONYMOUS"
    }

    fn respond(&mut self, _challenge: &[u8]) -> Result<Vec<u8>, MechanismError> {
        if self.step > 0 {
            warn!("ANONYMOUS: invalid step {}", self.step);
            return Err(MechanismError::InvalidStep);
        }
        self.step += 1;
        Ok(Vec::new())
    }

    fn is_finished(&self) -> bool {
        self.step > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_empty_step() {
        let mut mechanism = Anonymous::new();
        assert!(!mechanism.is_finished());
        assert_eq!(mechanism.initial().unwrap(), b"");
        assert!(mechanism.is_finished());
        assert_eq!(
            mechanism.respond(b"more?"),
            Err(MechanismError::InvalidStep)
        );
    }
}
