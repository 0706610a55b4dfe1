use crate::common::Identity;
use crate::server::{Mechanism, MechanismError, Response};
use getrandom::getrandom;
use log::warn;

/// The server side of ANONYMOUS, authenticating the client as a random identity.
#[derive(Debug, Default)]
pub struct Anonymous {
    done: bool,
}

impl Anonymous {
    /// Creates a new ANONYMOUS mechanism.
    pub fn new() -> Anonymous {
        Anonymous { done: false }
    }
}

impl Mechanism for Anonymous {
    fn name(&self) -> &str {
        "ANONYMOUS"
    }

    fn respond(&mut self, _payload: &[u8]) -> Result<Response, MechanismError> {
        if self.done {
            warn!("ANONYMOUS: invalid step");
            return Err(MechanismError::InvalidStep);
        }
        let mut rand = [0u8; 16];
        getrandom(&mut rand)?;
        self.done = true;
        let ident = Identity::Username(hex::encode(rand));
        Ok(Response::Success(ident, Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_identity() {
        let mut mechanism = Anonymous::new();
        let Response::Success(Identity::Username(username), data) =
            mechanism.respond(b"").unwrap()
        else {
            panic!("expected success");
        };
        assert_eq!(username.len(), 32);
        assert!(data.is_empty());
        assert_eq!(mechanism.respond(b""), Err(MechanismError::InvalidStep));
    }
}
