//! Provides the SASL "SCRAM-*" mechanisms and a way to implement more.

use base64::{engine::general_purpose::STANDARD as Base64, Engine};
use log::warn;

use crate::client::{Mechanism, MechanismError};
use crate::common::nonce::NonceSource;
use crate::common::scram::ScramProvider;
use crate::common::{escape_saslname, parse_frame, xor, Credentials, Identity, Password, Secret};

use std::marker::PhantomData;

const GS2_HEADER: &[u8] = b"n,,";

enum ScramState {
    Init,
    SentInitialMessage { initial_message: Vec<u8> },
    GotServerData { server_signature: Vec<u8> },
    Done,
    Failed,
}

/// A struct for the SASL SCRAM-* mechanisms, without channel binding.
pub struct Scram<S: ScramProvider> {
    name: String,
    username: String,
    password: Password,
    client_nonce: String,
    state: ScramState,
    _marker: PhantomData<S>,
}

impl<S: ScramProvider> Scram<S> {
    /// Constructs a new struct for authenticating using the SASL SCRAM-* mechanisms.
    ///
    /// It is recommended that instead you use a `Credentials` struct and turn it into the
    /// requested mechanism using `from_credentials`.
    pub fn new<N: Into<String>, P: Into<Password>>(
        username: N,
        password: P,
        client_nonce: String,
    ) -> Scram<S> {
        Scram {
            name: format!("SCRAM-{}", S::name()),
            username: username.into(),
            password: password.into(),
            client_nonce,
            state: ScramState::Init,
            _marker: PhantomData,
        }
    }

    /// Creates this mechanism from a username and password, drawing the client nonce from
    /// `nonces`.
    pub fn from_credentials(
        credentials: &Credentials,
        nonces: &mut dyn NonceSource,
    ) -> Result<Scram<S>, MechanismError> {
        let Secret::Password(password) = &credentials.secret else {
            return Err(MechanismError::RequiresPassword);
        };
        let Identity::Username(username) = &credentials.identity else {
            return Err(MechanismError::RequiresUsername);
        };
        Ok(Scram::new(username.as_str(), password.clone(), nonces.nonce()?))
    }

    fn client_first(&mut self) -> Vec<u8> {
        let mut bare = Vec::new();
        bare.extend(b"n=");
        bare.extend(escape_saslname(&self.username).bytes());
        bare.extend(b",r=");
        bare.extend(self.client_nonce.bytes());
        let mut data = Vec::new();
        data.extend(GS2_HEADER);
        data.extend(&bare);
        self.state = ScramState::SentInitialMessage {
            initial_message: bare,
        };
        data
    }

    fn client_final(
        &self,
        initial_message: &[u8],
        challenge: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), MechanismError> {
        let frame = parse_frame(challenge)
            .map_err(|_| MechanismError::InvalidServerMessage("can't decode challenge"))?;
        let server_nonce = frame
            .get("r")
            .ok_or(MechanismError::InvalidServerMessage("no server nonce"))?;
        if !server_nonce.starts_with(&self.client_nonce)
            || server_nonce.len() <= self.client_nonce.len()
        {
            return Err(MechanismError::InvalidServerMessage(
                "server nonce doesn't extend the client nonce",
            ));
        }
        let salt = frame
            .get("s")
            .ok_or(MechanismError::InvalidServerMessage("no server salt"))?;
        let salt = Base64
            .decode(salt)
            .map_err(|_| MechanismError::InvalidServerMessage("can't decode server salt"))?;
        if salt.is_empty() {
            return Err(MechanismError::InvalidServerMessage("empty server salt"));
        }
        let iterations: u32 = frame
            .get("i")
            .and_then(|v| v.parse().ok())
            .ok_or(MechanismError::InvalidServerMessage("no server iterations"))?;
        if iterations < 1 {
            return Err(MechanismError::InvalidServerMessage(
                "invalid server iterations",
            ));
        }

        let mut client_final_message_bare = Vec::new();
        client_final_message_bare.extend(b"c=");
        client_final_message_bare.extend(Base64.encode(GS2_HEADER).bytes());
        client_final_message_bare.extend(b",r=");
        client_final_message_bare.extend(server_nonce.bytes());

        let salted_password = S::derive(&self.password, &salt, iterations)?;
        let client_key = S::hmac(b"Client Key", &salted_password)?;
        let server_key = S::hmac(b"Server Key", &salted_password)?;
        let mut auth_message = Vec::new();
        auth_message.extend(initial_message);
        auth_message.push(b',');
        auth_message.extend(challenge);
        auth_message.push(b',');
        auth_message.extend(&client_final_message_bare);
        let stored_key = S::hash(&client_key);
        let client_signature = S::hmac(&auth_message, &stored_key)?;
        let client_proof = xor(&client_key, &client_signature);
        let server_signature = S::hmac(&auth_message, &server_key)?;

        let mut client_final_message = Vec::new();
        client_final_message.extend(&client_final_message_bare);
        client_final_message.extend(b",p=");
        client_final_message.extend(Base64.encode(client_proof).bytes());
        Ok((client_final_message, server_signature))
    }
}

fn verify_server_final(data: &[u8], server_signature: &[u8]) -> Result<(), MechanismError> {
    let frame = parse_frame(data)
        .map_err(|_| MechanismError::InvalidServerMessage("can't decode server final message"))?;
    if let Some(err) = frame.get("e") {
        return Err(MechanismError::ServerError(err.clone()));
    }
    let signature = frame
        .get("v")
        .ok_or(MechanismError::InvalidServerMessage(
            "no signature in server final message",
        ))?;
    let signature = Base64
        .decode(signature)
        .map_err(|_| MechanismError::InvalidServerMessage("can't decode server signature"))?;
    if signature != server_signature {
        return Err(MechanismError::ChallengeMismatch);
    }
    Ok(())
}

impl<S: ScramProvider> Mechanism for Scram<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn respond(&mut self, challenge: &[u8]) -> Result<Vec<u8>, MechanismError> {
        match &self.state {
            ScramState::Init => Ok(self.client_first()),
            ScramState::SentInitialMessage { initial_message } => {
                match self.client_final(initial_message, challenge) {
                    Ok((response, server_signature)) => {
                        self.state = ScramState::GotServerData { server_signature };
                        Ok(response)
                    }
                    Err(err) => {
                        self.state = ScramState::Failed;
                        Err(err)
                    }
                }
            }
            ScramState::GotServerData { server_signature } => {
                let verified = verify_server_final(challenge, server_signature);
                self.state = match verified {
                    Ok(()) => ScramState::Done,
                    Err(_) => ScramState::Failed,
                };
                verified.map(|()| Vec::new())
            }
            ScramState::Done | ScramState::Failed => {
                warn!("{}: invalid step", self.name);
                Err(MechanismError::InvalidStep)
            }
        }
    }

    fn is_finished(&self) -> bool {
        matches!(self.state, ScramState::Done)
    }
}
