use std::marker::PhantomData;

use base64::{engine::general_purpose::STANDARD as Base64, Engine};
use log::warn;

use crate::common::scram::ScramProvider;
use crate::common::{parse_frame, unescape_saslname, xor, Identity, Password};
use crate::server::{Mechanism, MechanismError, Response};

enum ScramState {
    Init,
    SentChallenge {
        initial_client_message: Vec<u8>,
        initial_server_message: Vec<u8>,
        gs2_header: Vec<u8>,
        server_nonce: String,
        identity: Identity,
        salted_password: Vec<u8>,
    },
    Done,
}

/// The server side of the SCRAM-* mechanisms, without channel binding.
pub struct Scram<S: ScramProvider> {
    name: String,
    state: ScramState,
    password: Option<Password>,
    nonce: String,
    salt: Vec<u8>,
    iterations: u32,
    _marker: PhantomData<S>,
}

impl<S: ScramProvider> Scram<S> {
    /// Creates a new SCRAM mechanism.
    ///
    /// `nonce` is appended to the client nonce; `salt` and `iterations` are used to derive the
    /// salted password from a plaintext one, a stored `Password::Pbkdf2` brings its own.
    pub fn new(nonce: String, salt: Vec<u8>, iterations: u32) -> Scram<S> {
        Scram {
            name: format!("SCRAM-{}", S::name()),
            state: ScramState::Init,
            password: None,
            nonce,
            salt,
            iterations,
            _marker: PhantomData,
        }
    }

    /// Sets the password to check against.
    pub fn set_password(&mut self, password: Password) {
        self.password = Some(password);
    }

    fn client_first(&mut self, payload: &[u8]) -> Result<Response, MechanismError> {
        // The gs2 header ends after its second comma.
        let mut commas = payload
            .iter()
            .enumerate()
            .filter(|&(_, &b)| b == b',')
            .map(|(idx, _)| idx);
        let (Some(_), Some(end)) = (commas.next(), commas.next()) else {
            return Err(MechanismError::FailedToDecodeMessage);
        };
        let gs2_header = payload[..=end].to_vec();
        let rest = payload[end + 1..].to_vec();
        match gs2_header[0] {
            b'n' | b'y' => (),
            _ => return Err(MechanismError::ChannelBindingNotSupported),
        }

        let frame =
            parse_frame(&rest).map_err(|_| MechanismError::CannotDecodeInitialMessage)?;
        let username = frame.get("n").ok_or(MechanismError::NoUsername)?;
        let username =
            unescape_saslname(username).ok_or(MechanismError::ErrorDecodingUsername)?;
        let identity = Identity::Username(username);
        let client_nonce = frame.get("r").ok_or(MechanismError::NoNonce)?;

        let Some(password) = &self.password else {
            return Ok(Response::InputNeeded(identity));
        };
        let (salt, iterations) = match password {
            Password::Pbkdf2 {
                salt, iterations, ..
            } => (salt.clone(), *iterations),
            Password::Plain(_) => (self.salt.clone(), self.iterations),
        };
        let salted_password = S::derive(password, &salt, iterations)?;

        let server_nonce = format!("{}{}", client_nonce, self.nonce);
        let mut buf = Vec::new();
        buf.extend(b"r=");
        buf.extend(server_nonce.bytes());
        buf.extend(b",s=");
        buf.extend(Base64.encode(&salt).bytes());
        buf.extend(b",i=");
        buf.extend(iterations.to_string().bytes());
        self.state = ScramState::SentChallenge {
            server_nonce,
            identity,
            salted_password,
            initial_client_message: rest,
            initial_server_message: buf.clone(),
            gs2_header,
        };
        Ok(Response::Proceed(buf))
    }
}

impl<S: ScramProvider> Mechanism for Scram<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn respond(&mut self, payload: &[u8]) -> Result<Response, MechanismError> {
        match &self.state {
            ScramState::Init => self.client_first(payload),
            ScramState::SentChallenge {
                server_nonce,
                identity,
                salted_password,
                gs2_header,
                initial_client_message,
                initial_server_message,
            } => {
                let frame =
                    parse_frame(payload).map_err(|_| MechanismError::CannotDecodeResponse)?;
                let mut client_final_message_bare = Vec::new();
                client_final_message_bare.extend(b"c=");
                client_final_message_bare.extend(Base64.encode(gs2_header).bytes());
                client_final_message_bare.extend(b",r=");
                client_final_message_bare.extend(server_nonce.bytes());
                let client_key = S::hmac(b"Client Key", salted_password)?;
                let server_key = S::hmac(b"Server Key", salted_password)?;
                let mut auth_message = Vec::new();
                auth_message.extend(initial_client_message);
                auth_message.extend(b",");
                auth_message.extend(initial_server_message);
                auth_message.extend(b",");
                auth_message.extend(&client_final_message_bare);
                let stored_key = S::hash(&client_key);
                let client_signature = S::hmac(&auth_message, &stored_key)?;
                let client_proof = xor(&client_key, &client_signature);
                let sent_proof = frame.get("p").ok_or(MechanismError::NoProof)?;
                let sent_proof = Base64
                    .decode(sent_proof)
                    .map_err(|_| MechanismError::CannotDecodeProof)?;
                if client_proof != sent_proof {
                    return Err(MechanismError::AuthenticationFailed);
                }
                let server_signature = S::hmac(&auth_message, &server_key)?;
                let mut buf = Vec::new();
                buf.extend(b"v=");
                buf.extend(Base64.encode(server_signature).bytes());
                let identity = identity.clone();
                self.state = ScramState::Done;
                Ok(Response::Success(identity, buf))
            }
            ScramState::Done => {
                warn!("{}: invalid step", self.name);
                Err(MechanismError::InvalidStep)
            }
        }
    }
}
