//! Provides the SASL "DIGEST-MD5" mechanism.

use log::warn;

use crate::client::{Mechanism, MechanismError};
use crate::common::digest_md5::{
    digest_md5_response, parse_message, secret, serialize_message, Message,
};
use crate::common::nonce::NonceSource;
use crate::common::{Credentials, Identity, Password, Secret};

const NONCE_COUNT: &[u8] = b"00000001";

enum DigestState {
    Init,
    SentInitialMessage,
    SentResponse { expected_rspauth: String },
    Done,
}

/// A struct for the SASL DIGEST-MD5 mechanism, with `qop=auth`.
pub struct DigestMd5 {
    username: String,
    password: String,
    authzid: Option<String>,
    digest_uri: String,
    cnonce: String,
    state: DigestState,
}

impl DigestMd5 {
    /// Constructs a new struct for authenticating against `digest_uri`, of the form
    /// `service/host`.
    pub fn new<N, P, U, C>(username: N, password: P, digest_uri: U, cnonce: C) -> DigestMd5
    where
        N: Into<String>,
        P: Into<String>,
        U: Into<String>,
        C: Into<String>,
    {
        DigestMd5 {
            username: username.into(),
            password: password.into(),
            authzid: None,
            digest_uri: digest_uri.into(),
            cnonce: cnonce.into(),
            state: DigestState::Init,
        }
    }

    /// Creates this mechanism from a username, plaintext password and service host.
    pub fn from_credentials(
        credentials: &Credentials,
        nonces: &mut dyn NonceSource,
    ) -> Result<DigestMd5, MechanismError> {
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
        let host = credentials
            .host
            .as_deref()
            .ok_or(MechanismError::RequiresHost)?;
        let digest_uri = format!("{}/{}", credentials.service_type, host);
        let mut mechanism =
            DigestMd5::new(username.as_str(), password.as_str(), digest_uri, nonces.nonce()?);
        mechanism.authzid = credentials.authzid.clone();
        Ok(mechanism)
    }

    fn answer_challenge(&self, challenge: &[u8]) -> Result<(Vec<u8>, String), MechanismError> {
        let input = parse_message(challenge);
        let nonce = input
            .get("nonce")
            .ok_or(MechanismError::InvalidServerMessage("no nonce in challenge"))?;
        let realm = input.get("realm").cloned().unwrap_or_default();

        // The server may list several options, auth is the default when it lists none.
        if let Some(qop) = input.get("qop") {
            if !qop.split(|&b| b == b',').any(|option| option == b"auth") {
                return Err(MechanismError::UnsupportedQop);
            }
        }

        let secret = secret(&self.username, &realm, &self.password);
        let authzid = self.authzid.as_deref().map(str::as_bytes);
        let response = digest_md5_response(
            &secret,
            authzid,
            b"AUTHENTICATE",
            self.digest_uri.as_bytes(),
            nonce,
            self.cnonce.as_bytes(),
            NONCE_COUNT,
        );
        let expected_rspauth = digest_md5_response(
            &secret,
            authzid,
            b"",
            self.digest_uri.as_bytes(),
            nonce,
            self.cnonce.as_bytes(),
            NONCE_COUNT,
        );

        let mut output = Message::new();
        output.insert(String::from("username"), self.username.as_bytes().to_vec());
        if !realm.is_empty() {
            output.insert(String::from("realm"), realm);
        }
        output.insert(String::from("nonce"), nonce.clone());
        output.insert(String::from("cnonce"), self.cnonce.as_bytes().to_vec());
        output.insert(String::from("nc"), NONCE_COUNT.to_vec());
        output.insert(String::from("qop"), b"auth".to_vec());
        output.insert(
            String::from("digest-uri"),
            self.digest_uri.as_bytes().to_vec(),
        );
        output.insert(String::from("response"), response.into_bytes());
        output.insert(String::from("charset"), b"utf-8".to_vec());
        if let Some(authzid) = &self.authzid {
            output.insert(String::from("authzid"), authzid.as_bytes().to_vec());
        }
        Ok((serialize_message(&output), expected_rspauth))
    }
}

impl Mechanism for DigestMd5 {
    fn name(&self) -> &str {
        "DIGEST-MD5"
    }

    fn respond(&mut self, challenge: &[u8]) -> Result<Vec<u8>, MechanismError> {
        match &self.state {
            DigestState::Init => {
                self.state = DigestState::SentInitialMessage;
                Ok(Vec::new())
            }
            DigestState::SentInitialMessage => {
                let (response, expected_rspauth) = self.answer_challenge(challenge)?;
                self.state = DigestState::SentResponse { expected_rspauth };
                Ok(response)
            }
            DigestState::SentResponse { expected_rspauth } => {
                let input = parse_message(challenge);
                if input.get("rspauth").map(Vec::as_slice) != Some(expected_rspauth.as_bytes()) {
                    return Err(MechanismError::ChallengeMismatch);
                }
                self.state = DigestState::Done;
                Ok(Vec::new())
            }
            DigestState::Done => {
                warn!("DIGEST-MD5: invalid step");
                Err(MechanismError::InvalidStep)
            }
        }
    }

    fn is_finished(&self) -> bool {
        matches!(self.state, DigestState::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::nonce::FixedNonce;

    fn mechanism() -> DigestMd5 {
        let creds = Credentials::default()
            .with_username("chris")
            .with_password("secret")
            .with_service_type("imap")
            .with_host("elwood.innosoft.com");
        DigestMd5::from_credentials(&creds, &mut FixedNonce::new("OA6MHXh6VqTrRk")).unwrap()
    }

    // Source: RFC 2831, section 4.
    #[test]
    fn rfc2831_exchange() {
        let mut mechanism = mechanism();
        assert_eq!(mechanism.initial().unwrap(), b"");
        let response = mechanism
            .respond(
                b"realm=\"elwood.innosoft.com\",nonce=\"OA6MG9tEQGm2hh\",qop=\"auth\",\
                  algorithm=md5-sess,charset=utf-8",
            )
            .unwrap();
        let response = parse_message(&response);
        assert_eq!(response["username"], b"chris");
        assert_eq!(response["realm"], b"elwood.innosoft.com");
        assert_eq!(response["nonce"], b"OA6MG9tEQGm2hh");
        assert_eq!(response["cnonce"], b"OA6MHXh6VqTrRk");
        assert_eq!(response["nc"], b"00000001");
        assert_eq!(response["qop"], b"auth");
        assert_eq!(response["digest-uri"], b"imap/elwood.innosoft.com");
        assert_eq!(response["response"], b"d388dad90d4bbd760a152321f2143af7");
        assert!(!mechanism.is_finished());

        assert_eq!(
            mechanism
                .respond(b"rspauth=ea40f60335c427b5527b84dbabcdfffd")
                .unwrap(),
            b""
        );
        assert!(mechanism.is_finished());
        assert_eq!(mechanism.respond(b""), Err(MechanismError::InvalidStep));
    }

    #[test]
    fn authzid_is_covered_by_the_digest() {
        let creds = Credentials::default()
            .with_username("chris")
            .with_password("secret")
            .with_authzid("admin")
            .with_service_type("imap")
            .with_host("elwood.innosoft.com");
        let mut mechanism =
            DigestMd5::from_credentials(&creds, &mut FixedNonce::new("OA6MHXh6VqTrRk")).unwrap();
        mechanism.initial().unwrap();
        let response = mechanism
            .respond(b"realm=\"elwood.innosoft.com\",nonce=\"OA6MG9tEQGm2hh\",qop=\"auth\"")
            .unwrap();
        let response = parse_message(&response);
        assert_eq!(response["authzid"], b"admin");
        assert_eq!(response["response"], b"23e90c577367d8f917efa6ba0cb7eebc");
        mechanism
            .respond(b"rspauth=9a3915030cc8922097cd627a25ee2b9e")
            .unwrap();
        assert!(mechanism.is_finished());
    }

    #[test]
    fn wrong_rspauth() {
        let mut mechanism = mechanism();
        mechanism.initial().unwrap();
        mechanism
            .respond(b"realm=\"elwood.innosoft.com\",nonce=\"OA6MG9tEQGm2hh\",qop=\"auth\"")
            .unwrap();
        assert_eq!(
            mechanism.respond(b"rspauth=00000000000000000000000000000000"),
            Err(MechanismError::ChallengeMismatch)
        );
    }

    #[test]
    fn unsupported_qop() {
        let mut mechanism = mechanism();
        mechanism.initial().unwrap();
        assert_eq!(
            mechanism.respond(b"nonce=\"OA6MG9tEQGm2hh\",qop=\"auth-conf\""),
            Err(MechanismError::UnsupportedQop)
        );
    }

    #[test]
    fn requires_host() {
        let creds = Credentials::default()
            .with_username("chris")
            .with_password("secret");
        assert_eq!(
            DigestMd5::from_credentials(&creds, &mut FixedNonce::new("x")).err(),
            Some(MechanismError::RequiresHost)
        );
    }
}
