use crate::common::digest_md5::{
    digest_md5_response, parse_message, secret, serialize_message, Message,
};
use crate::common::{Identity, Password};
use crate::server::{Mechanism, MechanismError, Response};
use log::warn;

/// The server side of DIGEST-MD5, with `qop=auth`.
pub struct DigestMd5 {
    realm: Option<String>,
    nonce: String,
    password: Option<Password>,
    password_digest: Option<Vec<u8>>,
    identity: Identity,
    step: u32,
}

impl DigestMd5 {
    /// Creates a new DIGEST-MD5 mechanism, challenging with `nonce`.
    pub fn new(realm: Option<String>, nonce: String) -> DigestMd5 {
        DigestMd5 {
            realm,
            nonce,
            password: None,
            password_digest: None,
            identity: Identity::None,
            step: 0,
        }
    }

    /// Sets the plaintext password to check against.
    pub fn set_password(&mut self, password: Password) {
        self.password = Some(password);
    }

    /// Sets the `H(username:realm:password)` secret to check against.
    pub fn set_password_digest(&mut self, digest: Vec<u8>) {
        self.password_digest = Some(digest);
    }

    fn challenge(&mut self) -> Response {
        let mut output = Message::new();
        output.insert(String::from("nonce"), self.nonce.as_bytes().to_vec());
        if let Some(realm) = &self.realm {
            output.insert(String::from("realm"), realm.as_bytes().to_vec());
        }
        output.insert(String::from("qop"), b"auth".to_vec());
        output.insert(String::from("charset"), b"utf-8".to_vec());
        output.insert(String::from("algorithm"), b"md5-sess".to_vec());
        self.step += 1;
        Response::Proceed(serialize_message(&output))
    }

    fn verify(&mut self, payload: &[u8]) -> Result<Response, MechanismError> {
        let input = parse_message(payload);
        if input.get("qop").map(Vec::as_slice).unwrap_or(b"auth") != b"auth" {
            return Err(MechanismError::UnsupportedQop);
        }
        let username = input.get("username").ok_or(MechanismError::NoUsername)?;
        let username = String::from_utf8(username.clone())
            .map_err(|_| MechanismError::ErrorDecodingUsername)?;
        self.identity = Identity::Username(username.clone());

        let realm = input.get("realm").cloned().unwrap_or_default();
        let secret = match (&self.password_digest, &self.password) {
            (Some(digest), _) => digest.clone(),
            (None, Some(Password::Plain(password))) => secret(&username, &realm, password),
            (None, Some(Password::Pbkdf2 { .. })) => {
                warn!("DIGEST-MD5: a salted password can't be used");
                return Err(MechanismError::AuthenticationFailed);
            }
            (None, None) => return Ok(Response::InputNeeded(self.identity.clone())),
        };

        let empty = Vec::new();
        let digest_uri = input.get("digest-uri").unwrap_or(&empty);
        let cnonce = input.get("cnonce").unwrap_or(&empty);
        let nc = input.get("nc").unwrap_or(&empty);
        let authzid = input.get("authzid").map(Vec::as_slice);
        let expected = digest_md5_response(
            &secret,
            authzid,
            b"AUTHENTICATE",
            digest_uri,
            self.nonce.as_bytes(),
            cnonce,
            nc,
        );
        if input.get("response").map(Vec::as_slice) != Some(expected.as_bytes()) {
            return Err(MechanismError::AuthenticationFailed);
        }

        let rspauth = digest_md5_response(
            &secret,
            authzid,
            b"",
            digest_uri,
            self.nonce.as_bytes(),
            cnonce,
            nc,
        );
        let mut output = Message::new();
        output.insert(String::from("rspauth"), rspauth.into_bytes());
        self.step += 1;
        Ok(Response::Proceed(serialize_message(&output)))
    }
}

impl Mechanism for DigestMd5 {
    fn name(&self) -> &str {
        "DIGEST-MD5"
    }

    fn respond(&mut self, payload: &[u8]) -> Result<Response, MechanismError> {
        match self.step {
            0 => Ok(self.challenge()),
            1 => self.verify(payload),
            2 => {
                self.step += 1;
                Ok(Response::Success(self.identity.clone(), Vec::new()))
            }
            step => {
                warn!("DIGEST-MD5: invalid step {}", step);
                Err(MechanismError::InvalidStep)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mechanisms::DigestMd5 as ClientDigestMd5;
    use crate::client::Mechanism as _;

    fn client() -> ClientDigestMd5 {
        ClientDigestMd5::new("chris", "secret", "xmpp/elwood.innosoft.com", "OA6MHXh6VqTrRk")
    }

    fn expect_proceed(response: Response) -> Vec<u8> {
        match response {
            Response::Proceed(data) => data,
            other => panic!("expected a challenge, got {:?}", other),
        }
    }

    #[test]
    fn exchange_with_client() {
        let mut client = client();
        let mut server = DigestMd5::new(
            Some(String::from("elwood.innosoft.com")),
            String::from("OA6MG9tEQGm2hh"),
        );

        let initial = client.initial().unwrap();
        let challenge = expect_proceed(server.respond(&initial).unwrap());
        let response = client.respond(&challenge).unwrap();
        assert_eq!(
            server.respond(&response).unwrap(),
            Response::InputNeeded(Identity::from("chris"))
        );
        server.set_password(Password::from("secret"));
        let rspauth = expect_proceed(server.respond(&response).unwrap());
        client.respond(&rspauth).unwrap();
        assert!(client.is_finished());
        assert_eq!(
            server.respond(b"").unwrap(),
            Response::Success(Identity::from("chris"), Vec::new())
        );
        assert_eq!(server.respond(b""), Err(MechanismError::InvalidStep));
    }

    #[test]
    fn authzid_exchange() {
        use crate::common::nonce::FixedNonce;
        use crate::common::Credentials;

        let creds = Credentials::default()
            .with_username("chris")
            .with_password("secret")
            .with_authzid("admin")
            .with_host("elwood.innosoft.com");
        let mut client =
            ClientDigestMd5::from_credentials(&creds, &mut FixedNonce::new("OA6MHXh6VqTrRk"))
                .unwrap();
        let mut server = DigestMd5::new(None, String::from("OA6MG9tEQGm2hh"));
        server.set_password(Password::from("secret"));
        let challenge = expect_proceed(server.respond(&client.initial().unwrap()).unwrap());
        let response = client.respond(&challenge).unwrap();
        assert_eq!(parse_message(&response)["authzid"], b"admin");
        let rspauth = expect_proceed(server.respond(&response).unwrap());
        client.respond(&rspauth).unwrap();
        assert!(client.is_finished());
    }

    #[test]
    fn stored_digest() {
        let mut client = client();
        let mut server = DigestMd5::new(
            Some(String::from("elwood.innosoft.com")),
            String::from("OA6MG9tEQGm2hh"),
        );
        server.set_password_digest(secret("chris", b"elwood.innosoft.com", "secret"));
        let challenge = expect_proceed(server.respond(&client.initial().unwrap()).unwrap());
        let response = client.respond(&challenge).unwrap();
        let rspauth = expect_proceed(server.respond(&response).unwrap());
        client.respond(&rspauth).unwrap();
    }

    #[test]
    fn wrong_password() {
        let mut client = client();
        let mut server = DigestMd5::new(None, String::from("OA6MG9tEQGm2hh"));
        server.set_password(Password::from("hunter2"));
        let challenge = expect_proceed(server.respond(&client.initial().unwrap()).unwrap());
        let response = client.respond(&challenge).unwrap();
        assert_eq!(
            server.respond(&response),
            Err(MechanismError::AuthenticationFailed)
        );
    }
}
