//! Provides the "X-FACEBOOK-PLATFORM" mechanism.

use log::warn;
use url::form_urlencoded;

use crate::client::{Mechanism, MechanismError};
use crate::common::nonce::NonceSource;
use crate::common::Credentials;

/// A struct for the X-FACEBOOK-PLATFORM mechanism.
///
/// The server challenges with a URL encoded query carrying `method` and `nonce`, which get echoed
/// back along with the access token.
pub struct FacebookPlatform {
    access_token: String,
    app_id: String,
    step: u32,
}

impl FacebookPlatform {
    /// Constructs a new struct from an access token and application id.
    pub fn new<T: Into<String>, A: Into<String>>(access_token: T, app_id: A) -> FacebookPlatform {
        FacebookPlatform {
            access_token: access_token.into(),
            app_id: app_id.into(),
            step: 0,
        }
    }

    /// Creates this mechanism from the Facebook token of the credentials.
    pub fn from_credentials(
        credentials: &Credentials,
        _nonces: &mut dyn NonceSource,
    ) -> Result<FacebookPlatform, MechanismError> {
        let token = credentials
            .facebook
            .as_ref()
            .ok_or(MechanismError::RequiresAccessToken)?;
        Ok(FacebookPlatform::new(
            token.access_token.as_str(),
            token.app_id.as_str(),
        ))
    }
}

impl Mechanism for FacebookPlatform {
    fn name(&self) -> &str {
        "X-FACEBOOK-PLATFORM"
    }

    fn respond(&mut self, challenge: &[u8]) -> Result<Vec<u8>, MechanismError> {
        match self.step {
            0 => {
                self.step += 1;
                Ok(Vec::new())
            }
            1 => {
                let mut method = None;
                let mut nonce = None;
                for (key, value) in form_urlencoded::parse(challenge) {
                    match &*key {
                        "method" => method = Some(value.into_owned()),
                        "nonce" => nonce = Some(value.into_owned()),
                        _ => (),
                    }
                }
                let method = method.ok_or(MechanismError::InvalidServerMessage(
                    "no method in challenge",
                ))?;
                let nonce =
                    nonce.ok_or(MechanismError::InvalidServerMessage("no nonce in challenge"))?;
                self.step += 1;
                let response = form_urlencoded::Serializer::new(String::new())
                    .append_pair("access_token", &self.access_token)
                    .append_pair("api_key", &self.app_id)
                    .append_pair("call_id", "")
                    .append_pair("method", &method)
                    .append_pair("nonce", &nonce)
                    .append_pair("v", "1.0")
                    .finish();
                Ok(response.into_bytes())
            }
            step => {
                warn!("X-FACEBOOK-PLATFORM: invalid step {}", step);
                Err(MechanismError::InvalidStep)
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.step > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_steps() {
        let mut mechanism = FacebookPlatform::new("abc123", "42");
        assert_eq!(mechanism.initial().unwrap(), b"");
        assert!(!mechanism.is_finished());
        let response = mechanism
            .respond(b"version=1&method=auth.xmpp_login&nonce=AA4EFEE16F2AB64B131EEFFE6EACDDB8")
            .unwrap();
        assert_eq!(
            String::from_utf8(response).unwrap(),
            "access_token=abc123&api_key=42&call_id=&method=auth.xmpp_login\
             &nonce=AA4EFEE16F2AB64B131EEFFE6EACDDB8&v=1.0"
        );
        assert!(mechanism.is_finished());
        assert_eq!(mechanism.respond(b""), Err(MechanismError::InvalidStep));
    }

    #[test]
    fn challenge_without_nonce() {
        let mut mechanism = FacebookPlatform::new("abc123", "42");
        mechanism.initial().unwrap();
        assert_eq!(
            mechanism.respond(b"method=auth.xmpp_login"),
            Err(MechanismError::InvalidServerMessage("no nonce in challenge"))
        );
    }
}
