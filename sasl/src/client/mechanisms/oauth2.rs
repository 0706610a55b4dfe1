//! Provides the bearer token mechanisms "X-OAUTH2" (Google) and "X-MESSENGER-OAUTH2" (Windows
//! Live).

use base64::{engine::general_purpose::STANDARD as Base64, Engine};
use log::warn;

use crate::client::{Mechanism, MechanismError};
use crate::common::nonce::NonceSource;
use crate::common::{Credentials, Identity};

/// A struct for the X-OAUTH2 mechanism, which sends a Google access token along with the
/// username.
pub struct OAuth2 {
    username: String,
    token: String,
    step: u32,
}

impl OAuth2 {
    /// Constructs a new struct for authenticating with a Google access token.
    pub fn new<N: Into<String>, T: Into<String>>(username: N, token: T) -> OAuth2 {
        OAuth2 {
            username: username.into(),
            token: token.into(),
            step: 0,
        }
    }

    /// Creates this mechanism from a username and Google access token.
    pub fn from_credentials(
        credentials: &Credentials,
        _nonces: &mut dyn NonceSource,
    ) -> Result<OAuth2, MechanismError> {
        let Identity::Username(username) = &credentials.identity else {
            return Err(MechanismError::RequiresUsername);
        };
        let token = credentials
            .google_access_token
            .as_deref()
            .ok_or(MechanismError::RequiresAccessToken)?;
        Ok(OAuth2::new(username.as_str(), token))
    }
}

impl Mechanism for OAuth2 {
    fn name(&self) -> &str {
        "X-OAUTH2"
    }

    fn respond(&mut self, _challenge: &[u8]) -> Result<Vec<u8>, MechanismError> {
        if self.step > 0 {
            warn!("X-OAUTH2: invalid step {}", self.step);
            return Err(MechanismError::InvalidStep);
        }
        self.step += 1;
        let mut auth = Vec::new();
        auth.push(0);
        auth.extend(self.username.bytes());
        auth.push(0);
        auth.extend(self.token.bytes());
        Ok(auth)
    }

    fn is_finished(&self) -> bool {
        self.step > 0
    }
}

/// A struct for the X-MESSENGER-OAUTH2 mechanism, which sends the raw Windows Live token.
pub struct MessengerOAuth2 {
    token: Vec<u8>,
    step: u32,
}

impl MessengerOAuth2 {
    /// Creates this mechanism from a base64 encoded Windows Live access token.
    pub fn from_credentials(
        credentials: &Credentials,
        _nonces: &mut dyn NonceSource,
    ) -> Result<MessengerOAuth2, MechanismError> {
        let token = credentials
            .windows_live_access_token
            .as_deref()
            .ok_or(MechanismError::RequiresAccessToken)?;
        let token = Base64
            .decode(token)
            .map_err(|_| MechanismError::InvalidAccessToken)?;
        Ok(MessengerOAuth2 { token, step: 0 })
    }
}

impl Mechanism for MessengerOAuth2 {
    fn name(&self) -> &str {
        "X-MESSENGER-OAUTH2"
    }

    fn respond(&mut self, _challenge: &[u8]) -> Result<Vec<u8>, MechanismError> {
        if self.step > 0 {
            warn!("X-MESSENGER-OAUTH2: invalid step {}", self.step);
            return Err(MechanismError::InvalidStep);
        }
        self.step += 1;
        Ok(self.token.clone())
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
    fn google_token() {
        let creds = Credentials::default()
            .with_username("juliet@gmail.com")
            .with_google_access_token("ya29.token");
        let mut mechanism = OAuth2::from_credentials(&creds, &mut OsNonce).unwrap();
        assert_eq!(mechanism.initial().unwrap(), b"\0juliet@gmail.com\0ya29.token");
        assert!(mechanism.is_finished());
        assert_eq!(mechanism.respond(b""), Err(MechanismError::InvalidStep));
    }

    #[test]
    fn google_requires_token() {
        let creds = Credentials::default().with_username("juliet@gmail.com");
        assert_eq!(
            OAuth2::from_credentials(&creds, &mut OsNonce).err(),
            Some(MechanismError::RequiresAccessToken)
        );
    }

    #[test]
    fn windows_live_token_is_decoded() {
        let creds = Credentials::default().with_windows_live_access_token("dG9rZW4=");
        let mut mechanism = MessengerOAuth2::from_credentials(&creds, &mut OsNonce).unwrap();
        assert_eq!(mechanism.initial().unwrap(), b"token");
        assert_eq!(mechanism.respond(b""), Err(MechanismError::InvalidStep));

        let creds = Credentials::default().with_windows_live_access_token("not base64!");
        assert_eq!(
            MessengerOAuth2::from_credentials(&creds, &mut OsNonce).err(),
            Some(MechanismError::InvalidAccessToken)
        );
    }
}
