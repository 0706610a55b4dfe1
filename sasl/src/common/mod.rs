//! Types and primitives shared by the client and server halves of the crate.

use std::collections::HashMap;

use std::convert::From;

use std::string::FromUtf8Error;

pub mod digest;
pub mod digest_md5;
pub mod nonce;
pub mod scram;

/// The identity being authenticated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identity {
    /// No identity, as with ANONYMOUS or before the peer told us.
    None,
    /// A plain username.
    Username(String),
}

impl Identity {
    /// Returns the username, if there is one.
    pub fn username(&self) -> Option<&str> {
        match self {
            Identity::None => None,
            Identity::Username(username) => Some(username),
        }
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Identity {
        Identity::Username(s)
    }
}

impl<'a> From<&'a str> for Identity {
    fn from(s: &'a str) -> Identity {
        Identity::Username(s.to_owned())
    }
}

/// The access token and application id used by X-FACEBOOK-PLATFORM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FacebookToken {
    /// The OAuth access token.
    pub access_token: String,
    /// The Facebook application id, sent as `api_key`.
    pub app_id: String,
}

/// A struct containing SASL credentials.
#[derive(Clone, Debug)]
pub struct Credentials {
    /// The requested identity.
    pub identity: Identity,
    /// The secret used to authenticate.
    pub secret: Secret,
    /// The identity to act as, if different from the authenticated one.
    pub authzid: Option<String>,
    /// The service type, used to build the DIGEST-MD5 digest URI.
    pub service_type: String,
    /// The host name of the service, used to build the DIGEST-MD5 digest URI.
    pub host: Option<String>,
    /// Access token for X-OAUTH2.
    pub google_access_token: Option<String>,
    /// Base64 encoded access token for X-MESSENGER-OAUTH2.
    pub windows_live_access_token: Option<String>,
    /// Access token and application id for X-FACEBOOK-PLATFORM.
    pub facebook: Option<FacebookToken>,
}

impl Default for Credentials {
    fn default() -> Credentials {
        Credentials {
            identity: Identity::None,
            secret: Secret::None,
            authzid: None,
            service_type: String::from("xmpp"),
            host: None,
            google_access_token: None,
            windows_live_access_token: None,
            facebook: None,
        }
    }
}

impl Credentials {
    /// Creates a new Credentials with the specified username.
    pub fn with_username<N: Into<String>>(mut self, username: N) -> Credentials {
        self.identity = Identity::Username(username.into());
        self
    }

    /// Creates a new Credentials with the specified plaintext password.
    pub fn with_password<P: Into<String>>(mut self, password: P) -> Credentials {
        self.secret = Secret::password_plain(password);
        self
    }

    /// Creates a new Credentials with the specified secret.
    pub fn with_secret(mut self, secret: Secret) -> Credentials {
        self.secret = secret;
        self
    }

    /// Creates a new Credentials acting on behalf of another identity.
    pub fn with_authzid<A: Into<String>>(mut self, authzid: A) -> Credentials {
        self.authzid = Some(authzid.into());
        self
    }

    /// Creates a new Credentials with the specified service host.
    pub fn with_host<H: Into<String>>(mut self, host: H) -> Credentials {
        self.host = Some(host.into());
        self
    }

    /// Creates a new Credentials with the specified service type.
    pub fn with_service_type<S: Into<String>>(mut self, service_type: S) -> Credentials {
        self.service_type = service_type.into();
        self
    }

    /// Creates a new Credentials with the specified Google access token.
    pub fn with_google_access_token<T: Into<String>>(mut self, token: T) -> Credentials {
        self.google_access_token = Some(token.into());
        self
    }

    /// Creates a new Credentials with the specified Windows Live access token.
    pub fn with_windows_live_access_token<T: Into<String>>(mut self, token: T) -> Credentials {
        self.windows_live_access_token = Some(token.into());
        self
    }

    /// Creates a new Credentials with the specified Facebook token and application id.
    pub fn with_facebook_token<T: Into<String>, A: Into<String>>(
        mut self,
        access_token: T,
        app_id: A,
    ) -> Credentials {
        self.facebook = Some(FacebookToken {
            access_token: access_token.into(),
            app_id: app_id.into(),
        });
        self
    }
}

/// Represents a SASL secret, like a password.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Secret {
    /// No extra data needed.
    None,
    /// Password required.
    Password(Password),
}

impl Secret {
    /// A plaintext password.
    pub fn password_plain<S: Into<String>>(password: S) -> Secret {
        Secret::Password(Password::Plain(password.into()))
    }

    /// A salted password, as stored by a server.
    pub fn password_pbkdf2<S: Into<String>>(
        method: S,
        salt: Vec<u8>,
        iterations: u32,
        data: Vec<u8>,
    ) -> Secret {
        Secret::Password(Password::Pbkdf2 {
            method: method.into(),
            salt,
            iterations,
            data,
        })
    }
}

/// Represents a password.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Password {
    /// A plaintext password.
    Plain(String),
    /// A password digest derived using PBKDF2.
    Pbkdf2 {
        /// Name of the hash function, e.g. `SHA-256`.
        method: String,
        /// Salt fed to PBKDF2.
        salt: Vec<u8>,
        /// Iteration count fed to PBKDF2.
        iterations: u32,
        /// The derived key.
        data: Vec<u8>,
    },
}

impl From<String> for Password {
    fn from(s: String) -> Password {
        Password::Plain(s)
    }
}

impl<'a> From<&'a str> for Password {
    fn from(s: &'a str) -> Password {
        Password::Plain(s.to_owned())
    }
}

#[doc(hidden)]
pub fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(a, b)| a ^ b).collect()
}

/// Splits a SCRAM message into its `key=value` attributes.
#[doc(hidden)]
pub fn parse_frame(frame: &[u8]) -> Result<HashMap<String, String>, FromUtf8Error> {
    let inner = String::from_utf8(frame.to_owned())?;
    let mut ret = HashMap::new();
    for s in inner.split(',') {
        if let Some((k, v)) = s.split_once('=') {
            ret.insert(k.to_owned(), v.to_owned());
        }
    }
    Ok(ret)
}

/// Escapes a username for use in a SCRAM message.
pub fn escape_saslname(name: &str) -> String {
    name.replace('=', "=3D").replace(',', "=2C")
}

/// Reverses `escape_saslname`, returning `None` on a stray `=`.
pub fn unescape_saslname(name: &str) -> Option<String> {
    let mut ret = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(idx) = rest.find('=') {
        ret.push_str(&rest[..idx]);
        let escape = rest.get(idx..idx + 3)?;
        match escape {
            "=2C" => ret.push(','),
            "=3D" => ret.push('='),
            _ => return None,
        }
        rest = &rest[idx + 3..];
    }
    ret.push_str(rest);
    Some(ret)
}
