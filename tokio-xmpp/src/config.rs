//! Client configuration

use sasl::client::registry::available_mechanisms;
use sasl::common::Credentials;
use uuid::Uuid;
use xmpp_parsers::sasl2::UserAgent;
use xmpp_parsers::BareJid;

/// When to ask the server to acknowledge what we sent
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckRequestPolicy {
    /// Never ask, the server acks on its own schedule
    Never,
    /// Ask after every stanza
    Always,
    /// Ask once every this many stanzas
    Every(u32),
}

/// Stream management (XEP-0198) settings
#[derive(Clone, Debug, PartialEq)]
pub struct StreamManagementConfig {
    /// Ask the server to keep the session around for resumption
    pub resume: bool,
    /// Preferred resumption time in seconds
    pub max: Option<u32>,
    /// When to send `<r/>`
    pub ack_policy: AckRequestPolicy,
}

impl Default for StreamManagementConfig {
    fn default() -> Self {
        StreamManagementConfig {
            resume: true,
            max: None,
            ack_policy: AckRequestPolicy::Always,
        }
    }
}

/// What to request inline with Bind 2 when authenticating with SASL2
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BindConfig {
    /// Client tag the server derives the resource from
    pub tag: Option<String>,
    /// Start the session as inactive (XEP-0352)
    pub csi_inactive: bool,
    /// Enable message carbons (XEP-0280)
    pub carbons: bool,
    /// Enable stream management along with binding
    pub enable_stream_management: bool,
}

impl BindConfig {
    /// Binds with the given client tag
    pub fn new<T: Into<String>>(tag: T) -> Self {
        BindConfig {
            tag: Some(tag.into()),
            ..BindConfig::default()
        }
    }

    /// Starts inactive
    pub fn with_csi_inactive(mut self) -> Self {
        self.csi_inactive = true;
        self
    }

    /// Enables carbons
    pub fn with_carbons(mut self) -> Self {
        self.carbons = true;
        self
    }

    /// Enables stream management
    pub fn with_stream_management(mut self) -> Self {
        self.enable_stream_management = true;
        self
    }
}

/// XMPP client configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// jid of the account
    pub jid: BareJid,
    /// SASL credentials
    pub credentials: Credentials,
    /// Acceptable mechanisms, most preferred first
    pub mechanisms: Vec<String>,
    /// Sent along with SASL2 authentication
    pub user_agent: Option<UserAgent>,
    /// Bind 2 request, if the resource should be bound with SASL2
    pub bind: Option<BindConfig>,
    /// Stream management settings
    pub stream_management: StreamManagementConfig,
}

impl Config {
    /// A configuration logging into `jid` with a password, accepting every mechanism
    /// `sasl` provides.
    pub fn new<P: Into<String>>(jid: BareJid, password: P) -> Self {
        let mut credentials = Credentials::default()
            .with_password(password)
            .with_host(jid.domain().to_string());
        if let Some(node) = jid.node() {
            credentials = credentials.with_username(node.to_string());
        }
        Config::with_credentials(jid, credentials)
    }

    /// A configuration using arbitrary credentials, such as access tokens.
    pub fn with_credentials(jid: BareJid, credentials: Credentials) -> Self {
        Config {
            jid,
            credentials,
            mechanisms: available_mechanisms()
                .iter()
                .map(|name| String::from(*name))
                .collect(),
            user_agent: None,
            bind: None,
            stream_management: StreamManagementConfig::default(),
        }
    }

    /// Restricts and orders the acceptable mechanisms.
    pub fn with_mechanisms<I, S>(mut self, mechanisms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mechanisms = mechanisms.into_iter().map(Into::into).collect();
        self
    }

    /// Identifies this client installation to the server; `id` should stay the same across
    /// sessions, see [`Config::generate_device_id`].
    pub fn with_user_agent(
        mut self,
        id: Uuid,
        software: Option<String>,
        device: Option<String>,
    ) -> Self {
        self.user_agent = Some(UserAgent {
            id: Some(id),
            software,
            device,
        });
        self
    }

    /// Requests a resource with Bind 2.
    pub fn with_bind(mut self, bind: BindConfig) -> Self {
        self.bind = Some(bind);
        self
    }

    /// Overrides the stream management settings.
    pub fn with_stream_management(mut self, stream_management: StreamManagementConfig) -> Self {
        self.stream_management = stream_management;
        self
    }

    /// A fresh random device identifier, to be stored and reused.
    pub fn generate_device_id() -> Uuid {
        Uuid::new_v4()
    }
}
