use xmpp_parsers::{Element, Jid};

use crate::stream_management::StreamManagementEvent;
use crate::Error;

/// High-level event yielded by a `ManagedStream`
#[derive(Debug)]
pub enum Event {
    /// Stream is connected and initialized
    Online {
        /// Server-set Jabber-Id for your session
        ///
        /// This may turn out to be a different JID resource than
        /// expected, so use this one instead of the JID with which
        /// the connection was setup.
        bound_jid: Jid,
        /// Was this session resumed with stream management?
        resumed: bool,
    },
    /// Stream end
    Disconnected(Error),
    /// Received stanza/nonza
    Stanza(Element),
    /// Something happened to the stream management session
    StreamManagement(StreamManagementEvent),
}

impl Event {
    /// `Online` event?
    pub fn is_online(&self) -> bool {
        matches!(self, Event::Online { .. })
    }

    /// Get the server-assigned JID for the `Online` event
    pub fn get_jid(&self) -> Option<&Jid> {
        match self {
            Event::Online { bound_jid, .. } => Some(bound_jid),
            _ => None,
        }
    }

    /// `Stanza` event?
    pub fn is_stanza(&self, name: &str) -> bool {
        match self {
            Event::Stanza(stanza) => stanza.name() == name,
            _ => false,
        }
    }

    /// If this is a `Stanza` event, get its data
    pub fn as_stanza(&self) -> Option<&Element> {
        match self {
            Event::Stanza(stanza) => Some(stanza),
            _ => None,
        }
    }

    /// If this is a `Stanza` event, unwrap into its data
    pub fn into_stanza(self) -> Option<Element> {
        match self {
            Event::Stanza(stanza) => Some(stanza),
            _ => None,
        }
    }
}
