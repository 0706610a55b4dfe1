//! XMPP client authentication and stream management with asynchronous I/O using Tokio.
//!
//! [`client_login`] opens a stream over any `AsyncRead + AsyncWrite` transport, authenticates
//! with SASL2 or legacy SASL, and returns a [`ManagedStream`] counting stanzas for stream
//! management (XEP-0198). Hand its [`StreamManagement`] session to the next `client_login` to
//! resume after losing the connection.

#![deny(unsafe_code, missing_docs, bare_trait_objects)]

mod xmpp_codec;
pub use crate::xmpp_codec::{serialize, Packet, XMPPCodec};
mod event;
pub use event::Event;
pub mod client;
pub use client::client_login;
pub mod config;
pub use config::{AckRequestPolicy, BindConfig, Config, StreamManagementConfig};
mod managed_stream;
pub use managed_stream::ManagedStream;
pub mod stream_features;
pub mod stream_management;
pub use stream_management::{StreamManagement, StreamManagementEvent};
pub mod xmpp_stream;
mod error;
pub use crate::error::{AuthError, Error, ProtocolError, StreamManagementError};

#[cfg(test)]
mod test_util;

// Re-exports
pub use minidom::Element;
pub use xmpp_parsers as parsers;
pub use xmpp_parsers::{BareJid, FullJid, Jid};
