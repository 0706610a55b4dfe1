//! `XMPPStream` provides encoding/decoding for XMPP

use futures::sink::Send;
use futures::{task::Poll, Sink, SinkExt, Stream, StreamExt};
use rand::{thread_rng, Rng};
use std::collections::HashMap;
use std::pin::Pin;
use std::task::Context;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use xmpp_parsers::{ns, Element, Jid};

use crate::error::{Error, ProtocolError};
use crate::stream_features::StreamFeatures;
use crate::xmpp_codec::{Packet, XMPPCodec};

/// Anything exchanging `Packet`s with a server
///
/// `XMPPStream` is the usual one, authentication and stream management only need this much.
pub trait XmppTransport:
    Stream<Item = Result<Packet, Error>> + Sink<Packet, Error = Error> + Unpin
{
}

impl<T> XmppTransport for T where
    T: Stream<Item = Result<Packet, Error>> + Sink<Packet, Error = Error> + Unpin
{
}

/// Adds an `id` to stanzas which don't have one yet.
pub fn add_stanza_id(mut stanza: Element, default_ns: &str) -> Element {
    let is_stanza = ["message", "presence", "iq"]
        .iter()
        .any(|name| stanza.is(*name, default_ns));
    if is_stanza && stanza.attr("id").is_none() {
        stanza.set_attr("id", make_id());
    }
    stanza
}

/// Generates a random id.
pub fn make_id() -> String {
    let id: u64 = thread_rng().gen();
    format!("{}", id)
}

/// Waits for the next element, skipping whitespace.
pub(crate) async fn next_element<S: XmppTransport>(stream: &mut S) -> Result<Element, Error> {
    loop {
        match stream.next().await {
            Some(Ok(Packet::Stanza(element))) => return Ok(element),
            Some(Ok(Packet::Text(_))) | Some(Ok(Packet::Raw(_))) => continue,
            Some(Ok(Packet::StreamStart(_))) => {
                return Err(ProtocolError::InvalidStreamStart.into())
            }
            Some(Ok(Packet::StreamEnd)) | None => return Err(Error::Disconnected),
            Some(Err(e)) => return Err(e),
        }
    }
}

/// Wraps a binary stream (tokio's `AsyncRead + AsyncWrite`) to decode
/// and encode XMPP packets.
///
/// Implements `Sink + Stream`
pub struct XMPPStream<S: AsyncRead + AsyncWrite + Unpin> {
    /// The local Jabber-Id
    pub jid: Jid,
    /// Codec instance
    pub stream: Framed<S, XMPPCodec>,
    /// `<stream:features/>` for XMPP version 1.0
    pub stream_features: StreamFeatures,
    /// Root namespace
    ///
    /// This is different for either c2s, s2s, or component
    /// connections.
    pub ns: String,
    /// Stream `id` attribute
    pub id: String,
}

impl<S: AsyncRead + AsyncWrite + Unpin> XMPPStream<S> {
    /// Send a `<stream:stream>` start tag, then wait for the server's one and its
    /// `<stream:features/>`.
    pub async fn start(io: S, jid: Jid, ns: String) -> Result<Self, Error> {
        let mut stream = Framed::new(io, XMPPCodec::new());

        let domain = jid.domain().to_string();
        let attrs: HashMap<String, String> = [
            ("to", domain.as_str()),
            ("version", "1.0"),
            ("xmlns", ns.as_str()),
            ("xmlns:stream", ns::STREAM),
        ]
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();
        stream.send(Packet::StreamStart(attrs)).await?;

        let id = loop {
            match stream.next().await {
                Some(Ok(Packet::StreamStart(attrs))) => {
                    break attrs.get("id").cloned().unwrap_or_default()
                }
                Some(Ok(Packet::Text(_))) => continue,
                Some(Ok(_)) => return Err(ProtocolError::InvalidStreamStart.into()),
                Some(Err(e)) => return Err(e),
                None => return Err(Error::Disconnected),
            }
        };

        let stream_features = StreamFeatures::new(next_element(&mut stream).await?)?;
        Ok(XMPPStream {
            jid,
            stream,
            stream_features,
            ns,
            id,
        })
    }

    /// Unwraps the inner stream
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }

    /// Re-run `start()`, as needed once authenticated
    pub async fn restart(self) -> Result<Self, Error> {
        let jid = self.jid.clone();
        let ns = self.ns.clone();
        let io = self.into_inner();
        Self::start(io, jid, ns).await
    }

    /// Convenience method
    pub fn send_stanza<E: Into<Element>>(&mut self, e: E) -> Send<'_, Self, Packet> {
        self.send(Packet::Stanza(e.into()))
    }
}

/// Proxy to self.stream
impl<S: AsyncRead + AsyncWrite + Unpin> Sink<Packet> for XMPPStream<S> {
    type Error = Error;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.stream).poll_ready(cx)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Packet) -> Result<(), Self::Error> {
        Pin::new(&mut self.stream).start_send(item)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.stream).poll_close(cx)
    }
}

/// Proxy to self.stream
impl<S: AsyncRead + AsyncWrite + Unpin> Stream for XMPPStream<S> {
    type Item = Result<Packet, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncWriteExt};
    use xmpp_parsers::BareJid;

    const FEATURES: &str = "<stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>PLAIN</mechanism></mechanisms></stream:features>";

    #[tokio::test]
    async fn start() {
        let (client, server) = duplex(4096);
        let mut server = Framed::new(server, XMPPCodec::new());
        let jid = Jid::from(BareJid::new("juliet@capulet.lit").unwrap());

        let serve = async {
            let attrs = match server.next().await {
                Some(Ok(Packet::StreamStart(attrs))) => attrs,
                other => panic!("expected a stream start, got {:?}", other),
            };
            let header = "<?xml version='1.0'?><stream:stream xmlns='jabber:client' xmlns:stream='http://etherx.jabber.org/streams' version='1.0' id='s1'>";
            server
                .get_mut()
                .write_all(format!("{}{}", header, FEATURES).as_bytes())
                .await
                .unwrap();
            attrs
        };
        let (stream, attrs) = tokio::join!(
            XMPPStream::start(client, jid, ns::JABBER_CLIENT.to_owned()),
            serve
        );

        let stream = stream.unwrap();
        assert_eq!(stream.id, "s1");
        assert_eq!(stream.stream_features.sasl_mechanisms(), ["PLAIN"]);
        assert_eq!(attrs.get("to").map(String::as_str), Some("capulet.lit"));
        assert_eq!(attrs.get("version").map(String::as_str), Some("1.0"));
        assert_eq!(
            attrs.get("xmlns").map(String::as_str),
            Some(ns::JABBER_CLIENT)
        );
    }

    #[tokio::test]
    async fn server_closes_early() {
        let (client, server) = duplex(4096);
        drop(server);
        let jid = Jid::from(BareJid::new("juliet@capulet.lit").unwrap());
        let result = XMPPStream::start(client, jid, ns::JABBER_CLIENT.to_owned()).await;
        assert!(result.is_err());
    }

    #[test]
    fn stanza_ids() {
        let iq: Element = "<iq xmlns='jabber:client' type='get'/>".parse().unwrap();
        let iq = add_stanza_id(iq, ns::JABBER_CLIENT);
        assert!(iq.attr("id").is_some());

        let message: Element = "<message xmlns='jabber:client' id='m1'/>".parse().unwrap();
        let message = add_stanza_id(message, ns::JABBER_CLIENT);
        assert_eq!(message.attr("id"), Some("m1"));

        let ack: Element = "<a xmlns='urn:xmpp:sm:3' h='1'/>".parse().unwrap();
        let ack = add_stanza_id(ack, ns::JABBER_CLIENT);
        assert_eq!(ack.attr("id"), None);
    }
}
