//! XML stream parser for XMPP

use crate::Error;
use bytes::{BufMut, BytesMut};
use log::debug;
use minidom::tree_builder::TreeBuilder;
use rxml::{Lexer, PushDriver, RawParser};
use std::collections::HashMap;
use std::fmt::Write;
use std::io;
use tokio_util::codec::{Decoder, Encoder};
use xmpp_parsers::Element;

/// Anything that can be sent or received on an XMPP/XML stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// `<stream:stream>` start tag
    StreamStart(HashMap<String, String>),
    /// A complete stanza or nonza
    Stanza(Element),
    /// A stanza already serialised, written out byte for byte
    ///
    /// Stream management replays unacknowledged stanzas this way.
    Raw(Vec<u8>),
    /// Plain text (think whitespace keep-alive)
    Text(String),
    /// `</stream:stream>` closing tag
    StreamEnd,
}

fn to_io_err<E: Into<Box<dyn std::error::Error + Send + Sync>>>(e: E) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, e)
}

/// Serialises a stanza into the exact bytes `XMPPCodec` writes for it.
pub fn serialize(stanza: &Element) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::new();
    stanza
        .write_to(&mut bytes)
        .map_err(|e| to_io_err(format!("{}", e)))?;
    Ok(bytes)
}

/// Stateful encoder/decoder for a bytestream from/to XMPP `Packet`
pub struct XMPPCodec {
    /// Outgoing
    ns: Option<String>,
    /// Incoming
    driver: PushDriver<RawParser>,
    stanza_builder: TreeBuilder,
}

impl XMPPCodec {
    /// Constructor
    pub fn new() -> Self {
        XMPPCodec {
            ns: None,
            driver: PushDriver::wrap(Lexer::new(), RawParser::new()),
            stanza_builder: TreeBuilder::new(),
        }
    }

    /// The default namespace of the stream we opened, once its header got written.
    pub fn ns(&self) -> Option<&str> {
        self.ns.as_deref()
    }
}

impl Default for XMPPCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for XMPPCodec {
    type Item = Packet;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let token = match self.driver.parse(buf, false) {
                Ok(Some(token)) => token,
                Ok(None) => break,
                Err(rxml::Error::IO(e)) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(minidom::Error::from(e).into()),
            };

            let had_stream_root = self.stanza_builder.depth() > 0;
            self.stanza_builder.process_event(token)?;
            let has_stream_root = self.stanza_builder.depth() > 0;

            if !had_stream_root && has_stream_root {
                let Some(root) = self.stanza_builder.top() else {
                    return Err(Error::InvalidState);
                };
                let attrs = root
                    .attrs()
                    .map(|(name, value)| (name.to_owned(), value.to_owned()))
                    .chain(
                        root.prefixes
                            .declared_prefixes()
                            .iter()
                            .map(|(prefix, namespace)| {
                                (
                                    prefix
                                        .as_ref()
                                        .map(|prefix| format!("xmlns:{}", prefix))
                                        .unwrap_or_else(|| "xmlns".to_owned()),
                                    namespace.clone(),
                                )
                            }),
                    )
                    .collect();
                debug!("<< {}", String::from(root));
                return Ok(Some(Packet::StreamStart(attrs)));
            } else if self.stanza_builder.depth() == 1 {
                self.driver.release_temporaries();

                if let Some(stanza) = self.stanza_builder.unshift_child() {
                    debug!("<< {}", String::from(&stanza));
                    return Ok(Some(Packet::Stanza(stanza)));
                }
            } else if self.stanza_builder.root.take().is_some() {
                self.driver.release_temporaries();

                debug!("<< </stream:stream>");
                return Ok(Some(Packet::StreamEnd));
            }
        }

        Ok(None)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode(buf)
    }
}

impl Encoder<Packet> for XMPPCodec {
    type Error = Error;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let remaining = dst.capacity() - dst.len();
        let max_stanza_size: usize = 2usize.pow(16);
        if remaining < max_stanza_size {
            dst.reserve(max_stanza_size - remaining);
        }

        match item {
            Packet::StreamStart(start_attrs) => {
                let mut buf = String::new();
                write!(buf, "<stream:stream")?;
                for (name, value) in start_attrs {
                    write!(buf, " {}=\"{}\"", escape(&name), escape(&value))?;
                    if name == "xmlns" {
                        self.ns = Some(value);
                    }
                }
                write!(buf, ">")?;

                debug!(">> {}", buf);
                dst.put_slice(buf.as_bytes());
            }
            Packet::Stanza(stanza) => {
                let bytes = serialize(&stanza)?;
                debug!(">> {}", std::str::from_utf8(&bytes)?);
                dst.put_slice(&bytes);
            }
            Packet::Raw(bytes) => {
                debug!(">> {} (replayed)", std::str::from_utf8(&bytes)?);
                dst.put_slice(&bytes);
            }
            Packet::Text(text) => {
                let mut buf = String::new();
                write_text(&text, &mut buf)?;
                debug!(">> {:?}", buf);
                dst.put_slice(buf.as_bytes());
            }
            Packet::StreamEnd => {
                debug!(">> </stream:stream>");
                dst.put_slice(b"</stream:stream>\n");
            }
        }

        Ok(())
    }
}

/// Write XML-escaped text string
pub fn write_text<W: Write>(text: &str, writer: &mut W) -> Result<(), std::fmt::Error> {
    write!(writer, "{}", escape(text))
}

/// Escapes the five XML special characters.
pub fn escape(input: &str) -> String {
    let mut result = String::with_capacity(input.len());

    for c in input.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '\'' => result.push_str("&apos;"),
            '"' => result.push_str("&quot;"),
            o => result.push(o),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use xmpp_parsers::ns;

    const STREAM_HEADER: &[u8] = b"<?xml version='1.0'?><stream:stream xmlns:stream='http://etherx.jabber.org/streams' version='1.0' xmlns='jabber:client' id='abc'>";

    fn opened() -> (XMPPCodec, BytesMut) {
        let mut c = XMPPCodec::new();
        let mut b = BytesMut::with_capacity(1024);
        b.put_slice(STREAM_HEADER);
        match c.decode(&mut b) {
            Ok(Some(Packet::StreamStart(attrs))) => {
                assert_eq!(attrs.get("id").map(String::as_str), Some("abc"));
                assert_eq!(attrs.get("xmlns").map(String::as_str), Some(ns::JABBER_CLIENT));
            }
            other => panic!("expected a stream start, got {:?}", other),
        }
        (c, b)
    }

    #[test]
    fn test_stream_end() {
        let (mut c, mut b) = opened();
        b.put_slice(b"</stream:stream>");
        let r = c.decode(&mut b);
        assert!(matches!(r, Ok(Some(Packet::StreamEnd))));
    }

    #[test]
    fn test_nonza() {
        let (mut c, mut b) = opened();
        b.put_slice(b"<a xmlns='urn:xmpp:sm:3' h='4'/><r xmlns='urn:xmpp:sm:3'/>");
        match c.decode(&mut b) {
            Ok(Some(Packet::Stanza(el))) => {
                assert!(el.is("a", ns::SM));
                assert_eq!(el.attr("h"), Some("4"));
            }
            other => panic!("expected an ack, got {:?}", other),
        }
        match c.decode(&mut b) {
            Ok(Some(Packet::Stanza(el))) => assert!(el.is("r", ns::SM)),
            other => panic!("expected an ack request, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_utf8() {
        let (mut c, mut b) = opened();

        b.put(&b"<test>\xc3"[..]);
        let r = c.decode(&mut b);
        assert!(matches!(r, Ok(None)));

        b.put(&b"\x9f</test>"[..]);
        let r = c.decode(&mut b);
        assert!(matches!(
            r,
            Ok(Some(Packet::Stanza(ref el))) if el.name() == "test" && el.text() == "ß"
        ));
    }

    #[test]
    fn test_stream_start_encoding() {
        let mut c = XMPPCodec::new();
        let mut b = BytesMut::new();
        let mut attrs = HashMap::new();
        attrs.insert(String::from("xmlns"), String::from(ns::JABBER_CLIENT));
        c.encode(Packet::StreamStart(attrs), &mut b).unwrap();
        assert_eq!(&b[..], b"<stream:stream xmlns=\"jabber:client\">");
        assert_eq!(c.ns(), Some(ns::JABBER_CLIENT));
    }

    #[test]
    fn test_raw_matches_stanza() {
        let stanza: Element = "<message xmlns='jabber:client' to='juliet@capulet.lit'><body>Wherefore art thou?</body></message>"
            .parse()
            .unwrap();
        let mut c = XMPPCodec::new();

        let mut encoded = BytesMut::new();
        c.encode(Packet::Stanza(stanza.clone()), &mut encoded).unwrap();

        let mut replayed = BytesMut::new();
        c.encode(Packet::Raw(serialize(&stanza).unwrap()), &mut replayed)
            .unwrap();

        assert_eq!(encoded, replayed);
    }

    #[test]
    fn test_escaped_text() {
        let mut c = XMPPCodec::new();
        let mut b = BytesMut::new();
        c.encode(Packet::Text(String::from("<&>")), &mut b).unwrap();
        assert_eq!(&b[..], b"&lt;&amp;&gt;");
    }

    /// By default, encode() only gets a BytesMut that has 8kb space reserved.
    #[test]
    fn test_large_stanza() {
        use futures::{executor::block_on, sink::SinkExt};
        use std::io::Cursor;
        use tokio_util::codec::FramedWrite;
        let mut framed = FramedWrite::new(Cursor::new(vec![]), XMPPCodec::new());
        let text = "A".repeat(2usize.pow(15));
        let stanza = Element::builder("message", "jabber:client")
            .append(
                Element::builder("body", "jabber:client")
                    .append(text.as_ref())
                    .build(),
            )
            .build();
        block_on(framed.send(Packet::Stanza(stanza))).expect("send");
        assert_eq!(
            framed.get_ref().get_ref(),
            &format!(
                "<message xmlns='jabber:client'><body>{}</body></message>",
                text
            )
            .as_bytes()
        );
    }
}
