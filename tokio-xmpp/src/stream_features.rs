//! Contains wrapper for `<stream:features/>`

use xmpp_parsers::sasl::Mechanisms;
use xmpp_parsers::sasl2::Authentication;
use xmpp_parsers::{ns, Element};

use crate::error::{Error, ProtocolError};

/// Wraps `<stream:features/>`, usually the very first nonza of an
/// XMPPStream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamFeatures {
    /// Legacy SASL mechanisms, if SASL authentication is possible.
    pub sasl_mechanisms: Option<Mechanisms>,
    /// Extensible SASL Profile, if the server supports it.
    pub sasl2: Option<Authentication>,
    /// Whether stream management (XEP-0198) can be enabled or resumed.
    pub stream_management: bool,
    /// Whether Client State Indication (XEP-0352) is available.
    pub csi: bool,
}

impl StreamFeatures {
    /// Parses a `<stream:features/>` element.
    pub fn new(element: Element) -> Result<Self, Error> {
        if !element.is("features", ns::STREAM) {
            return Err(ProtocolError::UnexpectedElement(element.name().to_owned()).into());
        }
        let mut features = StreamFeatures::default();
        for child in element.children() {
            if child.is("mechanisms", ns::SASL) {
                features.sasl_mechanisms = Some(Mechanisms::try_from(child.clone())?);
            } else if child.is("authentication", ns::SASL2) {
                features.sasl2 = Some(Authentication::try_from(child.clone())?);
            } else if child.is("sm", ns::SM) {
                features.stream_management = true;
            } else if child.is("csi", ns::CSI) {
                features.csi = true;
            }
        }
        Ok(features)
    }

    /// Can we authenticate with the Extensible SASL Profile?
    pub fn can_sasl2(&self) -> bool {
        self.sasl2.is_some()
    }

    /// The mechanisms the server offers over legacy SASL, in its own order.
    pub fn sasl_mechanisms(&self) -> &[String] {
        self.sasl_mechanisms
            .as_ref()
            .map(|mechanisms| mechanisms.mechanisms.as_slice())
            .unwrap_or(&[])
    }

    /// Can stream management be negotiated on this stream?
    pub fn can_stream_management(&self) -> bool {
        self.stream_management
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_features() {
        let elem: Element = "<stream:features xmlns:stream='http://etherx.jabber.org/streams'><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>SCRAM-SHA-1</mechanism><mechanism>PLAIN</mechanism></mechanisms><sm xmlns='urn:xmpp:sm:3'/></stream:features>"
            .parse()
            .unwrap();
        let features = StreamFeatures::new(elem).unwrap();
        assert_eq!(features.sasl_mechanisms(), ["SCRAM-SHA-1", "PLAIN"]);
        assert!(!features.can_sasl2());
        assert!(features.can_stream_management());
        assert!(!features.csi);
    }

    #[test]
    fn sasl2_features() {
        let elem: Element = "<stream:features xmlns:stream='http://etherx.jabber.org/streams'><authentication xmlns='urn:xmpp:sasl:2'><mechanism>PLAIN</mechanism><inline><sm xmlns='urn:xmpp:sm:3'/></inline></authentication><csi xmlns='urn:xmpp:csi:0'/></stream:features>"
            .parse()
            .unwrap();
        let features = StreamFeatures::new(elem).unwrap();
        assert!(features.can_sasl2());
        assert!(features.sasl2.as_ref().unwrap().sm);
        assert!(features.sasl_mechanisms().is_empty());
        assert!(features.csi);
    }

    #[test]
    fn not_features() {
        let elem: Element = "<message xmlns='jabber:client'/>".parse().unwrap();
        let err = StreamFeatures::new(elem).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::UnexpectedElement(ref name)) if name == "message"
        ));
    }
}
