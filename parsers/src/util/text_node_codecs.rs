// Copyright (c) 2017 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::util::error::Error;
use base64::{engine::general_purpose::STANDARD as Base64Engine, Engine};
use jid::Jid;
use std::str::FromStr;
use uuid::Uuid;

/// A trait for codecs that can decode and encode text nodes.
pub trait Codec {
    type Decoded;

    /// Decode the given string into the codec’s output.
    fn decode(s: &str) -> Result<Self::Decoded, Error>;

    /// Encode the given value; return None to not produce a text node at all.
    fn encode(decoded: &Self::Decoded) -> Option<String>;
}

/// Codec for text content.
pub struct Text;

impl Codec for Text {
    type Decoded = String;

    fn decode(s: &str) -> Result<String, Error> {
        Ok(s.to_owned())
    }

    fn encode(decoded: &String) -> Option<String> {
        Some(decoded.to_owned())
    }
}

/// Codec transformer that makes the text optional; a "" string is decoded as None.
pub struct OptionalCodec<T: Codec>(std::marker::PhantomData<T>);

impl<T> Codec for OptionalCodec<T>
where
    T: Codec,
{
    type Decoded = Option<T::Decoded>;

    fn decode(s: &str) -> Result<Option<T::Decoded>, Error> {
        if s.is_empty() {
            return Ok(None);
        }

        Ok(Some(T::decode(s)?))
    }

    fn encode(decoded: &Option<T::Decoded>) -> Option<String> {
        decoded.as_ref().and_then(T::encode)
    }
}

/// Codec that trims whitespace around the text.
pub struct Trimmed<T: Codec>(std::marker::PhantomData<T>);

impl<T> Codec for Trimmed<T>
where
    T: Codec,
{
    type Decoded = T::Decoded;

    fn decode(s: &str) -> Result<T::Decoded, Error> {
        match s.trim() {
            "" => Err(Error::ParseError(
                "The text in the element's text node was empty after trimming.",
            )),
            trimmed => T::decode(trimmed),
        }
    }

    fn encode(decoded: &T::Decoded) -> Option<String> {
        T::encode(decoded)
    }
}

/// Codec wrapping base64 encode/decode, while ignoring whitespace characters.
pub struct WhitespaceAwareBase64;

impl Codec for WhitespaceAwareBase64 {
    type Decoded = Vec<u8>;

    fn decode(s: &str) -> Result<Self::Decoded, Error> {
        let s: String = s
            .chars()
            .filter(|ch| *ch != ' ' && *ch != '\n' && *ch != '\t' && *ch != '\r')
            .collect();

        Ok(Base64Engine.decode(s)?)
    }

    fn encode(decoded: &Self::Decoded) -> Option<String> {
        Some(Base64Engine.encode(decoded))
    }
}

/// Codec for SASL payloads: base64, where a lone `=` stands for an empty payload and an empty
/// payload produces no text node.
pub struct SaslPayload;

impl Codec for SaslPayload {
    type Decoded = Vec<u8>;

    fn decode(s: &str) -> Result<Self::Decoded, Error> {
        match s.trim() {
            "" | "=" => Ok(Vec::new()),
            s => WhitespaceAwareBase64::decode(s),
        }
    }

    fn encode(decoded: &Self::Decoded) -> Option<String> {
        if decoded.is_empty() {
            return None;
        }
        WhitespaceAwareBase64::encode(decoded)
    }
}

/// Codec for a JID.
pub struct JidCodec;

impl Codec for JidCodec {
    type Decoded = Jid;

    fn decode(s: &str) -> Result<Jid, Error> {
        Ok(Jid::from_str(s)?)
    }

    fn encode(jid: &Jid) -> Option<String> {
        Some(jid.to_string())
    }
}

/// Codec for a UUID, serialised in its hyphenated form.
pub struct UuidCodec;

impl Codec for UuidCodec {
    type Decoded = Uuid;

    fn decode(s: &str) -> Result<Uuid, Error> {
        Ok(Uuid::parse_str(s)?)
    }

    fn encode(uuid: &Uuid) -> Option<String> {
        Some(uuid.hyphenated().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sasl_payload() {
        assert_eq!(SaslPayload::decode("").unwrap(), b"");
        assert_eq!(SaslPayload::decode("=").unwrap(), b"");
        assert_eq!(SaslPayload::decode(" AGp1bGlldA\n==").unwrap(), b"\0juliet");
        assert_eq!(SaslPayload::encode(&Vec::new()), None);
        assert_eq!(
            SaslPayload::encode(&b"\0juliet".to_vec()).unwrap(),
            "AGp1bGlldA=="
        );

        let err = SaslPayload::decode("not base64!").unwrap_err();
        assert!(err.to_string().starts_with("base64 error: "));
    }

    #[test]
    fn trimmed_jid() {
        let jid = Trimmed::<JidCodec>::decode(" juliet@capulet.lit/balcony\n").unwrap();
        assert_eq!(jid.to_string(), "juliet@capulet.lit/balcony");

        let err = Trimmed::<JidCodec>::decode("  ").unwrap_err();
        assert_eq!(
            err.to_string(),
            "parse error: The text in the element's text node was empty after trimming."
        );
    }

    #[test]
    fn optional_text() {
        assert_eq!(OptionalCodec::<Text>::decode("").unwrap(), None);
        assert_eq!(
            OptionalCodec::<Text>::decode("hi").unwrap(),
            Some(String::from("hi"))
        );
        assert_eq!(OptionalCodec::<Text>::encode(&None), None);
    }

    #[test]
    fn uuid() {
        let uuid = UuidCodec::decode("d4565fa7-4d72-4749-b3d3-740edbf87770").unwrap();
        assert_eq!(
            UuidCodec::encode(&uuid).unwrap(),
            "d4565fa7-4d72-4749-b3d3-740edbf87770"
        );
        assert!(UuidCodec::decode("not-a-uuid").is_err());
    }
}
