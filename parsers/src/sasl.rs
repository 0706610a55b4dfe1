// Copyright (c) 2017 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::ns;
use crate::util::error::Error;
use crate::util::text_node_codecs::{Codec, SaslPayload};
use crate::Element;
use std::convert::TryFrom;
use std::str::FromStr;

/// The list of mechanisms a server offers in its `<stream:features/>`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mechanisms {
    /// The mechanism names, in the order the server listed them.
    pub mechanisms: Vec<String>,
}

impl TryFrom<Element> for Mechanisms {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Mechanisms, Error> {
        check_self!(elem, "mechanisms", SASL);
        check_no_attributes!(elem, "mechanisms");
        let mut mechanisms = Vec::new();
        for child in elem.children() {
            if !child.is("mechanism", ns::SASL) {
                return Err(Error::ParseError("Unknown child in mechanisms element."));
            }
            check_no_children!(child, "mechanism");
            mechanisms.push(child.text().trim().to_owned());
        }
        Ok(Mechanisms { mechanisms })
    }
}

impl From<Mechanisms> for Element {
    fn from(mechanisms: Mechanisms) -> Element {
        Element::builder("mechanisms", ns::SASL)
            .append_all(mechanisms.mechanisms.into_iter().map(|name| {
                Element::builder("mechanism", ns::SASL)
                    .append(name)
                    .build()
            }))
            .build()
    }
}

/// The first step of the SASL process, selecting the mechanism and sending
/// the first part of the handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct Auth {
    /// The mechanism used.
    pub mechanism: String,

    /// The content of the handshake.
    pub data: Vec<u8>,
}

impl TryFrom<Element> for Auth {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Auth, Error> {
        check_self!(elem, "auth", SASL);
        check_no_unknown_attributes!(elem, "auth", ["mechanism"]);
        check_no_children!(elem, "auth");
        Ok(Auth {
            mechanism: get_attr!(elem, "mechanism", Required),
            data: SaslPayload::decode(&elem.text())?,
        })
    }
}

impl From<Auth> for Element {
    fn from(auth: Auth) -> Element {
        // An empty initial response is sent as "=", to tell it apart from no response at all.
        let text = SaslPayload::encode(&auth.data).unwrap_or_else(|| String::from("="));
        Element::builder("auth", ns::SASL)
            .attr("mechanism", auth.mechanism)
            .append(text)
            .build()
    }
}

generate_element!(
    /// In case the mechanism selected at the auth step requires a second step,
    /// the server sends this element with additional data.
    Challenge, "challenge", SASL,
    text: (
        /// The payload, already decoded from base64.
        data: SaslPayload<Vec<u8>>
    )
);

generate_element!(
    /// In case the mechanism selected at the auth step requires a second step,
    /// this contains the client’s response to the server’s challenge.
    Response, "response", SASL,
    text: (
        /// The payload, already decoded from base64.
        data: SaslPayload<Vec<u8>>
    )
);

generate_element!(
    /// Sent by the server on SASL success, possibly with additional data.
    Success, "success", SASL,
    text: (
        /// The payload, already decoded from base64.
        data: SaslPayload<Vec<u8>>
    )
);

generate_empty_element!(
    /// Sent by the client at any point after auth if it wants to cancel the
    /// current authentication process.
    Abort,
    "abort",
    SASL
);

/// Why a SASL negotiation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinedCondition {
    /// The client aborted the authentication with
    /// [abort](struct.Abort.html).
    Aborted,

    /// The account the client is trying to authenticate against has been
    /// disabled.
    AccountDisabled,

    /// The credentials for this account have expired.
    CredentialsExpired,

    /// You must enable StartTLS or use direct TLS before using this
    /// authentication mechanism.
    EncryptionRequired,

    /// The base64 data sent by the client is invalid.
    IncorrectEncoding,

    /// The authzid provided by the client is invalid.
    InvalidAuthzid,

    /// The client tried to use an invalid mechanism, or none.
    InvalidMechanism,

    /// The client sent a bad request.
    MalformedRequest,

    /// The mechanism selected is weaker than what the server allows.
    MechanismTooWeak,

    /// The credentials provided are invalid.
    NotAuthorized,

    /// The server encountered an issue which may be fixed later, the client
    /// should retry at some point.
    TemporaryAuthFailure,
}

impl DefinedCondition {
    /// The name of the element this condition is serialised as.
    pub fn as_str(&self) -> &'static str {
        match self {
            DefinedCondition::Aborted => "aborted",
            DefinedCondition::AccountDisabled => "account-disabled",
            DefinedCondition::CredentialsExpired => "credentials-expired",
            DefinedCondition::EncryptionRequired => "encryption-required",
            DefinedCondition::IncorrectEncoding => "incorrect-encoding",
            DefinedCondition::InvalidAuthzid => "invalid-authzid",
            DefinedCondition::InvalidMechanism => "invalid-mechanism",
            DefinedCondition::MalformedRequest => "malformed-request",
            DefinedCondition::MechanismTooWeak => "mechanism-too-weak",
            DefinedCondition::NotAuthorized => "not-authorized",
            DefinedCondition::TemporaryAuthFailure => "temporary-auth-failure",
        }
    }
}

impl FromStr for DefinedCondition {
    type Err = Error;

    /// The legacy `bad-auth` some servers still send is read as `not-authorized`.
    fn from_str(s: &str) -> Result<DefinedCondition, Error> {
        Ok(match s {
            "aborted" => DefinedCondition::Aborted,
            "account-disabled" => DefinedCondition::AccountDisabled,
            "credentials-expired" => DefinedCondition::CredentialsExpired,
            "encryption-required" => DefinedCondition::EncryptionRequired,
            "incorrect-encoding" => DefinedCondition::IncorrectEncoding,
            "invalid-authzid" => DefinedCondition::InvalidAuthzid,
            "invalid-mechanism" => DefinedCondition::InvalidMechanism,
            "malformed-request" => DefinedCondition::MalformedRequest,
            "mechanism-too-weak" => DefinedCondition::MechanismTooWeak,
            "not-authorized" | "bad-auth" => DefinedCondition::NotAuthorized,
            "temporary-auth-failure" => DefinedCondition::TemporaryAuthFailure,
            _ => return Err(Error::ParseError("Unknown defined-condition.")),
        })
    }
}

impl From<DefinedCondition> for Element {
    fn from(condition: DefinedCondition) -> Element {
        Element::builder(condition.as_str(), ns::SASL).build()
    }
}

/// Parses the condition and optional text out of a failure element, whichever namespace the
/// failure itself lives in.
pub(crate) fn parse_failure_children(
    elem: &Element,
) -> Result<(DefinedCondition, Option<String>), Error> {
    let mut defined_condition: Option<DefinedCondition> = None;
    let mut text = None;
    for child in elem.children() {
        if child.name() == "text" && (child.has_ns(ns::SASL) || child.has_ns(ns::SASL2)) {
            if text.is_some() {
                return Err(Error::ParseError("Text element present twice in failure."));
            }
            check_no_children!(child, "text");
            text = Some(child.text());
        } else if child.has_ns(ns::SASL) {
            if defined_condition.is_some() {
                return Err(Error::ParseError(
                    "Failure must not have more than one defined-condition.",
                ));
            }
            check_no_attributes!(child, "defined-condition");
            check_no_children!(child, "defined-condition");
            defined_condition = Some(child.name().parse()?);
        }
    }
    let defined_condition =
        defined_condition.ok_or(Error::ParseError("Failure must have a defined-condition."))?;
    Ok((defined_condition, text))
}

/// Sent by the server on SASL failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    /// One of the allowed defined-conditions for SASL.
    pub defined_condition: DefinedCondition,

    /// A human-readable explanation for the failure.
    pub text: Option<String>,
}

impl TryFrom<Element> for Failure {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Failure, Error> {
        check_self!(elem, "failure", SASL);
        check_no_attributes!(elem, "failure");
        let (defined_condition, text) = parse_failure_children(&elem)?;
        Ok(Failure {
            defined_condition,
            text,
        })
    }
}

impl From<Failure> for Element {
    fn from(failure: Failure) -> Element {
        Element::builder("failure", ns::SASL)
            .append(Element::from(failure.defined_condition))
            .append_all(
                failure
                    .text
                    .map(|text| Element::builder("text", ns::SASL).append(text).build()),
            )
            .build()
    }
}
