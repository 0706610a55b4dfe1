// Copyright (c) 2024 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::bind2::{BindFeature, BindRequest, Bound};
use crate::ns;
use crate::sasl::{parse_failure_children, DefinedCondition};
use crate::sm;
use crate::util::error::Error;
use crate::util::text_node_codecs::{
    Codec, JidCodec, OptionalCodec, SaslPayload, Text, Trimmed, UuidCodec, WhitespaceAwareBase64,
};
use crate::Element;
use jid::Jid;
use std::convert::TryFrom;
use uuid::Uuid;

fn text_child(name: &'static str, text: String) -> Element {
    Element::builder(name, ns::SASL2).append(text).build()
}

/// The `<authentication/>` stream feature, listing the mechanisms usable with SASL2 and the
/// features which can be negotiated inline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Authentication {
    /// The offered mechanisms, in the server's order.
    pub mechanisms: Vec<String>,

    /// Resource binding, if it can happen inline.
    pub bind: Option<BindFeature>,

    /// Whether stream management resumption can happen inline.
    pub sm: bool,
}

impl TryFrom<Element> for Authentication {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Authentication, Error> {
        check_self!(elem, "authentication", SASL2);
        check_no_attributes!(elem, "authentication");
        let mut authentication = Authentication::default();
        for child in elem.children() {
            if child.is("mechanism", ns::SASL2) {
                check_no_children!(child, "mechanism");
                authentication.mechanisms.push(child.text().trim().to_owned());
            } else if child.is("inline", ns::SASL2) {
                for feature in child.children() {
                    if feature.is("bind", ns::BIND2) {
                        authentication.bind = Some(BindFeature::try_from(feature.clone())?);
                    } else if feature.is("sm", ns::SM) {
                        authentication.sm = true;
                    }
                }
            }
        }
        Ok(authentication)
    }
}

impl From<Authentication> for Element {
    fn from(authentication: Authentication) -> Element {
        let inline = if authentication.bind.is_some() || authentication.sm {
            Some(
                Element::builder("inline", ns::SASL2)
                    .append_all(authentication.bind.map(Element::from))
                    .append_all(
                        authentication
                            .sm
                            .then(|| Element::from(sm::StreamManagement)),
                    )
                    .build(),
            )
        } else {
            None
        };
        Element::builder("authentication", ns::SASL2)
            .append_all(
                authentication
                    .mechanisms
                    .into_iter()
                    .map(|name| text_child("mechanism", name)),
            )
            .append_all(inline)
            .build()
    }
}

/// Describes the client to the server, so that it can recognise it across sessions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserAgent {
    /// A stable identifier for this installation of the client.
    pub id: Option<Uuid>,

    /// The name of the client software.
    pub software: Option<String>,

    /// The name of the device.
    pub device: Option<String>,
}

impl TryFrom<Element> for UserAgent {
    type Error = Error;

    fn try_from(elem: Element) -> Result<UserAgent, Error> {
        check_self!(elem, "user-agent", SASL2);
        check_no_unknown_attributes!(elem, "user-agent", ["id"]);
        let mut user_agent = UserAgent {
            id: get_attr!(elem, "id", Option, value, UuidCodec::decode(value)?),
            ..UserAgent::default()
        };
        for child in elem.children() {
            if child.is("software", ns::SASL2) {
                user_agent.software = OptionalCodec::<Text>::decode(&child.text())?;
            } else if child.is("device", ns::SASL2) {
                user_agent.device = OptionalCodec::<Text>::decode(&child.text())?;
            } else {
                return Err(Error::ParseError("Unknown child in user-agent element."));
            }
        }
        Ok(user_agent)
    }
}

impl From<UserAgent> for Element {
    fn from(user_agent: UserAgent) -> Element {
        Element::builder("user-agent", ns::SASL2)
            .attr("id", user_agent.id.as_ref().and_then(UuidCodec::encode))
            .append_all(
                user_agent
                    .software
                    .map(|software| text_child("software", software)),
            )
            .append_all(user_agent.device.map(|device| text_child("device", device)))
            .build()
    }
}

/// Starts a SASL2 authentication, possibly asking for a resource and stream management along
/// the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Authenticate {
    /// The selected mechanism.
    pub mechanism: String,

    /// The first message of the mechanism, if it sends one.
    pub initial_response: Option<Vec<u8>>,

    /// Who is authenticating.
    pub user_agent: Option<UserAgent>,

    /// Resource binding to perform once authenticated.
    pub bind: Option<BindRequest>,

    /// A previous session to resume once authenticated.
    pub sm_resume: Option<sm::Resume>,
}

impl TryFrom<Element> for Authenticate {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Authenticate, Error> {
        check_self!(elem, "authenticate", SASL2);
        check_no_unknown_attributes!(elem, "authenticate", ["mechanism"]);
        let mut authenticate = Authenticate {
            mechanism: get_attr!(elem, "mechanism", Required),
            initial_response: None,
            user_agent: None,
            bind: None,
            sm_resume: None,
        };
        for child in elem.children() {
            if child.is("initial-response", ns::SASL2) {
                authenticate.initial_response = Some(SaslPayload::decode(&child.text())?);
            } else if child.is("user-agent", ns::SASL2) {
                authenticate.user_agent = Some(UserAgent::try_from(child.clone())?);
            } else if child.is("bind", ns::BIND2) {
                authenticate.bind = Some(BindRequest::try_from(child.clone())?);
            } else if child.is("resume", ns::SM) {
                authenticate.sm_resume = Some(sm::Resume::try_from(child.clone())?);
            } else {
                return Err(Error::ParseError("Unknown child in authenticate element."));
            }
        }
        Ok(authenticate)
    }
}

impl From<Authenticate> for Element {
    fn from(authenticate: Authenticate) -> Element {
        let initial_response = authenticate.initial_response.map(|data| {
            // Empty is sent as "=", so that it differs from a missing initial response.
            let text = SaslPayload::encode(&data).unwrap_or_else(|| String::from("="));
            text_child("initial-response", text)
        });
        Element::builder("authenticate", ns::SASL2)
            .attr("mechanism", authenticate.mechanism)
            .append_all(initial_response)
            .append_all(authenticate.user_agent.map(Element::from))
            .append_all(authenticate.bind.map(Element::from))
            .append_all(authenticate.sm_resume.map(Element::from))
            .build()
    }
}

generate_element!(
    /// A challenge from the server during SASL2 authentication.
    Challenge, "challenge", SASL2,
    text: (
        /// The payload, already decoded from base64.
        data: SaslPayload<Vec<u8>>
    )
);

generate_element!(
    /// The client's answer to a [challenge](struct.Challenge.html).
    Response, "response", SASL2,
    text: (
        /// The payload, already decoded from base64.
        data: SaslPayload<Vec<u8>>
    )
);

/// The server accepted the authentication.
#[derive(Debug, Clone, PartialEq)]
pub struct Success {
    /// The final message of the mechanism, such as the SCRAM server signature.
    pub additional_data: Option<Vec<u8>>,

    /// The identity the stream is now authenticated as; a full JID if a resource got bound.
    pub authorization_identifier: Jid,

    /// The result of the inline resource binding, if one was asked for.
    pub bound: Option<Bound>,

    /// The result of an inline stream resumption, if one was asked for.
    pub sm: Option<sm::InlineOutcome>,
}

impl TryFrom<Element> for Success {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Success, Error> {
        check_self!(elem, "success", SASL2);
        check_no_attributes!(elem, "success");
        let mut additional_data = None;
        let mut authorization_identifier = None;
        let mut bound = None;
        for child in elem.children() {
            if child.is("additional-data", ns::SASL2) {
                additional_data = Some(WhitespaceAwareBase64::decode(&child.text())?);
            } else if child.is("authorization-identifier", ns::SASL2) {
                authorization_identifier = Some(Trimmed::<JidCodec>::decode(&child.text())?);
            } else if child.is("bound", ns::BIND2) {
                bound = Some(Bound::try_from(child.clone())?);
            }
        }
        let authorization_identifier = authorization_identifier.ok_or(Error::ParseError(
            "Missing authorization-identifier in success element.",
        ))?;
        let sm = sm::InlineOutcome::find(&elem)?;
        Ok(Success {
            additional_data,
            authorization_identifier,
            bound,
            sm,
        })
    }
}

impl From<Success> for Element {
    fn from(success: Success) -> Element {
        Element::builder("success", ns::SASL2)
            .append_all(
                success
                    .additional_data
                    .and_then(|data| WhitespaceAwareBase64::encode(&data))
                    .map(|text| text_child("additional-data", text)),
            )
            .append(text_child(
                "authorization-identifier",
                success.authorization_identifier.to_string(),
            ))
            .append_all(success.bound.map(Element::from))
            .append_all(success.sm.map(Element::from))
            .build()
    }
}

/// The server rejected the authentication.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    /// The SASL condition explaining the rejection.
    pub condition: DefinedCondition,

    /// A human-readable explanation.
    pub text: Option<String>,
}

impl TryFrom<Element> for Failure {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Failure, Error> {
        check_self!(elem, "failure", SASL2);
        check_no_attributes!(elem, "failure");
        let (condition, text) = parse_failure_children(&elem)?;
        Ok(Failure { condition, text })
    }
}

impl From<Failure> for Element {
    fn from(failure: Failure) -> Element {
        Element::builder("failure", ns::SASL2)
            .append(Element::from(failure.condition))
            .append_all(
                failure
                    .text
                    .map(|text| text_child("text", text)),
            )
            .build()
    }
}

/// Authentication succeeded, but the server wants the client to complete more tasks first.
#[derive(Debug, Clone, PartialEq)]
pub struct Continue {
    /// The final message of the mechanism.
    pub additional_data: Option<Vec<u8>>,

    /// The names of the tasks the client may pick from.
    pub tasks: Vec<String>,

    /// A human-readable explanation.
    pub text: Option<String>,
}

impl TryFrom<Element> for Continue {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Continue, Error> {
        check_self!(elem, "continue", SASL2);
        check_no_attributes!(elem, "continue");
        let mut additional_data = None;
        let mut tasks = Vec::new();
        let mut text = None;
        for child in elem.children() {
            if child.is("additional-data", ns::SASL2) {
                additional_data = Some(WhitespaceAwareBase64::decode(&child.text())?);
            } else if child.is("tasks", ns::SASL2) {
                for task in child.children() {
                    if task.is("task", ns::SASL2) {
                        tasks.push(task.text().trim().to_owned());
                    }
                }
            } else if child.is("text", ns::SASL2) {
                text = Some(child.text());
            }
        }
        if tasks.is_empty() {
            return Err(Error::ParseError("Continue must list at least one task."));
        }
        Ok(Continue {
            additional_data,
            tasks,
            text,
        })
    }
}

impl From<Continue> for Element {
    fn from(cont: Continue) -> Element {
        let tasks = Element::builder("tasks", ns::SASL2)
            .append_all(cont.tasks.into_iter().map(|task| text_child("task", task)))
            .build();
        Element::builder("continue", ns::SASL2)
            .append_all(
                cont.additional_data
                    .and_then(|data| WhitespaceAwareBase64::encode(&data))
                    .map(|text| text_child("additional-data", text)),
            )
            .append(tasks)
            .append_all(cont.text.map(|text| text_child("text", text)))
            .build()
    }
}

/// Sent by the client to cancel an ongoing SASL2 authentication.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Abort {
    /// Why the client gives up.
    pub text: Option<String>,
}

impl TryFrom<Element> for Abort {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Abort, Error> {
        check_self!(elem, "abort", SASL2);
        check_no_attributes!(elem, "abort");
        let mut abort = Abort::default();
        for child in elem.children() {
            if child.is("text", ns::SASL2) {
                abort.text = Some(child.text());
            } else {
                return Err(Error::ParseError("Unknown child in abort element."));
            }
        }
        Ok(abort)
    }
}

impl From<Abort> for Element {
    fn from(abort: Abort) -> Element {
        Element::builder("abort", ns::SASL2)
            .append_all(abort.text.map(|text| text_child("text", text)))
            .build()
    }
}

/// Any of the elements a server sends during SASL2 authentication.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Another round of the mechanism.
    Challenge(Challenge),
    /// Authentication succeeded.
    Success(Success),
    /// Authentication failed.
    Failure(Failure),
    /// More tasks are needed.
    Continue(Continue),
}

impl TryFrom<Element> for ServerMessage {
    type Error = Error;

    fn try_from(elem: Element) -> Result<ServerMessage, Error> {
        if !elem.has_ns(ns::SASL2) {
            return Err(Error::ParseError("This is not a SASL2 element."));
        }
        Ok(match elem.name() {
            "challenge" => ServerMessage::Challenge(Challenge::try_from(elem)?),
            "success" => ServerMessage::Success(Success::try_from(elem)?),
            "failure" => ServerMessage::Failure(Failure::try_from(elem)?),
            "continue" => ServerMessage::Continue(Continue::try_from(elem)?),
            _ => return Err(Error::ParseError("Unknown SASL2 server element.")),
        })
    }
}
