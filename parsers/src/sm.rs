// Copyright (c) 2018 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::ns;
use crate::util::error::Error;
use crate::Element;
use std::convert::TryFrom;

generate_element!(
    /// Acknowledgement of the currently received stanzas.
    A, "a", SM,
    attributes: [
        /// The last handled stanza.
        h: Required<u32> = "h",
    ]
);

impl A {
    /// Generates a new `<a/>` element.
    pub fn new(h: u32) -> A {
        A { h }
    }
}

generate_attribute!(
    /// Whether to allow resumption of a previous stream.
    ResumeAttr,
    "resume",
    bool
);

generate_element!(
    /// Client request for enabling stream management.
    #[derive(Default)]
    Enable, "enable", SM,
    attributes: [
        /// The preferred resumption time in seconds by the client.
        max: Option<u32> = "max",

        /// Whether the client wants to be allowed to resume the stream.
        resume: Default<ResumeAttr> = "resume",
    ]
);

impl Enable {
    /// Generates a new `<enable/>` element.
    pub fn new() -> Self {
        Enable::default()
    }

    /// Sets the preferred resumption time in seconds.
    pub fn with_max(mut self, max: u32) -> Self {
        self.max = Some(max);
        self
    }

    /// Asks for resumption to be possible.
    pub fn with_resume(mut self) -> Self {
        self.resume = ResumeAttr::True;
        self
    }
}

generate_element!(
    /// Server response once stream management is enabled.
    Enabled, "enabled", SM,
    attributes: [
        /// A random identifier used for stream resumption.
        id: Option<String> = "id",

        /// The preferred IP, domain, IP:port or domain:port location for
        /// resumption.
        location: Option<String> = "location",

        /// The preferred resumption time in seconds by the server.
        max: Option<u32> = "max",

        /// Whether stream resumption is allowed.
        resume: Default<ResumeAttr> = "resume",
    ]
);

generate_element_enum!(
    /// The stanza error condition explaining a stream management failure.
    ErrorCondition, "condition", XMPP_STANZAS, {
        /// The sender has sent a stanza containing XML that does not conform
        /// to the appropriate schema or that cannot be processed.
        BadRequest => "bad-request",
        /// Access cannot be granted because an existing resource exists with
        /// the same name or address.
        Conflict => "conflict",
        /// The feature represented in the XML stanza is not implemented by
        /// the intended recipient or an intermediate server.
        FeatureNotImplemented => "feature-not-implemented",
        /// The requesting entity does not possess the necessary permissions.
        Forbidden => "forbidden",
        /// The recipient or server can no longer be contacted at this address.
        Gone => "gone",
        /// The server has experienced a misconfiguration or other internal
        /// error.
        InternalServerError => "internal-server-error",
        /// The addressed JID or item requested cannot be found; for stream
        /// management, the session to resume is unknown or has expired.
        ItemNotFound => "item-not-found",
        /// The sending entity has provided an XMPP address that violates the
        /// rules of the address format.
        JidMalformed => "jid-malformed",
        /// The recipient or server understands the request but cannot process
        /// it.
        NotAcceptable => "not-acceptable",
        /// The recipient or server does not allow any entity to perform the
        /// action.
        NotAllowed => "not-allowed",
        /// The sender needs to provide valid credentials first.
        NotAuthorized => "not-authorized",
        /// The entity has violated some local service policy.
        PolicyViolation => "policy-violation",
        /// The intended recipient is temporarily unavailable.
        RecipientUnavailable => "recipient-unavailable",
        /// The recipient or server is redirecting requests for this
        /// information to another entity.
        Redirect => "redirect",
        /// The requesting entity is not authorized to access the requested
        /// service because prior registration is necessary.
        RegistrationRequired => "registration-required",
        /// A remote server or service specified as part or all of the JID of
        /// the intended recipient does not exist or cannot be resolved.
        RemoteServerNotFound => "remote-server-not-found",
        /// A remote server or service could not be contacted within a
        /// reasonable amount of time.
        RemoteServerTimeout => "remote-server-timeout",
        /// The server or recipient is busy or lacks the system resources
        /// necessary to service the request.
        ResourceConstraint => "resource-constraint",
        /// The server or recipient does not currently provide the requested
        /// service.
        ServiceUnavailable => "service-unavailable",
        /// The requesting entity is not authorized to access the requested
        /// service because a prior subscription is necessary.
        SubscriptionRequired => "subscription-required",
        /// The error condition is not one of those defined by the other
        /// conditions in this list.
        UndefinedCondition => "undefined-condition",
        /// The recipient or server understood the request but was not
        /// expecting it at this time; for stream management, the request
        /// came before authentication or twice.
        UnexpectedRequest => "unexpected-request",
    }
);

/// Either enabling or resuming stream management failed.
#[derive(Debug, Clone, PartialEq)]
pub struct Failed {
    /// The last handled stanza.
    pub h: Option<u32>,

    /// The error returned.
    pub error: Option<ErrorCondition>,
}

impl TryFrom<Element> for Failed {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Failed, Error> {
        check_self!(elem, "failed", SM);
        check_no_unknown_attributes!(elem, "failed", ["h"]);
        let h = get_attr!(elem, "h", Option);
        let mut error = None;
        for child in elem.children() {
            if error.is_some() {
                return Err(Error::ParseError(
                    "More than one error condition in failed element.",
                ));
            }
            error = Some(ErrorCondition::try_from(child.clone())?);
        }
        Ok(Failed { h, error })
    }
}

impl From<Failed> for Element {
    fn from(failed: Failed) -> Element {
        Element::builder("failed", ns::SM)
            .attr("h", failed.h)
            .append_all(failed.error.map(Element::from))
            .build()
    }
}

generate_empty_element!(
    /// Requests the currently received stanzas by the other party.
    R,
    "r",
    SM
);

generate_element!(
    /// Requests a stream resumption.
    Resume, "resume", SM,
    attributes: [
        /// The last handled stanza.
        h: Required<u32> = "h",

        /// The previous id given by the server on
        /// [enabled](struct.Enabled.html).
        previd: Required<String> = "previd",
    ]
);

generate_element!(
    /// The response by the server for a successfully resumed stream.
    Resumed, "resumed", SM,
    attributes: [
        /// The last handled stanza.
        h: Required<u32> = "h",

        /// The previous id given by the server on
        /// [enabled](struct.Enabled.html).
        previd: Required<String> = "previd",
    ]
);

/// Represents availability of Stream Management in `<stream:features/>`.
///
/// Its `<optional/>` or `<required/>` children, if any, are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamManagement;

impl TryFrom<Element> for StreamManagement {
    type Error = Error;

    fn try_from(elem: Element) -> Result<StreamManagement, Error> {
        check_self!(elem, "sm", SM);
        check_no_attributes!(elem, "sm");
        Ok(StreamManagement)
    }
}

impl From<StreamManagement> for Element {
    fn from(_: StreamManagement) -> Element {
        Element::builder("sm", ns::SM).build()
    }
}

/// Any of the stream management elements a server may send outside of stream negotiation.
#[derive(Debug, Clone, PartialEq)]
pub enum Nonza {
    /// Stream management got enabled.
    Enabled(Enabled),
    /// The stream got resumed.
    Resumed(Resumed),
    /// Enabling or resuming failed.
    Failed(Failed),
    /// The peer acknowledges stanzas.
    Ack(A),
    /// The peer asks for an acknowledgement.
    Req(R),
}

impl TryFrom<Element> for Nonza {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Nonza, Error> {
        if !elem.has_ns(ns::SM) {
            return Err(Error::ParseError("This is not a stream management element."));
        }
        Ok(match elem.name() {
            "enabled" => Nonza::Enabled(Enabled::try_from(elem)?),
            "resumed" => Nonza::Resumed(Resumed::try_from(elem)?),
            "failed" => Nonza::Failed(Failed::try_from(elem)?),
            "a" => Nonza::Ack(A::try_from(elem)?),
            "r" => Nonza::Req(R::try_from(elem)?),
            _ => return Err(Error::ParseError("Unknown stream management element.")),
        })
    }
}

impl From<Nonza> for Element {
    fn from(nonza: Nonza) -> Element {
        match nonza {
            Nonza::Enabled(enabled) => enabled.into(),
            Nonza::Resumed(resumed) => resumed.into(),
            Nonza::Failed(failed) => failed.into(),
            Nonza::Ack(a) => a.into(),
            Nonza::Req(r) => r.into(),
        }
    }
}

/// The outcome of a stream management request made inline, during SASL2 or Bind 2.
#[derive(Debug, Clone, PartialEq)]
pub enum InlineOutcome {
    /// Stream management got enabled along with resource binding.
    Enabled(Enabled),
    /// The previous session got resumed along with authentication.
    Resumed(Resumed),
    /// The inline request failed.
    Failed(Failed),
}

impl InlineOutcome {
    /// Picks the stream management outcome out of the children of `elem`, if there is one.
    pub fn find(elem: &Element) -> Result<Option<InlineOutcome>, Error> {
        for child in elem.children() {
            if !child.has_ns(ns::SM) {
                continue;
            }
            return Ok(Some(match child.name() {
                "enabled" => InlineOutcome::Enabled(Enabled::try_from(child.clone())?),
                "resumed" => InlineOutcome::Resumed(Resumed::try_from(child.clone())?),
                "failed" => InlineOutcome::Failed(Failed::try_from(child.clone())?),
                _ => return Err(Error::ParseError("Unexpected stream management element.")),
            }));
        }
        Ok(None)
    }
}

impl From<InlineOutcome> for Element {
    fn from(outcome: InlineOutcome) -> Element {
        match outcome {
            InlineOutcome::Enabled(enabled) => enabled.into(),
            InlineOutcome::Resumed(resumed) => resumed.into(),
            InlineOutcome::Failed(failed) => failed.into(),
        }
    }
}
