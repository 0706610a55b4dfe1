// Copyright (c) 2024 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::carbons;
use crate::csi;
use crate::ns;
use crate::sm;
use crate::util::error::Error;
use crate::Element;
use std::convert::TryFrom;

/// Represents the `<bind/>` element advertised inside the SASL2 `<inline/>` feature list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindFeature {
    /// The namespaces of the features which can be negotiated inline with resource binding.
    pub inline_features: Vec<String>,
}

impl BindFeature {
    /// Whether `namespace` can be negotiated inline with resource binding.
    pub fn supports(&self, namespace: &str) -> bool {
        self.inline_features.iter().any(|var| var == namespace)
    }
}

impl TryFrom<Element> for BindFeature {
    type Error = Error;

    fn try_from(elem: Element) -> Result<BindFeature, Error> {
        check_self!(elem, "bind", BIND2);
        check_no_attributes!(elem, "bind");
        let mut inline_features: Vec<String> = Vec::new();
        for child in elem.children() {
            if !child.is("inline", ns::BIND2) {
                continue;
            }
            for feature in child.children() {
                if !feature.is("feature", ns::BIND2) {
                    continue;
                }
                inline_features.push(get_attr!(feature, "var", Required));
            }
        }
        Ok(BindFeature { inline_features })
    }
}

impl From<BindFeature> for Element {
    fn from(feature: BindFeature) -> Element {
        let inline = Element::builder("inline", ns::BIND2)
            .append_all(feature.inline_features.into_iter().map(|var| {
                Element::builder("feature", ns::BIND2)
                    .attr("var", var)
                    .build()
            }))
            .build();
        Element::builder("bind", ns::BIND2).append(inline).build()
    }
}

/// A request from the client to bind a resource as part of SASL2 authentication.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindRequest {
    /// A tag identifying the client software, used by the server to build the resource.
    pub tag: Option<String>,

    /// Whether to mark the session inactive right away (XEP-0352).
    pub inactive: bool,

    /// Whether to enable message carbons (XEP-0280).
    pub carbons: bool,

    /// Whether to enable stream management (XEP-0198).
    pub sm: Option<sm::Enable>,
}

impl BindRequest {
    /// Creates a bind request with a client tag.
    pub fn new<T: Into<String>>(tag: Option<T>) -> BindRequest {
        BindRequest {
            tag: tag.map(Into::into),
            ..BindRequest::default()
        }
    }
}

impl TryFrom<Element> for BindRequest {
    type Error = Error;

    fn try_from(elem: Element) -> Result<BindRequest, Error> {
        check_self!(elem, "bind", BIND2);
        check_no_attributes!(elem, "bind");
        let mut request = BindRequest::default();
        for child in elem.children() {
            if child.is("tag", ns::BIND2) {
                if request.tag.is_some() {
                    return Err(Error::ParseError("Bind must not have more than one tag."));
                }
                check_no_children!(child, "tag");
                request.tag = Some(child.text());
            } else if child.is("inactive", ns::CSI) {
                csi::Inactive::try_from(child.clone())?;
                request.inactive = true;
            } else if child.is("enable", ns::CARBONS) {
                carbons::Enable::try_from(child.clone())?;
                request.carbons = true;
            } else if child.is("enable", ns::SM) {
                request.sm = Some(sm::Enable::try_from(child.clone())?);
            } else {
                return Err(Error::ParseError("Unknown child in bind element."));
            }
        }
        Ok(request)
    }
}

impl From<BindRequest> for Element {
    fn from(request: BindRequest) -> Element {
        Element::builder("bind", ns::BIND2)
            .append_all(
                request
                    .tag
                    .map(|tag| Element::builder("tag", ns::BIND2).append(tag).build()),
            )
            .append_all(request.inactive.then(|| Element::from(csi::Inactive)))
            .append_all(request.carbons.then(|| Element::from(carbons::Enable)))
            .append_all(request.sm.map(Element::from))
            .build()
    }
}

/// The server's confirmation that a resource got bound, inside SASL2 success.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bound {
    /// The outcome of the stream management request made inline, if any.
    pub sm: Option<sm::InlineOutcome>,
}

impl TryFrom<Element> for Bound {
    type Error = Error;

    fn try_from(elem: Element) -> Result<Bound, Error> {
        check_self!(elem, "bound", BIND2);
        check_no_attributes!(elem, "bound");
        let sm = sm::InlineOutcome::find(&elem)?;
        Ok(Bound { sm })
    }
}

impl From<Bound> for Element {
    fn from(bound: Bound) -> Element {
        Element::builder("bound", ns::BIND2)
            .append_all(bound.sm.map(Element::from))
            .build()
    }
}
