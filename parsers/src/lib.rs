// Copyright (c) 2017-2023 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A crate parsing the XMPP elements used to authenticate a stream and keep it reliable:
//! SASL (RFC 6120), Extensible SASL Profile (XEP-0388), Bind 2 (XEP-0386) and Stream
//! Management (XEP-0198).
//!
//! Each element type implements `TryFrom<Element>` for parsing and converts back into an
//! `Element` with `From`.

#![warn(missing_docs)]

pub use crate::util::error::Error;
pub use jid::{self, BareJid, FullJid, Jid};
pub use minidom::Element;

/// XML namespace definitions used through XMPP.
pub mod ns;

#[macro_use]
mod util;

/// RFC 6120: Extensible Messaging and Presence Protocol (XMPP): Core, SASL negotiation.
pub mod sasl;

/// XEP-0198: Stream Management
pub mod sm;

/// XEP-0280: Message Carbons
pub mod carbons;

/// XEP-0352: Client State Indication
pub mod csi;

/// XEP-0386: Bind 2
pub mod bind2;

/// XEP-0388: Extensible SASL Profile
pub mod sasl2;
