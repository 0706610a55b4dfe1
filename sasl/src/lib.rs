#![deny(unsafe_code, bare_trait_objects)]
#![warn(missing_docs)]

//! This crate provides a framework for SASL authentication and the mechanisms an XMPP client or
//! server negotiates: ANONYMOUS, PLAIN, DIGEST-MD5, the SCRAM family and a few provider-specific
//! bearer token mechanisms.
//!
//! Every mechanism is a small state machine which consumes the peer's payloads one round trip at
//! a time. A fresh instance is needed for every authentication attempt.
//!
//! # Examples
//!
//! ```rust
//! use sasl::client::mechanisms::Plain;
//! use sasl::client::Mechanism;
//! use sasl::common::nonce::OsNonce;
//! use sasl::common::Credentials;
//!
//! let creds = Credentials::default()
//!     .with_username("user")
//!     .with_password("pencil");
//!
//! let mut mechanism = Plain::from_credentials(&creds, &mut OsNonce).unwrap();
//!
//! let initial_data = mechanism.initial().unwrap();
//!
//! assert_eq!(initial_data, b"\0user\0pencil");
//! ```
//!
//! Picking the mechanism to use out of what a server offers goes through the registry:
//!
//! ```rust
//! use sasl::client::registry;
//!
//! let offered = ["PLAIN", "SCRAM-SHA-1"];
//! let chosen = registry::select(registry::available_mechanisms().iter().copied(), &offered);
//! assert_eq!(chosen, Some("SCRAM-SHA-1"));
//! ```
//!
//! You may look at the tests of `client/mechanisms/scram.rs` for examples of more advanced usage.

pub mod client;
pub mod common;
pub mod server;
