//! Legacy SASL authentication (RFC 6120)

use futures::{SinkExt, StreamExt};
use log::debug;
use sasl::client::registry::Registry;
use sasl::client::{ClientMechanism, Mechanism};
use sasl::common::nonce::NonceSource;
use xmpp_parsers::sasl::{Auth, Challenge, Failure, Mechanisms, Response, Success};
use xmpp_parsers::{ns, Element};

use super::select_mechanism;
use crate::config::Config;
use crate::error::{AuthError, Error, ProtocolError};
use crate::xmpp_codec::Packet;
use crate::xmpp_stream::{next_element, XmppTransport};

/// Authenticates over `stream`, which must be restarted afterwards.
pub async fn auth<S: XmppTransport>(
    stream: &mut S,
    mechanisms: &Mechanisms,
    config: &Config,
) -> Result<(), Error> {
    let mut registry = Registry::new();
    auth_with_registry(stream, mechanisms, config, &mut registry).await
}

pub(crate) async fn auth_with_registry<S: XmppTransport, N: NonceSource>(
    stream: &mut S,
    mechanisms: &Mechanisms,
    config: &Config,
    registry: &mut Registry<N>,
) -> Result<(), Error> {
    let mut mechanism = select_mechanism(config, &mechanisms.mechanisms, registry)?;
    let initial = mechanism.initial()?;
    debug!("Authenticating with {}", mechanism.name());
    stream
        .send(Packet::Stanza(
            Auth {
                mechanism: mechanism.name().to_owned(),
                data: initial,
            }
            .into(),
        ))
        .await?;

    loop {
        let element = next_element(stream).await?;
        if !element.has_ns(ns::SASL) {
            return Err(unexpected(element));
        }
        match element.name() {
            "challenge" => {
                let challenge = Challenge::try_from(element)?;
                let response = mechanism.respond(&challenge.data)?;
                stream
                    .send(Packet::Stanza(Response { data: response }.into()))
                    .await?;
            }
            "success" => {
                let success = Success::try_from(element)?;
                return finish(&mut mechanism, &success.data);
            }
            "failure" => {
                let failure = Failure::try_from(element)?;
                return Err(AuthError::Fail(failure.defined_condition, failure.text).into());
            }
            _ => return Err(unexpected(element)),
        }
    }
}

fn finish(mechanism: &mut ClientMechanism, data: &[u8]) -> Result<(), Error> {
    mechanism.success(data)?;
    debug!("Authenticated with {}", mechanism.name());
    Ok(())
}

fn unexpected(element: Element) -> Error {
    ProtocolError::UnexpectedElement(element.name().to_owned()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::Loopback;
    use sasl::common::nonce::FixedNonce;
    use sasl::common::{Identity, Password};
    use sasl::server::registry::Registry as ServerRegistry;
    use sasl::server::{Mechanism as _, Response as ServerResponse};
    use xmpp_parsers::sasl::DefinedCondition;
    use xmpp_parsers::BareJid;

    fn config() -> Config {
        Config::new(BareJid::new("alice@example.org").unwrap(), "secret")
    }

    fn offered(names: &[&str]) -> Mechanisms {
        Mechanisms {
            mechanisms: names.iter().map(|name| String::from(*name)).collect(),
        }
    }

    async fn expect(server: &mut Loopback) -> Element {
        match server.next().await {
            Some(Ok(Packet::Stanza(element))) => element,
            other => panic!("expected an element, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn plain_fallback() {
        let (mut client, mut server) = Loopback::pair();
        let config = config().with_mechanisms(["SCRAM-SHA-256", "PLAIN"]);
        server
            .send(Packet::Stanza(Success { data: vec![] }.into()))
            .await
            .unwrap();

        auth(&mut client, &offered(&["PLAIN"]), &config)
            .await
            .unwrap();

        let auth = Auth::try_from(expect(&mut server).await).unwrap();
        assert_eq!(auth.mechanism, "PLAIN");
        assert_eq!(auth.data, b"\0alice\0secret");
    }

    #[tokio::test]
    async fn no_common_mechanism() {
        let (mut client, _server) = Loopback::pair();
        let config = config().with_mechanisms(["SCRAM-SHA-256"]);
        let err = auth(&mut client, &offered(&["PLAIN", "DIGEST-MD5"]), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::NoMechanism)));
    }

    #[tokio::test]
    async fn failure() {
        let (mut client, mut server) = Loopback::pair();
        server
            .send(Packet::Stanza(
                "<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><not-authorized/><text>Wrong password</text></failure>"
                    .parse()
                    .unwrap(),
            ))
            .await
            .unwrap();
        let err = auth(&mut client, &offered(&["PLAIN"]), &config())
            .await
            .unwrap_err();
        match err {
            Error::Auth(AuthError::Fail(condition, text)) => {
                assert_eq!(condition, DefinedCondition::NotAuthorized);
                assert_eq!(text.as_deref(), Some("Wrong password"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn scram_against_server() {
        let (mut client, mut server) = Loopback::pair();
        let config = config().with_mechanisms(["SCRAM-SHA-256"]);

        let serve = async {
            let mut mechanism = ServerRegistry::new()
                .with_scram_iterations(4096)
                .create("SCRAM-SHA-256")
                .unwrap()
                .unwrap();
            let mut payload = Auth::try_from(expect(&mut server).await).unwrap().data;
            loop {
                let response = match mechanism.respond(&payload).unwrap() {
                    ServerResponse::InputNeeded(identity) => {
                        assert_eq!(identity, Identity::from("alice"));
                        mechanism.set_password(Password::from("secret"));
                        mechanism.respond(&payload).unwrap()
                    }
                    response => response,
                };
                match response {
                    ServerResponse::Proceed(data) => {
                        server
                            .send(Packet::Stanza(Challenge { data }.into()))
                            .await
                            .unwrap();
                        payload = Response::try_from(expect(&mut server).await)
                            .unwrap()
                            .data;
                    }
                    ServerResponse::Success(identity, data) => {
                        server
                            .send(Packet::Stanza(Success { data }.into()))
                            .await
                            .unwrap();
                        return identity;
                    }
                    ServerResponse::InputNeeded(_) => panic!("asked twice for the password"),
                }
            }
        };

        let mut registry = Registry::with_nonce_source(FixedNonce::new("rOprNGfwEbeRWgbNEkqO"));
        let mechs = offered(&["PLAIN", "SCRAM-SHA-256"]);
        let (result, identity) = tokio::join!(
            auth_with_registry(&mut client, &mechs, &config, &mut registry),
            serve
        );
        result.unwrap();
        assert_eq!(identity, Identity::from("alice"));
    }

    #[tokio::test]
    async fn tampered_server_signature() {
        let (mut client, mut server) = Loopback::pair();
        let config = config().with_mechanisms(["SCRAM-SHA-1"]);

        let serve = async {
            let mut mechanism = ServerRegistry::new()
                .with_scram_iterations(4096)
                .create("SCRAM-SHA-1")
                .unwrap()
                .unwrap();
            let first = Auth::try_from(expect(&mut server).await).unwrap().data;
            mechanism.respond(&first).unwrap();
            mechanism.set_password(Password::from("secret"));
            let challenge = match mechanism.respond(&first).unwrap() {
                ServerResponse::Proceed(data) => data,
                other => panic!("unexpected {:?}", other),
            };
            server
                .send(Packet::Stanza(Challenge { data: challenge }.into()))
                .await
                .unwrap();
            expect(&mut server).await;
            server
                .send(Packet::Stanza(
                    Success {
                        data: b"v=AAAAAAAAAAAAAAAAAAAAAAAAAAA=".to_vec(),
                    }
                    .into(),
                ))
                .await
                .unwrap();
        };

        let mut registry = Registry::new();
        let mechs = offered(&["SCRAM-SHA-1"]);
        let (result, ()) = tokio::join!(
            auth_with_registry(&mut client, &mechs, &config, &mut registry),
            serve
        );
        assert!(matches!(result, Err(Error::Auth(AuthError::Sasl(_)))));
    }
}
