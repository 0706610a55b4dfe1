//! Logging into a server

use log::{debug, warn};
use sasl::client::registry::Registry;
use sasl::client::ClientMechanism;
use sasl::common::nonce::NonceSource;
use tokio::io::{AsyncRead, AsyncWrite};
use xmpp_parsers::{ns, Jid};

use crate::config::Config;
use crate::error::{AuthError, Error, ProtocolError};
use crate::event::Event;
use crate::managed_stream::ManagedStream;
use crate::stream_management::{State, StreamManagement};
use crate::xmpp_stream::XMPPStream;

pub mod auth;
pub mod sasl2;

use self::sasl2::AuthOutcome;

/// Creates the most preferred mechanism of `config` which the server offers.
///
/// Mechanisms which can't be built from the credentials, say a SCRAM one without a password,
/// are skipped.
pub(crate) fn select_mechanism<N: NonceSource>(
    config: &Config,
    offered: &[String],
    registry: &mut Registry<N>,
) -> Result<ClientMechanism, Error> {
    let mut last_error = None;
    for name in &config.mechanisms {
        if !offered.contains(name) {
            continue;
        }
        match registry.create(name, &config.credentials) {
            Some(Ok(mechanism)) => return Ok(mechanism),
            Some(Err(e)) => {
                debug!("Can't use {}: {}", name, e);
                last_error = Some(e);
            }
            None => debug!("{} isn't supported", name),
        }
    }
    Err(match last_error {
        Some(e) => AuthError::Sasl(e).into(),
        None => AuthError::NoMechanism.into(),
    })
}

/// Opens a stream over `io` and logs in.
///
/// SASL2 is used when offered, binding a resource and handling stream management inline as
/// `config` asks for. Otherwise legacy SASL authenticates the stream, which then gets
/// restarted and `session` resumed if possible; no resource gets bound on that path.
///
/// Pass the session of a previous stream to resume it. The first event of the returned
/// stream is `Event::Online`.
pub async fn client_login<S: AsyncRead + AsyncWrite + Unpin>(
    io: S,
    config: &Config,
    session: Option<StreamManagement>,
) -> Result<ManagedStream<XMPPStream<S>>, Error> {
    let jid = Jid::from(config.jid.clone());
    let mut stream = XMPPStream::start(io, jid.clone(), ns::JABBER_CLIENT.to_owned()).await?;
    let mut session =
        session.unwrap_or_else(|| StreamManagement::new(config.stream_management.clone()));

    if let Some(authentication) = stream.stream_features.sasl2.clone() {
        let can_stream_management = stream.stream_features.can_stream_management();
        let (outcome, replay) =
            sasl2::authenticate(&mut stream, &authentication, config, &mut session).await?;
        let (bound_jid, bound, resumed) = match outcome {
            AuthOutcome::Authenticated {
                jid,
                bound,
                stream_management,
            } => {
                let resumed = session.is_enabled()
                    && matches!(
                        stream_management,
                        Some(xmpp_parsers::sm::InlineOutcome::Resumed(_))
                    );
                (jid, bound, resumed)
            }
            AuthOutcome::Failed { condition, text } => {
                return Err(AuthError::Fail(condition, text).into())
            }
            AuthOutcome::NeedsMoreInput { tasks, .. } => {
                return Err(AuthError::NeedsMoreInput(tasks).into())
            }
        };

        let mut managed = ManagedStream::new(stream, session);
        managed.queue_packets(replay);
        let wants_stream_management = config
            .bind
            .as_ref()
            .map_or(false, |bind| bind.enable_stream_management);
        if bound
            && wants_stream_management
            && can_stream_management
            && managed.session().state() == State::Disabled
        {
            enable_or_warn(&mut managed, config.stream_management.resume).await?;
        }
        managed.push_event(Event::Online { bound_jid, resumed });
        Ok(managed)
    } else if let Some(mechanisms) = stream.stream_features.sasl_mechanisms.clone() {
        auth::auth(&mut stream, &mechanisms, config).await?;
        let stream = stream.restart().await?;
        let can_stream_management = stream.stream_features.can_stream_management();

        let mut managed = ManagedStream::new(stream, session);
        let mut resumed = false;
        if can_stream_management && managed.session().can_resume() {
            match managed.resume().await {
                Ok(()) => resumed = true,
                Err(Error::StreamManagement(e)) => warn!("Couldn't resume the session: {}", e),
                Err(e) => return Err(e),
            }
        } else if managed.session().state() != State::Disabled {
            debug!("Dropping the previous stream management session");
            managed.session_mut().reset();
        }
        managed.push_event(Event::Online {
            bound_jid: jid,
            resumed,
        });
        Ok(managed)
    } else {
        Err(ProtocolError::UnexpectedElement(String::from("features")).into())
    }
}

async fn enable_or_warn<S: AsyncRead + AsyncWrite + Unpin>(
    managed: &mut ManagedStream<XMPPStream<S>>,
    request_resume: bool,
) -> Result<(), Error> {
    match managed.enable(request_resume).await {
        Ok(()) => Ok(()),
        Err(Error::StreamManagement(e)) => {
            warn!("Couldn't enable stream management: {}", e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BindConfig;
    use crate::stream_management::StreamManagementEvent;
    use crate::xmpp_codec::{Packet, XMPPCodec};
    use futures::{SinkExt, StreamExt};
    use sasl::common::nonce::FixedNonce;
    use sasl::common::Credentials;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
    use tokio_util::codec::Framed;
    use xmpp_parsers::BareJid;

    const HEADER: &str = "<?xml version='1.0'?><stream:stream xmlns='jabber:client' xmlns:stream='http://etherx.jabber.org/streams' version='1.0' id='s1'>";

    fn config() -> Config {
        Config::new(BareJid::new("alice@example.org").unwrap(), "secret")
    }

    struct Server {
        framed: Framed<DuplexStream, XMPPCodec>,
    }

    impl Server {
        fn new(io: DuplexStream) -> Server {
            Server {
                framed: Framed::new(io, XMPPCodec::new()),
            }
        }

        async fn open(&mut self, features: &str) {
            match self.framed.next().await {
                Some(Ok(Packet::StreamStart(_))) => (),
                other => panic!("expected a stream start, got {:?}", other),
            }
            let opening = format!("{}<stream:features>{}</stream:features>", HEADER, features);
            self.framed
                .get_mut()
                .write_all(opening.as_bytes())
                .await
                .unwrap();
        }

        /// A new stream after authentication needs a new parser.
        fn restart(self) -> Server {
            Server::new(self.framed.into_inner())
        }

        async fn expect(&mut self, name: &str) -> xmpp_parsers::Element {
            loop {
                match self.framed.next().await {
                    Some(Ok(Packet::Stanza(element))) => {
                        assert_eq!(element.name(), name);
                        return element;
                    }
                    Some(Ok(Packet::Text(_))) => continue,
                    other => panic!("expected <{}/>, got {:?}", name, other),
                }
            }
        }

        async fn send(&mut self, xml: &str) {
            self.framed
                .send(Packet::Stanza(xml.parse().unwrap()))
                .await
                .unwrap();
        }
    }

    #[test]
    fn preferences_come_first() {
        let config = config().with_mechanisms(["SCRAM-SHA-256", "PLAIN"]);
        let mut registry = Registry::with_nonce_source(FixedNonce::new("nonce"));
        let offered = vec![String::from("PLAIN"), String::from("SCRAM-SHA-256")];
        let mechanism = select_mechanism(&config, &offered, &mut registry).unwrap();
        assert_eq!(sasl::client::Mechanism::name(&mechanism), "SCRAM-SHA-256");
    }

    #[test]
    fn unusable_credentials_are_skipped() {
        let credentials = Credentials::default().with_username("alice");
        let config = Config::with_credentials(BareJid::new("alice@example.org").unwrap(), credentials)
            .with_mechanisms(["SCRAM-SHA-256", "PLAIN"]);
        let mut registry = Registry::with_nonce_source(FixedNonce::new("nonce"));

        let offered = vec![String::from("SCRAM-SHA-256")];
        let err = select_mechanism(&config, &offered, &mut registry).unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::Sasl(_))));

        let offered = vec![String::from("ANONYMOUS")];
        let err = select_mechanism(&config, &offered, &mut registry).unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::NoMechanism)));
    }

    #[tokio::test]
    async fn legacy_login() {
        let (client, server) = duplex(16384);
        let config = config().with_mechanisms(["SCRAM-SHA-256", "PLAIN"]);

        let serve = async move {
            let mut server = Server::new(server);
            server
                .open("<mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>PLAIN</mechanism></mechanisms>")
                .await;
            let auth = server.expect("auth").await;
            assert_eq!(auth.attr("mechanism"), Some("PLAIN"));
            assert_eq!(auth.text(), "AGFsaWNlAHNlY3JldA==");
            server
                .send("<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>")
                .await;

            let mut server = server.restart();
            server.open("").await;
            server
        };

        let (managed, _server) = tokio::join!(client_login(client, &config, None), serve);
        let mut managed = managed.unwrap();
        match managed.next_event().await {
            Some(Ok(Event::Online { bound_jid, resumed })) => {
                assert_eq!(bound_jid.to_string(), "alice@example.org");
                assert!(!resumed);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(managed.session().state(), State::Disabled);
    }

    #[tokio::test]
    async fn sasl2_login_with_inline_stream_management() {
        let (client, server) = duplex(16384);
        let config = config()
            .with_mechanisms(["PLAIN"])
            .with_bind(BindConfig::new("test").with_stream_management());

        let serve = async move {
            let mut server = Server::new(server);
            server
                .open("<authentication xmlns='urn:xmpp:sasl:2'><mechanism>PLAIN</mechanism><inline><bind xmlns='urn:xmpp:bind:0'><inline><feature var='urn:xmpp:sm:3'/></inline></bind></inline></authentication><sm xmlns='urn:xmpp:sm:3'/>")
                .await;
            let authenticate = server.expect("authenticate").await;
            assert!(authenticate.has_child("bind", ns::BIND2));
            server
                .send("<success xmlns='urn:xmpp:sasl:2'><authorization-identifier>alice@example.org/test.1</authorization-identifier><bound xmlns='urn:xmpp:bind:0'><enabled xmlns='urn:xmpp:sm:3' id='sm-1' resume='true'/></bound></success>")
                .await;
            server
                .send("<message xmlns='jabber:client' from='bob@example.org'><body>hi</body></message>")
                .await;
            server.send("<r xmlns='urn:xmpp:sm:3'/>").await;
            let ack = server.expect("a").await;
            assert_eq!(ack.attr("h"), Some("1"));
        };

        let login = async {
            let mut managed = client_login(client, &config, None).await.unwrap();
            let mut events = Vec::new();
            while let Some(Ok(event)) = managed.next_event().await {
                events.push(event);
            }
            (managed, events)
        };
        let ((managed, events), ()) = tokio::join!(login, serve);

        assert_eq!(events.len(), 4);
        match &events[0] {
            Event::Online { bound_jid, resumed } => {
                assert_eq!(bound_jid.to_string(), "alice@example.org/test.1");
                assert!(!resumed);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            events[1],
            Event::StreamManagement(StreamManagementEvent::Enabled { resumable: true })
        ));
        assert!(events[2].is_stanza("message"));
        assert!(matches!(events[3], Event::Disconnected(Error::Disconnected)));
        assert_eq!(managed.session().resumption_id(), Some("sm-1"));
        assert_eq!(managed.session().incoming(), 1);
    }

    #[tokio::test]
    async fn sasl2_failure() {
        let (client, server) = duplex(16384);
        let config = config().with_mechanisms(["PLAIN"]);

        let serve = async move {
            let mut server = Server::new(server);
            server
                .open("<authentication xmlns='urn:xmpp:sasl:2'><mechanism>PLAIN</mechanism></authentication>")
                .await;
            server.expect("authenticate").await;
            server
                .send("<failure xmlns='urn:xmpp:sasl:2'><not-authorized xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/></failure>")
                .await;
            server
        };

        let (result, _server) = tokio::join!(client_login(client, &config, None), serve);
        assert!(matches!(
            result,
            Err(Error::Auth(AuthError::Fail(
                xmpp_parsers::sasl::DefinedCondition::NotAuthorized,
                None
            )))
        ));
    }
}
