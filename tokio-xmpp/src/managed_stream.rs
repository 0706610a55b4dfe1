//! Stanza traffic over a transport, with stream management bookkeeping

use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use std::collections::VecDeque;
use xmpp_parsers::sm::Nonza;
use xmpp_parsers::{ns, Element};

use crate::error::{Error, StreamManagementError};
use crate::event::Event;
use crate::stream_management::{State, StreamManagement};
use crate::xmpp_codec::{serialize, Packet};
use crate::xmpp_stream::{add_stanza_id, XmppTransport};

fn is_stanza(element: &Element) -> bool {
    ["message", "presence", "iq"]
        .iter()
        .any(|name| element.is(*name, ns::JABBER_CLIENT))
}

/// A logged-in stream
///
/// Every stanza going through [`ManagedStream::send_stanza`] or coming out of
/// [`ManagedStream::next_event`] is counted by the stream management session, which answers
/// the server's acknowledgement requests and keeps what it didn't acknowledge for replay.
pub struct ManagedStream<S> {
    inner: S,
    session: StreamManagement,
    /// Sent before anything else
    outgoing: VecDeque<Packet>,
    /// Received while negotiating, not counted
    incoming: VecDeque<Element>,
    events: VecDeque<Event>,
    closed: bool,
}

impl<S: XmppTransport> ManagedStream<S> {
    /// Wraps an authenticated transport
    pub fn new(inner: S, session: StreamManagement) -> Self {
        ManagedStream {
            inner,
            session,
            outgoing: VecDeque::new(),
            incoming: VecDeque::new(),
            events: VecDeque::new(),
            closed: false,
        }
    }

    /// The stream management session
    pub fn session(&self) -> &StreamManagement {
        &self.session
    }

    /// Get a reference to the transport
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Get a mutable reference to the transport
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Keeps the session, to resume it over another connection.
    pub fn into_session(self) -> StreamManagement {
        self.session
    }

    /// Unwraps the transport and the session
    pub fn into_parts(self) -> (S, StreamManagement) {
        (self.inner, self.session)
    }

    pub(crate) fn session_mut(&mut self) -> &mut StreamManagement {
        &mut self.session
    }

    pub(crate) fn push_event(&mut self, event: Event) {
        self.events.push_back(event);
    }

    pub(crate) fn queue_packets(&mut self, packets: Vec<Packet>) {
        self.outgoing.extend(packets);
    }

    async fn flush_queue(&mut self) -> Result<(), Error> {
        if self.outgoing.is_empty() {
            return Ok(());
        }
        while let Some(packet) = self.outgoing.pop_front() {
            self.inner.feed(packet).await?;
        }
        self.inner.flush().await
    }

    /// Send a stanza, then `<r/>` if the acknowledgement policy says so.
    ///
    /// The stanza is kept for replay before it hits the wire, so it survives a failed write.
    pub async fn send_stanza(&mut self, stanza: Element) -> Result<(), Error> {
        self.flush_queue().await?;
        let stanza = add_stanza_id(stanza, ns::JABBER_CLIENT);
        let request = self.session.on_stanza_sent(serialize(&stanza)?);
        self.inner.feed(Packet::Stanza(stanza)).await?;
        if let Some(request) = request {
            self.inner.feed(Packet::Stanza(request.into())).await?;
        }
        self.inner.flush().await
    }

    /// Ask the server which stanzas it handled.
    pub async fn request_ack(&mut self) -> Result<(), Error> {
        if !self.session.is_enabled() {
            return Err(StreamManagementError::InvalidState.into());
        }
        self.flush_queue().await?;
        self.inner
            .send(Packet::Stanza(xmpp_parsers::sm::R.into()))
            .await
    }

    /// End connection by sending `</stream:stream>`
    pub async fn send_end(&mut self) -> Result<(), Error> {
        self.flush_queue().await?;
        self.inner.send(Packet::StreamEnd).await
    }

    fn handle_nonza(&mut self, element: Element) -> Result<(), Error> {
        let nonza = Nonza::try_from(element)?;
        let packets = self.session.handle_nonza(nonza)?;
        self.outgoing.extend(packets);
        Ok(())
    }

    /// Waits for the next event.
    ///
    /// Stream management nonzas are handled on the way and never show up. Once the stream
    /// is gone a single `Event::Disconnected` comes out, then `None`.
    pub async fn next_event(&mut self) -> Option<Result<Event, Error>> {
        loop {
            self.events.extend(
                self.session
                    .take_events()
                    .into_iter()
                    .map(Event::StreamManagement),
            );
            if let Some(event) = self.events.pop_front() {
                return Some(Ok(event));
            }
            if let Some(stanza) = self.incoming.pop_front() {
                return Some(Ok(Event::Stanza(stanza)));
            }
            if self.closed {
                return None;
            }
            if let Err(e) = self.flush_queue().await {
                self.closed = true;
                return Some(Ok(Event::Disconnected(e)));
            }

            match self.inner.next().await {
                Some(Ok(Packet::Stanza(element))) => {
                    if element.has_ns(ns::SM) {
                        if let Err(e) = self.handle_nonza(element) {
                            return Some(Err(e));
                        }
                        continue;
                    }
                    if is_stanza(&element) {
                        self.session.on_stanza_received();
                    }
                    return Some(Ok(Event::Stanza(element)));
                }
                Some(Ok(Packet::StreamEnd)) | None => {
                    self.closed = true;
                    return Some(Ok(Event::Disconnected(Error::Disconnected)));
                }
                Some(Err(e)) => {
                    self.closed = true;
                    return Some(Ok(Event::Disconnected(e)));
                }
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Runs stream management nonzas until the session isn't negotiating anymore.
    async fn negotiate(&mut self) -> Result<(), Error> {
        while let State::Negotiating | State::Resuming = self.session.state() {
            match self.inner.next().await {
                Some(Ok(Packet::Stanza(element))) => {
                    if element.has_ns(ns::SM) {
                        self.handle_nonza(element)?;
                    } else {
                        debug!("Keeping {} for later", element.name());
                        self.incoming.push_back(element);
                    }
                }
                Some(Ok(Packet::StreamEnd)) | None => return Err(Error::Disconnected),
                Some(Err(e)) => return Err(e),
                Some(Ok(_)) => (),
            }
        }
        self.flush_queue().await
    }

    /// Enables stream management on this stream.
    pub async fn enable(&mut self, request_resume: bool) -> Result<(), Error> {
        let enable = self.session.enable(request_resume)?;
        self.flush_queue().await?;
        self.inner.send(Packet::Stanza(enable.into())).await?;
        self.negotiate().await
    }

    /// Resumes the session on this fresh stream, then sends again what the server missed.
    pub async fn resume(&mut self) -> Result<(), Error> {
        let resume = self
            .session
            .resume()
            .ok_or(StreamManagementError::NotResumable)?;
        self.inner.send(Packet::Stanza(resume.into())).await?;
        if let Err(e) = self.negotiate().await {
            if self.session.state() == State::Resuming {
                warn!("Lost the stream while resuming: {}", e);
                self.session.reset();
            }
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AckRequestPolicy, StreamManagementConfig};
    use crate::stream_management::StreamManagementEvent;
    use crate::test_util::Loopback;
    use xmpp_parsers::sm::{ErrorCondition, A};

    fn message(body: &str) -> Element {
        format!(
            "<message xmlns='jabber:client' to='romeo@montague.lit' id='{}'><body>{}</body></message>",
            body, body
        )
        .parse()
        .unwrap()
    }

    fn sm(element: &str) -> Packet {
        Packet::Stanza(element.parse().unwrap())
    }

    fn config(ack_policy: AckRequestPolicy) -> StreamManagementConfig {
        StreamManagementConfig {
            ack_policy,
            ..StreamManagementConfig::default()
        }
    }

    async fn enabled(
        ack_policy: AckRequestPolicy,
    ) -> (ManagedStream<Loopback>, Loopback) {
        let (client, mut server) = Loopback::pair();
        let mut stream = ManagedStream::new(client, StreamManagement::new(config(ack_policy)));
        server
            .send(sm("<enabled xmlns='urn:xmpp:sm:3' id='s1' resume='true'/>"))
            .await
            .unwrap();
        stream.enable(true).await.unwrap();
        match server.next().await {
            Some(Ok(Packet::Stanza(enable))) => {
                assert!(enable.is("enable", ns::SM));
                assert_eq!(enable.attr("resume"), Some("true"));
            }
            other => panic!("expected <enable/>, got {:?}", other),
        }
        (stream, server)
    }

    #[tokio::test]
    async fn enable_and_ack() {
        let (mut stream, mut server) = enabled(AckRequestPolicy::Always).await;
        assert!(stream.session().can_resume());

        stream.send_stanza(message("one")).await.unwrap();
        assert_eq!(server.next().await.unwrap().unwrap(), Packet::Stanza(message("one")));
        assert_eq!(server.next().await.unwrap().unwrap(), sm("<r xmlns='urn:xmpp:sm:3'/>"));

        server.send(Packet::Stanza(A::new(1).into())).await.unwrap();
        server.send(Packet::Stanza(message("hello"))).await.unwrap();

        let event = stream.next_event().await.unwrap().unwrap();
        assert!(matches!(
            event,
            Event::StreamManagement(StreamManagementEvent::Enabled { resumable: true })
        ));
        let event = stream.next_event().await.unwrap().unwrap();
        assert!(matches!(
            event,
            Event::StreamManagement(StreamManagementEvent::Acknowledged(1))
        ));
        let event = stream.next_event().await.unwrap().unwrap();
        assert_eq!(event.into_stanza(), Some(message("hello")));
        assert_eq!(stream.session().incoming(), 1);
        assert_eq!(stream.session().unacked_len(), 0);
    }

    #[tokio::test]
    async fn answers_ack_requests() {
        let (mut stream, mut server) = enabled(AckRequestPolicy::Never).await;
        server.send(Packet::Stanza(message("one"))).await.unwrap();
        server.send(Packet::Stanza(message("two"))).await.unwrap();
        server.send(sm("<r xmlns='urn:xmpp:sm:3'/>")).await.unwrap();
        server.send(Packet::StreamEnd).await.unwrap();

        let mut stanzas = 0;
        loop {
            match stream.next_event().await {
                Some(Ok(Event::Stanza(_))) => stanzas += 1,
                Some(Ok(Event::Disconnected(Error::Disconnected))) => break,
                Some(Ok(Event::StreamManagement(_))) => (),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(stanzas, 2);
        assert!(stream.next_event().await.is_none());
        assert_eq!(
            server.next().await.unwrap().unwrap(),
            sm("<a xmlns='urn:xmpp:sm:3' h='2'/>")
        );
    }

    #[tokio::test]
    async fn enable_rejected() {
        let (client, mut server) = Loopback::pair();
        let mut stream = ManagedStream::new(
            client,
            StreamManagement::new(StreamManagementConfig::default()),
        );
        server
            .send(sm("<failed xmlns='urn:xmpp:sm:3'><unexpected-request xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/></failed>"))
            .await
            .unwrap();
        let err = stream.enable(false).await.unwrap_err();
        assert!(matches!(
            err,
            Error::StreamManagement(StreamManagementError::EnableRejected(Some(
                ErrorCondition::UnexpectedRequest
            )))
        ));
        assert_eq!(stream.session().state(), State::Disabled);
    }

    #[tokio::test]
    async fn resume_on_new_stream() {
        let (mut stream, mut server) = enabled(AckRequestPolicy::Never).await;
        for body in ["one", "two", "three"] {
            stream.send_stanza(message(body)).await.unwrap();
            server.next().await.unwrap().unwrap();
        }
        server.send(Packet::Stanza(A::new(1).into())).await.unwrap();
        server.send(Packet::Stanza(message("hello"))).await.unwrap();
        while let Some(Ok(event)) = stream.next_event().await {
            if event.is_stanza("message") {
                break;
            }
        }
        let session = stream.into_session();
        assert_eq!(session.unacked_len(), 2);

        let (client, mut server) = Loopback::pair();
        let mut stream = ManagedStream::new(client, session);
        server
            .send(sm("<resumed xmlns='urn:xmpp:sm:3' previd='s1' h='2'/>"))
            .await
            .unwrap();
        stream.resume().await.unwrap();

        assert_eq!(
            server.next().await.unwrap().unwrap(),
            sm("<resume xmlns='urn:xmpp:sm:3' h='1' previd='s1'/>")
        );
        assert_eq!(
            server.next().await.unwrap().unwrap(),
            Packet::Raw(serialize(&message("three")).unwrap())
        );
        assert_eq!(stream.session().unacked_len(), 1);

        stream.send_stanza(message("four")).await.unwrap();
        assert_eq!(
            server.next().await.unwrap().unwrap(),
            Packet::Stanza(message("four"))
        );
        assert_eq!(stream.session().outgoing(), 4);
    }

    #[tokio::test]
    async fn resume_rejected() {
        let (mut stream, _server) = enabled(AckRequestPolicy::Never).await;
        stream.send_stanza(message("one")).await.unwrap();
        let session = stream.into_session();

        let (client, mut server) = Loopback::pair();
        let mut stream = ManagedStream::new(client, session);
        server
            .send(sm("<failed xmlns='urn:xmpp:sm:3' h='0'><item-not-found xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/></failed>"))
            .await
            .unwrap();
        let err = stream.resume().await.unwrap_err();
        assert!(matches!(
            err,
            Error::StreamManagement(StreamManagementError::ResumptionRejected(Some(
                ErrorCondition::ItemNotFound
            )))
        ));
        assert_eq!(stream.session().state(), State::Disabled);
        assert_eq!(stream.session().unacked_len(), 0);

        let err = stream.resume().await.unwrap_err();
        assert!(matches!(
            err,
            Error::StreamManagement(StreamManagementError::NotResumable)
        ));
    }

    #[tokio::test]
    async fn nothing_counted_when_disabled() {
        let (client, mut server) = Loopback::pair();
        let mut stream = ManagedStream::new(
            client,
            StreamManagement::new(StreamManagementConfig::default()),
        );
        stream.send_stanza(message("one")).await.unwrap();
        assert_eq!(server.next().await.unwrap().unwrap(), Packet::Stanza(message("one")));
        server.send(Packet::Stanza(message("two"))).await.unwrap();
        stream.next_event().await.unwrap().unwrap();
        assert_eq!(stream.session().outgoing(), 0);
        assert_eq!(stream.session().incoming(), 0);
        assert!(stream.request_ack().await.is_err());
    }
}
