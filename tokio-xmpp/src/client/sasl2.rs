//! Extensible SASL Profile (XEP-0388), with Bind 2 (XEP-0386) and inline stream management
//!
//! [`Sasl2Negotiator`] holds no transport: it produces the elements to send and digests the
//! server's answers, [`authenticate`] drives it over a stream.

use futures::SinkExt;
use log::{debug, warn};
use sasl::client::registry::Registry;
use sasl::client::{ClientMechanism, Mechanism};
use sasl::common::nonce::NonceSource;
use xmpp_parsers::bind2::BindRequest;
use xmpp_parsers::sasl::DefinedCondition;
use xmpp_parsers::sasl2::{
    Abort, Authenticate, Authentication, Response, ServerMessage, UserAgent,
};
use xmpp_parsers::sm::{InlineOutcome, Resume};
use xmpp_parsers::{ns, Element, Jid};

use super::select_mechanism;
use crate::config::Config;
use crate::error::{Error, ProtocolError};
use crate::stream_management::{State, StreamManagement};
use crate::xmpp_codec::Packet;
use crate::xmpp_stream::{next_element, XmppTransport};

/// How a SASL2 exchange ended
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    /// Logged in
    Authenticated {
        /// The authorization identifier, a full JID if a resource got bound
        jid: Jid,
        /// Did Bind 2 bind a resource?
        bound: bool,
        /// Outcome of the stream management request sent along, if any
        stream_management: Option<InlineOutcome>,
    },
    /// The server refused
    Failed {
        /// Why
        condition: DefinedCondition,
        /// Human-readable details
        text: Option<String>,
    },
    /// The server wants more tasks done, which this client doesn't know how to do
    NeedsMoreInput {
        /// The tasks offered by the server
        tasks: Vec<String>,
        /// Human-readable details
        text: Option<String>,
    },
}

/// What to do with a server message
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    /// Send this and wait for the next message
    Respond(Element),
    /// The exchange is over
    Finished(AuthOutcome),
}

/// Client side of a SASL2 exchange
#[derive(Debug)]
pub struct Sasl2Negotiator {
    mechanism: ClientMechanism,
    user_agent: Option<UserAgent>,
    bind: Option<BindRequest>,
    resume: Option<Resume>,
    finished: bool,
}

impl Sasl2Negotiator {
    /// Authenticates with `mechanism` and nothing else.
    pub fn new(mechanism: ClientMechanism) -> Self {
        Sasl2Negotiator {
            mechanism,
            user_agent: None,
            bind: None,
            resume: None,
            finished: false,
        }
    }

    /// Identifies the client.
    pub fn with_user_agent(mut self, user_agent: UserAgent) -> Self {
        self.user_agent = Some(user_agent);
        self
    }

    /// Binds a resource along with authentication.
    pub fn with_bind(mut self, bind: BindRequest) -> Self {
        self.bind = Some(bind);
        self
    }

    /// Resumes a previous stream management session along with authentication.
    pub fn with_resume(mut self, resume: Resume) -> Self {
        self.resume = Some(resume);
        self
    }

    /// Prepares everything `config` asks for and `authentication` advertises.
    ///
    /// A resumable `session` is resumed if the server can do it inline, otherwise it gets
    /// reset. Stream management is only enabled through Bind 2 when not resuming.
    pub fn from_config<N: NonceSource>(
        authentication: &Authentication,
        config: &Config,
        session: &mut StreamManagement,
        registry: &mut Registry<N>,
    ) -> Result<Self, Error> {
        let mechanism = select_mechanism(config, &authentication.mechanisms, registry)?;
        let mut negotiator = Sasl2Negotiator::new(mechanism);
        if let Some(user_agent) = &config.user_agent {
            negotiator = negotiator.with_user_agent(user_agent.clone());
        }

        let resume = if authentication.sm {
            session.resume()
        } else {
            None
        };
        if resume.is_none() && session.state() != State::Disabled {
            debug!("Dropping the previous stream management session");
            session.reset();
        }

        match (&config.bind, &authentication.bind) {
            (Some(bind_config), Some(feature)) => {
                let mut request = BindRequest::new(bind_config.tag.clone());
                request.inactive = bind_config.csi_inactive && feature.supports(ns::CSI);
                request.carbons = bind_config.carbons && feature.supports(ns::CARBONS);
                if bind_config.enable_stream_management
                    && resume.is_none()
                    && feature.supports(ns::SM)
                {
                    request.sm = Some(session.enable(config.stream_management.resume)?);
                }
                negotiator = negotiator.with_bind(request);
            }
            (Some(_), None) => debug!("Server doesn't offer Bind 2"),
            (None, _) => (),
        }

        if let Some(resume) = resume {
            negotiator = negotiator.with_resume(resume);
        }
        Ok(negotiator)
    }

    /// Name of the mechanism in use
    pub fn mechanism_name(&self) -> &str {
        self.mechanism.name()
    }

    /// The `<authenticate/>` element opening the exchange.
    pub fn authenticate(&mut self) -> Result<Element, Error> {
        let initial = self.mechanism.initial()?;
        Ok(Authenticate {
            mechanism: self.mechanism.name().to_owned(),
            initial_response: Some(initial).filter(|data| !data.is_empty()),
            user_agent: self.user_agent.clone(),
            bind: self.bind.clone(),
            sm_resume: self.resume.clone(),
        }
        .into())
    }

    /// Digests a server message.
    pub fn handle(&mut self, element: Element) -> Result<Progress, Error> {
        if self.finished {
            return Err(Error::InvalidState);
        }
        let known = ["challenge", "success", "failure", "continue"]
            .iter()
            .any(|name| element.is(*name, ns::SASL2));
        if !known {
            return Err(ProtocolError::UnexpectedElement(element.name().to_owned()).into());
        }
        let message = ServerMessage::try_from(element)?;

        match message {
            ServerMessage::Challenge(challenge) => {
                let data = self.mechanism.respond(&challenge.data)?;
                Ok(Progress::Respond(Response { data }.into()))
            }
            ServerMessage::Success(success) => {
                self.finished = true;
                self.mechanism
                    .success(success.additional_data.as_deref().unwrap_or_default())?;
                let bound = success.bound.is_some();
                let stream_management = success
                    .sm
                    .or_else(|| success.bound.and_then(|bound| bound.sm));
                debug!(
                    "Authenticated as {} with {}",
                    success.authorization_identifier,
                    self.mechanism.name()
                );
                Ok(Progress::Finished(AuthOutcome::Authenticated {
                    jid: success.authorization_identifier,
                    bound,
                    stream_management,
                }))
            }
            ServerMessage::Failure(failure) => {
                self.finished = true;
                Ok(Progress::Finished(AuthOutcome::Failed {
                    condition: failure.condition,
                    text: failure.text,
                }))
            }
            ServerMessage::Continue(cont) => {
                self.finished = true;
                warn!("Server asks for unsupported tasks: {:?}", cont.tasks);
                Ok(Progress::Finished(AuthOutcome::NeedsMoreInput {
                    tasks: cont.tasks,
                    text: cont.text,
                }))
            }
        }
    }

    /// Gives up on the exchange.
    pub fn abort<T: Into<String>>(&mut self, text: Option<T>) -> Element {
        self.finished = true;
        Abort {
            text: text.map(Into::into),
        }
        .into()
    }
}

/// Runs a SASL2 exchange over `stream`, no restart needed afterwards.
///
/// The inline stream management outcome is applied to `session` on success. Stanzas to send
/// again after a resumption come back alongside the outcome.
pub async fn authenticate<S: XmppTransport>(
    stream: &mut S,
    authentication: &Authentication,
    config: &Config,
    session: &mut StreamManagement,
) -> Result<(AuthOutcome, Vec<Packet>), Error> {
    let mut registry = Registry::new();
    authenticate_with_registry(stream, authentication, config, session, &mut registry).await
}

pub(crate) async fn authenticate_with_registry<S: XmppTransport, N: NonceSource>(
    stream: &mut S,
    authentication: &Authentication,
    config: &Config,
    session: &mut StreamManagement,
    registry: &mut Registry<N>,
) -> Result<(AuthOutcome, Vec<Packet>), Error> {
    let mut negotiator = Sasl2Negotiator::from_config(authentication, config, session, registry)?;
    debug!("Authenticating with {} over SASL2", negotiator.mechanism_name());
    stream
        .send(Packet::Stanza(negotiator.authenticate()?))
        .await?;

    let outcome = loop {
        let element = next_element(stream).await?;
        let progress = match negotiator.handle(element) {
            Ok(progress) => progress,
            Err(e) => {
                let abort = negotiator.abort(Some(e.to_string()));
                if let Err(send_error) = stream.send(Packet::Stanza(abort)).await {
                    debug!("Couldn't abort: {}", send_error);
                }
                session.reset();
                return Err(e);
            }
        };
        match progress {
            Progress::Respond(response) => stream.send(Packet::Stanza(response)).await?,
            Progress::Finished(outcome) => break outcome,
        }
    };

    let mut replay = Vec::new();
    match &outcome {
        AuthOutcome::Authenticated {
            stream_management: Some(inline),
            ..
        } => match session.handle_inline(inline.clone()) {
            Ok(packets) => replay = packets,
            Err(e) => warn!("Inline stream management failed: {}", e),
        },
        AuthOutcome::Authenticated { .. } => (),
        AuthOutcome::Failed { .. } | AuthOutcome::NeedsMoreInput { .. } => session.reset(),
    }
    if let State::Negotiating | State::Resuming = session.state() {
        debug!("Server ignored the inline stream management request");
        session.reset();
    }
    Ok((outcome, replay))
}
