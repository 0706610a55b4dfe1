//! Stream management (XEP-0198) bookkeeping
//!
//! [`StreamManagement`] doesn't do any I/O: it gets told about every stanza sent and received
//! and about the stream management nonzas coming from the server, and answers with what needs
//! to go out next. A session outlives the transport it was negotiated on, so that it can be
//! handed to the next connection for resumption.

use log::{debug, warn};
use std::collections::VecDeque;
use xmpp_parsers::sm::{
    Enable, Enabled, Failed, InlineOutcome, Nonza, Resume, ResumeAttr, Resumed, A, R,
};

use crate::config::{AckRequestPolicy, StreamManagementConfig};
use crate::error::StreamManagementError;
use crate::xmpp_codec::Packet;

/// Where the session stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Nothing negotiated, nothing counted
    Disabled,
    /// `<enable/>` sent, waiting for `<enabled/>` or `<failed/>`
    Negotiating,
    /// Counting stanzas in both directions
    Enabled,
    /// `<resume/>` sent, waiting for `<resumed/>` or `<failed/>`
    Resuming,
}

/// Notable changes of a stream management session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamManagementEvent {
    /// The server enabled stream management
    Enabled {
        /// Can this session be resumed later on?
        resumable: bool,
    },
    /// The server handled every stanza up to this one
    Acknowledged(u32),
    /// The previous session got resumed
    Resumed {
        /// How many stanzas the server missed and got sent again
        replayed: usize,
    },
    /// The previous session is gone, along with whatever it didn't get acknowledged
    ResumptionFailed,
}

/// Whether `a` comes before `b` or is `b`, comparing the way 32-bit serial numbers wrap around.
fn precedes_or_equals(a: u32, b: u32) -> bool {
    b.wrapping_sub(a) < 1 << 31
}

/// Stream management session
#[derive(Debug, Clone)]
pub struct StreamManagement {
    config: StreamManagementConfig,
    state: State,
    /// Number of the last stanza sent
    outgoing: u32,
    /// Number of stanzas received
    incoming: u32,
    /// Sent but not acknowledged yet, oldest first, with their contiguous numbers
    unacked: VecDeque<(u32, Vec<u8>)>,
    resumption_id: Option<String>,
    location: Option<String>,
    max: Option<u32>,
    preserve_counters: bool,
    sent_since_request: u32,
    events: VecDeque<StreamManagementEvent>,
}

impl StreamManagement {
    /// A disabled session
    pub fn new(config: StreamManagementConfig) -> Self {
        StreamManagement {
            config,
            state: State::Disabled,
            outgoing: 0,
            incoming: 0,
            unacked: VecDeque::new(),
            resumption_id: None,
            location: None,
            max: None,
            preserve_counters: false,
            sent_since_request: 0,
            events: VecDeque::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> State {
        self.state
    }

    /// Is stream management enabled?
    pub fn is_enabled(&self) -> bool {
        self.state == State::Enabled
    }

    /// Number of the last stanza sent
    pub fn outgoing(&self) -> u32 {
        self.outgoing
    }

    /// Number of stanzas received
    pub fn incoming(&self) -> u32 {
        self.incoming
    }

    /// Stanzas the server hasn't acknowledged yet, oldest first
    pub fn unacked(&self) -> impl Iterator<Item = (u32, &[u8])> + '_ {
        self.unacked
            .iter()
            .map(|(seq, bytes)| (*seq, bytes.as_slice()))
    }

    /// How many stanzas the server hasn't acknowledged yet
    pub fn unacked_len(&self) -> usize {
        self.unacked.len()
    }

    /// Identifier to resume this session with
    pub fn resumption_id(&self) -> Option<&str> {
        self.resumption_id.as_deref()
    }

    /// Where the server would like us to reconnect for resumption
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// How long the server keeps the session around, in seconds
    pub fn max(&self) -> Option<u32> {
        self.max
    }

    /// Could this session be resumed on a new stream?
    pub fn can_resume(&self) -> bool {
        self.state == State::Enabled && self.resumption_id.is_some()
    }

    /// Forgets everything about the session, including what wasn't acknowledged.
    pub fn reset(&mut self) {
        self.state = State::Disabled;
        self.outgoing = 0;
        self.incoming = 0;
        self.unacked.clear();
        self.resumption_id = None;
        self.location = None;
        self.max = None;
        self.preserve_counters = false;
        self.sent_since_request = 0;
    }

    /// Drains the events that happened since the last call.
    pub fn take_events(&mut self) -> Vec<StreamManagementEvent> {
        self.events.drain(..).collect()
    }

    /// Builds the `<enable/>` request, counters start over once enabled.
    pub fn enable(&mut self, request_resume: bool) -> Result<Enable, StreamManagementError> {
        self.start_enabling(request_resume, false)
    }

    /// Builds the `<enable/>` request, counting on from the current numbers once enabled.
    pub fn enable_preserving_counters(
        &mut self,
        request_resume: bool,
    ) -> Result<Enable, StreamManagementError> {
        self.start_enabling(request_resume, true)
    }

    fn start_enabling(
        &mut self,
        request_resume: bool,
        preserve_counters: bool,
    ) -> Result<Enable, StreamManagementError> {
        match self.state {
            State::Disabled | State::Enabled => (),
            State::Negotiating | State::Resuming => {
                return Err(StreamManagementError::InvalidState)
            }
        }
        self.state = State::Negotiating;
        self.preserve_counters = preserve_counters;

        let mut enable = Enable::new();
        if let Some(max) = self.config.max {
            enable = enable.with_max(max);
        }
        if request_resume {
            enable = enable.with_resume();
        }
        debug!("Enabling stream management (resume: {})", request_resume);
        Ok(enable)
    }

    /// Handles `<enabled/>`.
    ///
    /// Whatever a previous session left unacknowledged gets numbered anew and returned, to be
    /// sent again on this stream.
    pub fn handle_enabled(
        &mut self,
        enabled: Enabled,
    ) -> Result<Vec<Vec<u8>>, StreamManagementError> {
        if self.state != State::Negotiating {
            return Err(StreamManagementError::InvalidState);
        }
        self.state = State::Enabled;
        self.resumption_id = enabled.id.filter(|_| enabled.resume == ResumeAttr::True);
        self.location = enabled.location;
        self.max = enabled.max;
        if !self.preserve_counters {
            self.outgoing = 0;
            self.incoming = 0;
        }
        self.preserve_counters = false;
        self.sent_since_request = 0;

        let pending: Vec<Vec<u8>> = self.unacked.drain(..).map(|(_, bytes)| bytes).collect();
        for bytes in &pending {
            self.outgoing = self.outgoing.wrapping_add(1);
            self.unacked.push_back((self.outgoing, bytes.clone()));
        }

        let resumable = self.resumption_id.is_some();
        debug!("Stream management enabled (resumable: {})", resumable);
        self.events
            .push_back(StreamManagementEvent::Enabled { resumable });
        Ok(pending)
    }

    /// Handles `<failed/>` in answer to `<enable/>`, and returns the error to report.
    pub fn handle_enable_failed(&mut self, failed: Failed) -> StreamManagementError {
        if self.state != State::Negotiating {
            return StreamManagementError::InvalidState;
        }
        warn!("Server refused to enable stream management: {:?}", failed.error);
        self.reset();
        StreamManagementError::EnableRejected(failed.error)
    }

    /// Records a stanza about to be sent, in its serialised form.
    ///
    /// Returns the `<r/>` to send right after it, if acknowledgement should be requested now.
    pub fn on_stanza_sent(&mut self, bytes: Vec<u8>) -> Option<R> {
        if self.state != State::Enabled {
            return None;
        }
        self.outgoing = self.outgoing.wrapping_add(1);
        self.unacked.push_back((self.outgoing, bytes));

        match self.config.ack_policy {
            AckRequestPolicy::Never => None,
            AckRequestPolicy::Always => Some(R),
            AckRequestPolicy::Every(count) => {
                self.sent_since_request += 1;
                if self.sent_since_request >= count.max(1) {
                    self.sent_since_request = 0;
                    Some(R)
                } else {
                    None
                }
            }
        }
    }

    /// Handles `<a h='…'/>`.
    ///
    /// An acknowledgement of stanzas never sent is reported and otherwise ignored.
    pub fn on_ack_received(&mut self, h: u32) -> Result<(), StreamManagementError> {
        if self.state != State::Enabled {
            return Err(StreamManagementError::InvalidState);
        }
        if !precedes_or_equals(h, self.outgoing) {
            warn!(
                "Server acknowledged {} stanzas but only {} were sent",
                h, self.outgoing
            );
            return Err(StreamManagementError::SequenceViolation {
                acked: h,
                sent: self.outgoing,
            });
        }
        if self.drop_acknowledged(h) > 0 {
            self.events
                .push_back(StreamManagementEvent::Acknowledged(h));
        }
        Ok(())
    }

    fn drop_acknowledged(&mut self, h: u32) -> usize {
        let mut dropped = 0;
        while let Some((seq, _)) = self.unacked.front() {
            if !precedes_or_equals(*seq, h) {
                break;
            }
            self.unacked.pop_front();
            dropped += 1;
        }
        dropped
    }

    /// Counts a stanza received from the server.
    pub fn on_stanza_received(&mut self) {
        if self.state == State::Enabled {
            self.incoming = self.incoming.wrapping_add(1);
        }
    }

    /// Answers `<r/>`.
    pub fn on_ack_request_received(&self) -> A {
        A::new(self.incoming)
    }

    /// Builds the `<resume/>` request, if there is a session to resume.
    pub fn resume(&mut self) -> Option<Resume> {
        if !self.can_resume() {
            return None;
        }
        let previd = self.resumption_id.clone()?;
        self.state = State::Resuming;
        debug!("Resuming stream management session {}", previd);
        Some(Resume {
            h: self.incoming,
            previd,
        })
    }

    /// Handles `<resumed/>`, and returns the stanzas to send again, oldest first.
    pub fn handle_resumed(
        &mut self,
        resumed: Resumed,
    ) -> Result<Vec<Vec<u8>>, StreamManagementError> {
        if self.state != State::Resuming {
            return Err(StreamManagementError::InvalidState);
        }
        if self.resumption_id.as_deref() != Some(resumed.previd.as_str()) {
            debug!(
                "Server resumed {} instead of {:?}",
                resumed.previd, self.resumption_id
            );
        }

        let oldest_acked = self.outgoing.wrapping_sub(self.unacked.len() as u32);
        if !precedes_or_equals(oldest_acked, resumed.h)
            || !precedes_or_equals(resumed.h, self.outgoing)
        {
            warn!(
                "Server resumed at {} but the unacknowledged stanzas run from {} to {}",
                resumed.h,
                oldest_acked.wrapping_add(1),
                self.outgoing
            );
            let sent = self.outgoing;
            self.reset();
            self.events
                .push_back(StreamManagementEvent::ResumptionFailed);
            return Err(StreamManagementError::SequenceViolation {
                acked: resumed.h,
                sent,
            });
        }

        self.drop_acknowledged(resumed.h);
        self.state = State::Enabled;
        self.sent_since_request = 0;
        let replay: Vec<Vec<u8>> = self
            .unacked
            .iter()
            .map(|(_, bytes)| bytes.clone())
            .collect();
        debug!("Session resumed, sending {} stanzas again", replay.len());
        self.events.push_back(StreamManagementEvent::Resumed {
            replayed: replay.len(),
        });
        Ok(replay)
    }

    /// Handles `<failed/>` in answer to `<resume/>`, and returns the error to report.
    pub fn handle_resume_failed(&mut self, failed: Failed) -> StreamManagementError {
        if self.state != State::Resuming {
            return StreamManagementError::InvalidState;
        }
        warn!("Server refused to resume the session: {:?}", failed.error);
        self.reset();
        self.events
            .push_back(StreamManagementEvent::ResumptionFailed);
        StreamManagementError::ResumptionRejected(failed.error)
    }

    /// Handles any stream management nonza, returning what should be sent in response.
    pub fn handle_nonza(&mut self, nonza: Nonza) -> Result<Vec<Packet>, StreamManagementError> {
        match nonza {
            Nonza::Enabled(enabled) => Ok(into_packets(self.handle_enabled(enabled)?)),
            Nonza::Resumed(resumed) => Ok(into_packets(self.handle_resumed(resumed)?)),
            Nonza::Failed(failed) => Err(match self.state {
                State::Negotiating => self.handle_enable_failed(failed),
                State::Resuming => self.handle_resume_failed(failed),
                State::Disabled | State::Enabled => StreamManagementError::InvalidState,
            }),
            Nonza::Ack(a) => {
                if let Err(e) = self.on_ack_received(a.h) {
                    debug!("Ignoring acknowledgement: {}", e);
                }
                Ok(Vec::new())
            }
            Nonza::Req(_) => Ok(vec![Packet::Stanza(
                self.on_ack_request_received().into(),
            )]),
        }
    }

    /// Handles the outcome of an inline request made along with SASL2 or Bind 2.
    pub fn handle_inline(
        &mut self,
        outcome: InlineOutcome,
    ) -> Result<Vec<Packet>, StreamManagementError> {
        self.handle_nonza(match outcome {
            InlineOutcome::Enabled(enabled) => Nonza::Enabled(enabled),
            InlineOutcome::Resumed(resumed) => Nonza::Resumed(resumed),
            InlineOutcome::Failed(failed) => Nonza::Failed(failed),
        })
    }
}

fn into_packets(replay: Vec<Vec<u8>>) -> Vec<Packet> {
    replay.into_iter().map(Packet::Raw).collect()
}
