use sasl::client::MechanismError as SaslMechanismError;
use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;
use std::str::Utf8Error;
use xmpp_parsers::sasl::DefinedCondition as SaslDefinedCondition;
use xmpp_parsers::sm::ErrorCondition;
use xmpp_parsers::Error as ParsersError;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(IoError),
    /// Error parsing Jabber-Id
    Parser(minidom::Error),
    /// Protocol-level error
    Protocol(ProtocolError),
    /// Authentication error
    Auth(AuthError),
    /// Stream management error
    StreamManagement(StreamManagementError),
    /// Formatting error
    Fmt(fmt::Error),
    /// Invalid UTF-8 data
    Utf8(Utf8Error),
    /// Connection closed
    Disconnected,
    /// Should never happen
    InvalidState,
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(fmt, "IO error: {}", e),
            Error::Parser(e) => write!(fmt, "XML parse error: {}", e),
            Error::Protocol(e) => write!(fmt, "protocol error: {}", e),
            Error::Auth(e) => write!(fmt, "authentication error: {}", e),
            Error::StreamManagement(e) => write!(fmt, "stream management error: {}", e),
            Error::Fmt(e) => write!(fmt, "Fmt error: {}", e),
            Error::Utf8(e) => write!(fmt, "Utf8 error: {}", e),
            Error::Disconnected => write!(fmt, "disconnected"),
            Error::InvalidState => write!(fmt, "invalid state"),
        }
    }
}

impl StdError for Error {}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::Io(e)
    }
}

impl From<minidom::Error> for Error {
    fn from(e: minidom::Error) -> Self {
        Error::Parser(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<AuthError> for Error {
    fn from(e: AuthError) -> Self {
        Error::Auth(e)
    }
}

impl From<StreamManagementError> for Error {
    fn from(e: StreamManagementError) -> Self {
        Error::StreamManagement(e)
    }
}

impl From<fmt::Error> for Error {
    fn from(e: fmt::Error) -> Self {
        Error::Fmt(e)
    }
}

impl From<Utf8Error> for Error {
    fn from(e: Utf8Error) -> Self {
        Error::Utf8(e)
    }
}

impl From<ParsersError> for Error {
    fn from(e: ParsersError) -> Self {
        ProtocolError::Parsers(e).into()
    }
}

impl From<SaslMechanismError> for Error {
    fn from(e: SaslMechanismError) -> Self {
        AuthError::Sasl(e).into()
    }
}

/// XMPP protocol-level error
#[derive(Debug)]
pub enum ProtocolError {
    /// Error with expected stanza schema
    Parsers(ParsersError),
    /// The peer didn't open the stream as expected
    InvalidStreamStart,
    /// Encountered an unexpected XML element
    UnexpectedElement(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProtocolError::Parsers(e) => write!(fmt, "error with expected stanza schema: {}", e),
            ProtocolError::InvalidStreamStart => write!(fmt, "invalid stream start"),
            ProtocolError::UnexpectedElement(name) => {
                write!(fmt, "encountered an unexpected XML element: {}", name)
            }
        }
    }
}

impl StdError for ProtocolError {}

impl From<ParsersError> for ProtocolError {
    fn from(e: ParsersError) -> Self {
        ProtocolError::Parsers(e)
    }
}

/// Authentication error
#[derive(Debug)]
pub enum AuthError {
    /// No matching SASL mechanism available
    NoMechanism,
    /// Local SASL implementation error
    Sasl(SaslMechanismError),
    /// Failure from server
    Fail(SaslDefinedCondition, Option<String>),
    /// The server asks for more tasks before letting us in
    NeedsMoreInput(Vec<String>),
}

impl fmt::Display for AuthError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuthError::NoMechanism => write!(fmt, "no matching SASL mechanism available"),
            AuthError::Sasl(s) => write!(fmt, "local SASL implementation error: {}", s),
            AuthError::Fail(c, None) => write!(fmt, "failure from the server: {}", c.as_str()),
            AuthError::Fail(c, Some(text)) => {
                write!(fmt, "failure from the server: {} ({})", c.as_str(), text)
            }
            AuthError::NeedsMoreInput(tasks) => {
                write!(fmt, "the server requires more tasks: {}", tasks.join(", "))
            }
        }
    }
}

impl StdError for AuthError {}

/// Stream management error
#[derive(Debug, PartialEq)]
pub enum StreamManagementError {
    /// The server refused to enable stream management
    EnableRejected(Option<ErrorCondition>),
    /// The server refused to resume the previous session
    ResumptionRejected(Option<ErrorCondition>),
    /// An acknowledgement doesn't fit what got sent
    SequenceViolation {
        /// The number the server acknowledged
        acked: u32,
        /// The number of the last stanza sent
        sent: u32,
    },
    /// There is no session to resume
    NotResumable,
    /// The operation doesn't apply to the current state
    InvalidState,
}

impl fmt::Display for StreamManagementError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StreamManagementError::EnableRejected(Some(condition)) => {
                write!(fmt, "enabling rejected: {}", condition.as_str())
            }
            StreamManagementError::EnableRejected(None) => write!(fmt, "enabling rejected"),
            StreamManagementError::ResumptionRejected(Some(condition)) => {
                write!(fmt, "resumption rejected: {}", condition.as_str())
            }
            StreamManagementError::ResumptionRejected(None) => write!(fmt, "resumption rejected"),
            StreamManagementError::SequenceViolation { acked, sent } => write!(
                fmt,
                "server acknowledged {} but the last stanza sent was {}",
                acked, sent
            ),
            StreamManagementError::NotResumable => write!(fmt, "no session to resume"),
            StreamManagementError::InvalidState => write!(fmt, "invalid state"),
        }
    }
}

impl StdError for StreamManagementError {}
