use crate::channel_status::ChannelState;
use crate::connection_status::ConnectionState;
use crate::frame::FrameError;
use crate::protocol::AMQPClass;
use crate::types::{ChannelId, ReplyCode, ShortString};
use std::{error, fmt, io, sync::Arc};

pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by this crate.
///
/// Errors are shared between the io loop, pending reply waiters and the
/// events stream, so the kind lives behind an `Arc` and cloning is cheap.
#[derive(Clone, Debug)]
pub struct Error(Arc<ErrorKind>);

/// The type of error that can be returned in this crate.
///
/// Even though we expose the complete enumeration of possible error
/// variants, it is not considered stable to exhaustively match on it.
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Transport failure: connect error, reset, unexpected socket end.
    IOError(io::Error),
    /// The initial TCP connect exceeded the configured deadline.
    ConnectTimeout,
    /// No inbound traffic for twice the heartbeat interval (the grace, in
    /// seconds, is carried in the variant).
    MissingHeartbeat(u64),
    Frame(FrameError),
    BadServerVersion(u8, u8),
    /// Heuristic: the transport ended before `ready`, which in practice
    /// means the broker rejected our credentials.
    AuthenticationFailure,
    ServerClose {
        code: ReplyCode,
        message: ShortString,
    },
    ChannelClose {
        code: ReplyCode,
        message: ShortString,
    },
    ChannelsLimitReached,
    /// An operation's arguments cannot work, e.g. a nowait consume with
    /// no client-side consumer tag.
    PreconditionFailed,
    /// A method arrived in a state where it cannot be handled.
    InvalidMethod(AMQPClass),
    /// A content frame arrived with no content method preceding it, or a
    /// heartbeat arrived on a nonzero channel.
    InvalidFrameReceived,
    InvalidUri(String),
    InvalidChannel(ChannelId),
    InvalidConnectionState(ConnectionState),
    InvalidChannelState(ChannelState),
    NotConnected,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    pub fn is_io_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::IOError(_))
    }

    pub fn wouldblock(&self) -> bool {
        if let ErrorKind::IOError(e) = self.kind() {
            e.kind() == io::ErrorKind::WouldBlock
        } else {
            false
        }
    }

    /// Permanent failures (bad credentials, version mismatch, unusable
    /// uri) terminate the connection even when reconnection is enabled.
    pub(crate) fn can_be_recovered(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::AuthenticationFailure
                | ErrorKind::BadServerVersion(..)
                | ErrorKind::InvalidUri(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.kind(), f)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::IOError(e) => write!(f, "IO error: {}", e),
            ErrorKind::ConnectTimeout => write!(f, "connection timed out"),
            ErrorKind::MissingHeartbeat(grace) => {
                write!(f, "no heartbeat or data in the last {} seconds", grace)
            }
            ErrorKind::Frame(e) => write!(f, "frame error: {}", e),
            ErrorKind::BadServerVersion(major, minor) => {
                write!(f, "server speaks AMQP {}-{}, expected 0-9", major, minor)
            }
            ErrorKind::AuthenticationFailure => {
                write!(f, "connection ended before ready, probable authentication failure")
            }
            ErrorKind::ServerClose { code, message } => {
                write!(f, "connection closed by server: {} {}", code, message)
            }
            ErrorKind::ChannelClose { code, message } => {
                write!(f, "channel closed by server: {} {}", code, message)
            }
            ErrorKind::ChannelsLimitReached => write!(
                f,
                "the maximum number of channels for this connection has been reached"
            ),
            ErrorKind::PreconditionFailed => write!(f, "precondition failed"),
            ErrorKind::InvalidMethod(method) => {
                write!(f, "unexpected protocol method: {}", method.method_name())
            }
            ErrorKind::InvalidFrameReceived => write!(f, "invalid frame received"),
            ErrorKind::InvalidUri(e) => write!(f, "invalid uri: {}", e),
            ErrorKind::InvalidChannel(channel) => write!(f, "invalid channel: {}", channel),
            ErrorKind::InvalidConnectionState(state) => {
                write!(f, "invalid connection state: {:?}", state)
            }
            ErrorKind::InvalidChannelState(state) => {
                write!(f, "invalid channel state: {:?}", state)
            }
            ErrorKind::NotConnected => write!(f, "not connected"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self.kind() {
            ErrorKind::IOError(e) => Some(e),
            ErrorKind::Frame(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self(Arc::new(kind))
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        ErrorKind::IOError(e).into()
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        ErrorKind::Frame(e).into()
    }
}
