//! Error types for the ptz-visca crate.

use std::error::Error as StdError;
use std::fmt;
use std::io;

use crate::types::Property;

// =============================================================================
// Transport Error
// =============================================================================

/// What went wrong at the byte-stream level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// Resolving or connecting to the camera failed.
    Connect,
    /// Reading from the connection failed.
    Read,
    /// Writing to the connection failed.
    Write,
    /// No complete frame arrived in time.
    Timeout,
    /// The connection is not open.
    Closed,
}

/// A connect/read/write/timeout failure on a camera connection.
///
/// Carries only a message so it can be cloned to every command that was
/// queued behind the failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Closed, message)
    }

    /// Returns true if this is a read timeout.
    pub fn is_timeout(&self) -> bool {
        self.kind == TransportErrorKind::Timeout
    }

    /// Map an io error from a read into a transport error.
    pub fn from_read(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                Self::timeout(err.to_string())
            }
            io::ErrorKind::UnexpectedEof => Self::closed("connection closed by camera"),
            _ => Self::new(TransportErrorKind::Read, err.to_string()),
        }
    }

    /// Map an io error from a write into a transport error.
    pub fn from_write(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                Self::timeout(err.to_string())
            }
            _ => Self::new(TransportErrorKind::Write, err.to_string()),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            TransportErrorKind::Connect => "connect failed",
            TransportErrorKind::Read => "read failed",
            TransportErrorKind::Write => "write failed",
            TransportErrorKind::Timeout => "timed out",
            TransportErrorKind::Closed => "connection closed",
        };
        write!(f, "{}: {}", kind, self.message)
    }
}

impl StdError for TransportError {}

// =============================================================================
// Device Error
// =============================================================================

/// Error codes a camera reports in a `z0 6y ee FF` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceError {
    MessageLength,
    Syntax,
    CommandBufferFull,
    CommandCancelled,
    NoSocket,
    NotExecutable,
    Other(u8),
}

impl DeviceError {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => DeviceError::MessageLength,
            0x02 => DeviceError::Syntax,
            0x03 => DeviceError::CommandBufferFull,
            0x04 => DeviceError::CommandCancelled,
            0x05 => DeviceError::NoSocket,
            0x41 => DeviceError::NotExecutable,
            other => DeviceError::Other(other),
        }
    }

    pub fn code(&self) -> u8 {
        match *self {
            DeviceError::MessageLength => 0x01,
            DeviceError::Syntax => 0x02,
            DeviceError::CommandBufferFull => 0x03,
            DeviceError::CommandCancelled => 0x04,
            DeviceError::NoSocket => 0x05,
            DeviceError::NotExecutable => 0x41,
            DeviceError::Other(code) => code,
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::MessageLength => write!(f, "message length error"),
            DeviceError::Syntax => write!(f, "syntax error"),
            DeviceError::CommandBufferFull => write!(f, "command buffer full"),
            DeviceError::CommandCancelled => write!(f, "command cancelled"),
            DeviceError::NoSocket => write!(f, "no socket"),
            DeviceError::NotExecutable => write!(f, "command not executable"),
            DeviceError::Other(code) => write!(f, "error code {:#04x}", code),
        }
    }
}

// =============================================================================
// Crate Error
// =============================================================================

/// Error type for camera operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The connection to the camera failed or timed out.
    Transport(TransportError),

    /// A malformed or unexpected frame was received.
    Protocol(String),

    /// The camera rejected the command.
    Device(DeviceError),

    /// The command was cancelled by the caller.
    Cancelled,

    /// The property is not supported by this camera's dialect.
    CapabilityUnsupported(Property),

    /// A scene index or property value is outside the dialect's range.
    InvalidArgument(String),

    /// The camera's command engine has shut down.
    Closed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "transport error: {}", e),
            Error::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Error::Device(e) => write!(f, "device error: {}", e),
            Error::Cancelled => write!(f, "cancelled"),
            Error::CapabilityUnsupported(p) => {
                write!(f, "capability unsupported: {}", p.name())
            }
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::Closed => write!(f, "camera engine closed"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl Error {
    /// Create a protocol error with a message.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Create an invalid argument error with a message.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Returns true if this is a Cancelled error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns true if this is a Transport error.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Returns true if the camera itself rejected the command.
    pub fn is_device(&self) -> bool {
        matches!(self, Error::Device(_))
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Transport(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Transport(TransportError::from_read(err))
    }
}

#[cfg(feature = "serial")]
impl From<serialport::Error> for TransportError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::Io(kind) if kind == io::ErrorKind::TimedOut => {
                TransportError::timeout(err.to_string())
            }
            _ => TransportError::connect(err.to_string()),
        }
    }
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, Error>;
