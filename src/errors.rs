//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

use crate::wire::codec::DecodeError;
use crate::wire::frame::Phase;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all failure modes.
///
/// Every handshake-level variant is terminal: a session that produces one is
/// finished, and the stream it ran on must not carry further handshake frames.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing, validation, or credential-resolution failure.
    Config(String),
    /// Child process could not be spawned or its stdio could not be captured.
    Spawn(String),
    /// Pipe or file-system I/O failure.
    Io(String),
    /// No complete frame arrived before the deadline for the given phase.
    Timeout(Phase),
    /// The peer closed the stream mid-handshake.
    Closed(Phase),
    /// The peer sent bytes the protocol does not allow in the given phase.
    Protocol {
        /// Phase the session was blocked in when the violation was observed.
        phase: Phase,
        /// What was wrong with the frame.
        detail: String,
    },
    /// The credential payload could not be decoded.
    Decode(DecodeError),
    /// The peer reported a terminal failure via a `+ERR` frame.
    Peer(String),
}

impl AppError {
    /// Stable single-token reason code for `+ERR` replies.
    ///
    /// Mirrors [`DecodeError::wire_code`] for payload failures; ambient
    /// failures with no protocol meaning map to `INTERNAL`.
    #[must_use]
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "TIMEOUT",
            Self::Closed(_) => "NO_INPUT",
            Self::Protocol { .. } => "PROTOCOL",
            Self::Decode(err) => err.wire_code(),
            Self::Peer(_) | Self::Config(_) | Self::Spawn(_) | Self::Io(_) => "INTERNAL",
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Timeout(phase) => write!(f, "timeout while {phase}"),
            Self::Closed(phase) => write!(f, "stream closed while {phase}"),
            Self::Protocol { phase, detail } => {
                write!(f, "protocol violation while {phase}: {detail}")
            }
            Self::Decode(err) => write!(f, "payload decode: {err}"),
            Self::Peer(msg) => write!(f, "peer reported: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<DecodeError> for AppError {
    fn from(err: DecodeError) -> Self {
        Self::Decode(err)
    }
}
