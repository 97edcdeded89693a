//! Handshake phases and frame classification.
//!
//! Classification is purely syntactic and applies only before handoff: a line
//! whose first byte is `+` is a control frame in every phase, and any other
//! line is payload content — legal only while a side is awaiting the
//! credential payload. There is no try-control-then-fall-back heuristic; the
//! phase decides what a line may be, and anything else is a violation.

use std::fmt::{Display, Formatter};

use crate::{AppError, Result};

/// Handshake phase a session is currently blocked in.
///
/// Carried inside timeout, EOF, and violation errors so failures name the
/// wait they interrupted. Once a session leaves its final phase the stream is
/// handed off and no classification happens at all.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Phase {
    /// Parent side, waiting for the child's `+READY`.
    AwaitingReady,
    /// Child side, waiting for the credential payload.
    AwaitingPayload,
    /// Parent side, waiting for the child's `+OK` or `+ERR`.
    AwaitingAck,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitingReady => write!(f, "awaiting ready"),
            Self::AwaitingPayload => write!(f, "awaiting payload"),
            Self::AwaitingAck => write!(f, "awaiting ack"),
        }
    }
}

/// One classified handshake line.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Frame {
    /// `+READY` — the child is listening for credentials.
    Ready,
    /// `+OK` or `+OK <n>` — the child accepted the credential payload.
    Ok {
        /// Number of credentials received; present under the legacy encoding.
        count: Option<usize>,
    },
    /// `+ERR <message>` — either side reports a terminal failure.
    Err {
        /// Single-line diagnostic from the peer.
        message: String,
    },
    /// `+CRED` — legacy encoding, opens the `key=value` block.
    CredBegin,
    /// `+END` — legacy encoding, closes the `key=value` block.
    CredEnd,
    /// Non-control line, payload content for the active codec.
    Payload(String),
}

impl Frame {
    /// Short descriptor for diagnostics. Payload content is never echoed.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready => "+READY",
            Self::Ok { .. } => "+OK",
            Self::Err { .. } => "+ERR",
            Self::CredBegin => "+CRED",
            Self::CredEnd => "+END",
            Self::Payload(_) => "payload line",
        }
    }

    /// Render the frame as its wire line, without the trailing newline.
    ///
    /// `+ERR` messages have newline bytes replaced by spaces so the frame can
    /// never span lines on the wire.
    #[must_use]
    pub fn wire_line(&self) -> String {
        match self {
            Self::Ready => "+READY".to_owned(),
            Self::Ok { count: None } => "+OK".to_owned(),
            Self::Ok { count: Some(n) } => format!("+OK {n}"),
            Self::Err { message } if message.is_empty() => "+ERR".to_owned(),
            Self::Err { message } => {
                let flat = message.replace(['\n', '\r'], " ");
                format!("+ERR {flat}")
            }
            Self::CredBegin => "+CRED".to_owned(),
            Self::CredEnd => "+END".to_owned(),
            Self::Payload(line) => line.clone(),
        }
    }
}

/// Classify one inbound line under the given phase.
///
/// Control frames start with `+`; the token runs to the first space and the
/// remainder is the argument. `+READY`, `+CRED`, and `+END` take no argument,
/// `+OK` takes an optional decimal count, and `+ERR` takes the rest of the
/// line verbatim. Unknown `+` tokens are violations, not something to skip —
/// garbage on a credential channel fails the session.
///
/// # Errors
///
/// Returns [`AppError::Protocol`] when the line is not a valid frame for
/// `phase`: a malformed or unknown control line in any phase, or a
/// non-control line outside [`Phase::AwaitingPayload`].
pub fn classify(phase: Phase, line: &str) -> Result<Frame> {
    if let Some(rest) = line.strip_prefix('+') {
        let (token, arg) = match rest.split_once(' ') {
            Some((token, arg)) => (token, Some(arg)),
            None => (rest, None),
        };

        return match (token, arg) {
            ("READY", None) => Ok(Frame::Ready),
            ("CRED", None) => Ok(Frame::CredBegin),
            ("END", None) => Ok(Frame::CredEnd),
            ("OK", None) => Ok(Frame::Ok { count: None }),
            ("OK", Some(n)) => match n.parse::<usize>() {
                Ok(count) => Ok(Frame::Ok { count: Some(count) }),
                Err(_) => Err(violation(phase, format!("+OK count is not a number: {n:?}"))),
            },
            ("ERR", arg) => Ok(Frame::Err {
                message: arg.unwrap_or_default().to_owned(),
            }),
            (token @ ("READY" | "CRED" | "END"), Some(_)) => {
                Err(violation(phase, format!("+{token} takes no argument")))
            }
            (token, _) => Err(violation(phase, format!("unknown control frame: +{token}"))),
        };
    }

    if phase == Phase::AwaitingPayload {
        return Ok(Frame::Payload(line.to_owned()));
    }

    // Not echoed: a stray line here could be a misdirected credential.
    Err(violation(phase, "unexpected non-control line".to_owned()))
}

fn violation(phase: Phase, detail: String) -> AppError {
    AppError::Protocol { phase, detail }
}
