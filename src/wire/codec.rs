//! Credential payload codec — the two wire encodings.
//!
//! The payload travels in one of two encodings, chosen once per session by
//! configuration on both sides (there is no in-band negotiation):
//!
//! - **JSON** (current): exactly one line holding a JSON object whose values
//!   are all strings.
//! - **Legacy** (v0.1 line framing): a `+CRED` control line, zero or more
//!   `key=value` lines, then `+END`. A value may carry a `b64:` prefix for
//!   standard-base64 content.
//!
//! All encoding-specific rules live here, behind [`PayloadDecoder`]'s
//! push-style interface, so the two handshake state machines stay identical
//! across encodings.

use std::fmt::{Display, Formatter};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::wire::creds::CredentialSet;
use crate::wire::frame::Frame;

/// Wire encoding for the credential payload.
///
/// Doubles as the `--encoding` CLI flag value and the `encoding` config
/// field. Defaults to [`WireFormat::Json`]; both sides of a deployment must
/// be configured alike.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// Single-line JSON object, acknowledged with a bare `+OK`.
    #[default]
    Json,
    /// `+CRED` / `key=value` / `+END` block, acknowledged with `+OK <count>`.
    Legacy,
}

/// Credential payload decode failure.
///
/// Each variant maps to a stable wire reason code via
/// [`DecodeError::wire_code`], so the child side replies `+ERR <code>`
/// without inventing text per call site. Variants carry credential names and
/// parser positions where useful — never values.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DecodeError {
    /// The payload line is not valid JSON.
    InvalidJson(String),
    /// The payload parsed but is not a flat object of string values.
    InvalidFormat(String),
    /// A legacy payload line is not `key=value`.
    InvalidPair,
    /// A credential name failed validation.
    InvalidKey(String),
    /// A `b64:` value did not decode to base64-encoded UTF-8 text. Carries
    /// the credential name.
    InvalidBase64(String),
    /// The frame sequence violates the payload grammar.
    UnexpectedFrame(String),
}

impl DecodeError {
    /// Stable single-token reason code used in `+ERR` replies.
    #[must_use]
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "INVALID_JSON",
            Self::InvalidFormat(_) => "INVALID_FORMAT",
            Self::InvalidPair => "INVALID_PAIR",
            Self::InvalidKey(_) => "INVALID_KEY",
            Self::InvalidBase64(_) => "INVALID_BASE64",
            Self::UnexpectedFrame(_) => "PROTOCOL",
        }
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidJson(msg) => write!(f, "payload is not valid JSON: {msg}"),
            Self::InvalidFormat(msg) => write!(f, "payload is not a flat string map: {msg}"),
            Self::InvalidPair => write!(f, "legacy payload line is not key=value"),
            Self::InvalidKey(name) => write!(f, "invalid credential name: {name:?}"),
            Self::InvalidBase64(name) => {
                write!(f, "value of {name:?} is not base64-encoded text")
            }
            Self::UnexpectedFrame(detail) => write!(f, "unexpected frame in payload: {detail}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Push-style credential payload decoder.
///
/// The child session feeds classified frames one at a time;
/// [`PayloadDecoder::accept`] answers with the completed set, a request for
/// more frames, or a decode failure. The decoder is single-use: after it
/// completes or fails, the session is past the payload phase either way.
#[derive(Debug)]
pub struct PayloadDecoder {
    format: WireFormat,
    state: DecodeState,
}

#[derive(Debug)]
enum DecodeState {
    /// No payload frame consumed yet.
    Idle,
    /// Legacy only: inside the `+CRED` block.
    Collecting(CredentialSet),
    /// Payload completed or failed; no further frames are legal.
    Done,
}

impl PayloadDecoder {
    /// Create a decoder for the given encoding.
    #[must_use]
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            state: DecodeState::Idle,
        }
    }

    /// Feed one classified frame.
    ///
    /// Returns `Ok(Some(set))` when the payload is complete and `Ok(None)`
    /// when more frames are required (a legacy block in progress).
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the frame violates the active
    /// encoding's grammar or its content does not decode. Any error is
    /// terminal for the decoder: the state stays at `Done`, so a confused
    /// caller that feeds another frame gets a grammar error rather than a
    /// second decode.
    pub fn accept(&mut self, frame: Frame) -> Result<Option<CredentialSet>, DecodeError> {
        let state = std::mem::replace(&mut self.state, DecodeState::Done);
        let (next, completed) = match self.format {
            WireFormat::Json => step_json(state, frame)?,
            WireFormat::Legacy => step_legacy(state, frame)?,
        };
        self.state = next;
        Ok(completed)
    }
}

/// One transition of the JSON payload grammar.
fn step_json(
    state: DecodeState,
    frame: Frame,
) -> Result<(DecodeState, Option<CredentialSet>), DecodeError> {
    match (state, frame) {
        (DecodeState::Idle, Frame::Payload(line)) => {
            let set = decode_json_object(&line)?;
            Ok((DecodeState::Done, Some(set)))
        }
        (DecodeState::Done, _) => Err(DecodeError::UnexpectedFrame(
            "payload already complete".to_owned(),
        )),
        (_, frame) => Err(DecodeError::UnexpectedFrame(format!(
            "{} under the json encoding",
            frame.kind()
        ))),
    }
}

/// One transition of the legacy block grammar.
fn step_legacy(
    state: DecodeState,
    frame: Frame,
) -> Result<(DecodeState, Option<CredentialSet>), DecodeError> {
    match (state, frame) {
        (DecodeState::Idle, Frame::CredBegin) => {
            Ok((DecodeState::Collecting(CredentialSet::new()), None))
        }
        (DecodeState::Idle, Frame::Payload(_)) => Err(DecodeError::UnexpectedFrame(
            "credential pair before +CRED".to_owned(),
        )),
        (DecodeState::Idle, Frame::CredEnd) => Err(DecodeError::UnexpectedFrame(
            "+END before +CRED".to_owned(),
        )),
        (DecodeState::Collecting(mut set), Frame::Payload(line)) => {
            let (name, value) = line.split_once('=').ok_or(DecodeError::InvalidPair)?;
            let value = decode_legacy_value(name, value)?;
            set.insert(name, value)
                .map_err(|_| DecodeError::InvalidKey(name.to_owned()))?;
            Ok((DecodeState::Collecting(set), None))
        }
        (DecodeState::Collecting(set), Frame::CredEnd) => Ok((DecodeState::Done, Some(set))),
        (DecodeState::Collecting(_), Frame::CredBegin) => Err(DecodeError::UnexpectedFrame(
            "+CRED repeated inside a block".to_owned(),
        )),
        (DecodeState::Done, _) => Err(DecodeError::UnexpectedFrame(
            "payload already complete".to_owned(),
        )),
        (DecodeState::Idle, frame) => Err(DecodeError::UnexpectedFrame(format!(
            "{} before the credential block",
            frame.kind()
        ))),
        (DecodeState::Collecting(_), frame) => Err(DecodeError::UnexpectedFrame(format!(
            "{} inside the credential block",
            frame.kind()
        ))),
    }
}

/// Render `set` as its payload wire lines under `format`.
///
/// JSON: one compact object line (string escaping keeps it single-line).
/// Legacy: `+CRED`, one `key=value` line per credential in sorted name
/// order, `+END`; a value containing newline bytes, or beginning with the
/// literal `b64:`, is base64-armored so no value ever spans lines and the
/// prefix stays unambiguous.
#[must_use]
pub fn encode_lines(set: &CredentialSet, format: WireFormat) -> Vec<String> {
    match format {
        WireFormat::Json => {
            let map: serde_json::Map<String, serde_json::Value> = set
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_owned(),
                        serde_json::Value::String(value.to_owned()),
                    )
                })
                .collect();
            vec![serde_json::Value::Object(map).to_string()]
        }
        WireFormat::Legacy => {
            let mut lines = Vec::with_capacity(set.len() + 2);
            lines.push(Frame::CredBegin.wire_line());
            for (name, value) in set.iter() {
                if value.contains(['\n', '\r']) || value.starts_with("b64:") {
                    lines.push(format!("{name}=b64:{}", BASE64.encode(value)));
                } else {
                    lines.push(format!("{name}={value}"));
                }
            }
            lines.push(Frame::CredEnd.wire_line());
            lines
        }
    }
}

/// Decode one JSON-encoded payload line into a credential set.
fn decode_json_object(line: &str) -> Result<CredentialSet, DecodeError> {
    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    let serde_json::Value::Object(map) = value else {
        return Err(DecodeError::InvalidFormat(
            "payload is not a JSON object".to_owned(),
        ));
    };

    let mut set = CredentialSet::new();
    for (name, value) in map {
        let serde_json::Value::String(text) = value else {
            return Err(DecodeError::InvalidFormat(format!(
                "value of {name:?} is not a string"
            )));
        };
        set.insert(&name, text)
            .map_err(|_| DecodeError::InvalidKey(name))?;
    }
    Ok(set)
}

/// Decode one legacy value, unwrapping the optional `b64:` armor.
fn decode_legacy_value(name: &str, raw: &str) -> Result<String, DecodeError> {
    let Some(encoded) = raw.strip_prefix("b64:") else {
        return Ok(raw.to_owned());
    };
    let bytes = BASE64
        .decode(encoded)
        .map_err(|_| DecodeError::InvalidBase64(name.to_owned()))?;
    String::from_utf8(bytes).map_err(|_| DecodeError::InvalidBase64(name.to_owned()))
}
