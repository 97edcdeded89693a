//! Line framing for the handshake portion of a stream.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a fixed maximum line length
//! to prevent memory exhaustion caused by an unterminated or maliciously
//! large line from a misbehaving peer.
//!
//! Used as the codec parameter for [`tokio_util::codec::FramedRead`] by the
//! session layer's frame gate. Only decoding goes through the codec; the
//! handshake's own writes are plain `line\n` byte writes.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

/// Maximum line length accepted during the handshake: 1 MiB.
///
/// Inbound lines exceeding this limit fail the decode with
/// [`LineError::TooLong`] rather than allocating without bound. The limit is
/// a handshake concern only — after handoff the stream is not line-framed.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Line decoder for handshake streams.
///
/// Delegates framing to [`LinesCodec`] with the fixed [`MAX_LINE_BYTES`]
/// limit. Each decoded item is one UTF-8 line without its terminating `\n`;
/// a trailing `\r` is stripped as well.
///
/// A stream that ends mid-line yields [`LineError::PartialLineAtEof`] instead
/// of surfacing the fragment: an unterminated tail is a closed peer, not a
/// frame.
#[derive(Debug)]
pub struct LineCodec(LinesCodec);

impl LineCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Framing-level decode failure.
///
/// Carries no handshake phase; the session layer's gate tags the failure
/// with the phase the session was blocked in before surfacing it.
#[derive(Debug)]
pub enum LineError {
    /// The line exceeded [`MAX_LINE_BYTES`] before a newline arrived.
    TooLong,
    /// The stream ended mid-line; the unterminated tail is not a frame.
    PartialLineAtEof,
    /// Underlying read failure. Invalid UTF-8 surfaces here with
    /// [`std::io::ErrorKind::InvalidData`].
    Io(std::io::Error),
}

impl std::fmt::Display for LineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooLong => write!(f, "line too long: exceeded {MAX_LINE_BYTES} bytes"),
            Self::PartialLineAtEof => write!(f, "stream ended mid-line"),
            Self::Io(err) => write!(f, "io: {err}"),
        }
    }
}

impl std::error::Error for LineError {}

impl From<std::io::Error> for LineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = LineError;

    /// Decode the next newline-terminated line from `src`.
    ///
    /// Returns `Ok(None)` when `src` holds no complete line yet.
    ///
    /// # Errors
    ///
    /// [`LineError::TooLong`] when the buffered line exceeds
    /// [`MAX_LINE_BYTES`]; [`LineError::Io`] for stream failures and invalid
    /// UTF-8.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, LineError> {
        self.0.decode(src).map_err(map_codec_error)
    }

    /// Drain remaining complete lines at EOF.
    ///
    /// # Errors
    ///
    /// [`LineError::PartialLineAtEof`] when bytes remain after the final
    /// newline — the peer closed mid-line and the tail must not be
    /// classified. Other failures as for [`LineCodec::decode`].
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, LineError> {
        match self.0.decode(src).map_err(map_codec_error)? {
            Some(line) => Ok(Some(line)),
            None if src.is_empty() => Ok(None),
            None => Err(LineError::PartialLineAtEof),
        }
    }
}

/// Map a [`LinesCodecError`] to a [`LineError`].
fn map_codec_error(e: LinesCodecError) -> LineError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => LineError::TooLong,
        LinesCodecError::Io(io_err) => LineError::Io(io_err),
    }
}
