//! Deadline-gated frame reader and the handshake/application boundary.
//!
//! [`FrameGate`] owns the read half of the channel during the handshake:
//! every line is pulled through the bounded [`LineCodec`], classified under
//! the current [`Phase`], and charged against an absolute deadline. When the
//! handshake completes, [`FrameGate::into_stream`] surrenders the read half
//! together with any bytes the line reader had buffered past the final
//! control frame, so an eager peer that pipelines application traffic behind
//! its acknowledgement loses nothing.

use std::io::Cursor;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, Chain};
use tokio::time::{timeout_at, Instant};
use tokio_util::codec::FramedRead;

use crate::wire::frame::{classify, Frame, Phase};
use crate::wire::line::{LineCodec, LineError, MAX_LINE_BYTES};
use crate::{AppError, Result};

/// Reads and classifies handshake frames under per-phase deadlines.
pub struct FrameGate<R> {
    framed: FramedRead<R, LineCodec>,
}

impl<R> FrameGate<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap the read half of a channel for the duration of the handshake.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            framed: FramedRead::new(reader, LineCodec::new()),
        }
    }

    /// Read one frame, classified under `phase`, before `deadline`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Timeout`] when the deadline passes first,
    /// [`AppError::Closed`] when the stream ends (cleanly or mid-line), and
    /// [`AppError::Protocol`] when the line is overlong, not UTF-8, or fails
    /// classification.
    pub async fn await_frame(&mut self, phase: Phase, deadline: Instant) -> Result<Frame> {
        match timeout_at(deadline, self.framed.next()).await {
            Err(_) => Err(AppError::Timeout(phase)),
            Ok(None) => Err(AppError::Closed(phase)),
            Ok(Some(Err(err))) => Err(map_line_error(phase, err)),
            Ok(Some(Ok(line))) => classify(phase, &line),
        }
    }

    /// Dissolve the gate, returning buffered-but-unread bytes and the reader.
    ///
    /// The returned bytes are whatever the line reader pulled off the wire
    /// past the last frame it yielded. They belong to the application phase
    /// and must be replayed ahead of the reader; [`AppStream`] does so.
    #[must_use]
    pub fn into_stream(mut self) -> (Bytes, R) {
        let leftover = self.framed.read_buffer_mut().split().freeze();
        (leftover, self.framed.into_inner())
    }
}

/// Write one frame and flush it.
///
/// # Errors
///
/// Returns [`AppError::Io`] when the underlying write or flush fails.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes = frame.wire_line().into_bytes();
    bytes.push(b'\n');
    writer
        .write_all(&bytes)
        .await
        .map_err(|err| AppError::Io(format!("frame write failed: {err}")))?;
    writer
        .flush()
        .await
        .map_err(|err| AppError::Io(format!("frame flush failed: {err}")))?;
    Ok(())
}

fn map_line_error(phase: Phase, err: LineError) -> AppError {
    match err {
        LineError::TooLong => AppError::Protocol {
            phase,
            detail: format!("line too long: exceeded {MAX_LINE_BYTES} bytes"),
        },
        LineError::PartialLineAtEof => AppError::Closed(phase),
        LineError::Io(err) if err.kind() == std::io::ErrorKind::InvalidData => {
            AppError::Protocol {
                phase,
                detail: "line is not valid UTF-8".to_owned(),
            }
        }
        LineError::Io(err) => AppError::Io(err.to_string()),
    }
}

/// The channel after a completed handshake: raw bytes in both directions.
///
/// Holds the same reader and writer the handshake used. The reader is
/// prefixed with the gate's leftover bytes, so the application sees exactly
/// the byte stream the peer produced after its final control frame.
#[derive(Debug)]
pub struct AppStream<R, W> {
    /// Read half; replays handshake leftover before touching the wire.
    pub reader: Chain<Cursor<Bytes>, R>,
    /// Write half, untouched.
    pub writer: W,
}

impl<R, W> AppStream<R, W>
where
    R: AsyncRead,
{
    pub(crate) fn new(leftover: Bytes, reader: R, writer: W) -> Self {
        Self {
            reader: Cursor::new(leftover).chain(reader),
            writer,
        }
    }
}
