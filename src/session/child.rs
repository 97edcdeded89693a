//! Receiving end of the handshake: announce, collect, acknowledge.

use tokio::io::{AsyncRead, AsyncWrite, Stdin, Stdout};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::session::gate::{write_frame, AppStream, FrameGate};
use crate::session::HandshakeTimeouts;
use crate::wire::codec::{PayloadDecoder, WireFormat};
use crate::wire::creds::CredentialSet;
use crate::wire::frame::{Frame, Phase};
use crate::{AppError, Result};

/// The child half of the credential handshake.
///
/// Announces readiness, collects the payload under a deadline, acknowledges
/// it, and hands the untouched byte streams back for application traffic.
pub struct ChildSession<R, W> {
    reader: R,
    writer: W,
    format: WireFormat,
    timeouts: HandshakeTimeouts,
}

impl ChildSession<Stdin, Stdout> {
    /// Session over this process's own standard streams, with default
    /// deadlines. This is the shape a spawned child normally wants.
    #[must_use]
    pub fn over_stdio(format: WireFormat) -> Self {
        Self::new(
            tokio::io::stdin(),
            tokio::io::stdout(),
            format,
            HandshakeTimeouts::default(),
        )
    }
}

impl<R, W> ChildSession<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Session over an arbitrary reader/writer pair.
    #[must_use]
    pub fn new(reader: R, writer: W, format: WireFormat, timeouts: HandshakeTimeouts) -> Self {
        Self {
            reader,
            writer,
            format,
            timeouts,
        }
    }

    /// Run the handshake to completion.
    ///
    /// Emits `+READY`, then collects the credential payload with the payload
    /// deadline anchored at that announcement. A complete payload is answered
    /// with `+OK` (carrying a pair count under the legacy encoding) and
    /// returned together with the [`AppStream`].
    ///
    /// On failure the parent is told why with a best-effort `+ERR reason`
    /// reply, except when the parent itself sent `+ERR`, which is never
    /// answered. The caller should treat any error as fatal and exit
    /// non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Timeout`] when the payload misses its deadline,
    /// [`AppError::Closed`] when the parent goes away, [`AppError::Decode`]
    /// or [`AppError::Protocol`] when its payload is malformed, and
    /// [`AppError::Peer`] when the parent reports failure.
    pub async fn run(self) -> Result<(CredentialSet, AppStream<R, W>)> {
        let Self {
            reader,
            mut writer,
            format,
            timeouts,
        } = self;

        write_frame(&mut writer, &Frame::Ready).await?;
        let deadline = Instant::now() + timeouts.payload;

        let mut gate = FrameGate::new(reader);
        let mut decoder = PayloadDecoder::new(format);
        let creds = loop {
            match gate.await_frame(Phase::AwaitingPayload, deadline).await {
                Ok(Frame::Err { message }) => {
                    warn!(reason = %message, "parent aborted before delivering credentials");
                    return Err(AppError::Peer(message));
                }
                Ok(frame) => match decoder.accept(frame) {
                    Ok(Some(set)) => break set,
                    Ok(None) => {}
                    Err(err) => {
                        reply_err(&mut writer, err.wire_code()).await;
                        return Err(AppError::Decode(err));
                    }
                },
                Err(err) => {
                    reply_err(&mut writer, err.wire_code()).await;
                    return Err(err);
                }
            }
        };

        let ack = match format {
            WireFormat::Json => Frame::Ok { count: None },
            WireFormat::Legacy => Frame::Ok {
                count: Some(creds.len()),
            },
        };
        write_frame(&mut writer, &ack).await?;
        info!(credentials = creds.len(), "credential handshake complete");

        let (leftover, reader) = gate.into_stream();
        Ok((creds, AppStream::new(leftover, reader, writer)))
    }
}

/// Best-effort `+ERR` reply; the parent may already be gone.
async fn reply_err<W>(writer: &mut W, code: &str)
where
    W: AsyncWrite + Unpin,
{
    let frame = Frame::Err {
        message: code.to_owned(),
    };
    if let Err(err) = write_frame(writer, &frame).await {
        debug!(error = %err, "error reply not delivered");
    }
}
