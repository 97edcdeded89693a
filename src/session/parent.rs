//! Sending end of the handshake: await readiness, deliver, await the ack.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::session::gate::{write_frame, AppStream, FrameGate};
use crate::session::HandshakeTimeouts;
use crate::wire::codec::{encode_lines, WireFormat};
use crate::wire::creds::CredentialSet;
use crate::wire::frame::{Frame, Phase};
use crate::{AppError, Result};

/// The parent half of the credential handshake.
///
/// Waits for the child to announce readiness, delivers the payload exactly
/// once, waits for the acknowledgement, and hands the untouched byte streams
/// back for application traffic. It does not own the child process; the
/// supervisor layers lifecycle handling on top.
pub struct ParentSession<R, W> {
    reader: R,
    writer: W,
    format: WireFormat,
    timeouts: HandshakeTimeouts,
}

impl<R, W> ParentSession<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Session over the child's stdout/stdin pair.
    #[must_use]
    pub fn new(reader: R, writer: W, format: WireFormat, timeouts: HandshakeTimeouts) -> Self {
        Self {
            reader,
            writer,
            format,
            timeouts,
        }
    }

    /// Run the handshake to completion, consuming the credentials.
    ///
    /// The readiness deadline is anchored at `spawned_at`, so slow process
    /// startup counts against the child. The payload is written only after
    /// `+READY` and never rewritten; the credentials are dropped as soon as
    /// the bytes are on the wire.
    ///
    /// On failure the child is told why with a best-effort `+ERR reason`
    /// notice, except when the child itself sent `+ERR`, which is never
    /// answered. Killing the now-useless child is the supervisor's job.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Timeout`] when readiness or the acknowledgement
    /// misses its deadline, [`AppError::Closed`] when the child goes away,
    /// [`AppError::Protocol`] when it speaks out of turn, and
    /// [`AppError::Peer`] when it reports failure.
    pub async fn run(self, creds: CredentialSet, spawned_at: Instant) -> Result<AppStream<R, W>> {
        let Self {
            reader,
            mut writer,
            format,
            timeouts,
        } = self;
        let mut gate = FrameGate::new(reader);

        let ready_deadline = spawned_at + timeouts.ready;
        match gate.await_frame(Phase::AwaitingReady, ready_deadline).await {
            Ok(Frame::Ready) => {}
            Ok(Frame::Err { message }) => {
                warn!(reason = %message, "child reported failure instead of readiness");
                return Err(AppError::Peer(message));
            }
            Ok(frame) => {
                let err = AppError::Protocol {
                    phase: Phase::AwaitingReady,
                    detail: format!("expected +READY, got {}", frame.kind()),
                };
                send_err_best_effort(&mut writer, &err).await;
                return Err(err);
            }
            Err(err) => {
                send_err_best_effort(&mut writer, &err).await;
                return Err(err);
            }
        }
        debug!("child is ready, delivering credentials");

        write_payload(&mut writer, encode_lines(&creds, format)).await?;
        let sent = creds.len();
        drop(creds);

        let ack_deadline = Instant::now() + timeouts.ack;
        match gate.await_frame(Phase::AwaitingAck, ack_deadline).await {
            Ok(Frame::Ok { count }) => {
                if let Some(count) = count {
                    if count != sent {
                        debug!(sent, acknowledged = count, "ack count differs from sent");
                    }
                }
                info!(credentials = sent, "credential handshake complete");
                let (leftover, reader) = gate.into_stream();
                Ok(AppStream::new(leftover, reader, writer))
            }
            Ok(Frame::Err { message }) => {
                warn!(reason = %message, "child rejected credential payload");
                Err(AppError::Peer(message))
            }
            Ok(frame) => {
                let err = AppError::Protocol {
                    phase: Phase::AwaitingAck,
                    detail: format!("expected +OK, got {}", frame.kind()),
                };
                send_err_best_effort(&mut writer, &err).await;
                Err(err)
            }
            Err(err) => {
                send_err_best_effort(&mut writer, &err).await;
                Err(err)
            }
        }
    }
}

/// Write the encoded payload as one buffer, then flush.
async fn write_payload<W>(writer: &mut W, lines: Vec<String>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    for line in lines {
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
    }
    writer
        .write_all(&buf)
        .await
        .map_err(|err| AppError::Io(format!("payload write failed: {err}")))?;
    writer
        .flush()
        .await
        .map_err(|err| AppError::Io(format!("payload flush failed: {err}")))?;
    Ok(())
}

/// Best-effort abort notice; the child may already be gone.
async fn send_err_best_effort<W>(writer: &mut W, reason: &AppError)
where
    W: AsyncWrite + Unpin,
{
    let frame = Frame::Err {
        message: reason.wire_code().to_owned(),
    };
    if let Err(err) = write_frame(writer, &frame).await {
        debug!(error = %err, "abort notice not delivered");
    }
}
