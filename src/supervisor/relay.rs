//! Transparent byte relay between the caller and a handed-off child.
//!
//! After the handshake the channel is plain bytes; the relay copies them in
//! both directions without looking at them. Application traffic buffered by
//! the handshake reader is replayed first because the [`AppStream`] reader
//! is built that way, so nothing the child pipelined behind its `+OK` is
//! lost.

use tokio::io::{copy, AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::session::gate::AppStream;
use crate::supervisor::ChildChannel;
use crate::{AppError, Result};

/// Pump bytes both ways until the child exits, then return its exit code.
///
/// Inbound (child stdout to `output`) runs until the child closes its end.
/// Outbound (`input` to child stdin) forwards EOF by shutting the child's
/// stdin down, and is cancelled once the child is gone. A child killed by a
/// signal reports exit code 1.
///
/// # Errors
///
/// Returns [`AppError::Io`] when waiting on the child process itself fails.
/// Relay copy failures end the affected direction and are logged, not
/// returned; the child's exit status is the authoritative outcome.
pub async fn run_relay<I, O>(channel: ChildChannel, input: I, output: O) -> Result<i32>
where
    I: AsyncRead + Unpin + Send + 'static,
    O: AsyncWrite + Unpin + Send + 'static,
{
    let ChildChannel {
        session_id,
        mut child,
        stream,
    } = channel;
    let AppStream {
        mut reader,
        writer: mut child_stdin,
    } = stream;

    let mut output = output;
    let inbound = tokio::spawn(async move {
        let copied = copy(&mut reader, &mut output).await?;
        output.flush().await?;
        Ok::<u64, std::io::Error>(copied)
    });

    let mut input = input;
    let outbound = tokio::spawn(async move {
        let copied = copy(&mut input, &mut child_stdin).await?;
        // EOF from the caller becomes EOF on the child's stdin.
        child_stdin.shutdown().await?;
        Ok::<u64, std::io::Error>(copied)
    });

    let status = child
        .wait()
        .await
        .map_err(|err| AppError::Io(format!("child wait failed: {err}")))?;

    match inbound.await {
        Ok(Ok(bytes)) => debug!(session_id = %session_id, bytes, "child output drained"),
        Ok(Err(err)) => debug!(session_id = %session_id, error = %err, "child output relay ended early"),
        Err(err) => debug!(session_id = %session_id, error = %err, "child output relay aborted"),
    }
    outbound.abort();
    if let Ok(Ok(bytes)) = outbound.await {
        debug!(session_id = %session_id, bytes, "caller input drained");
    }

    debug!(session_id = %session_id, %status, "child exited");
    Ok(status.code().unwrap_or(1))
}
