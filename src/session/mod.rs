//! Handshake sessions for the two ends of the credential channel.
//!
//! [`ChildSession`] runs the receiving half (announce readiness, collect the
//! payload, acknowledge) and [`ParentSession`] the sending half (await
//! readiness, deliver the payload, await the acknowledgement). Both consume
//! themselves on completion and hand back an [`AppStream`] carrying the raw
//! byte streams, so the handshake machinery cannot touch a single byte of the
//! application traffic that follows.

pub mod child;
pub mod gate;
pub mod parent;

use std::time::Duration;

pub use child::ChildSession;
pub use gate::{AppStream, FrameGate};
pub use parent::ParentSession;

/// Per-phase deadlines for the handshake.
///
/// Each phase is bounded independently; once the handshake completes the
/// channel carries application traffic with no deadline at all.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct HandshakeTimeouts {
    /// Parent-side bound on `+READY`, measured from process spawn.
    pub ready: Duration,
    /// Child-side bound on the credential payload, measured from `+READY`.
    pub payload: Duration,
    /// Parent-side bound on the acknowledgement, measured from payload write.
    pub ack: Duration,
}

impl Default for HandshakeTimeouts {
    fn default() -> Self {
        Self {
            ready: Duration::from_secs(10),
            payload: Duration::from_secs(5),
            ack: Duration::from_secs(5),
        }
    }
}
