#![forbid(unsafe_code)]

//! Credential handoff to child processes over stdio: a line-oriented
//! handshake first, opaque byte pass-through after.

pub mod config;
pub mod errors;
pub mod session;
pub mod supervisor;
pub mod wire;

pub use config::LaunchConfig;
pub use errors::{AppError, Result};
pub use session::{ChildSession, HandshakeTimeouts, ParentSession};
pub use wire::codec::WireFormat;
pub use wire::creds::CredentialSet;
