//! Child process lifecycle: spawn scrubbed, inject credentials, kill cleanly.
//!
//! The supervisor owns everything the handshake itself must not: building
//! the [`tokio::process::Command`], scrubbing the environment so secrets
//! only ever travel over stdio, and making sure a child that failed its
//! handshake is dead and reaped before the failure is reported.

pub mod relay;

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::session::gate::AppStream;
use crate::session::{HandshakeTimeouts, ParentSession};
use crate::wire::codec::WireFormat;
use crate::wire::creds::CredentialSet;
use crate::{AppError, Result};

/// Environment variables forwarded to the child. Everything else is
/// scrubbed; credentials travel over stdio, never the environment.
const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "LANG",
    "LC_ALL",
    "TERM",
    "RUST_LOG",
    // Windows equivalents.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// What to launch and how.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Program to execute.
    pub program: String,
    /// Arguments passed to it verbatim.
    pub args: Vec<String>,
    /// Working directory for the child, when pinned.
    pub workspace_root: Option<PathBuf>,
    /// Extra environment variable names forwarded from our own environment,
    /// on top of the built-in allowlist.
    pub extra_env: Vec<String>,
}

/// A freshly spawned child, handshake not yet run.
pub struct SpawnedChild {
    /// Identifier tying this child's log lines together.
    pub session_id: String,
    /// Process handle.
    pub child: Child,
    /// The child's stdin, our write half.
    pub stdin: ChildStdin,
    /// The child's stdout, our read half.
    pub stdout: ChildStdout,
    /// Spawn instant; the readiness deadline is anchored here.
    pub spawned_at: Instant,
}

/// A child that completed the handshake and now carries application traffic.
#[derive(Debug)]
pub struct ChildChannel {
    /// Identifier tying this child's log lines together.
    pub session_id: String,
    /// Process handle; the relay waits on it.
    pub child: Child,
    /// Pass-through byte streams.
    pub stream: AppStream<ChildStdout, ChildStdin>,
}

/// Spawn the configured program with piped stdio and a scrubbed environment.
///
/// The child inherits our stderr so its own diagnostics stay visible.
///
/// # Errors
///
/// Returns [`AppError::Spawn`] when the process cannot be started or its
/// stdio pipes are missing.
pub fn spawn_child(config: &SpawnConfig) -> Result<SpawnedChild> {
    let session_id = Uuid::new_v4().to_string();

    let mut command = Command::new(&config.program);
    command
        .args(&config.args)
        .env_clear()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    for name in ALLOWED_ENV_VARS
        .iter()
        .copied()
        .chain(config.extra_env.iter().map(String::as_str))
    {
        if let Ok(value) = std::env::var(name) {
            command.env(name, value);
        }
    }
    if let Some(root) = &config.workspace_root {
        command.current_dir(root);
    }

    let spawned_at = Instant::now();
    let mut child = command
        .spawn()
        .map_err(|err| AppError::Spawn(format!("failed to spawn {:?}: {err}", config.program)))?;
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Spawn("child stdin was not piped".to_owned()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("child stdout was not piped".to_owned()))?;

    info!(session_id = %session_id, program = %config.program, "child spawned");
    Ok(SpawnedChild {
        session_id,
        child,
        stdin,
        stdout,
        spawned_at,
    })
}

/// Run the parent half of the handshake against a spawned child.
///
/// On any handshake failure the child is killed and reaped before the error
/// is returned, so no orphan outlives a failed injection.
///
/// # Errors
///
/// Propagates the handshake error; see [`ParentSession::run`].
pub async fn inject(
    spawned: SpawnedChild,
    creds: CredentialSet,
    format: WireFormat,
    timeouts: HandshakeTimeouts,
) -> Result<ChildChannel> {
    let SpawnedChild {
        session_id,
        mut child,
        stdin,
        stdout,
        spawned_at,
    } = spawned;

    let session = ParentSession::new(stdout, stdin, format, timeouts);
    match session.run(creds, spawned_at).await {
        Ok(stream) => Ok(ChildChannel {
            session_id,
            child,
            stream,
        }),
        Err(err) => {
            warn!(session_id = %session_id, error = %err, "handshake failed, killing child");
            kill_and_reap(&mut child, &session_id).await;
            Err(err)
        }
    }
}

/// Spawn the child and inject the credentials in one step.
///
/// # Errors
///
/// Returns the spawn or handshake error; a child that got as far as running
/// is killed and reaped first.
pub async fn launch(
    config: &SpawnConfig,
    creds: CredentialSet,
    format: WireFormat,
    timeouts: HandshakeTimeouts,
) -> Result<ChildChannel> {
    let spawned = spawn_child(config)?;
    inject(spawned, creds, format, timeouts).await
}

/// Kill the child if it is still running, then reap it.
///
/// Safe to call at any point and more than once; a child that has already
/// exited is only reaped.
pub async fn kill_and_reap(child: &mut Child, session_id: &str) {
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!(session_id = %session_id, %status, "child already exited");
            return;
        }
        Ok(None) => {
            if let Err(err) = child.start_kill() {
                debug!(session_id = %session_id, error = %err, "kill signal not delivered");
            }
        }
        Err(err) => {
            debug!(session_id = %session_id, error = %err, "child status unavailable");
        }
    }
    match child.wait().await {
        Ok(status) => debug!(session_id = %session_id, %status, "child reaped"),
        Err(err) => warn!(session_id = %session_id, error = %err, "child not reaped"),
    }
}
