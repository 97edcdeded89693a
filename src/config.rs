//! Launch configuration parsing, validation, and credential resolution.
//!
//! Configuration is one TOML file; everything except `command` has a
//! default. Credentials can be inlined, pulled from environment variables,
//! or fetched from the OS keychain. Resolution happens before any child
//! process exists, so a missing secret fails the launch instead of leaving
//! a spawned child waiting on a payload that never comes.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::session::HandshakeTimeouts;
use crate::supervisor::SpawnConfig;
use crate::wire::codec::WireFormat;
use crate::wire::creds::CredentialSet;
use crate::{AppError, Result};

/// Launch configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LaunchConfig {
    /// Program to launch.
    pub command: String,
    /// Arguments passed to the program verbatim.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the child; canonicalized during validation.
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
    /// Payload encoding for the handshake.
    #[serde(default)]
    pub encoding: WireFormat,
    /// Environment variable names forwarded to the child on top of the
    /// built-in allowlist.
    #[serde(default)]
    pub passthrough_env: Vec<String>,
    /// Handshake deadlines.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Static credentials inlined in the config file.
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
    /// Additional credential sources.
    #[serde(default)]
    pub source: SourceConfig,
}

/// Configurable handshake deadlines (seconds).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Bound on `+READY`, measured from process spawn.
    #[serde(default = "default_ready_seconds")]
    pub ready_seconds: u64,
    /// Bound on the credential payload, measured from `+READY`.
    #[serde(default = "default_payload_seconds")]
    pub payload_seconds: u64,
    /// Bound on the acknowledgement, measured from payload delivery.
    #[serde(default = "default_ack_seconds")]
    pub ack_seconds: u64,
}

fn default_ready_seconds() -> u64 {
    10
}

fn default_payload_seconds() -> u64 {
    5
}

fn default_ack_seconds() -> u64 {
    5
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            ready_seconds: default_ready_seconds(),
            payload_seconds: default_payload_seconds(),
            ack_seconds: default_ack_seconds(),
        }
    }
}

impl TimeoutConfig {
    /// Convert the configured seconds to runtime deadlines.
    #[must_use]
    pub fn to_timeouts(&self) -> HandshakeTimeouts {
        HandshakeTimeouts {
            ready: Duration::from_secs(self.ready_seconds),
            payload: Duration::from_secs(self.payload_seconds),
            ack: Duration::from_secs(self.ack_seconds),
        }
    }
}

/// Where additional credentials come from.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SourceConfig {
    /// Environment variables read at launch; each name doubles as the
    /// credential name.
    #[serde(default)]
    pub env: Vec<String>,
    /// OS keychain lookups.
    #[serde(default)]
    pub keychain: Option<KeychainConfig>,
}

/// OS keychain credential source.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct KeychainConfig {
    /// Keychain service the entries live under.
    pub service: String,
    /// Entry names to fetch; each name doubles as the credential name.
    pub keys: Vec<String>,
}

impl LaunchConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Spawn settings for the supervisor.
    #[must_use]
    pub fn spawn_config(&self) -> SpawnConfig {
        SpawnConfig {
            program: self.command.clone(),
            args: self.args.clone(),
            workspace_root: self.workspace_root.clone(),
            extra_env: self.passthrough_env.clone(),
        }
    }

    /// Gather credentials from every configured source.
    ///
    /// Static entries load first, then environment variables, then the
    /// keychain; a name defined by several sources keeps the last value, so
    /// keychain beats environment beats static.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a configured source cannot produce its
    /// credential.
    pub async fn resolve_credentials(&self) -> Result<CredentialSet> {
        let mut creds = CredentialSet::new();
        for (name, value) in &self.credentials {
            creds.insert(name, value.clone())?;
        }
        for name in &self.source.env {
            let value = env::var(name).map_err(|_| {
                AppError::Config(format!("credential {name} not set in environment"))
            })?;
            creds.insert(name, value)?;
        }
        if let Some(keychain) = &self.source.keychain {
            for name in &keychain.keys {
                let value = load_keychain_entry(&keychain.service, name).await?;
                creds.insert(name, value)?;
            }
        }
        Ok(creds)
    }

    fn validate(&mut self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(AppError::Config("command must not be empty".into()));
        }

        for name in self
            .credentials
            .keys()
            .map(String::as_str)
            .chain(self.source.env.iter().map(String::as_str))
            .chain(keychain_keys(&self.source))
        {
            if !CredentialSet::is_valid_name(name) {
                return Err(AppError::Config(format!(
                    "invalid credential name: {name:?}"
                )));
            }
        }

        if self.timeouts.ready_seconds == 0
            || self.timeouts.payload_seconds == 0
            || self.timeouts.ack_seconds == 0
        {
            return Err(AppError::Config("timeouts must be greater than zero".into()));
        }

        if let Some(root) = &self.workspace_root {
            let canonical = root
                .canonicalize()
                .map_err(|err| AppError::Config(format!("workspace_root invalid: {err}")))?;
            self.workspace_root = Some(canonical);
        }

        Ok(())
    }
}

fn keychain_keys(source: &SourceConfig) -> impl Iterator<Item = &str> {
    source
        .keychain
        .iter()
        .flat_map(|keychain| keychain.keys.iter().map(String::as_str))
}

/// Load a single credential from the OS keychain with env-var fallback.
async fn load_keychain_entry(service: &str, name: &str) -> Result<String> {
    let service_key = service.to_owned();
    let entry_key = name.to_owned();

    // Try the OS keychain first via spawn_blocking (keyring is synchronous I/O).
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(&service_key, &entry_key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = name, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(key = name, ?err, "keychain lookup failed, trying env var");
        }
    }

    // Fallback to an identically named environment variable.
    env::var(name).map_err(|_| {
        AppError::Config(format!(
            "credential {name} not found in {service} keychain or env var"
        ))
    })
}
