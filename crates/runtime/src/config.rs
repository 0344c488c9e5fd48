//! Worker configuration, loaded once at startup from JSON.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "chatpilot.config.json";
/// Credential file name, resolved next to the config file.
pub const DEFAULT_COOKIES_FILE: &str = "cookies.json";
pub const DEFAULT_RETRY_LIMIT: u32 = 3;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 40;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 200;

/// Which chat surface the worker drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionKind {
	#[serde(rename = "chatgpt", alias = "ChatGPT")]
	ChatGpt,
	#[serde(rename = "chatCutterman", alias = "ChatCutterman")]
	ChatCutterman,
	#[serde(rename = "fastChat", alias = "FastChat")]
	FastChat,
	/// Deterministic in-process driver for tests and dry runs.
	#[serde(rename = "scripted")]
	Scripted,
}

impl fmt::Display for SessionKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			SessionKind::ChatGpt => "chatgpt",
			SessionKind::ChatCutterman => "chatCutterman",
			SessionKind::FastChat => "fastChat",
			SessionKind::Scripted => "scripted",
		};
		f.write_str(name)
	}
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
	pub email: String,
	pub password: String,
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Credentials").field("email", &self.email).field("password", &"<redacted>").finish()
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerConfig {
	pub session_kind: SessionKind,
	#[serde(default, alias = "chromePath", skip_serializing_if = "Option::is_none")]
	pub executable_path: Option<PathBuf>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub credentials: Option<Credentials>,
	/// Extra `main()` attempts allowed after the first one fails.
	#[serde(default = "default_retry_limit", alias = "retryCount")]
	pub retry_limit: u32,
	#[serde(default = "default_headless")]
	pub headless: bool,
	/// Overrides the surface's default URL.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cookies_path: Option<PathBuf>,
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	/// Pause between a successful submit and the first watcher tick.
	#[serde(default = "default_settle_delay_ms")]
	pub settle_delay_ms: u64,
	/// Pause after tearing down a failed session, before the next attempt.
	#[serde(default)]
	pub retry_delay_ms: u64,
}

fn default_retry_limit() -> u32 {
	DEFAULT_RETRY_LIMIT
}

fn default_headless() -> bool {
	true
}

fn default_poll_interval_ms() -> u64 {
	DEFAULT_POLL_INTERVAL_MS
}

fn default_settle_delay_ms() -> u64 {
	DEFAULT_SETTLE_DELAY_MS
}

impl WorkerConfig {
	/// Config with every optional field at its default.
	pub fn new(session_kind: SessionKind) -> Self {
		Self {
			session_kind,
			executable_path: None,
			credentials: None,
			retry_limit: DEFAULT_RETRY_LIMIT,
			headless: true,
			url: None,
			cookies_path: None,
			poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
			settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
			retry_delay_ms: 0,
		}
	}

	/// Reads, parses and validates a config file.
	///
	/// A relative `cookiesPath` is resolved against the config file's
	/// directory, and an absent one defaults to `cookies.json` beside it.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		if !path.exists() {
			return Err(ConfigError::Missing { path: path.to_path_buf() });
		}
		let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		let mut config: WorkerConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})?;

		let base = path.parent().unwrap_or_else(|| Path::new(""));
		config.cookies_path = Some(match config.cookies_path.take() {
			Some(cookies) if cookies.is_relative() => base.join(cookies),
			Some(cookies) => cookies,
			None => base.join(DEFAULT_COOKIES_FILE),
		});

		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.poll_interval_ms == 0 {
			return Err(ConfigError::Invalid("pollIntervalMs must be greater than zero".into()));
		}
		if self.session_kind == SessionKind::ChatGpt && self.credentials.is_none() {
			return Err(ConfigError::Invalid("chatgpt sessions require credentials".into()));
		}
		if self.url.as_deref().is_some_and(|url| url.trim().is_empty()) {
			return Err(ConfigError::Invalid("url must not be empty".into()));
		}
		Ok(())
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn settle_delay(&self) -> Duration {
		Duration::from_millis(self.settle_delay_ms)
	}

	pub fn retry_delay(&self) -> Duration {
		Duration::from_millis(self.retry_delay_ms)
	}

	/// Where persisted cookies live for this session.
	pub fn credential_path(&self) -> PathBuf {
		self.cookies_path.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_COOKIES_FILE))
	}
}

/// Where the worker gets its configuration from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
	File(PathBuf),
	Inline(WorkerConfig),
}

impl ConfigSource {
	pub fn default_file() -> Self {
		ConfigSource::File(PathBuf::from(DEFAULT_CONFIG_FILE))
	}

	pub fn load(&self) -> Result<WorkerConfig, ConfigError> {
		match self {
			ConfigSource::File(path) => WorkerConfig::load(path),
			ConfigSource::Inline(config) => {
				config.validate()?;
				Ok(config.clone())
			}
		}
	}
}

impl From<WorkerConfig> for ConfigSource {
	fn from(config: WorkerConfig) -> Self {
		ConfigSource::Inline(config)
	}
}
