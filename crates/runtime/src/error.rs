//! Error types for configuration, drivers, the worker, and the supervisor.

use std::path::PathBuf;

use chatpilot_protocol::{ErrorKind, MessageKind};
use thiserror::Error;

use crate::config::SessionKind;

/// Worker ended normally (requested exit or supervisor gone).
pub const EXIT_OK: i32 = 0;
/// Host-level failure outside the worker taxonomy.
pub const EXIT_FAILURE: i32 = 1;
/// Missing or invalid configuration at startup.
pub const EXIT_CONFIG: i32 = 2;
/// Retry budget used up.
pub const EXIT_RETRY_EXHAUSTED: i32 = 3;

pub type Result<T, E = WorkerError> = std::result::Result<T, E>;
pub type DriverResult<T> = std::result::Result<T, DriverError>;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("config file not found: {}", path.display())]
	Missing { path: PathBuf },

	#[error("failed to read config {}: {source}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse config {}: {source}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("invalid config: {0}")]
	Invalid(String),

	#[error("session kind `{kind}` is not supported by this host")]
	Unsupported { kind: SessionKind },
}

#[derive(Debug, Error)]
pub enum DriverError {
	#[error("element not found: {selector}")]
	NotFound { selector: String },

	#[error("timed out after {ms}ms waiting for {condition}")]
	Timeout { ms: u64, condition: String },

	#[error("navigation to {url} failed: {message}")]
	Navigation { url: String, message: String },

	#[error("browser launch failed: {0}")]
	Launch(String),

	#[error("no active session")]
	NoSession,

	#[error("page is closed")]
	Closed,

	#[error("credentials required to sign in")]
	MissingCredentials,

	#[error("interactive sign-in required but the session is headless")]
	InteractiveRequired,

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error("{0}")]
	Other(String),
}

#[derive(Debug, Error)]
pub enum WorkerError {
	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error("session error: {0}")]
	Session(#[from] DriverError),

	#[error("retry over count: {limit}")]
	RetryExhausted { limit: u32 },

	#[error("surface reported an error")]
	Surface,

	#[error("supervisor channel closed")]
	Transport,
}

impl WorkerError {
	/// Wire-level classification of this error.
	pub fn kind(&self) -> ErrorKind {
		match self {
			WorkerError::Config(_) => ErrorKind::Config,
			WorkerError::Session(_) => ErrorKind::Session,
			WorkerError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
			WorkerError::Surface => ErrorKind::Surface,
			WorkerError::Transport => ErrorKind::Transport,
		}
	}

	/// Exit code the hosting process reports when the worker ends with this error.
	pub fn exit_code(&self) -> i32 {
		match self {
			WorkerError::Config(_) => EXIT_CONFIG,
			WorkerError::RetryExhausted { .. } => EXIT_RETRY_EXHAUSTED,
			WorkerError::Transport => EXIT_OK,
			WorkerError::Session(_) | WorkerError::Surface => EXIT_FAILURE,
		}
	}
}

#[derive(Debug, Error)]
pub enum SupervisorError {
	#[error("worker channel closed; {kind} message not delivered")]
	Transport { kind: MessageKind },

	#[error("worker exited with code {code}")]
	WorkerExited { code: i32 },

	#[error("worker already started")]
	AlreadyStarted,

	#[error("another reply is still streaming")]
	Busy,

	#[error("failed to spawn worker thread: {0}")]
	Spawn(#[source] std::io::Error),
}
