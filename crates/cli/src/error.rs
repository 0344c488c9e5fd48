use chatpilot_runtime::error::{EXIT_CONFIG, EXIT_FAILURE};
use chatpilot_runtime::{ConfigError, SupervisorError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error(transparent)]
	Supervisor(#[from] SupervisorError),

	#[error("turn failed: {0}")]
	Turn(String),

	#[error("reply ended without a final event")]
	Incomplete,

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

impl CliError {
	/// Process exit code; worker exit codes pass through unchanged.
	pub fn exit_code(&self) -> i32 {
		match self {
			CliError::Config(_) => EXIT_CONFIG,
			CliError::Supervisor(SupervisorError::WorkerExited { code }) if *code != 0 => *code,
			_ => EXIT_FAILURE,
		}
	}
}
