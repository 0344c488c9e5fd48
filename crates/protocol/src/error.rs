//! Structured failure payload carried by `Error` envelopes.

use serde::{Deserialize, Serialize};

/// Failure taxonomy shared by both sides of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	/// Missing or invalid worker configuration. Fatal at startup.
	Config,
	/// Launch, navigation, or sign-in failure. Recovered by retry.
	Session,
	/// Retry budget used up. Fatal.
	RetryExhausted,
	/// The driven surface reported an in-band error mid-stream. Recovered by reload.
	Surface,
	/// Message delivery between supervisor and worker failed.
	Transport,
	/// A submission arrived while a turn was still streaming.
	Busy,
}

impl std::fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			ErrorKind::Config => "config",
			ErrorKind::Session => "session",
			ErrorKind::RetryExhausted => "retry_exhausted",
			ErrorKind::Surface => "surface",
			ErrorKind::Transport => "transport",
			ErrorKind::Busy => "busy",
		};
		f.write_str(name)
	}
}

/// Cause attached to a reported error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
	pub kind: ErrorKind,
	pub detail: String,
}

impl ErrorPayload {
	pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
		Self { kind, detail: detail.into() }
	}
}
