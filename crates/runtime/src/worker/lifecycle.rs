use std::fmt;

use crate::error::EXIT_OK;

/// Where the worker is in its session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
	Uninitialized,
	ConfigLoaded,
	SessionLaunched,
	SignedIn,
	Ready,
	Conversing,
	Retrying,
	Reloading,
	Terminated,
}

impl fmt::Display for LifecycleState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			LifecycleState::Uninitialized => "uninitialized",
			LifecycleState::ConfigLoaded => "config_loaded",
			LifecycleState::SessionLaunched => "session_launched",
			LifecycleState::SignedIn => "signed_in",
			LifecycleState::Ready => "ready",
			LifecycleState::Conversing => "conversing",
			LifecycleState::Retrying => "retrying",
			LifecycleState::Reloading => "reloading",
			LifecycleState::Terminated => "terminated",
		};
		f.write_str(name)
	}
}

/// Retry attempts used over the worker's lifetime. Reloads never count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
	attempts_used: u32,
}

impl RetryState {
	pub fn attempts_used(&self) -> u32 {
		self.attempts_used
	}

	/// Consumes one attempt if `limit` allows it.
	pub fn try_consume(&mut self, limit: u32) -> bool {
		if self.attempts_used >= limit {
			return false;
		}
		self.attempts_used += 1;
		true
	}
}

/// How a worker that did not fail came to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
	/// The supervisor sent `Exit`.
	Requested,
	/// The supervisor side of the channel went away.
	Disconnected,
}

impl WorkerExit {
	pub fn code(self) -> i32 {
		EXIT_OK
	}
}
