//! The per-surface capability interface the worker drives.

mod scripted;

pub use scripted::{DriverCall, Journal, Script, ScriptedDriver, TurnScript};

use async_trait::async_trait;

use crate::config::WorkerConfig;
use crate::error::{ConfigError, DriverResult};

/// Outcome of [`Driver::sign_in`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignIn {
	Ok,
	/// A human has to finish signing in (captcha, verification mail).
	NeedsInteractive,
}

/// One chat surface.
///
/// The worker calls the lifecycle methods in order (`launch`,
/// `restore_credentials`, `sign_in`, `prepare`, `persist_credentials`) and
/// then alternates `submit` with the polling reads while a turn streams.
/// Every method may fail; the worker decides whether a failure means retry,
/// reload, or a skipped poll tick.
#[async_trait]
pub trait Driver: Send {
	/// Short name used as the `source` of progress reports.
	fn name(&self) -> &str;

	/// Opens the browser session and navigates to the surface.
	async fn launch(&mut self, config: &WorkerConfig) -> DriverResult<()>;

	async fn sign_in(&mut self, config: &WorkerConfig) -> DriverResult<SignIn>;

	/// Waits until the surface accepts input.
	async fn prepare(&mut self) -> DriverResult<()> {
		Ok(())
	}

	async fn submit(&mut self, text: &str) -> DriverResult<()>;

	/// Whether a reply to the last submit has begun.
	async fn is_start_reply(&mut self) -> DriverResult<bool>;

	/// Text of the reply currently being streamed.
	async fn read_text(&mut self) -> DriverResult<String>;

	async fn read_html(&mut self) -> DriverResult<String>;

	async fn is_reply_over(&mut self) -> DriverResult<bool>;

	/// Whether the surface shows an in-band error that calls for a reload.
	async fn has_surface_error(&mut self) -> DriverResult<bool> {
		Ok(false)
	}

	/// Re-navigates the existing session without relaunching it.
	async fn reload(&mut self) -> DriverResult<()>;

	async fn before_retry(&mut self) -> DriverResult<()> {
		Ok(())
	}

	async fn before_reload(&mut self) -> DriverResult<()> {
		Ok(())
	}

	async fn persist_credentials(&mut self) -> DriverResult<()> {
		Ok(())
	}

	/// Applies persisted credentials. Returns whether any were found.
	async fn restore_credentials(&mut self) -> DriverResult<bool> {
		Ok(false)
	}

	/// Tears the session down. Safe to call when nothing is open.
	async fn close(&mut self) -> DriverResult<()>;
}

/// Builds the driver for a loaded config, on the worker's thread.
pub trait DriverFactory: Send + Sync {
	fn create(&self, config: &WorkerConfig) -> Result<Box<dyn Driver>, ConfigError>;
}

impl<F> DriverFactory for F
where
	F: Fn(&WorkerConfig) -> Result<Box<dyn Driver>, ConfigError> + Send + Sync,
{
	fn create(&self, config: &WorkerConfig) -> Result<Box<dyn Driver>, ConfigError> {
		self(config)
	}
}
