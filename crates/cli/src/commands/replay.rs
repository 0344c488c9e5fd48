use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chatpilot_runtime::driver::{Script, ScriptedDriver};
use chatpilot_runtime::error::EXIT_OK;
use chatpilot_runtime::{ConfigError, ConfigSource, Driver, DriverFactory, SessionKind, Supervisor, SupervisorError, WorkerConfig};
use futures::StreamExt;
use tracing::debug;

use crate::error::{CliError, Result};
use crate::output::{OutputFormat, ReplyPrinter};

#[derive(Debug)]
pub struct ReplayArgs {
	pub config: PathBuf,
	pub script: PathBuf,
	pub format: OutputFormat,
	pub question: String,
}

/// Serves only `scripted` sessions from one loaded script.
struct ReplayFactory {
	script: Script,
}

impl DriverFactory for ReplayFactory {
	fn create(&self, config: &WorkerConfig) -> std::result::Result<Box<dyn Driver>, ConfigError> {
		match config.session_kind {
			SessionKind::Scripted => Ok(Box::new(ScriptedDriver::new(self.script.clone()))),
			kind => Err(ConfigError::Unsupported { kind }),
		}
	}
}

pub async fn run(args: ReplayArgs) -> Result<()> {
	let script = Script::from_file(&args.script).with_context(|| format!("failed to load script {}", args.script.display()))?;

	let supervisor = Supervisor::new();
	supervisor.start(ConfigSource::File(args.config), Arc::new(ReplayFactory { script }))?;

	let outcome = converse(&supervisor, &args.question, args.format).await;
	// The worker may already be gone; its exit code is what counts then.
	if let Err(err) = supervisor.exit() {
		debug!(target = "chatpilot", error = %err, "exit not delivered");
	}
	let code = supervisor.join().await;
	debug!(target = "chatpilot", code, "worker joined");

	if code != EXIT_OK {
		return Err(SupervisorError::WorkerExited { code }.into());
	}
	outcome
}

async fn converse(supervisor: &Supervisor, question: &str, format: OutputFormat) -> Result<()> {
	let mut stream = supervisor.ask(question).await?;
	let mut printer = ReplyPrinter::new(std::io::stdout(), format, question);
	while let Some(event) = stream.next().await {
		printer.print(&event)?;
	}
	if let Some(failure) = stream.failure() {
		return Err(CliError::Turn(format!("{}: {}", failure.message, failure.cause.detail)));
	}
	printer.finish()?;
	Ok(())
}
