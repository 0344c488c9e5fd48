//! Deterministic in-process driver.
//!
//! Replays a [`Script`] instead of touching a browser: canned launch and
//! sign-in failures, a per-turn sequence of reply samples, and optional
//! surface errors. Every call is appended to a shared [`Journal`] so tests can
//! inspect what the worker did after the driver has moved onto its thread.
//!
//! ```ignore
//! let journal = Journal::default();
//! let script = Script::single_turn(["", "Hel", "Hello", "Hello world"]);
//! let driver = ScriptedDriver::with_journal(script, journal.clone());
//! // hand `driver` to a worker, then:
//! assert_eq!(journal.count(|call| matches!(call, DriverCall::Launch)), 1);
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{Driver, SignIn};
use crate::config::WorkerConfig;
use crate::error::{DriverError, DriverResult};

/// What a [`ScriptedDriver`] replays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
	/// Number of initial `launch` calls that fail.
	#[serde(default)]
	pub launch_failures: u32,
	#[serde(default)]
	pub sign_in_failures: u32,
	#[serde(default)]
	pub submit_failures: u32,
	/// 1-based reload numbers that fail.
	#[serde(default)]
	pub failing_reloads: Vec<u32>,
	#[serde(default)]
	pub needs_interactive: bool,
	/// Turn scripts, one per submit. The last one repeats.
	#[serde(default)]
	pub turns: Vec<TurnScript>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnScript {
	/// `is_start_reply` polls answered `false` before the reply starts.
	#[serde(default)]
	pub start_after_polls: u32,
	/// Successive `read_text` results. The last one repeats.
	#[serde(default)]
	pub samples: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub html: Option<String>,
	/// Sample index after which the surface shows an error, once.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub surface_error_at: Option<usize>,
	/// Sample indices whose first `read_text` fails. The next read returns
	/// the same sample.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub failing_reads: Vec<usize>,
	/// Delay added to every `is_reply_over` and `read_html` call, like a page
	/// round trip.
	#[serde(default)]
	pub page_delay_ms: u64,
	/// Keep streaming the last sample forever.
	#[serde(default)]
	pub never_finish: bool,
}

impl Script {
	pub fn from_file(path: &Path) -> DriverResult<Self> {
		let raw = std::fs::read_to_string(path)?;
		Ok(serde_json::from_str(&raw)?)
	}

	/// Script whose every turn streams `samples` and then ends.
	pub fn single_turn<I, S>(samples: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			turns: vec![TurnScript::streaming(samples)],
			..Self::default()
		}
	}
}

impl TurnScript {
	pub fn streaming<I, S>(samples: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			samples: samples.into_iter().map(Into::into).collect(),
			..Self::default()
		}
	}
}

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
	Launch,
	RestoreCredentials,
	SignIn,
	Prepare,
	PersistCredentials,
	Submit(String),
	Reload,
	BeforeRetry,
	BeforeReload,
	Close,
}

/// Shared, append-only record of driver calls.
#[derive(Debug, Clone, Default)]
pub struct Journal {
	calls: Arc<Mutex<Vec<DriverCall>>>,
}

impl Journal {
	fn record(&self, call: DriverCall) {
		self.calls.lock().push(call);
	}

	pub fn calls(&self) -> Vec<DriverCall> {
		self.calls.lock().clone()
	}

	pub fn count(&self, predicate: impl Fn(&DriverCall) -> bool) -> usize {
		self.calls.lock().iter().filter(|call| predicate(call)).count()
	}
}

#[derive(Debug, Default)]
struct TurnProgress {
	index: Option<usize>,
	start_polls: u32,
	reads: usize,
	failed_reads: Vec<usize>,
	surface_error_fired: bool,
}

pub struct ScriptedDriver {
	script: Script,
	journal: Journal,
	launches: u32,
	sign_ins: u32,
	submits: u32,
	reloads: u32,
	open: bool,
	turn: TurnProgress,
}

impl ScriptedDriver {
	pub fn new(script: Script) -> Self {
		Self::with_journal(script, Journal::default())
	}

	pub fn with_journal(script: Script, journal: Journal) -> Self {
		Self {
			script,
			journal,
			launches: 0,
			sign_ins: 0,
			submits: 0,
			reloads: 0,
			open: false,
			turn: TurnProgress::default(),
		}
	}

	pub fn journal(&self) -> Journal {
		self.journal.clone()
	}

	fn ensure_open(&self) -> DriverResult<()> {
		if self.open { Ok(()) } else { Err(DriverError::NoSession) }
	}

	fn current_turn(&self) -> DriverResult<&TurnScript> {
		let index = self.turn.index.ok_or_else(|| DriverError::Other("no turn submitted".into()))?;
		let turns = &self.script.turns;
		turns
			.get(index)
			.or_else(|| turns.last())
			.ok_or_else(|| DriverError::Other("script has no turns".into()))
	}

	async fn page_delay(&self) -> DriverResult<()> {
		let ms = self.current_turn()?.page_delay_ms;
		if ms > 0 {
			tokio::time::sleep(Duration::from_millis(ms)).await;
		}
		Ok(())
	}

	fn sample(&self, read: usize) -> DriverResult<String> {
		let samples = &self.current_turn()?.samples;
		Ok(samples.get(read).or_else(|| samples.last()).cloned().unwrap_or_default())
	}
}

#[async_trait]
impl Driver for ScriptedDriver {
	fn name(&self) -> &str {
		"scripted"
	}

	async fn launch(&mut self, _config: &WorkerConfig) -> DriverResult<()> {
		self.journal.record(DriverCall::Launch);
		self.launches += 1;
		if self.launches <= self.script.launch_failures {
			return Err(DriverError::Launch(format!("scripted launch failure {}", self.launches)));
		}
		self.open = true;
		Ok(())
	}

	async fn sign_in(&mut self, _config: &WorkerConfig) -> DriverResult<SignIn> {
		self.journal.record(DriverCall::SignIn);
		self.ensure_open()?;
		self.sign_ins += 1;
		if self.sign_ins <= self.script.sign_in_failures {
			return Err(DriverError::Other(format!("scripted sign-in failure {}", self.sign_ins)));
		}
		Ok(if self.script.needs_interactive {
			SignIn::NeedsInteractive
		} else {
			SignIn::Ok
		})
	}

	async fn prepare(&mut self) -> DriverResult<()> {
		self.journal.record(DriverCall::Prepare);
		self.ensure_open()
	}

	async fn submit(&mut self, text: &str) -> DriverResult<()> {
		self.journal.record(DriverCall::Submit(text.to_string()));
		self.ensure_open()?;
		self.submits += 1;
		if self.submits <= self.script.submit_failures {
			return Err(DriverError::NotFound { selector: "input".into() });
		}
		let next = self.turn.index.map_or(0, |index| index + 1);
		self.turn = TurnProgress {
			index: Some(next),
			..TurnProgress::default()
		};
		Ok(())
	}

	async fn is_start_reply(&mut self) -> DriverResult<bool> {
		let threshold = self.current_turn()?.start_after_polls;
		self.turn.start_polls += 1;
		Ok(self.turn.start_polls > threshold)
	}

	async fn read_text(&mut self) -> DriverResult<String> {
		let read = self.turn.reads;
		if self.current_turn()?.failing_reads.contains(&read) && !self.turn.failed_reads.contains(&read) {
			self.turn.failed_reads.push(read);
			return Err(DriverError::Timeout {
				ms: 0,
				condition: format!("scripted read {read}"),
			});
		}
		let text = self.sample(read)?;
		self.turn.reads += 1;
		Ok(text)
	}

	async fn read_html(&mut self) -> DriverResult<String> {
		self.page_delay().await?;
		let turn = self.current_turn()?;
		if let Some(html) = &turn.html {
			return Ok(html.clone());
		}
		let text = self.sample(self.turn.reads.saturating_sub(1))?;
		Ok(format!("<p>{text}</p>"))
	}

	async fn is_reply_over(&mut self) -> DriverResult<bool> {
		self.page_delay().await?;
		let turn = self.current_turn()?;
		Ok(!turn.never_finish && self.turn.reads > turn.samples.len())
	}

	async fn has_surface_error(&mut self) -> DriverResult<bool> {
		let at = self.current_turn()?.surface_error_at;
		let last_read = self.turn.reads.checked_sub(1);
		if !self.turn.surface_error_fired && at.is_some() && at == last_read {
			self.turn.surface_error_fired = true;
			return Ok(true);
		}
		Ok(false)
	}

	async fn reload(&mut self) -> DriverResult<()> {
		self.journal.record(DriverCall::Reload);
		self.ensure_open()?;
		self.reloads += 1;
		if self.script.failing_reloads.contains(&self.reloads) {
			return Err(DriverError::Navigation {
				url: "scripted://chat".into(),
				message: format!("scripted reload failure {}", self.reloads),
			});
		}
		Ok(())
	}

	async fn before_retry(&mut self) -> DriverResult<()> {
		self.journal.record(DriverCall::BeforeRetry);
		Ok(())
	}

	async fn before_reload(&mut self) -> DriverResult<()> {
		self.journal.record(DriverCall::BeforeReload);
		Ok(())
	}

	async fn persist_credentials(&mut self) -> DriverResult<()> {
		self.journal.record(DriverCall::PersistCredentials);
		Ok(())
	}

	async fn restore_credentials(&mut self) -> DriverResult<bool> {
		self.journal.record(DriverCall::RestoreCredentials);
		Ok(false)
	}

	async fn close(&mut self) -> DriverResult<()> {
		self.journal.record(DriverCall::Close);
		self.open = false;
		Ok(())
	}
}
