//! Polling reply watcher.
//!
//! A turn is watched in two phases. Phase A polls
//! [`Driver::is_start_reply`] until the reply begins. Phase B then samples the
//! reply text on every tick and emits the newly appended suffix, until the
//! driver reports the reply is over.
//!
//! Waiting for a tick ([`StreamWatcher::wait`]) is cancel-safe and may be
//! raced against other work. Running the tick ([`StreamWatcher::step`]) is
//! not: once started it has to run to completion, so callers only race the
//! wait and check for cancellation before each step.

use std::time::Duration;

use chatpilot_protocol::ChatEvent;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::config::DEFAULT_POLL_INTERVAL_MS;
use crate::driver::Driver;
use crate::error::DriverError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WatchPhase {
	#[default]
	Idle,
	AwaitStart,
	Streaming,
}

/// What a single tick observed.
#[derive(Debug)]
pub enum Tick {
	/// Nothing to emit.
	Idle,
	/// The reply began; streaming starts on the next tick.
	Started,
	Event(ChatEvent),
	/// The surface shows an error; the turn has to be abandoned.
	SurfaceError,
	/// A driver read failed. The tick is skipped; the next one may succeed.
	ReadFailed(DriverError),
	/// The watch was reset before the tick ran.
	Cancelled,
}

/// Per-turn state, owned by the worker.
///
/// `poll_timer` doubles as the cancellation token: a tick that finds it gone
/// does nothing. The terminal flag stays armed from the `End` of a turn until
/// the next [`StreamWatcher::begin`].
#[derive(Debug, Default)]
pub struct WatcherState {
	last_observed_text: String,
	poll_timer: Option<Interval>,
	terminal_flag_armed: bool,
	started: bool,
	phase: WatchPhase,
}

impl WatcherState {
	pub fn last_observed_text(&self) -> &str {
		&self.last_observed_text
	}

	pub fn phase(&self) -> WatchPhase {
		self.phase
	}

	/// Whether a turn is being watched.
	pub fn is_active(&self) -> bool {
		self.poll_timer.is_some()
	}

	pub fn is_armed(&self) -> bool {
		self.terminal_flag_armed
	}

	/// Whether this turn has emitted its `Start`.
	pub fn has_started(&self) -> bool {
		self.started
	}

	/// Cancels the timer and clears all turn progress. Idempotent.
	pub fn reset(&mut self) {
		self.poll_timer = None;
		self.last_observed_text.clear();
		self.terminal_flag_armed = false;
		self.started = false;
		self.phase = WatchPhase::Idle;
	}
}

#[derive(Debug, Clone)]
pub struct StreamWatcher {
	interval: Duration,
}

impl Default for StreamWatcher {
	fn default() -> Self {
		Self::new(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS))
	}
}

impl StreamWatcher {
	pub fn new(interval: Duration) -> Self {
		Self { interval }
	}

	pub fn interval(&self) -> Duration {
		self.interval
	}

	fn timer(&self) -> Interval {
		let mut timer = tokio::time::interval(self.interval);
		timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
		timer
	}

	/// Starts watching a freshly submitted turn (phase A).
	pub fn begin(&self, state: &mut WatcherState) {
		debug_assert!(state.last_observed_text.is_empty(), "turn started without reset");
		state.terminal_flag_armed = false;
		state.started = false;
		state.phase = WatchPhase::AwaitStart;
		state.poll_timer = Some(self.timer());
	}

	/// Waits for the next tick of the active timer. Returns `false` at once
	/// when no turn is being watched.
	///
	/// Cancel-safe: dropping the future loses nothing.
	pub async fn wait(&self, state: &mut WatcherState) -> bool {
		match state.poll_timer.as_mut() {
			Some(timer) => {
				timer.tick().await;
				true
			}
			None => false,
		}
	}

	/// Waits for the next tick and runs it.
	pub async fn poll(&self, state: &mut WatcherState, driver: &mut dyn Driver) -> Tick {
		if !self.wait(state).await {
			return Tick::Cancelled;
		}
		self.step(state, driver).await
	}

	/// Runs one tick against the driver. Must not be cancelled once started.
	pub async fn step(&self, state: &mut WatcherState, driver: &mut dyn Driver) -> Tick {
		if state.poll_timer.is_none() || state.terminal_flag_armed {
			return Tick::Cancelled;
		}

		match state.phase {
			WatchPhase::AwaitStart => self.await_start(state, driver).await,
			WatchPhase::Streaming => self.stream(state, driver).await,
			WatchPhase::Idle => Tick::Cancelled,
		}
	}

	async fn await_start(&self, state: &mut WatcherState, driver: &mut dyn Driver) -> Tick {
		match driver.is_start_reply().await {
			Ok(true) => {
				debug!(target = "chatpilot.watcher", "reply started");
				state.poll_timer = Some(self.timer());
				state.phase = WatchPhase::Streaming;
				Tick::Started
			}
			Ok(false) => Tick::Idle,
			Err(err) => Tick::ReadFailed(err),
		}
	}

	async fn stream(&self, state: &mut WatcherState, driver: &mut dyn Driver) -> Tick {
		let text = match driver.read_text().await {
			Ok(text) => text,
			Err(err) => return Tick::ReadFailed(err),
		};
		match driver.has_surface_error().await {
			Ok(true) => return Tick::SurfaceError,
			Ok(false) => {}
			Err(err) => return Tick::ReadFailed(err),
		}

		let over = match driver.is_reply_over().await {
			Ok(over) => over,
			Err(err) => return Tick::ReadFailed(err),
		};
		let delta = match text.strip_prefix(state.last_observed_text.as_str()) {
			Some(delta) => Some(delta.to_string()),
			None => {
				debug!(
					target = "chatpilot.watcher",
					previous_len = state.last_observed_text.len(),
					len = text.len(),
					"reply text no longer extends the previous sample"
				);
				None
			}
		};
		state.last_observed_text.clone_from(&text);

		if over {
			state.reset();
			state.terminal_flag_armed = true;
			let html = driver.read_html().await.unwrap_or_else(|err| {
				warn!(target = "chatpilot.watcher", error = %err, "failed to read reply html");
				String::new()
			});
			return Tick::Event(ChatEvent::end(&text, &html));
		}

		match delta {
			Some(delta) if !delta.is_empty() => {
				if state.started {
					Tick::Event(ChatEvent::replying(&delta, &text))
				} else {
					state.started = true;
					Tick::Event(ChatEvent::start(&text))
				}
			}
			_ => Tick::Idle,
		}
	}
}
