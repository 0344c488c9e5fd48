//! The chat worker: owns one driver and runs its lifecycle.
//!
//! Startup (`boot`) runs `main()` until it succeeds, retrying with a fresh
//! session on each failure until the retry budget runs out. Once `Ready` is
//! announced the worker serves supervisor messages, watching one turn at a
//! time. Surface errors and `Refresh` requests reload the page in place, which
//! never touches the retry budget; a failed reload escalates to a retry.

mod lifecycle;
mod outbox;

pub use lifecycle::{LifecycleState, RetryState, WorkerExit};

use chatpilot_protocol::{ErrorKind, ErrorPayload, MessageKind, WorkerMessage};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use self::outbox::Outbox;
use crate::config::{ConfigSource, WorkerConfig};
use crate::driver::{Driver, DriverFactory, SignIn};
use crate::error::{DriverError, Result, WorkerError};
use crate::watcher::{StreamWatcher, Tick, WatcherState};

/// The worker's ends of the two message channels.
pub struct WorkerLink {
	inbox: mpsc::UnboundedReceiver<WorkerMessage>,
	outbox: mpsc::UnboundedSender<WorkerMessage>,
}

impl WorkerLink {
	pub fn new(inbox: mpsc::UnboundedReceiver<WorkerMessage>, outbox: mpsc::UnboundedSender<WorkerMessage>) -> Self {
		Self { inbox, outbox }
	}
}

pub struct ChatWorker {
	config: WorkerConfig,
	driver: Box<dyn Driver>,
	state: LifecycleState,
	retry: RetryState,
	watcher: StreamWatcher,
	watch: WatcherState,
	inbox: mpsc::UnboundedReceiver<WorkerMessage>,
	outbox: Outbox,
}

impl ChatWorker {
	pub fn new(config: WorkerConfig, driver: Box<dyn Driver>, link: WorkerLink) -> Self {
		let outbox = Outbox::new(link.outbox, driver.name());
		Self {
			watcher: StreamWatcher::new(config.poll_interval()),
			config,
			driver,
			state: LifecycleState::ConfigLoaded,
			retry: RetryState::default(),
			watch: WatcherState::default(),
			inbox: link.inbox,
			outbox,
		}
	}

	/// Loads the config, builds the driver, and runs until exit.
	pub async fn start(source: ConfigSource, factory: &dyn DriverFactory, link: WorkerLink) -> Result<WorkerExit> {
		let mut outbox = Outbox::new(link.outbox.clone(), "worker");
		outbox.report("start read config");
		let config = match source.load() {
			Ok(config) => config,
			Err(err) => {
				let err = WorkerError::Config(err);
				outbox.error("read config error", &err);
				return Err(err);
			}
		};
		outbox.set_source(config.session_kind.to_string());
		outbox.report("read config complete");

		let driver = match factory.create(&config) {
			Ok(driver) => driver,
			Err(err) => {
				let err = WorkerError::Config(err);
				outbox.error("unable to create driver", &err);
				return Err(err);
			}
		};
		ChatWorker::new(config, driver, link).run().await
	}

	pub fn state(&self) -> LifecycleState {
		self.state
	}

	pub fn retry_state(&self) -> RetryState {
		self.retry
	}

	pub async fn run(mut self) -> Result<WorkerExit> {
		let result = match self.boot().await {
			Ok(()) => self.serve().await,
			Err(err) => Err(err),
		};
		self.transition(LifecycleState::Terminated);
		match result {
			Err(WorkerError::Transport) => {
				info!(target = "chatpilot.worker", "supervisor gone; shutting down");
				self.close_session().await;
				Ok(WorkerExit::Disconnected)
			}
			other => other,
		}
	}

	fn transition(&mut self, next: LifecycleState) {
		if self.state != next {
			debug!(target = "chatpilot.worker", from = %self.state, to = %next, "lifecycle");
			self.state = next;
		}
	}

	/// Runs `main()` until it succeeds or the retry budget is spent.
	async fn boot(&mut self) -> Result<()> {
		loop {
			match self.main().await {
				Ok(()) => return Ok(()),
				Err(WorkerError::Transport) => return Err(WorkerError::Transport),
				Err(err) => {
					self.outbox.error("something went wrong, retry now", &err);
					self.retry().await?;
				}
			}
		}
	}

	async fn main(&mut self) -> Result<()> {
		self.outbox.report("start launch session");
		self.driver.launch(&self.config).await?;
		self.transition(LifecycleState::SessionLaunched);
		self.outbox.report("launch session complete");

		match self.driver.restore_credentials().await {
			Ok(true) => self.outbox.report("read cookies success"),
			Ok(false) => self.outbox.report("skip read cookies"),
			Err(err) => {
				warn!(target = "chatpilot.worker", error = %err, "failed to restore credentials");
				self.outbox.report("skip read cookies");
			}
		}

		self.outbox.report("start sign in");
		match self.driver.sign_in(&self.config).await? {
			SignIn::Ok => {}
			SignIn::NeedsInteractive if self.config.headless => return Err(DriverError::InteractiveRequired.into()),
			SignIn::NeedsInteractive => self.outbox.report("waiting for interactive sign in"),
		}
		self.transition(LifecycleState::SignedIn);
		self.outbox.report("sign in complete");

		self.driver.prepare().await?;
		if let Err(err) = self.driver.persist_credentials().await {
			warn!(target = "chatpilot.worker", error = %err, "failed to persist credentials");
		}
		self.announce_ready()
	}

	fn announce_ready(&mut self) -> Result<()> {
		self.transition(LifecycleState::Ready);
		self.outbox.send(WorkerMessage::ready())
	}

	/// Consumes one retry attempt and tears the session down for the next `main()`.
	async fn retry(&mut self) -> Result<()> {
		self.watch.reset();
		let limit = self.config.retry_limit;
		if !self.retry.try_consume(limit) {
			let err = WorkerError::RetryExhausted { limit };
			self.outbox.error("retry over count", &err);
			self.close_session().await;
			return Err(err);
		}

		self.transition(LifecycleState::Retrying);
		self.outbox.report_with("retry", json!({ "attempt": self.retry.attempts_used(), "limit": limit }));
		if let Err(err) = self.driver.before_retry().await {
			warn!(target = "chatpilot.worker", error = %err, "before-retry hook failed");
		}
		self.close_session().await;
		self.outbox.report("close session, ready to call main again");

		let delay = self.config.retry_delay();
		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}
		Ok(())
	}

	/// Abandons the current turn and re-navigates the existing session.
	async fn reload(&mut self) -> Result<()> {
		self.watch.reset();
		self.transition(LifecycleState::Reloading);
		self.outbox.report("reload");
		if let Err(err) = self.driver.before_reload().await {
			warn!(target = "chatpilot.worker", error = %err, "before-reload hook failed");
		}

		let reloaded = match self.driver.reload().await {
			Ok(()) => self.driver.prepare().await,
			Err(err) => Err(err),
		};
		match reloaded {
			Ok(()) => self.announce_ready(),
			Err(err) => {
				self.outbox.error("reload failed, retry now", &err.into());
				self.retry().await?;
				self.boot().await
			}
		}
	}

	async fn serve(&mut self) -> Result<WorkerExit> {
		loop {
			// Only the timer wait races the inbox. A started tick runs to the end,
			// and queued messages are handled before the next one.
			let message = if self.watch.is_active() {
				tokio::select! {
					message = self.inbox.recv() => message,
					due = self.watcher.wait(&mut self.watch) => {
						if due {
							let tick = self.watcher.step(&mut self.watch, &mut *self.driver).await;
							self.on_tick(tick).await?;
						}
						continue;
					}
				}
			} else {
				self.inbox.recv().await
			};

			let Some(message) = message else {
				return Err(WorkerError::Transport);
			};
			if let Some(exit) = self.dispatch(message).await? {
				return Ok(exit);
			}
		}
	}

	async fn dispatch(&mut self, message: WorkerMessage) -> Result<Option<WorkerExit>> {
		match message.kind() {
			MessageKind::Chat => match message.chat_text() {
				Some(text) => self.converse(text).await?,
				None => warn!(target = "chatpilot.worker", "chat message without text"),
			},
			MessageKind::Refresh => self.reload().await?,
			MessageKind::Exit => {
				self.outbox.report("exit");
				self.close_session().await;
				return Ok(Some(WorkerExit::Requested));
			}
			kind => debug!(target = "chatpilot.worker", %kind, "ignoring message"),
		}
		Ok(None)
	}

	async fn converse(&mut self, text: &str) -> Result<()> {
		if self.watch.is_active() {
			self.outbox
				.reject("turn already in progress", ErrorPayload::new(ErrorKind::Busy, "a reply is still streaming"));
			return Ok(());
		}

		self.transition(LifecycleState::Conversing);
		if let Err(err) = self.driver.submit(text).await {
			self.outbox.error("submit failed, reload now", &err.into());
			return self.reload().await;
		}

		tokio::time::sleep(self.config.settle_delay()).await;
		self.watcher.begin(&mut self.watch);
		Ok(())
	}

	async fn on_tick(&mut self, tick: Tick) -> Result<()> {
		match tick {
			Tick::Idle | Tick::Cancelled => {}
			Tick::Started => debug!(target = "chatpilot.worker", "reply started"),
			Tick::Event(event) => {
				let end = event.is_end();
				self.outbox.send(WorkerMessage::reply(&event))?;
				if end {
					self.transition(LifecycleState::Ready);
				}
			}
			Tick::SurfaceError => {
				self.outbox.error("surface reported an error, reload now", &WorkerError::Surface);
				self.reload().await?;
			}
			Tick::ReadFailed(err) => {
				debug!(target = "chatpilot.worker", error = %err, "poll tick failed; skipping");
			}
		}
		Ok(())
	}

	async fn close_session(&mut self) {
		if let Err(err) = self.driver.close().await {
			warn!(target = "chatpilot.worker", error = %err, "failed to close session");
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use chatpilot_protocol::{ChatEvent, ChatStatus};
	use tokio::task::JoinHandle;
	use tokio::time::timeout;

	use super::*;
	use crate::config::SessionKind;
	use crate::driver::{DriverCall, Journal, Script, ScriptedDriver, TurnScript};

	struct Harness {
		commands: mpsc::UnboundedSender<WorkerMessage>,
		events: mpsc::UnboundedReceiver<WorkerMessage>,
		journal: Journal,
		handle: JoinHandle<Result<WorkerExit>>,
	}

	impl Harness {
		fn config(retry_limit: u32) -> WorkerConfig {
			let mut config = WorkerConfig::new(SessionKind::Scripted);
			config.poll_interval_ms = 2;
			config.settle_delay_ms = 1;
			config.retry_limit = retry_limit;
			config
		}

		fn spawn(script: Script, retry_limit: u32) -> Self {
			Self::spawn_with(script, Self::config(retry_limit))
		}

		fn spawn_with(script: Script, config: WorkerConfig) -> Self {
			let (commands, inbox) = mpsc::unbounded_channel();
			let (outbox, events) = mpsc::unbounded_channel();
			let journal = Journal::default();
			let driver = ScriptedDriver::with_journal(script, journal.clone());
			let worker = ChatWorker::new(config, Box::new(driver), WorkerLink::new(inbox, outbox));
			let handle = tokio::spawn(worker.run());
			Self {
				commands,
				events,
				journal,
				handle,
			}
		}

		async fn next(&mut self) -> WorkerMessage {
			timeout(Duration::from_secs(5), self.events.recv())
				.await
				.expect("worker stalled")
				.expect("worker channel closed")
		}

		async fn next_of(&mut self, kind: MessageKind) -> WorkerMessage {
			loop {
				let message = self.next().await;
				if message.kind() == kind {
					return message;
				}
			}
		}

		fn send(&self, message: WorkerMessage) {
			self.commands.send(message).unwrap();
		}

		/// Collects the turn's reply events up to `End`, plus any errors seen meanwhile.
		async fn finish_turn(&mut self) -> (Vec<ChatEvent>, Vec<ErrorPayload>) {
			let mut events = Vec::new();
			let mut errors = Vec::new();
			loop {
				let message = self.next().await;
				match message.kind() {
					MessageKind::Error => errors.push(message.error_payload().unwrap()),
					MessageKind::Reply => {
						let event = message.chat_event().unwrap();
						let end = event.is_end();
						events.push(event);
						if end {
							return (events, errors);
						}
					}
					_ => {}
				}
			}
		}
	}

	fn assert_deltas_rebuild_content(events: &[ChatEvent]) {
		assert_eq!(events[0].status, ChatStatus::Start);
		assert_eq!(events.iter().filter(|event| event.status == ChatStatus::Start).count(), 1);
		let end = events.last().unwrap();
		assert!(end.is_end());
		let mut rebuilt = events[0].content.clone();
		for event in &events[1..events.len() - 1] {
			rebuilt.push_str(&event.delta);
		}
		assert_eq!(rebuilt, end.content);
	}

	#[tokio::test]
	async fn retries_until_ready_within_budget() {
		let mut harness = Harness::spawn(
			Script {
				launch_failures: 2,
				..Script::single_turn(["ok"])
			},
			2,
		);

		let mut retries = 0;
		loop {
			let message = harness.next().await;
			match message.kind() {
				MessageKind::Ready => break,
				MessageKind::Report if message.message() == "retry" => retries += 1,
				MessageKind::Error => {
					assert_eq!(message.error_payload().unwrap().kind, ErrorKind::Session);
				}
				_ => {}
			}
		}
		assert_eq!(retries, 2);
		assert_eq!(harness.journal.count(|call| *call == DriverCall::Launch), 3);

		harness.send(WorkerMessage::exit());
		assert_eq!(harness.handle.await.unwrap().unwrap(), WorkerExit::Requested);
	}

	#[tokio::test]
	async fn exhausted_retries_end_the_worker() {
		let mut harness = Harness::spawn(
			Script {
				launch_failures: 10,
				..Script::default()
			},
			1,
		);

		let error = loop {
			let message = harness.next_of(MessageKind::Error).await;
			let payload = message.error_payload().unwrap();
			if payload.kind == ErrorKind::RetryExhausted {
				break payload;
			}
		};
		assert_eq!(error.kind, ErrorKind::RetryExhausted);

		let err = harness.handle.await.unwrap().unwrap_err();
		assert_eq!(err.exit_code(), crate::error::EXIT_RETRY_EXHAUSTED);
		assert_eq!(harness.journal.count(|call| *call == DriverCall::Launch), 2);
	}

	#[tokio::test]
	async fn second_chat_while_streaming_is_busy() {
		let mut harness = Harness::spawn(
			Script {
				turns: vec![TurnScript {
					start_after_polls: 2,
					..TurnScript::streaming(["sl", "slo", "slow"])
				}],
				..Script::default()
			},
			0,
		);
		harness.next_of(MessageKind::Ready).await;

		harness.send(WorkerMessage::chat("first"));
		harness.send(WorkerMessage::chat("second"));

		let (events, errors) = harness.finish_turn().await;
		assert_eq!(errors.len(), 1);
		assert_eq!(errors[0].kind, ErrorKind::Busy);
		assert_deltas_rebuild_content(&events);
		assert_eq!(events.last().unwrap().content, "slow");
		assert_eq!(harness.journal.count(|call| matches!(call, DriverCall::Submit(_))), 1);
	}

	#[tokio::test]
	async fn chats_during_slow_page_reads_leave_the_turn_intact() {
		let mut harness = Harness::spawn(
			Script {
				turns: vec![TurnScript {
					page_delay_ms: 30,
					..TurnScript::streaming(["a", "ab", "abc"])
				}],
				..Script::default()
			},
			0,
		);
		harness.next_of(MessageKind::Ready).await;

		harness.send(WorkerMessage::chat("first"));
		let start = harness.next_of(MessageKind::Reply).await.chat_event().unwrap();
		assert_eq!(start, ChatEvent::start("a"));

		// Most of these land while the worker is inside `is_reply_over` or `read_html`.
		let commands = harness.commands.clone();
		let chatter = tokio::spawn(async move {
			loop {
				tokio::time::sleep(Duration::from_millis(10)).await;
				if commands.send(WorkerMessage::chat("second")).is_err() {
					break;
				}
			}
		});
		let (rest, errors) = harness.finish_turn().await;
		chatter.abort();

		let events: Vec<ChatEvent> = std::iter::once(start).chain(rest).collect();
		assert_deltas_rebuild_content(&events);
		assert_eq!(events.last().unwrap(), &ChatEvent::end("abc", "<p>abc</p>"));
		assert!(errors.iter().any(|error| error.kind == ErrorKind::Busy));
		assert!(errors.iter().all(|error| error.kind == ErrorKind::Busy));
		assert_eq!(harness.journal.count(|call| *call == DriverCall::Submit("first".into())), 1);
	}

	#[tokio::test]
	async fn failed_read_skips_the_tick_and_keeps_deltas() {
		let mut harness = Harness::spawn(
			Script {
				turns: vec![TurnScript {
					failing_reads: vec![1, 2],
					..TurnScript::streaming(["Hel", "Hello", "Hello world"])
				}],
				..Script::default()
			},
			0,
		);
		harness.next_of(MessageKind::Ready).await;

		harness.send(WorkerMessage::chat("hi"));
		let (events, errors) = harness.finish_turn().await;

		assert!(errors.is_empty());
		assert_eq!(
			events,
			vec![
				ChatEvent::start("Hel"),
				ChatEvent::replying("lo", "Hello"),
				ChatEvent::replying(" world", "Hello world"),
				ChatEvent::end("Hello world", "<p>Hello world</p>"),
			]
		);
		assert_eq!(harness.journal.count(|call| *call == DriverCall::Reload), 0);
	}

	#[tokio::test]
	async fn interactive_sign_in_is_retried_when_headless() {
		let mut harness = Harness::spawn(
			Script {
				needs_interactive: true,
				..Script::single_turn(["ok"])
			},
			1,
		);

		let first = harness.next_of(MessageKind::Error).await.error_payload().unwrap();
		assert_eq!(first.kind, ErrorKind::Session);
		let retry = harness.next_of(MessageKind::Report).await;
		assert_eq!(retry.message(), "retry");
		let last = harness.next_of(MessageKind::Error).await.error_payload().unwrap();
		assert_eq!(last.kind, ErrorKind::Session);
		let exhausted = harness.next_of(MessageKind::Error).await.error_payload().unwrap();
		assert_eq!(exhausted.kind, ErrorKind::RetryExhausted);

		let err = harness.handle.await.unwrap().unwrap_err();
		assert!(matches!(err, WorkerError::RetryExhausted { limit: 1 }));
		assert_eq!(harness.journal.count(|call| *call == DriverCall::Prepare), 0);
	}

	#[tokio::test]
	async fn interactive_sign_in_waits_when_headed() {
		let mut config = Harness::config(0);
		config.headless = false;
		let mut harness = Harness::spawn_with(
			Script {
				needs_interactive: true,
				..Script::single_turn(["ok"])
			},
			config,
		);

		loop {
			let message = harness.next().await;
			assert_ne!(message.kind(), MessageKind::Error);
			if message.kind() == MessageKind::Ready {
				break;
			}
			if message.kind() == MessageKind::Report && message.message() == "waiting for interactive sign in" {
				assert_eq!(harness.journal.count(|call| *call == DriverCall::Prepare), 0);
			}
		}
		assert_eq!(harness.journal.count(|call| *call == DriverCall::Prepare), 1);
		assert_eq!(harness.journal.count(|call| *call == DriverCall::Launch), 1);
	}

	#[tokio::test]
	async fn refresh_abandons_turn_and_reannounces_ready() {
		let mut harness = Harness::spawn(
			Script {
				turns: vec![
					TurnScript {
						never_finish: true,
						..TurnScript::streaming(["stale"])
					},
					TurnScript::streaming(["fresh"]),
				],
				..Script::default()
			},
			0,
		);
		harness.next_of(MessageKind::Ready).await;

		harness.send(WorkerMessage::chat("one"));
		let start = harness.next_of(MessageKind::Reply).await.chat_event().unwrap();
		assert_eq!(start.content, "stale");

		harness.send(WorkerMessage::refresh());
		harness.next_of(MessageKind::Ready).await;

		harness.send(WorkerMessage::chat("two"));
		let mut events = Vec::new();
		loop {
			let event = harness.next_of(MessageKind::Reply).await.chat_event().unwrap();
			let end = event.is_end();
			events.push(event);
			if end {
				break;
			}
		}
		assert_eq!(events[0].status, ChatStatus::Start);
		assert_eq!(events[0].content, "fresh");
		assert!(events.iter().all(|event| event.content == "fresh"));
		assert_eq!(harness.journal.count(|call| *call == DriverCall::Reload), 1);
	}

	#[tokio::test]
	async fn failed_submit_reloads_without_spending_retries() {
		let mut harness = Harness::spawn(
			Script {
				submit_failures: 1,
				..Script::single_turn(["ok"])
			},
			0,
		);
		harness.next_of(MessageKind::Ready).await;

		harness.send(WorkerMessage::chat("lost"));
		let error = harness.next_of(MessageKind::Error).await;
		assert_eq!(error.error_payload().unwrap().kind, ErrorKind::Session);
		harness.next_of(MessageKind::Ready).await;

		harness.send(WorkerMessage::chat("again"));
		loop {
			if harness.next_of(MessageKind::Reply).await.chat_event().unwrap().is_end() {
				break;
			}
		}
	}

	#[tokio::test]
	async fn dropped_supervisor_disconnects_worker() {
		let mut harness = Harness::spawn(Script::single_turn(["ok"]), 0);
		harness.next_of(MessageKind::Ready).await;

		drop(harness.commands);
		assert_eq!(harness.handle.await.unwrap().unwrap(), WorkerExit::Disconnected);
		assert_eq!(harness.journal.calls().last(), Some(&DriverCall::Close));
	}
}
