//! Supervisor side of the worker channel.
//!
//! [`Supervisor`] owns the hosting of one worker thread, turns worker messages
//! into [`SupervisorEvent`]s for registered handlers, and offers fire-and-continue
//! commands. Handlers run on the relay task, in registration order.

mod host;
mod reply;

pub use reply::ReplyStream;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chatpilot_protocol::{ErrorKind, ErrorPayload, MessageKind, WorkerMessage};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info, warn};

use self::reply::ReplyItem;
use crate::config::ConfigSource;
use crate::driver::DriverFactory;
use crate::error::SupervisorError;
use crate::worker::WorkerLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
	Message,
	Error,
	Exit,
	Online,
	Ready,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
	pub message: String,
	pub cause: ErrorPayload,
}

impl ErrorReport {
	pub fn new(message: impl Into<String>, cause: ErrorPayload) -> Self {
		Self {
			message: message.into(),
			cause,
		}
	}
}

#[derive(Debug, Clone)]
pub enum SupervisorEvent {
	/// Any worker message other than `Ready` and `Error`.
	Message(WorkerMessage),
	Error(ErrorReport),
	/// The worker thread ended with this exit code.
	Exit(i32),
	/// The worker thread is up.
	Online,
	Ready(WorkerMessage),
}

impl SupervisorEvent {
	pub fn name(&self) -> EventName {
		match self {
			SupervisorEvent::Message(_) => EventName::Message,
			SupervisorEvent::Error(_) => EventName::Error,
			SupervisorEvent::Exit(_) => EventName::Exit,
			SupervisorEvent::Online => EventName::Online,
			SupervisorEvent::Ready(_) => EventName::Ready,
		}
	}
}

pub type EventHandler = Arc<dyn Fn(&SupervisorEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
struct HandlerTable {
	next_id: u64,
	handlers: HashMap<EventName, Vec<(HandlerId, EventHandler)>>,
}

#[derive(Debug, Clone, Copy, Default)]
struct LinkStatus {
	ready: bool,
	exited: Option<i32>,
}

pub(crate) struct Shared {
	handlers: Mutex<HandlerTable>,
	commands: mpsc::UnboundedSender<WorkerMessage>,
	pending: Mutex<Option<mpsc::UnboundedReceiver<WorkerMessage>>>,
	status: watch::Sender<LinkStatus>,
	/// Set while an [`Supervisor::ask`] stream owns the current turn.
	turn_in_flight: AtomicBool,
}

impl Shared {
	fn emit(&self, event: &SupervisorEvent) {
		let handlers: Vec<EventHandler> = {
			let table = self.handlers.lock();
			table
				.handlers
				.get(&event.name())
				.map(|list| list.iter().map(|(_, handler)| Arc::clone(handler)).collect())
				.unwrap_or_default()
		};
		for handler in handlers {
			handler(event);
		}
	}

	fn claim_turn(&self) -> bool {
		!self.turn_in_flight.swap(true, Ordering::AcqRel)
	}

	fn release_turn(&self) {
		self.turn_in_flight.store(false, Ordering::Release);
	}

	fn mark_ready(&self) {
		self.status.send_modify(|status| status.ready = true);
	}

	fn mark_exited(&self, code: i32) {
		self.status.send_modify(|status| {
			status.ready = false;
			status.exited = Some(code);
		});
	}
}

/// Handle to a hosted worker. Clones share the same worker.
#[derive(Clone)]
pub struct Supervisor {
	shared: Arc<Shared>,
}

impl Default for Supervisor {
	fn default() -> Self {
		Self::new()
	}
}

impl Supervisor {
	/// Creates a supervisor with the default logging handlers installed.
	///
	/// Register further handlers before [`Supervisor::start`] to observe every
	/// event. Commands sent before `start` are queued.
	pub fn new() -> Self {
		let (commands, pending) = mpsc::unbounded_channel();
		let (status, _) = watch::channel(LinkStatus::default());
		let supervisor = Self {
			shared: Arc::new(Shared {
				handlers: Mutex::new(HandlerTable::default()),
				commands,
				pending: Mutex::new(Some(pending)),
				status,
				turn_in_flight: AtomicBool::new(false),
			}),
		};
		supervisor.install_default_handlers();
		supervisor
	}

	/// Spawns the worker thread and starts relaying its messages.
	///
	/// Must be called from within a tokio runtime.
	pub fn start(&self, source: ConfigSource, factory: Arc<dyn DriverFactory>) -> Result<(), SupervisorError> {
		let inbox = self.shared.pending.lock().take().ok_or(SupervisorError::AlreadyStarted)?;
		let (outbox, events) = mpsc::unbounded_channel();
		let (online_tx, online_rx) = oneshot::channel();

		let thread = host::spawn_worker(source, factory, WorkerLink::new(inbox, outbox), online_tx).map_err(SupervisorError::Spawn)?;
		tokio::spawn(host::relay(Arc::clone(&self.shared), events, online_rx, thread));
		Ok(())
	}

	/// Convenience for [`Supervisor::new`] followed by [`Supervisor::start`].
	pub fn spawn(source: ConfigSource, factory: Arc<dyn DriverFactory>) -> Result<Self, SupervisorError> {
		let supervisor = Self::new();
		supervisor.start(source, factory)?;
		Ok(supervisor)
	}

	fn install_default_handlers(&self) {
		self.on(EventName::Message, |event| {
			match event {
				SupervisorEvent::Message(message) if message.kind() == MessageKind::Report => {
					info!(target = "chatpilot.supervisor", data = %message.data(), "{}", message.message());
				}
				_ => {}
			}
		});
		self.on(EventName::Error, |event| {
			if let SupervisorEvent::Error(report) = event {
				error!(target = "chatpilot.supervisor", kind = %report.cause.kind, detail = %report.cause.detail, "{}", report.message);
			}
		});
		self.on(EventName::Exit, |event| {
			if let SupervisorEvent::Exit(code) = event {
				if *code == 0 {
					info!(target = "chatpilot.supervisor", code, "worker exited");
				} else {
					warn!(target = "chatpilot.supervisor", code, "worker exited");
				}
			}
		});
	}

	pub fn on<F>(&self, event: EventName, handler: F) -> HandlerId
	where
		F: Fn(&SupervisorEvent) + Send + Sync + 'static,
	{
		let mut table = self.shared.handlers.lock();
		let id = HandlerId(table.next_id);
		table.next_id += 1;
		table.handlers.entry(event).or_default().push((id, Arc::new(handler)));
		id
	}

	/// Removes one handler, or every handler for `event` when `id` is `None`.
	/// Returns how many were removed.
	pub fn off(&self, event: EventName, id: Option<HandlerId>) -> usize {
		let mut table = self.shared.handlers.lock();
		let Some(list) = table.handlers.get_mut(&event) else {
			return 0;
		};
		let before = list.len();
		match id {
			Some(id) => list.retain(|(existing, _)| *existing != id),
			None => list.clear(),
		}
		before - list.len()
	}

	/// Submits `text` for a new turn.
	pub fn converse(&self, text: &str) -> Result<(), SupervisorError> {
		self.post(WorkerMessage::chat(text))
	}

	/// Asks the worker to abandon any turn and reload.
	pub fn refresh(&self) -> Result<(), SupervisorError> {
		self.shared.status.send_modify(|status| status.ready = false);
		self.post(WorkerMessage::refresh())
	}

	pub fn exit(&self) -> Result<(), SupervisorError> {
		self.post(WorkerMessage::exit())
	}

	fn post(&self, message: WorkerMessage) -> Result<(), SupervisorError> {
		let kind = message.kind();
		if self.shared.commands.send(message).is_err() {
			let err = SupervisorError::Transport { kind };
			self.shared.emit(&SupervisorEvent::Error(ErrorReport::new(
				err.to_string(),
				ErrorPayload::new(ErrorKind::Transport, format!("{kind} message not delivered")),
			)));
			return Err(err);
		}
		Ok(())
	}

	pub fn is_ready(&self) -> bool {
		self.shared.status.borrow().ready
	}

	/// Resolves once the worker has announced `Ready` since the last refresh.
	pub async fn wait_ready(&self) -> Result<(), SupervisorError> {
		let mut status = self.shared.status.subscribe();
		loop {
			{
				let current = status.borrow_and_update();
				if current.ready {
					return Ok(());
				}
				if let Some(code) = current.exited {
					return Err(SupervisorError::WorkerExited { code });
				}
			}
			if status.changed().await.is_err() {
				return Err(SupervisorError::WorkerExited { code: crate::error::EXIT_FAILURE });
			}
		}
	}

	/// Waits for the worker thread to end and returns its exit code.
	pub async fn join(&self) -> i32 {
		let mut status = self.shared.status.subscribe();
		loop {
			if let Some(code) = status.borrow_and_update().exited {
				return code;
			}
			if status.changed().await.is_err() {
				return crate::error::EXIT_FAILURE;
			}
		}
	}

	/// Waits for readiness, submits `text`, and streams the reply.
	///
	/// Only one stream at a time may own the turn; a second `ask` on any
	/// clone fails with [`SupervisorError::Busy`] until the first one ends.
	pub async fn ask(&self, text: &str) -> Result<ReplyStream, SupervisorError> {
		self.wait_ready().await?;
		if !self.shared.claim_turn() {
			return Err(SupervisorError::Busy);
		}

		let (tx, rx) = mpsc::unbounded_channel();
		let replies = tx.clone();
		let on_message = self.on(EventName::Message, move |event| {
			let SupervisorEvent::Message(message) = event else {
				return;
			};
			if let Some(reply) = message.chat_event() {
				let _ = replies.send(ReplyItem::Event(reply));
			}
		});
		let failures = tx.clone();
		let on_error = self.on(EventName::Error, move |event| {
			match event {
				// Rejections of someone else's submission do not end this turn.
				SupervisorEvent::Error(report) if report.cause.kind == ErrorKind::Busy => {}
				SupervisorEvent::Error(report) => {
					let _ = failures.send(ReplyItem::Failed(report.clone()));
				}
				_ => {}
			}
		});
		let on_exit = self.on(EventName::Exit, move |_| {
			let _ = tx.send(ReplyItem::Closed);
		});
		let handlers = vec![(EventName::Message, on_message), (EventName::Error, on_error), (EventName::Exit, on_exit)];

		if let Err(err) = self.converse(text) {
			for (event, id) in handlers {
				self.off(event, Some(id));
			}
			self.shared.release_turn();
			return Err(err);
		}
		Ok(ReplyStream::new(self.clone(), rx, handlers))
	}
}
