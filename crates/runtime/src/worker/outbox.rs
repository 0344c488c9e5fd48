use chatpilot_protocol::{ErrorPayload, MessageKind, WorkerMessage};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::{Result, WorkerError};

/// Worker-to-supervisor sender that tags reports with the driver name.
pub(crate) struct Outbox {
	tx: mpsc::UnboundedSender<WorkerMessage>,
	source: String,
}

impl Outbox {
	pub(crate) fn new(tx: mpsc::UnboundedSender<WorkerMessage>, source: impl Into<String>) -> Self {
		Self { tx, source: source.into() }
	}

	pub(crate) fn set_source(&mut self, source: impl Into<String>) {
		self.source = source.into();
	}

	pub(crate) fn send(&self, message: WorkerMessage) -> Result<()> {
		self.tx.send(message).map_err(|_| WorkerError::Transport)
	}

	/// Progress notice. A closed channel is logged, not propagated.
	pub(crate) fn report(&self, message: &str) {
		debug!(target = "chatpilot.worker", source = %self.source, "{message}");
		self.deliver(WorkerMessage::report(message, &self.source));
	}

	pub(crate) fn report_with(&self, message: &str, mut data: Value) {
		debug!(target = "chatpilot.worker", source = %self.source, data = %data, "{message}");
		if let Value::Object(map) = &mut data {
			map.insert("source".into(), Value::String(self.source.clone()));
		}
		self.deliver(WorkerMessage::build(MessageKind::Report, Some(message), Some(data)));
	}

	pub(crate) fn error(&self, message: &str, err: &WorkerError) {
		error!(target = "chatpilot.worker", source = %self.source, kind = %err.kind(), error = %err, "{message}");
		self.deliver(WorkerMessage::error(message, &ErrorPayload::new(err.kind(), err.to_string())));
	}

	pub(crate) fn reject(&self, message: &str, payload: ErrorPayload) {
		warn!(target = "chatpilot.worker", source = %self.source, kind = %payload.kind, "{message}");
		self.deliver(WorkerMessage::error(message, &payload));
	}

	fn deliver(&self, message: WorkerMessage) {
		if self.tx.send(message).is_err() {
			warn!(target = "chatpilot.worker", "supervisor channel closed; dropping message");
		}
	}
}
