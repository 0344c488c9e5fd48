//! Envelope exchanged in both directions between supervisor and worker.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorPayload;
use crate::event::ChatEvent;

/// Placeholder text used when an envelope is built without a message.
pub const NO_MESSAGE: &str = "none";

/// Discriminant of a [`WorkerMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
	/// Supervisor asks the worker to close its session and stop.
	Exit,
	/// Worker announces that the session is ready for a turn.
	Ready,
	/// Worker progress notice (lifecycle steps, retry/reload timeline).
	Report,
	/// Worker reports a failure; `data` carries an [`ErrorPayload`].
	Error,
	/// Supervisor submits text for a new turn; `data` carries the raw text.
	#[serde(alias = "question")]
	Chat,
	/// Worker streams reply progress; `data` carries a [`ChatEvent`].
	#[serde(alias = "answer")]
	Reply,
	/// Supervisor asks the worker to abandon the turn and reload in place.
	Refresh,
}

impl std::fmt::Display for MessageKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			MessageKind::Exit => "exit",
			MessageKind::Ready => "ready",
			MessageKind::Report => "report",
			MessageKind::Error => "error",
			MessageKind::Chat => "chat",
			MessageKind::Reply => "reply",
			MessageKind::Refresh => "refresh",
		};
		f.write_str(name)
	}
}

/// Immutable `{type, message, data}` envelope.
///
/// Built only through [`WorkerMessage::build`] (or the shorthands that call it),
/// which fills `message` and `data` only when they are provided. Absent fields
/// default to [`NO_MESSAGE`] and `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerMessage {
	#[serde(rename = "type")]
	kind: MessageKind,
	message: String,
	#[serde(default)]
	data: Value,
}

impl WorkerMessage {
	/// Builds an envelope, defaulting absent fields.
	pub fn build(kind: MessageKind, message: Option<&str>, data: Option<Value>) -> Self {
		Self {
			kind,
			message: message.unwrap_or(NO_MESSAGE).to_string(),
			data: data.unwrap_or(Value::Null),
		}
	}

	pub fn exit() -> Self {
		Self::build(MessageKind::Exit, None, None)
	}

	pub fn ready() -> Self {
		Self::build(MessageKind::Ready, None, None)
	}

	pub fn refresh() -> Self {
		Self::build(MessageKind::Refresh, None, None)
	}

	pub fn report(message: &str, source: &str) -> Self {
		Self::build(MessageKind::Report, Some(message), Some(serde_json::json!({ "source": source })))
	}

	pub fn chat(text: &str) -> Self {
		Self::build(MessageKind::Chat, Some("question"), Some(Value::String(text.to_string())))
	}

	pub fn reply(event: &ChatEvent) -> Self {
		let data = serde_json::to_value(event).unwrap_or(Value::Null);
		Self::build(MessageKind::Reply, Some("answer"), Some(data))
	}

	pub fn error(message: &str, payload: &ErrorPayload) -> Self {
		let data = serde_json::to_value(payload).unwrap_or(Value::Null);
		Self::build(MessageKind::Error, Some(message), Some(data))
	}

	pub fn kind(&self) -> MessageKind {
		self.kind
	}

	pub fn message(&self) -> &str {
		&self.message
	}

	pub fn data(&self) -> &Value {
		&self.data
	}

	/// Decodes the reply payload of a [`MessageKind::Reply`] envelope.
	pub fn chat_event(&self) -> Option<ChatEvent> {
		if self.kind != MessageKind::Reply {
			return None;
		}
		serde_json::from_value(self.data.clone()).ok()
	}

	/// Returns the submitted text of a [`MessageKind::Chat`] envelope.
	pub fn chat_text(&self) -> Option<&str> {
		if self.kind != MessageKind::Chat {
			return None;
		}
		self.data.as_str()
	}

	/// Decodes the failure payload of a [`MessageKind::Error`] envelope.
	pub fn error_payload(&self) -> Option<ErrorPayload> {
		if self.kind != MessageKind::Error {
			return None;
		}
		serde_json::from_value(self.data.clone()).ok()
	}
}
