//! Reply-progress records emitted while a turn streams.

use serde::{Deserialize, Serialize};

/// Phase of a streamed reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
	/// First observed text of the turn.
	Start,
	/// Further text appended.
	Replying,
	/// Terminal event; the turn is complete.
	End,
}

/// One step of a streamed reply.
///
/// Within a turn `content` only grows, `delta` is the suffix appended since the
/// previous event (empty for [`ChatStatus::End`]), and `html` is set only on
/// [`ChatStatus::End`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
	pub status: ChatStatus,
	#[serde(default)]
	pub delta: String,
	#[serde(default)]
	pub content: String,
	#[serde(default)]
	pub html: String,
}

impl ChatEvent {
	/// First event of a turn: the whole observed text is the delta.
	pub fn start(content: &str) -> Self {
		Self {
			status: ChatStatus::Start,
			delta: content.to_string(),
			content: content.to_string(),
			html: String::new(),
		}
	}

	pub fn replying(delta: &str, content: &str) -> Self {
		Self {
			status: ChatStatus::Replying,
			delta: delta.to_string(),
			content: content.to_string(),
			html: String::new(),
		}
	}

	pub fn end(content: &str, html: &str) -> Self {
		Self {
			status: ChatStatus::End,
			delta: String::new(),
			content: content.to_string(),
			html: html.to_string(),
		}
	}

	pub fn is_end(&self) -> bool {
		self.status == ChatStatus::End
	}
}
