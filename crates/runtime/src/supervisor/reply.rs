use std::pin::Pin;
use std::task::{Context, Poll};

use chatpilot_protocol::ChatEvent;
use futures::Stream;
use tokio::sync::mpsc;

use super::{ErrorReport, EventName, HandlerId, Supervisor};

pub(super) enum ReplyItem {
	Event(ChatEvent),
	Failed(ErrorReport),
	Closed,
}

/// Reply events of one turn, ending after `End`.
///
/// The stream also ends early when the worker reports an error or exits
/// during the turn; [`ReplyStream::failure`] then says why. Dropping the
/// stream before it ends abandons the turn with a refresh.
pub struct ReplyStream {
	supervisor: Supervisor,
	rx: mpsc::UnboundedReceiver<ReplyItem>,
	handlers: Vec<(EventName, HandlerId)>,
	failure: Option<ErrorReport>,
	finished: bool,
}

impl ReplyStream {
	pub(super) fn new(supervisor: Supervisor, rx: mpsc::UnboundedReceiver<ReplyItem>, handlers: Vec<(EventName, HandlerId)>) -> Self {
		Self {
			supervisor,
			rx,
			handlers,
			failure: None,
			finished: false,
		}
	}

	pub fn failure(&self) -> Option<&ErrorReport> {
		self.failure.as_ref()
	}

	pub fn is_finished(&self) -> bool {
		self.finished
	}

	fn finish(&mut self) {
		self.finished = true;
		for (event, id) in self.handlers.drain(..) {
			self.supervisor.off(event, Some(id));
		}
		self.supervisor.shared.release_turn();
	}
}

impl Stream for ReplyStream {
	type Item = ChatEvent;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ChatEvent>> {
		if self.finished {
			return Poll::Ready(None);
		}
		match self.rx.poll_recv(cx) {
			Poll::Ready(Some(ReplyItem::Event(event))) => {
				if event.is_end() {
					self.finish();
				}
				Poll::Ready(Some(event))
			}
			Poll::Ready(Some(ReplyItem::Failed(report))) => {
				self.failure = Some(report);
				self.finish();
				Poll::Ready(None)
			}
			Poll::Ready(Some(ReplyItem::Closed)) | Poll::Ready(None) => {
				self.finish();
				Poll::Ready(None)
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

impl Drop for ReplyStream {
	fn drop(&mut self) {
		if !self.finished {
			let _ = self.supervisor.refresh();
			self.finish();
		}
	}
}
