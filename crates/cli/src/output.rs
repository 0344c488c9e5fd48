//! Printing streamed replies.

use std::io::Write;

use chatpilot_protocol::{ChatEvent, ChatStatus};
use clap::ValueEnum;
use serde::Serialize;

use crate::error::{CliError, Result};

/// Output format for reply events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	/// Reply text as it streams
	#[default]
	Text,
	/// One JSON document once the reply is complete
	Json,
	/// One JSON line per reply event
	Ndjson,
}

impl std::fmt::Display for OutputFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			OutputFormat::Text => write!(f, "text"),
			OutputFormat::Json => write!(f, "json"),
			OutputFormat::Ndjson => write!(f, "ndjson"),
		}
	}
}

#[derive(Debug, Serialize)]
struct ReplySummary<'a> {
	question: &'a str,
	content: &'a str,
	html: &'a str,
	events: usize,
}

/// Writes reply events in one [`OutputFormat`].
pub struct ReplyPrinter<'q, W: Write> {
	out: W,
	format: OutputFormat,
	question: &'q str,
	events: usize,
	finished: bool,
}

impl<'q, W: Write> ReplyPrinter<'q, W> {
	pub fn new(out: W, format: OutputFormat, question: &'q str) -> Self {
		Self {
			out,
			format,
			question,
			events: 0,
			finished: false,
		}
	}

	pub fn print(&mut self, event: &ChatEvent) -> Result<()> {
		self.events += 1;
		match self.format {
			OutputFormat::Text => match event.status {
				ChatStatus::Start | ChatStatus::Replying => write!(self.out, "{}", event.delta)?,
				ChatStatus::End => writeln!(self.out)?,
			},
			OutputFormat::Ndjson => {
				serde_json::to_writer(&mut self.out, event)?;
				writeln!(self.out)?;
			}
			OutputFormat::Json => {
				if event.is_end() {
					let summary = ReplySummary {
						question: self.question,
						content: &event.content,
						html: &event.html,
						events: self.events,
					};
					serde_json::to_writer_pretty(&mut self.out, &summary)?;
					writeln!(self.out)?;
				}
			}
		}
		if event.is_end() {
			self.finished = true;
		}
		self.out.flush()?;
		Ok(())
	}

	/// Fails when no `End` event was printed.
	pub fn finish(self) -> Result<W> {
		if !self.finished {
			return Err(CliError::Incomplete);
		}
		Ok(self.out)
	}
}
