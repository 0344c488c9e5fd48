//! Runs a worker on its own thread and relays its messages back.

use std::sync::Arc;
use std::thread::JoinHandle;

use chatpilot_protocol::{ErrorKind, ErrorPayload, MessageKind, WorkerMessage};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use super::{ErrorReport, Shared, SupervisorEvent};
use crate::config::ConfigSource;
use crate::driver::DriverFactory;
use crate::error::EXIT_FAILURE;
use crate::worker::{ChatWorker, WorkerLink};

const WORKER_THREAD_NAME: &str = "chatpilot-worker";

pub(super) fn spawn_worker(
	source: ConfigSource,
	factory: Arc<dyn DriverFactory>,
	link: WorkerLink,
	online: oneshot::Sender<()>,
) -> std::io::Result<JoinHandle<i32>> {
	std::thread::Builder::new()
		.name(WORKER_THREAD_NAME.into())
		.spawn(move || host(source, factory, link, online))
}

fn host(source: ConfigSource, factory: Arc<dyn DriverFactory>, link: WorkerLink, online: oneshot::Sender<()>) -> i32 {
	let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
		Ok(runtime) => runtime,
		Err(err) => {
			error!(target = "chatpilot.supervisor", error = %err, "failed to build worker runtime");
			return EXIT_FAILURE;
		}
	};
	let _ = online.send(());

	runtime.block_on(async move {
		match ChatWorker::start(source, factory.as_ref(), link).await {
			Ok(exit) => {
				debug!(target = "chatpilot.supervisor", ?exit, "worker finished");
				exit.code()
			}
			Err(err) => err.exit_code(),
		}
	})
}

/// Forwards worker messages as events until the worker's channel closes,
/// then joins the thread and emits `Exit`.
///
/// Status waiters are released only after the handlers for the matching
/// event have run.
pub(super) async fn relay(
	shared: Arc<Shared>,
	mut events: mpsc::UnboundedReceiver<WorkerMessage>,
	online: oneshot::Receiver<()>,
	thread: JoinHandle<i32>,
) {
	if online.await.is_ok() {
		shared.emit(&SupervisorEvent::Online);
	}

	while let Some(message) = events.recv().await {
		route(&shared, message);
	}

	let code = match tokio::task::spawn_blocking(move || thread.join()).await {
		Ok(Ok(code)) => code,
		Ok(Err(_)) => {
			shared.emit(&SupervisorEvent::Error(ErrorReport::new(
				"worker thread panicked",
				ErrorPayload::new(ErrorKind::Transport, "worker thread panicked"),
			)));
			EXIT_FAILURE
		}
		Err(err) => {
			error!(target = "chatpilot.supervisor", error = %err, "failed to join worker thread");
			EXIT_FAILURE
		}
	};
	shared.emit(&SupervisorEvent::Exit(code));
	shared.mark_exited(code);
}

fn route(shared: &Shared, message: WorkerMessage) {
	match message.kind() {
		MessageKind::Ready => {
			shared.emit(&SupervisorEvent::Ready(message));
			shared.mark_ready();
		}
		MessageKind::Error => {
			let cause = message
				.error_payload()
				.unwrap_or_else(|| ErrorPayload::new(ErrorKind::Session, message.message()));
			shared.emit(&SupervisorEvent::Error(ErrorReport::new(message.message(), cause)));
		}
		_ => shared.emit(&SupervisorEvent::Message(message)),
	}
}
