use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{Pacing, SurfaceSession, pause};
use crate::config::WorkerConfig;
use crate::driver::{Driver, SignIn};
use crate::error::DriverResult;

pub(super) const URL: &str = "https://chat.cutterman.cn";

const INPUT: &str = "#input";
const SEND_BUTTON: &str = "button[title=\"发送\"]";
const MESSAGE_ROWS: &str = "#message-container>div";
const REPLY: &str = "#message-container>div:last-child>.message";

const INPUT_TIMEOUT: Duration = Duration::from_secs(10);
const AFTER_SEND: Duration = Duration::from_millis(200);

/// Detects a reply start by the message list growing past its size at submit.
pub struct CutterDriver {
	session: SurfaceSession,
	pacing: Pacing,
	rows_at_submit: usize,
}

impl CutterDriver {
	pub(crate) fn new(session: SurfaceSession, pacing: Pacing) -> Self {
		Self {
			session,
			pacing,
			rows_at_submit: 0,
		}
	}
}

#[async_trait]
impl Driver for CutterDriver {
	fn name(&self) -> &str {
		"chatCutterman"
	}

	async fn launch(&mut self, config: &WorkerConfig) -> DriverResult<()> {
		self.rows_at_submit = 0;
		self.session.open(config).await
	}

	async fn sign_in(&mut self, _config: &WorkerConfig) -> DriverResult<SignIn> {
		self.session.page()?.wait_for_selector(INPUT, Some(INPUT_TIMEOUT)).await?;
		Ok(SignIn::Ok)
	}

	async fn prepare(&mut self) -> DriverResult<()> {
		let page = self.session.page()?;
		page.wait_for_selector(INPUT, None).await?;
		page.wait_for_selector(SEND_BUTTON, None).await?;
		self.pacing.settle().await;
		Ok(())
	}

	async fn submit(&mut self, text: &str) -> DriverResult<()> {
		let page = self.session.page()?;
		page.type_text(INPUT, text).await?;
		self.pacing.step().await;
		page.click(SEND_BUTTON).await?;
		pause(AFTER_SEND).await;
		self.rows_at_submit = page.count(MESSAGE_ROWS).await?;
		Ok(())
	}

	async fn is_start_reply(&mut self) -> DriverResult<bool> {
		Ok(self.session.page()?.count(MESSAGE_ROWS).await? > self.rows_at_submit)
	}

	async fn read_text(&mut self) -> DriverResult<String> {
		self.session.last_text(REPLY).await
	}

	async fn read_html(&mut self) -> DriverResult<String> {
		self.session.last_html(REPLY).await
	}

	/// The send button only comes back once the reply is complete.
	async fn is_reply_over(&mut self) -> DriverResult<bool> {
		self.session.page()?.exists(SEND_BUTTON).await
	}

	async fn reload(&mut self) -> DriverResult<()> {
		self.session.reload().await
	}

	/// Stale cookies are the usual reason a session fails, so drop them.
	async fn before_retry(&mut self) -> DriverResult<()> {
		if !self.session.credentials().clear()? {
			debug!(target = "chatpilot.surface", "skip clear cookies");
		}
		Ok(())
	}

	async fn before_reload(&mut self) -> DriverResult<()> {
		self.rows_at_submit = 0;
		Ok(())
	}

	async fn persist_credentials(&mut self) -> DriverResult<()> {
		self.session.persist_cookies().await
	}

	async fn restore_credentials(&mut self) -> DriverResult<bool> {
		self.session.restore_cookies().await
	}

	async fn close(&mut self) -> DriverResult<()> {
		self.session.close().await
	}
}
