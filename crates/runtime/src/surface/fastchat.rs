use std::time::Duration;

use async_trait::async_trait;

use super::{Pacing, SurfaceSession};
use crate::config::WorkerConfig;
use crate::driver::{Driver, SignIn};
use crate::error::DriverResult;

pub(super) const URL: &str = "https://chat.lmsys.org/";

const INPUT: &str = "textarea[placeholder=\"Enter text and press ENTER\"]";
/// Spinner shown until the model starts answering.
const PENDING: &str = ".svelte-zyxd38.margin";
const REPLY: &str = "div[data-testid=\"bot\"].latest";
/// "Clear history" stays disabled while a reply streams.
const CLEAR_HISTORY_DISABLED: &str = "#component-17[disabled]";

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Public arena without sign-in or cookies.
pub struct FastChatDriver {
	session: SurfaceSession,
	pacing: Pacing,
}

impl FastChatDriver {
	pub(crate) fn new(session: SurfaceSession, pacing: Pacing) -> Self {
		Self { session, pacing }
	}
}

#[async_trait]
impl Driver for FastChatDriver {
	fn name(&self) -> &str {
		"fastChat"
	}

	async fn launch(&mut self, config: &WorkerConfig) -> DriverResult<()> {
		self.session.open(config).await
	}

	async fn sign_in(&mut self, _config: &WorkerConfig) -> DriverResult<SignIn> {
		Ok(SignIn::Ok)
	}

	async fn submit(&mut self, text: &str) -> DriverResult<()> {
		let page = self.session.page()?;
		page.wait_for_selector(INPUT, None).await?;
		page.fill(INPUT, text).await?;
		self.pacing.step().await;
		page.type_text(INPUT, "\n").await
	}

	async fn is_start_reply(&mut self) -> DriverResult<bool> {
		Ok(!self.session.page()?.exists(PENDING).await?)
	}

	async fn read_text(&mut self) -> DriverResult<String> {
		self.session.page()?.wait_for_selector(REPLY, Some(REPLY_TIMEOUT)).await?;
		self.session.last_text(REPLY).await
	}

	async fn read_html(&mut self) -> DriverResult<String> {
		self.session.page()?.wait_for_selector(REPLY, Some(REPLY_TIMEOUT)).await?;
		self.session.last_html(REPLY).await
	}

	async fn is_reply_over(&mut self) -> DriverResult<bool> {
		Ok(!self.session.page()?.exists(CLEAR_HISTORY_DISABLED).await?)
	}

	async fn reload(&mut self) -> DriverResult<()> {
		self.session.reload().await
	}

	async fn close(&mut self) -> DriverResult<()> {
		self.session.close().await
	}
}
