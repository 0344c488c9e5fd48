//! Browser-backed chat surfaces.
//!
//! Each surface is a [`Driver`] written against the [`Page`] trait with the
//! selectors of one chat site. [`SurfaceFactory`] picks the surface named by
//! the config's `sessionKind`.

mod chatgpt;
mod cutterman;
mod fastchat;
#[cfg(test)]
pub(crate) mod testing;

pub use chatgpt::ChatGptDriver;
pub use cutterman::CutterDriver;
pub use fastchat::FastChatDriver;

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::{SessionKind, WorkerConfig};
use crate::credentials::CredentialStore;
use crate::driver::{Driver, DriverFactory};
use crate::error::{ConfigError, DriverError, DriverResult};
use crate::page::{BrowserLauncher, LaunchOptions, Page};

/// Pauses inserted between UI steps, scaled for humans watching the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
	/// Between individual form interactions.
	pub step: Duration,
	/// After the page looks ready, before the first interaction.
	pub settle: Duration,
}

impl Default for Pacing {
	fn default() -> Self {
		Self {
			step: Duration::from_secs(1),
			settle: Duration::from_secs(3),
		}
	}
}

impl Pacing {
	/// No pauses at all.
	pub fn none() -> Self {
		Self {
			step: Duration::ZERO,
			settle: Duration::ZERO,
		}
	}

	async fn step(&self) {
		pause(self.step).await;
	}

	async fn settle(&self) {
		pause(self.settle).await;
	}
}

async fn pause(duration: Duration) {
	if !duration.is_zero() {
		tokio::time::sleep(duration).await;
	}
}

/// One page plus the cookie file of a surface.
pub(crate) struct SurfaceSession {
	launcher: Arc<dyn BrowserLauncher>,
	credentials: CredentialStore,
	url: String,
	page: Option<Box<dyn Page>>,
}

impl SurfaceSession {
	pub(crate) fn new(launcher: Arc<dyn BrowserLauncher>, credentials: CredentialStore, url: String) -> Self {
		Self {
			launcher,
			credentials,
			url,
			page: None,
		}
	}

	pub(crate) fn url(&self) -> &str {
		&self.url
	}

	pub(crate) fn credentials(&self) -> &CredentialStore {
		&self.credentials
	}

	pub(crate) async fn open(&mut self, config: &WorkerConfig) -> DriverResult<()> {
		self.close().await?;
		let mut page = self.launcher.launch(&LaunchOptions::from(config)).await?;
		page.goto(&self.url).await?;
		self.page = Some(page);
		Ok(())
	}

	pub(crate) fn page(&mut self) -> DriverResult<&mut (dyn Page + 'static)> {
		match self.page.as_deref_mut() {
			Some(page) => Ok(page),
			None => Err(DriverError::NoSession),
		}
	}

	pub(crate) async fn reload(&mut self) -> DriverResult<()> {
		self.page()?.reload().await
	}

	pub(crate) async fn close(&mut self) -> DriverResult<()> {
		match self.page.take() {
			Some(mut page) => page.close().await,
			None => Ok(()),
		}
	}

	pub(crate) async fn restore_cookies(&mut self) -> DriverResult<bool> {
		let Some(stored) = self.credentials.load()? else {
			return Ok(false);
		};
		if stored.cookies.is_empty() {
			return Ok(false);
		}
		self.page()?.add_cookies(stored.cookies).await?;
		Ok(true)
	}

	pub(crate) async fn persist_cookies(&mut self) -> DriverResult<()> {
		let cookies = self.page()?.cookies().await?;
		self.credentials.save(&cookies)
	}

	/// Text of the last element matching `selector`.
	pub(crate) async fn last_text(&mut self, selector: &str) -> DriverResult<String> {
		self.page()?.text_contents(selector).await?.pop().ok_or_else(|| DriverError::NotFound {
			selector: selector.to_string(),
		})
	}

	pub(crate) async fn last_html(&mut self, selector: &str) -> DriverResult<String> {
		self.page()?.inner_htmls(selector).await?.pop().ok_or_else(|| DriverError::NotFound {
			selector: selector.to_string(),
		})
	}
}

/// Builds browser surfaces on a shared launcher.
pub struct SurfaceFactory {
	launcher: Arc<dyn BrowserLauncher>,
	pacing: Pacing,
}

impl SurfaceFactory {
	pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
		Self {
			launcher,
			pacing: Pacing::default(),
		}
	}

	pub fn with_pacing(mut self, pacing: Pacing) -> Self {
		self.pacing = pacing;
		self
	}

	fn session(&self, config: &WorkerConfig, default_url: &str) -> SurfaceSession {
		let url = config.url.clone().unwrap_or_else(|| default_url.to_string());
		SurfaceSession::new(Arc::clone(&self.launcher), CredentialStore::new(config.credential_path()), url)
	}
}

impl DriverFactory for SurfaceFactory {
	fn create(&self, config: &WorkerConfig) -> Result<Box<dyn Driver>, ConfigError> {
		debug!(target = "chatpilot.surface", kind = %config.session_kind, "creating surface driver");
		let driver: Box<dyn Driver> = match config.session_kind {
			SessionKind::ChatGpt => Box::new(ChatGptDriver::new(self.session(config, chatgpt::URL), self.pacing)),
			SessionKind::ChatCutterman => Box::new(CutterDriver::new(self.session(config, cutterman::URL), self.pacing)),
			SessionKind::FastChat => Box::new(FastChatDriver::new(self.session(config, fastchat::URL), self.pacing)),
			kind @ SessionKind::Scripted => return Err(ConfigError::Unsupported { kind }),
		};
		Ok(driver)
	}
}
