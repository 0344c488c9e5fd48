//! Browser page abstraction the chat surfaces are written against.
//!
//! The runtime does not ship a browser backend. Hosts plug one in through
//! [`BrowserLauncher`]; the surfaces only ever see a [`Page`].

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chatpilot_protocol::Cookie;

use crate::config::WorkerConfig;
use crate::error::DriverResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
	pub executable_path: Option<PathBuf>,
	pub headless: bool,
}

impl From<&WorkerConfig> for LaunchOptions {
	fn from(config: &WorkerConfig) -> Self {
		Self {
			executable_path: config.executable_path.clone(),
			headless: config.headless,
		}
	}
}

/// A single open browser tab.
///
/// Selectors use Playwright syntax, including `>>` chaining and `nth=`.
/// Queries that can match several elements return them in document order.
#[async_trait]
pub trait Page: Send {
	async fn goto(&mut self, url: &str) -> DriverResult<()>;

	async fn reload(&mut self) -> DriverResult<()>;

	/// Waits for `selector` to attach. `None` waits indefinitely.
	async fn wait_for_selector(&mut self, selector: &str, timeout: Option<Duration>) -> DriverResult<()>;

	async fn count(&mut self, selector: &str) -> DriverResult<usize>;

	async fn exists(&mut self, selector: &str) -> DriverResult<bool> {
		Ok(self.count(selector).await? > 0)
	}

	async fn click(&mut self, selector: &str) -> DriverResult<()>;

	/// Types into the element as key presses, appending to its value.
	async fn type_text(&mut self, selector: &str, text: &str) -> DriverResult<()>;

	/// Replaces the element's value.
	async fn fill(&mut self, selector: &str, text: &str) -> DriverResult<()>;

	async fn text_contents(&mut self, selector: &str) -> DriverResult<Vec<String>>;

	async fn inner_htmls(&mut self, selector: &str) -> DriverResult<Vec<String>>;

	async fn cookies(&mut self) -> DriverResult<Vec<Cookie>>;

	async fn add_cookies(&mut self, cookies: Vec<Cookie>) -> DriverResult<()>;

	async fn close(&mut self) -> DriverResult<()>;
}

/// Opens browser pages for a surface.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
	async fn launch(&self, options: &LaunchOptions) -> DriverResult<Box<dyn Page>>;
}
