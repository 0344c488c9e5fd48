//! In-memory page for surface tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatpilot_protocol::Cookie;
use parking_lot::Mutex;

use crate::error::{DriverError, DriverResult};
use crate::page::{BrowserLauncher, LaunchOptions, Page};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
	Goto(String),
	Reload,
	Click(String),
	Type(String, String),
	Fill(String, String),
}

#[derive(Default)]
struct Dom {
	elements: HashMap<String, Vec<String>>,
	cookies: Vec<Cookie>,
	actions: Vec<Action>,
	closed: bool,
}

/// Page whose "DOM" is a map from selector to the texts it matches.
#[derive(Clone, Default)]
pub(crate) struct FakePage {
	dom: Arc<Mutex<Dom>>,
}

impl FakePage {
	pub(crate) fn set<I, S>(&self, selector: &str, texts: I)
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.dom.lock().elements.insert(selector.to_string(), texts.into_iter().map(Into::into).collect());
	}

	pub(crate) fn show(&self, selector: &str) {
		self.set(selector, [""]);
	}

	pub(crate) fn hide(&self, selector: &str) {
		self.dom.lock().elements.remove(selector);
	}

	pub(crate) fn set_cookies(&self, cookies: Vec<Cookie>) {
		self.dom.lock().cookies = cookies;
	}

	pub(crate) fn cookie_names(&self) -> Vec<String> {
		self.dom.lock().cookies.iter().map(|cookie| cookie.name.clone()).collect()
	}

	pub(crate) fn actions(&self) -> Vec<Action> {
		self.dom.lock().actions.clone()
	}

	pub(crate) fn visited(&self) -> Vec<String> {
		self.actions()
			.into_iter()
			.filter_map(|action| match action {
				Action::Goto(url) => Some(url),
				_ => None,
			})
			.collect()
	}

	pub(crate) fn is_closed(&self) -> bool {
		self.dom.lock().closed
	}

	fn act(&self, action: Action) -> DriverResult<()> {
		let mut dom = self.dom.lock();
		if dom.closed {
			return Err(DriverError::Closed);
		}
		dom.actions.push(action);
		Ok(())
	}

	fn require(&self, selector: &str) -> DriverResult<()> {
		if self.dom.lock().elements.contains_key(selector) {
			Ok(())
		} else {
			Err(DriverError::NotFound {
				selector: selector.to_string(),
			})
		}
	}
}

#[async_trait]
impl Page for FakePage {
	async fn goto(&mut self, url: &str) -> DriverResult<()> {
		self.act(Action::Goto(url.to_string()))
	}

	async fn reload(&mut self) -> DriverResult<()> {
		self.act(Action::Reload)
	}

	async fn wait_for_selector(&mut self, selector: &str, timeout: Option<Duration>) -> DriverResult<()> {
		self.require(selector).map_err(|_| DriverError::Timeout {
			ms: timeout.map_or(0, |timeout| timeout.as_millis() as u64),
			condition: selector.to_string(),
		})
	}

	async fn count(&mut self, selector: &str) -> DriverResult<usize> {
		Ok(self.dom.lock().elements.get(selector).map_or(0, Vec::len))
	}

	async fn click(&mut self, selector: &str) -> DriverResult<()> {
		self.require(selector)?;
		self.act(Action::Click(selector.to_string()))
	}

	async fn type_text(&mut self, selector: &str, text: &str) -> DriverResult<()> {
		self.require(selector)?;
		self.act(Action::Type(selector.to_string(), text.to_string()))
	}

	async fn fill(&mut self, selector: &str, text: &str) -> DriverResult<()> {
		self.require(selector)?;
		self.act(Action::Fill(selector.to_string(), text.to_string()))
	}

	async fn text_contents(&mut self, selector: &str) -> DriverResult<Vec<String>> {
		Ok(self.dom.lock().elements.get(selector).cloned().unwrap_or_default())
	}

	async fn inner_htmls(&mut self, selector: &str) -> DriverResult<Vec<String>> {
		let texts = self.text_contents(selector).await?;
		Ok(texts.into_iter().map(|text| format!("<p>{text}</p>")).collect())
	}

	async fn cookies(&mut self) -> DriverResult<Vec<Cookie>> {
		Ok(self.dom.lock().cookies.clone())
	}

	async fn add_cookies(&mut self, cookies: Vec<Cookie>) -> DriverResult<()> {
		self.dom.lock().cookies.extend(cookies);
		Ok(())
	}

	async fn close(&mut self) -> DriverResult<()> {
		self.dom.lock().closed = true;
		Ok(())
	}
}

/// Hands out clones of one [`FakePage`].
pub(crate) struct FakeLauncher {
	page: FakePage,
	launches: Mutex<Vec<LaunchOptions>>,
}

impl FakeLauncher {
	pub(crate) fn new(page: FakePage) -> Self {
		Self {
			page,
			launches: Mutex::new(Vec::new()),
		}
	}

	pub(crate) fn launches(&self) -> Vec<LaunchOptions> {
		self.launches.lock().clone()
	}
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
	async fn launch(&self, options: &LaunchOptions) -> DriverResult<Box<dyn Page>> {
		self.launches.lock().push(options.clone());
		self.page.dom.lock().closed = false;
		Ok(Box::new(self.page.clone()))
	}
}
