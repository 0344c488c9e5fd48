use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Pacing, SurfaceSession};
use crate::config::WorkerConfig;
use crate::driver::{Driver, SignIn};
use crate::error::{DriverError, DriverResult};

pub(super) const URL: &str = "https://chat.openai.com/";

const LOGIN_BUTTON: &str = ".btn.relative.btn-primary";
const EMAIL_INPUT: &str = "#username";
const CONTINUE_BUTTON: &str = "button[type=\"submit\"]";
const PASSWORD_INPUT: &str = "#password";
const PASSWORD_CONTINUE_BUTTON: &str = "._button-login-password";
const TUTORIAL_NEXT_BUTTON: &str = "div[role=\"dialog\"] button:last-child";
const TEXTAREA: &str = "textarea";
const SEND_BUTTON: &str = ".absolute.p-1.rounded-md.text-white";
/// The send button shows its icon again once the reply is complete.
const SEND_BUTTON_ICON: &str = ".absolute.p-1.rounded-md.text-white svg";
const STREAMING_REPLY: &str = ".result-streaming";
/// Markdown of the last message group only; empty when that group has none.
const LAST_MESSAGE_MARKDOWN: &str = ".group.w-full >> nth=-1 >> .markdown";
const ERROR_BANNER: &str = ".bg-red-500\\/10";
const HUMAN_CHECK: &str = "#content";

const COMPOSER_TIMEOUT: Duration = Duration::from_secs(1);
const TUTORIAL_STEPS: usize = 3;

pub struct ChatGptDriver {
	session: SurfaceSession,
	pacing: Pacing,
	restored: bool,
}

impl ChatGptDriver {
	pub(crate) fn new(session: SurfaceSession, pacing: Pacing) -> Self {
		Self {
			session,
			pacing,
			restored: false,
		}
	}

	/// Checks whether restored cookies still open the chat directly.
	async fn resume(&mut self) -> DriverResult<Option<SignIn>> {
		let url = self.session.url().to_string();
		let page = self.session.page()?;
		page.goto(&url).await?;
		if page.exists(HUMAN_CHECK).await? {
			info!(target = "chatpilot.surface", "human verification page shown");
			return Ok(Some(SignIn::NeedsInteractive));
		}
		let composer = match page.wait_for_selector(TEXTAREA, Some(COMPOSER_TIMEOUT)).await {
			Ok(()) => page.wait_for_selector(SEND_BUTTON, Some(COMPOSER_TIMEOUT)).await,
			Err(err) => Err(err),
		};
		match composer {
			Ok(()) => Ok(Some(SignIn::Ok)),
			Err(err) => {
				debug!(target = "chatpilot.surface", error = %err, "cookies expired");
				Ok(None)
			}
		}
	}

	async fn log_in(&mut self, config: &WorkerConfig) -> DriverResult<()> {
		let credentials = config.credentials.as_ref().ok_or(DriverError::MissingCredentials)?;
		let page = self.session.page()?;

		page.wait_for_selector(LOGIN_BUTTON, None).await?;
		self.pacing.settle().await;
		page.click(LOGIN_BUTTON).await?;

		page.wait_for_selector(EMAIL_INPUT, None).await?;
		self.pacing.step().await;
		page.type_text(EMAIL_INPUT, &credentials.email).await?;
		page.wait_for_selector(CONTINUE_BUTTON, None).await?;
		page.click(CONTINUE_BUTTON).await?;

		page.wait_for_selector(PASSWORD_INPUT, None).await?;
		self.pacing.step().await;
		page.type_text(PASSWORD_INPUT, &credentials.password).await?;
		page.wait_for_selector(PASSWORD_CONTINUE_BUTTON, None).await?;
		page.click(PASSWORD_CONTINUE_BUTTON).await?;
		Ok(())
	}
}

#[async_trait]
impl Driver for ChatGptDriver {
	fn name(&self) -> &str {
		"chatgpt"
	}

	async fn launch(&mut self, config: &WorkerConfig) -> DriverResult<()> {
		self.restored = false;
		self.session.open(config).await
	}

	async fn sign_in(&mut self, config: &WorkerConfig) -> DriverResult<SignIn> {
		if self.restored {
			if let Some(outcome) = self.resume().await? {
				return Ok(outcome);
			}
		}
		self.log_in(config).await?;
		Ok(SignIn::Ok)
	}

	async fn prepare(&mut self) -> DriverResult<()> {
		self.pacing.settle().await;
		let page = self.session.page()?;
		page.wait_for_selector(TEXTAREA, None).await?;
		page.wait_for_selector(SEND_BUTTON, None).await?;

		if page.exists(TUTORIAL_NEXT_BUTTON).await? {
			for _ in 0..TUTORIAL_STEPS {
				page.click(TUTORIAL_NEXT_BUTTON).await?;
				self.pacing.step().await;
			}
		}
		Ok(())
	}

	async fn submit(&mut self, text: &str) -> DriverResult<()> {
		let page = self.session.page()?;
		page.fill(TEXTAREA, text).await?;
		page.type_text(TEXTAREA, " ").await?;
		page.click(SEND_BUTTON).await
	}

	async fn is_start_reply(&mut self) -> DriverResult<bool> {
		self.session.page()?.exists(STREAMING_REPLY).await
	}

	async fn read_text(&mut self) -> DriverResult<String> {
		let page = self.session.page()?;
		if let Some(text) = page.text_contents(STREAMING_REPLY).await?.pop() {
			return Ok(text);
		}
		Ok(page.text_contents(LAST_MESSAGE_MARKDOWN).await?.pop().unwrap_or_default())
	}

	async fn read_html(&mut self) -> DriverResult<String> {
		let page = self.session.page()?;
		if let Some(html) = page.inner_htmls(STREAMING_REPLY).await?.pop() {
			return Ok(html);
		}
		Ok(page.inner_htmls(LAST_MESSAGE_MARKDOWN).await?.pop().unwrap_or_default())
	}

	async fn is_reply_over(&mut self) -> DriverResult<bool> {
		self.session.page()?.exists(SEND_BUTTON_ICON).await
	}

	async fn has_surface_error(&mut self) -> DriverResult<bool> {
		self.session.page()?.exists(ERROR_BANNER).await
	}

	async fn reload(&mut self) -> DriverResult<()> {
		self.session.reload().await
	}

	async fn persist_credentials(&mut self) -> DriverResult<()> {
		self.session.persist_cookies().await
	}

	async fn restore_credentials(&mut self) -> DriverResult<bool> {
		self.restored = self.session.restore_cookies().await?;
		Ok(self.restored)
	}

	async fn close(&mut self) -> DriverResult<()> {
		self.session.close().await
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use chatpilot_protocol::Cookie;
	use tempfile::TempDir;

	use super::*;
	use crate::config::{Credentials, SessionKind};
	use crate::credentials::CredentialStore;
	use crate::surface::testing::{Action, FakeLauncher, FakePage};

	fn config() -> WorkerConfig {
		let mut config = WorkerConfig::new(SessionKind::ChatGpt);
		config.credentials = Some(Credentials {
			email: "me@example.com".into(),
			password: "secret".into(),
		});
		config
	}

	fn driver(page: &FakePage, dir: &TempDir) -> ChatGptDriver {
		let session = SurfaceSession::new(
			Arc::new(FakeLauncher::new(page.clone())),
			CredentialStore::new(dir.path().join("cookies.json")),
			URL.to_string(),
		);
		ChatGptDriver::new(session, Pacing::none())
	}

	fn login_page() -> FakePage {
		let page = FakePage::default();
		for selector in [LOGIN_BUTTON, EMAIL_INPUT, CONTINUE_BUTTON, PASSWORD_INPUT, PASSWORD_CONTINUE_BUTTON] {
			page.show(selector);
		}
		page
	}

	#[tokio::test]
	async fn logs_in_with_credentials_without_cookies() {
		let dir = TempDir::new().unwrap();
		let page = login_page();
		let mut driver = driver(&page, &dir);

		driver.launch(&config()).await.unwrap();
		assert!(!driver.restore_credentials().await.unwrap());
		assert_eq!(driver.sign_in(&config()).await.unwrap(), SignIn::Ok);

		let actions = page.actions();
		assert!(actions.contains(&Action::Type(EMAIL_INPUT.into(), "me@example.com".into())));
		assert!(actions.contains(&Action::Type(PASSWORD_INPUT.into(), "secret".into())));
		assert_eq!(actions.last(), Some(&Action::Click(PASSWORD_CONTINUE_BUTTON.into())));
	}

	#[tokio::test]
	async fn restored_cookies_skip_the_login_form() {
		let dir = TempDir::new().unwrap();
		CredentialStore::new(dir.path().join("cookies.json")).save(&[Cookie::new("sid", "1")]).unwrap();
		let page = FakePage::default();
		page.show(TEXTAREA);
		page.show(SEND_BUTTON);
		let mut driver = driver(&page, &dir);

		driver.launch(&config()).await.unwrap();
		assert!(driver.restore_credentials().await.unwrap());
		assert_eq!(driver.sign_in(&config()).await.unwrap(), SignIn::Ok);
		assert!(!page.actions().iter().any(|action| matches!(action, Action::Click(_))));
		assert_eq!(page.cookie_names(), vec!["sid".to_string()]);
	}

	#[tokio::test]
	async fn human_check_needs_interaction() {
		let dir = TempDir::new().unwrap();
		CredentialStore::new(dir.path().join("cookies.json")).save(&[Cookie::new("sid", "1")]).unwrap();
		let page = FakePage::default();
		page.show(HUMAN_CHECK);
		let mut driver = driver(&page, &dir);

		driver.launch(&config()).await.unwrap();
		driver.restore_credentials().await.unwrap();
		assert_eq!(driver.sign_in(&config()).await.unwrap(), SignIn::NeedsInteractive);
	}

	#[tokio::test]
	async fn missing_credentials_fail_sign_in() {
		let dir = TempDir::new().unwrap();
		let page = login_page();
		let mut driver = driver(&page, &dir);

		let bare = WorkerConfig::new(SessionKind::ChatGpt);
		driver.launch(&bare).await.unwrap();
		assert!(matches!(driver.sign_in(&bare).await, Err(DriverError::MissingCredentials)));
	}

	#[tokio::test]
	async fn prepare_dismisses_the_tutorial() {
		let dir = TempDir::new().unwrap();
		let page = FakePage::default();
		for selector in [TEXTAREA, SEND_BUTTON, TUTORIAL_NEXT_BUTTON] {
			page.show(selector);
		}
		let mut driver = driver(&page, &dir);

		driver.launch(&config()).await.unwrap();
		driver.prepare().await.unwrap();
		let clicks = page
			.actions()
			.into_iter()
			.filter(|action| *action == Action::Click(TUTORIAL_NEXT_BUTTON.into()))
			.count();
		assert_eq!(clicks, TUTORIAL_STEPS);
	}

	#[tokio::test]
	async fn reads_streaming_reply_then_final_markdown() {
		let dir = TempDir::new().unwrap();
		let page = FakePage::default();
		let mut driver = driver(&page, &dir);
		driver.launch(&config()).await.unwrap();

		assert!(!driver.is_start_reply().await.unwrap());
		page.set(STREAMING_REPLY, ["Hel"]);
		assert!(driver.is_start_reply().await.unwrap());
		assert_eq!(driver.read_text().await.unwrap(), "Hel");
		assert!(!driver.is_reply_over().await.unwrap());

		page.hide(STREAMING_REPLY);
		page.set(LAST_MESSAGE_MARKDOWN, ["Hello"]);
		page.show(SEND_BUTTON_ICON);
		assert_eq!(driver.read_text().await.unwrap(), "Hello");
		assert_eq!(driver.read_html().await.unwrap(), "<p>Hello</p>");
		assert!(driver.is_reply_over().await.unwrap());
	}

	#[tokio::test]
	async fn last_group_without_markdown_reads_empty() {
		let dir = TempDir::new().unwrap();
		let page = FakePage::default();
		let mut driver = driver(&page, &dir);
		driver.launch(&config()).await.unwrap();

		page.set(".group.w-full", ["old question", "old answer", "new question"]);
		page.set(".group.w-full .markdown", ["old answer"]);
		assert_eq!(driver.read_text().await.unwrap(), "");
		assert_eq!(driver.read_html().await.unwrap(), "");
	}

	#[tokio::test]
	async fn error_banner_is_a_surface_error() {
		let dir = TempDir::new().unwrap();
		let page = FakePage::default();
		let mut driver = driver(&page, &dir);
		driver.launch(&config()).await.unwrap();

		assert!(!driver.has_surface_error().await.unwrap());
		page.show(ERROR_BANNER);
		assert!(driver.has_surface_error().await.unwrap());
	}
}
