use std::path::Path;

use chatpilot_runtime::WorkerConfig;
use tracing::info;

use crate::error::Result;

pub fn run(path: &Path) -> Result<()> {
	let config = WorkerConfig::load(path)?;
	info!(target = "chatpilot", path = %path.display(), kind = %config.session_kind, "config ok");

	println!("config: {}", path.display());
	println!("session kind: {}", config.session_kind);
	println!("retry limit: {}", config.retry_limit);
	println!("headless: {}", config.headless);
	println!("poll interval: {}ms", config.poll_interval_ms);
	println!("cookies: {}", config.credential_path().display());
	if let Some(credentials) = &config.credentials {
		println!("credentials: {}", credentials.email);
	}
	Ok(())
}
