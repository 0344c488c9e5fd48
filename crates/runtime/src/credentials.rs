//! File-backed cookie persistence shared by the browser surfaces.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chatpilot_protocol::{Cookie, StoredCredentials};
use tracing::debug;

use crate::error::DriverResult;

/// Reads and writes a `{"cookies": [...]}` JSON file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
	path: PathBuf,
}

impl CredentialStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Returns `None` when nothing has been persisted yet.
	pub fn load(&self) -> DriverResult<Option<StoredCredentials>> {
		let raw = match fs::read_to_string(&self.path) {
			Ok(raw) => raw,
			Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
			Err(err) => return Err(err.into()),
		};
		let stored: StoredCredentials = serde_json::from_str(&raw)?;
		debug!(target = "chatpilot.surface", path = %self.path.display(), cookies = stored.cookies.len(), "loaded cookies");
		Ok(Some(stored))
	}

	pub fn save(&self, cookies: &[Cookie]) -> DriverResult<()> {
		if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
			fs::create_dir_all(parent)?;
		}
		let stored = StoredCredentials { cookies: cookies.to_vec() };
		fs::write(&self.path, serde_json::to_string_pretty(&stored)?)?;
		debug!(target = "chatpilot.surface", path = %self.path.display(), cookies = cookies.len(), "saved cookies");
		Ok(())
	}

	/// Removes the file. Returns whether anything was deleted.
	pub fn clear(&self) -> DriverResult<bool> {
		match fs::remove_file(&self.path) {
			Ok(()) => Ok(true),
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
			Err(err) => Err(err.into()),
		}
	}
}
