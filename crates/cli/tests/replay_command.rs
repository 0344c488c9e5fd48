use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn chatpilot(args: &[&str], dir: &Path) -> Output {
	Command::new(env!("CARGO_BIN_EXE_chatpilot"))
		.args(args)
		.current_dir(dir)
		.env_remove("RUST_LOG")
		.output()
		.expect("failed to run chatpilot")
}

fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
	let path = dir.path().join(name);
	std::fs::write(&path, body).unwrap();
	path
}

const FAST_SCRIPTED: &str = r#"{"sessionKind": "scripted", "retryLimit": 1, "pollIntervalMs": 2, "settleDelayMs": 1}"#;
const HELLO_SCRIPT: &str = r#"{"turns": [{"samples": ["", "Hel", "Hello", "Hello world"], "html": "<p>Hello world</p>"}]}"#;

#[test]
fn replay_streams_ndjson_events() {
	let dir = TempDir::new().unwrap();
	write(&dir, "chatpilot.config.json", FAST_SCRIPTED);
	write(&dir, "script.json", HELLO_SCRIPT);

	let output = chatpilot(&["replay", "--script", "script.json", "--format", "ndjson", "say hello"], dir.path());
	assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

	let stdout = String::from_utf8(output.stdout).unwrap();
	let events: Vec<serde_json::Value> = stdout.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
	let statuses: Vec<&str> = events.iter().map(|event| event["status"].as_str().unwrap()).collect();
	assert_eq!(statuses, vec!["start", "replying", "replying", "end"]);
	assert_eq!(events[3]["content"], "Hello world");
	assert_eq!(events[3]["html"], "<p>Hello world</p>");
}

#[test]
fn replay_text_prints_the_reply() {
	let dir = TempDir::new().unwrap();
	let config = write(&dir, "custom.json", FAST_SCRIPTED);
	let script = write(&dir, "script.json", HELLO_SCRIPT);

	let output = chatpilot(
		&["replay", "-c", config.to_str().unwrap(), "-s", script.to_str().unwrap(), "say hello"],
		dir.path(),
	);
	assert!(output.status.success());
	assert_eq!(String::from_utf8(output.stdout).unwrap(), "Hello world\n");
}

#[test]
fn missing_config_exits_with_code_two() {
	let dir = TempDir::new().unwrap();
	write(&dir, "script.json", HELLO_SCRIPT);

	let output = chatpilot(&["replay", "--script", "script.json", "hi"], dir.path());
	assert_eq!(output.status.code(), Some(2));
	assert!(output.stdout.is_empty());
}

#[test]
fn exhausted_retries_exit_with_code_three() {
	let dir = TempDir::new().unwrap();
	write(&dir, "chatpilot.config.json", FAST_SCRIPTED);
	write(&dir, "script.json", r#"{"launchFailures": 5}"#);

	let output = chatpilot(&["replay", "--script", "script.json", "hi"], dir.path());
	assert_eq!(output.status.code(), Some(3));
}

#[test]
fn failed_reload_mid_turn_keeps_the_retry_exit_code() {
	let dir = TempDir::new().unwrap();
	write(
		&dir,
		"chatpilot.config.json",
		r#"{"sessionKind": "scripted", "retryLimit": 0, "pollIntervalMs": 2, "settleDelayMs": 1}"#,
	);
	write(
		&dir,
		"script.json",
		r#"{"failingReloads": [1], "turns": [{"samples": ["a", "ab"], "surfaceErrorAt": 0}]}"#,
	);

	let output = chatpilot(&["replay", "--script", "script.json", "hi"], dir.path());
	assert_eq!(output.status.code(), Some(3), "stderr: {}", String::from_utf8_lossy(&output.stderr));
}

#[test]
fn browser_sessions_are_not_replayable() {
	let dir = TempDir::new().unwrap();
	write(&dir, "chatpilot.config.json", r#"{"sessionKind": "fastChat"}"#);
	write(&dir, "script.json", HELLO_SCRIPT);

	let output = chatpilot(&["replay", "--script", "script.json", "hi"], dir.path());
	assert_eq!(output.status.code(), Some(2));
}

#[test]
fn check_reports_resolved_config() {
	let dir = TempDir::new().unwrap();
	write(
		&dir,
		"chatpilot.config.json",
		r#"{"sessionKind": "chatgpt", "credentials": {"email": "me@example.com", "password": "secret"}}"#,
	);

	let output = chatpilot(&["check"], dir.path());
	assert!(output.status.success());
	let stdout = String::from_utf8(output.stdout).unwrap();
	assert!(stdout.contains("session kind: chatgpt"));
	assert!(stdout.contains("retry limit: 3"));
	assert!(stdout.contains("credentials: me@example.com"));
	assert!(!stdout.contains("secret"));
}

#[test]
fn check_rejects_invalid_config() {
	let dir = TempDir::new().unwrap();
	write(&dir, "chatpilot.config.json", r#"{"sessionKind": "scripted", "pollIntervalMs": 0}"#);

	let output = chatpilot(&["check"], dir.path());
	assert_eq!(output.status.code(), Some(2));
}
