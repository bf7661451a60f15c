use std::path::Path;

use color_eyre::{Result, eyre::eyre};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
	/// Base URL of the study-app backend
	#[serde(default = "default_api_base")]
	pub api_base: String,
	/// HTTP request timeout in seconds (default: 30)
	#[serde(default = "default_http_timeout_secs")]
	pub http_timeout_secs: u64,
	/// Delay before the first detection pass on a result page, in ms (default: 1000)
	#[serde(default = "default_initial_detect_delay_ms")]
	pub initial_detect_delay_ms: u64,
	/// Delay before the second detection pass, in ms (default: 3000)
	#[serde(default = "default_second_detect_delay_ms")]
	pub second_detect_delay_ms: u64,
	/// Delay between further retries when both counts parse as zero, in ms (default: 2000)
	#[serde(default = "default_retry_detect_delay_ms")]
	pub retry_detect_delay_ms: u64,
	/// Max detection passes per navigation event before giving up (default: 5)
	#[serde(default = "default_max_detect_attempts")]
	pub max_detect_attempts: u32,
	/// Interval between URL polls in the host loop, in ms (default: 500)
	#[serde(default = "default_url_poll_interval_ms")]
	pub url_poll_interval_ms: u64,
	/// Run with visible browser window (non-headless mode)
	#[serde(default)]
	pub visible: bool,
}

fn default_api_base() -> String {
	"http://150.241.105.221:80".to_string()
}

fn default_http_timeout_secs() -> u64 {
	30
}

fn default_initial_detect_delay_ms() -> u64 {
	1000
}

fn default_second_detect_delay_ms() -> u64 {
	3000
}

fn default_retry_detect_delay_ms() -> u64 {
	2000
}

fn default_max_detect_attempts() -> u32 {
	5
}

fn default_url_poll_interval_ms() -> u64 {
	500
}

impl Default for AppConfig {
	fn default() -> Self {
		Self {
			api_base: default_api_base(),
			http_timeout_secs: default_http_timeout_secs(),
			initial_detect_delay_ms: default_initial_detect_delay_ms(),
			second_detect_delay_ms: default_second_detect_delay_ms(),
			retry_detect_delay_ms: default_retry_detect_delay_ms(),
			max_detect_attempts: default_max_detect_attempts(),
			url_poll_interval_ms: default_url_poll_interval_ms(),
			visible: false,
		}
	}
}

impl AppConfig {
	/// Load from a JSON config file, filling unset fields with defaults
	pub fn load(path: &Path) -> Result<Self> {
		let raw = std::fs::read_to_string(path).map_err(|e| eyre!("Failed to read config {}: {}", path.display(), e))?;
		serde_json::from_str(&raw).map_err(|e| eyre!("Failed to parse config {}: {}", path.display(), e))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_sane() {
		let config = AppConfig::default();
		assert_eq!(config.max_detect_attempts, 5);
		assert_eq!(config.initial_detect_delay_ms, 1000);
		assert_eq!(config.second_detect_delay_ms, 3000);
		assert!(!config.visible);
	}

	#[test]
	fn partial_config_fills_defaults() {
		let config: AppConfig = serde_json::from_str(r#"{"api_base":"http://localhost:8000","visible":true}"#).unwrap();
		assert_eq!(config.api_base, "http://localhost:8000");
		assert!(config.visible);
		assert_eq!(config.url_poll_interval_ms, 500);
	}
}
