use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Source shown when no shared text is available.
pub const DEFAULT_SOURCE: &str = "def foo(x):\n  return x + 2\n\nfoo(\"1\")";

/// Session settings, read from TOML. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
	/// Quiet interval before an edited document is validated.
	pub validate_delay_ms: u64,
	/// Quiet interval before the share link is rewritten.
	pub share_delay_ms: u64,
	pub default_source: String,
	/// Engine program followed by its arguments.
	pub engine_command: Option<Vec<String>>,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			validate_delay_ms: 500,
			share_delay_ms: 500,
			default_source: DEFAULT_SOURCE.to_string(),
			engine_command: None,
		}
	}
}

impl SessionConfig {
	/// Reads and parses the configuration file at `path`.
	pub fn load(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		let config = Self::from_toml(&text).map_err(|error| ConfigError::Parse {
			path: path.to_path_buf(),
			error,
		})?;
		tracing::debug!(path = %path.display(), "config.loaded");
		Ok(config)
	}

	pub fn from_toml(text: &str) -> std::result::Result<Self, toml::de::Error> {
		toml::from_str(text)
	}

	pub fn validate_delay(&self) -> Duration {
		Duration::from_millis(self.validate_delay_ms)
	}

	pub fn share_delay(&self) -> Duration {
		Duration::from_millis(self.share_delay_ms)
	}
}
